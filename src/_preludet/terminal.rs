//! Scripted operator and browser doubles.

// std
use std::{collections::VecDeque, io, sync::mpsc::Receiver};
// self
use crate::{
	_prelude::*,
	auth::{Choice, Prompter, Secret},
	error::PromptError,
	oauth::BrowserLauncher,
};

type OpenHook = Box<dyn Fn(&Url) + Send + Sync>;

/// [`Prompter`] that replays queued answers and records every label it was asked.
///
/// Text and password prompts consume [`ScriptedPrompter::answer`]s; menus consume
/// [`ScriptedPrompter::pick`]s. Running out of answers fails the prompt.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
	answers: Mutex<VecDeque<String>>,
	picks: Mutex<VecDeque<usize>>,
	asked: Mutex<Vec<String>>,
	hold: Mutex<Option<Receiver<()>>>,
}
impl ScriptedPrompter {
	/// Queues a text or password answer.
	pub fn answer(self, answer: impl Into<String>) -> Self {
		self.answers.lock().push_back(answer.into());

		self
	}

	/// Queues a menu selection.
	pub fn pick(self, index: usize) -> Self {
		self.picks.lock().push_back(index);

		self
	}

	/// Blocks the first prompt until `release` fires or its sender is dropped, like an operator
	/// who never answers.
	pub fn held_until(self, release: Receiver<()>) -> Self {
		*self.hold.lock() = Some(release);

		self
	}

	/// Labels asked so far, in order.
	pub fn asked(&self) -> Vec<String> {
		self.asked.lock().clone()
	}

	fn next_answer(&self, label: &str) -> Result<String, PromptError> {
		self.asked.lock().push(label.to_owned());

		let hold = self.hold.lock().take();

		if let Some(release) = hold {
			let _ = release.recv();
		}

		self.answers.lock().pop_front().ok_or_else(|| exhausted(label))
	}
}
impl Prompter for ScriptedPrompter {
	fn input(&self, label: &str) -> Result<String, PromptError> {
		self.next_answer(label)
	}

	fn password(&self, label: &str) -> Result<Secret, PromptError> {
		self.next_answer(label).map(Secret::new)
	}

	fn choose(&self, label: &str, choices: &[Choice]) -> Result<usize, PromptError> {
		self.asked.lock().push(label.to_owned());

		let index = self.picks.lock().pop_front().ok_or_else(|| exhausted(label))?;

		if index < choices.len() {
			Ok(index)
		} else {
			Err(PromptError::new(label, io::Error::other("scripted pick is out of range")))
		}
	}
}

/// [`BrowserLauncher`] that records opened URLs and optionally reacts to them.
#[derive(Default)]
pub struct RecordingBrowser {
	opened: Mutex<Vec<Url>>,
	hook: Option<OpenHook>,
}
impl RecordingBrowser {
	/// Runs `hook` for every opened URL, standing in for the operator's browser.
	pub fn on_open<F>(mut self, hook: F) -> Self
	where
		F: 'static + Fn(&Url) + Send + Sync,
	{
		self.hook = Some(Box::new(hook));

		self
	}

	/// URLs opened so far.
	pub fn opened(&self) -> Vec<Url> {
		self.opened.lock().clone()
	}
}
impl BrowserLauncher for RecordingBrowser {
	fn open(&self, url: &Url) -> Result<(), BoxError> {
		self.opened.lock().push(url.clone());

		if let Some(hook) = &self.hook {
			hook(url);
		}

		Ok(())
	}
}
impl Debug for RecordingBrowser {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RecordingBrowser")
			.field("opened", &self.opened.lock().len())
			.field("hook", &self.hook.is_some())
			.finish()
	}
}

fn exhausted(label: &str) -> PromptError {
	PromptError::new(label, io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer left"))
}
