//! Interactive operator prompts.

// crates.io
use dialoguer::{Input, Password, Select};
// self
use crate::{_prelude::*, auth::Secret, error::PromptError};

/// One selectable entry in a [`Prompter::choose`] menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Choice {
	/// Primary label.
	pub label: String,
	/// Secondary note rendered next to the label.
	pub note: String,
}
impl Choice {
	/// Creates a new entry.
	pub fn new(label: impl Into<String>, note: impl Into<String>) -> Self {
		Self { label: label.into(), note: note.into() }
	}
}
impl Display for Choice {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		if self.note.is_empty() {
			f.write_str(&self.label)
		} else {
			write!(f, "{} ({})", self.label, self.note)
		}
	}
}

/// Source of operator answers; replaced by scripted answers in tests.
pub trait Prompter
where
	Self: Send + Sync,
{
	/// Reads a plain line of text.
	fn input(&self, label: &str) -> Result<String, PromptError>;

	/// Reads a masked secret.
	fn password(&self, label: &str) -> Result<Secret, PromptError>;

	/// Lets the operator pick one entry; returns its index.
	fn choose(&self, label: &str, choices: &[Choice]) -> Result<usize, PromptError>;
}

/// Runs `ask` on the blocking pool and returns early with [`Error::Cancelled`] on shutdown.
///
/// A cancelled terminal read stays parked on its thread until the operator answers.
pub async fn prompt_until_shutdown<T, F>(
	prompter: &Arc<dyn Prompter>,
	shutdown: &CancellationToken,
	ask: F,
) -> Result<T>
where
	T: 'static + Send,
	F: 'static + Send + FnOnce(&dyn Prompter) -> Result<T>,
{
	let prompter = prompter.clone();
	let answer = tokio::task::spawn_blocking(move || ask(prompter.as_ref()));

	tokio::select! {
		biased;
		_ = shutdown.cancelled() => Err(Error::Cancelled),
		joined = answer => joined.map_err(|e| PromptError::new("prompt", e))?,
	}
}

/// [`Prompter`] backed by the controlling terminal.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalPrompter;
impl Prompter for TerminalPrompter {
	fn input(&self, label: &str) -> Result<String, PromptError> {
		Input::<String>::new()
			.with_prompt(label)
			.interact_text()
			.map_err(|e| PromptError::new(label, e))
	}

	fn password(&self, label: &str) -> Result<Secret, PromptError> {
		Password::new()
			.with_prompt(label)
			.interact()
			.map(Secret::new)
			.map_err(|e| PromptError::new(label, e))
	}

	fn choose(&self, label: &str, choices: &[Choice]) -> Result<usize, PromptError> {
		Select::new()
			.with_prompt(label)
			.items(choices)
			.default(0)
			.interact()
			.map_err(|e| PromptError::new(label, e))
	}
}
