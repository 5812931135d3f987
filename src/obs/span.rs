// crates.io
use tracing::{Instrument as _, Span, instrument::Instrumented, span::EnteredSpan};
// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome, record_flow_outcome},
};

/// A span builder used by sink flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	kind: FlowKind,
	span: Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		let span = tracing::info_span!("coyote.flow", flow = kind.as_str(), stage);

		Self { kind, span }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> EnteredSpan {
		self.span.entered()
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}

	/// Instruments a fallible async block and records its attempt and outcome.
	pub async fn observe<Fut, T>(&self, fut: Fut) -> Result<T>
	where
		Fut: Future<Output = Result<T>>,
	{
		record_flow_outcome(self.kind, FlowOutcome::Attempt);

		let result = self.instrument(fut).await;
		let outcome = match &result {
			Ok(_) => FlowOutcome::Success,
			Err(Error::Cancelled) => FlowOutcome::Cancelled,
			Err(_) => FlowOutcome::Failure,
		};

		record_flow_outcome(self.kind, outcome);

		result
	}
}
