//! Observability helpers for authentication flows and the consumer lifecycle.
//!
//! # Feature Flags
//!
//! - Spans named `coyote.flow` carry the `flow` and `stage` (call site) fields.
//! - Enable `metrics` to increment `coyote_flow_total` (labeled by `flow` + `outcome`) and
//!   `coyote_transition_total` (labeled by `from` + `to`).

mod counter;
mod span;

pub use counter::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Broker and provider metadata discovery.
	Discovery,
	/// Consent URL presentation and callback capture.
	Authorize,
	/// Authorization code for token exchange.
	Exchange,
	/// Broker dial.
	Connect,
	/// Channel, queue, and binding setup.
	ChannelInit,
	/// Delivery stream setup.
	Consume,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Discovery => "discovery",
			FlowKind::Authorize => "authorize",
			FlowKind::Exchange => "exchange",
			FlowKind::Connect => "connect",
			FlowKind::ChannelInit => "channel_init",
			FlowKind::Consume => "consume",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Interrupted by shutdown.
	Cancelled,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
