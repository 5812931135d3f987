// self
use crate::{
	consumer::ConnectionState,
	obs::{FlowKind, FlowOutcome},
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"coyote_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a lifecycle transition via the global metrics recorder (when enabled).
pub fn record_transition(from: ConnectionState, to: ConnectionState) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"coyote_transition_total",
			"from" => from.as_str(),
			"to" => to.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (from, to);
	}
}
