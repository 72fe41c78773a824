// self
use crate::obs::{FlowKind, FlowOutcome, GateOutcome};

/// Increments `playlist_gate_flow_total{flow,outcome}`. No-op without the `metrics` feature.
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"playlist_gate_flow_total",
		"flow" => kind.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = (kind, outcome);
}

/// Increments `playlist_gate_gate_total{outcome}`. No-op without the `metrics` feature.
pub fn record_gate_decision(outcome: GateOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!("playlist_gate_gate_total", "outcome" => outcome.as_str()).increment(1);
	#[cfg(not(feature = "metrics"))]
	let _ = outcome;
}
