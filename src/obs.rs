//! Observability helpers shared by the flow controller and the request gate.
//!
//! Exchanges and refreshes run inside `playlist_gate.flow` spans carrying `flow` and `stage`
//! fields. With the `metrics` feature, attempts and their outcomes increment
//! `playlist_gate_flow_total{flow,outcome}` and gate verdicts increment
//! `playlist_gate_gate_total{outcome}`.

mod metrics;
mod span;

pub use metrics::*;
pub use span::*;

// self
use crate::_prelude::*;

macro_rules! label_enum {
	(
		$(#[$meta:meta])*
		pub enum $name:ident {
			$($(#[$variant_meta:meta])* $variant:ident => $label:literal,)+
		}
	) => {
		$(#[$meta])*
		#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
		pub enum $name {
			$($(#[$variant_meta])* $variant,)+
		}
		impl $name {
			/// Stable label for span and metric fields.
			pub const fn as_str(self) -> &'static str {
				match self {
					$(Self::$variant => $label,)+
				}
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(self.as_str())
			}
		}
	};
}

label_enum! {
	/// Grant being exercised.
	pub enum FlowKind {
		/// Consent URL, callback, and code exchange.
		Authorization => "authorization_code",
		/// Refresh-token grant.
		Refresh => "refresh",
	}
}

label_enum! {
	/// Lifecycle point of a flow operation.
	pub enum FlowOutcome {
		/// The operation started.
		Attempt => "attempt",
		/// A credential was produced.
		Success => "success",
		/// The operation returned an error.
		Failure => "failure",
	}
}

label_enum! {
	/// Request gate verdict.
	pub enum GateOutcome {
		/// Request admitted.
		Admitted => "admitted",
		/// Rejected by the rate limiter.
		RateLimited => "rate_limited",
		/// Rejected for lack of a usable credential.
		Unauthorized => "unauthorized",
	}
}
