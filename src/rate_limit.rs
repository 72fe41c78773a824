//! Keyed sliding-window admission control.
//!
//! Every key keeps a log of the monotonic instants at which requests were admitted. An
//! admission purges instants that fell out of the window and records a new one only when
//! the remaining count is strictly below the key's limit. The whole check-and-record step
//! runs under a single lock shared by all keys, so concurrent callers can never over-admit.

// std
use std::time::{Duration as StdDuration, Instant};
// self
use crate::{_prelude::*, error::ConfigError};

/// Result of evaluating a key against its budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The request may proceed immediately; its instant has been recorded.
	Allow,
	/// The request must be rejected.
	Delay(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` for [`RateLimitDecision::Allow`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Time until the oldest retained admission leaves the window.
	pub retry_after: StdDuration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a directive with the provided backoff.
	pub fn new(retry_after: StdDuration) -> Self {
		Self { retry_after, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}

	/// Backoff rounded up to whole seconds, as sent in `Retry-After`.
	pub fn retry_after_secs(&self) -> u64 {
		let secs = self.retry_after.as_secs();

		if self.retry_after.subsec_nanos() > 0 { secs + 1 } else { secs }
	}
}

#[derive(Debug, Default)]
struct LimiterState {
	limits: HashMap<String, usize>,
	windows: HashMap<String, VecDeque<Instant>>,
}

/// Sliding-window limiter keyed by endpoint identifier.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
	window: StdDuration,
	state: Mutex<LimiterState>,
}
impl SlidingWindowLimiter {
	/// Creates a limiter with the shared window length. Zero windows are rejected.
	pub fn new(window: StdDuration) -> Result<Self, ConfigError> {
		if window.is_zero() {
			return Err(ConfigError::InvalidWindow);
		}

		Ok(Self { window, state: Mutex::new(LimiterState::default()) })
	}

	/// Builder-style variant of [`Self::configure`].
	pub fn with_limit(self, key: impl Into<String>, limit: usize) -> Self {
		self.configure(key, limit);

		self
	}

	/// Sets or replaces the limit for `key`.
	pub fn configure(&self, key: impl Into<String>, limit: usize) {
		self.state.lock().limits.insert(key.into(), limit);
	}

	/// Configured limit for `key`; unconfigured keys report zero.
	pub fn limit(&self, key: &str) -> usize {
		self.state.lock().limits.get(key).copied().unwrap_or(0)
	}

	/// Window length shared by every key.
	pub fn window(&self) -> StdDuration {
		self.window
	}

	/// Admits and records a request for `key` if it fits in the current window.
	pub fn allow(&self, key: &str) -> bool {
		self.allow_at(key, Instant::now())
	}

	/// [`Self::allow`] evaluated at an explicit instant.
	pub fn allow_at(&self, key: &str, now: Instant) -> bool {
		self.evaluate_at(key, now).is_allowed()
	}

	/// Same admission step as [`Self::allow`], reporting a retry hint on rejection.
	pub fn evaluate(&self, key: &str) -> RateLimitDecision {
		self.evaluate_at(key, Instant::now())
	}

	/// [`Self::evaluate`] evaluated at an explicit instant.
	pub fn evaluate_at(&self, key: &str, now: Instant) -> RateLimitDecision {
		let window = self.window;
		let mut state = self.state.lock();
		let limit = state.limits.get(key).copied().unwrap_or(0);
		let log = state.windows.entry(key.to_owned()).or_default();

		while log.front().is_some_and(|admitted| now.saturating_duration_since(*admitted) >= window)
		{
			log.pop_front();
		}

		if log.len() < limit {
			log.push_back(now);

			return RateLimitDecision::Allow;
		}

		let retry_after = log
			.front()
			.map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
			.unwrap_or(window);

		RateLimitDecision::Delay(
			RetryDirective::new(retry_after)
				.with_reason(format!("{limit} requests per {}s exceeded", window.as_secs())),
		)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn limiter(limit: usize) -> SlidingWindowLimiter {
		SlidingWindowLimiter::new(StdDuration::from_secs(60))
			.expect("Non-zero window should be accepted.")
			.with_limit("/auth/url", limit)
	}

	#[test]
	fn zero_window_is_rejected() {
		assert!(matches!(
			SlidingWindowLimiter::new(StdDuration::ZERO),
			Err(ConfigError::InvalidWindow)
		));
	}

	#[test]
	fn admits_up_to_limit_then_rejects_with_retry_hint() {
		let limiter = limiter(2);
		let start = Instant::now();

		assert!(limiter.allow_at("/auth/url", start));
		assert!(limiter.allow_at("/auth/url", start + StdDuration::from_secs(10)));

		match limiter.evaluate_at("/auth/url", start + StdDuration::from_secs(20)) {
			RateLimitDecision::Delay(directive) => {
				assert_eq!(directive.retry_after, StdDuration::from_secs(40));
				assert_eq!(directive.retry_after_secs(), 40);
			},
			RateLimitDecision::Allow => panic!("Third request inside the window must be rejected."),
		}
	}

	#[test]
	fn window_slides_as_instants_expire() {
		let limiter = limiter(2);
		let start = Instant::now();

		assert!(limiter.allow_at("/auth/url", start));
		assert!(limiter.allow_at("/auth/url", start + StdDuration::from_secs(30)));
		assert!(!limiter.allow_at("/auth/url", start + StdDuration::from_secs(59)));
		assert!(limiter.allow_at("/auth/url", start + StdDuration::from_secs(60)));
		assert!(!limiter.allow_at("/auth/url", start + StdDuration::from_secs(61)));
	}

	#[test]
	fn rejections_are_not_recorded() {
		let limiter = limiter(1);
		let start = Instant::now();

		assert!(limiter.allow_at("/auth/url", start));

		for offset in 1..50 {
			assert!(!limiter.allow_at("/auth/url", start + StdDuration::from_secs(offset)));
		}

		assert!(limiter.allow_at("/auth/url", start + StdDuration::from_secs(60)));
	}

	#[test]
	fn unconfigured_keys_always_reject() {
		let limiter = limiter(5);

		assert_eq!(limiter.limit("/unknown"), 0);
		assert!(!limiter.allow("/unknown"));
		assert!(matches!(
			limiter.evaluate("/unknown"),
			RateLimitDecision::Delay(RetryDirective { retry_after, .. })
				if retry_after == limiter.window()
		));
	}

	#[test]
	fn keys_are_independent_and_limits_can_be_replaced() {
		let limiter = limiter(1).with_limit("/auth/status", 1);

		assert!(limiter.allow("/auth/url"));
		assert!(limiter.allow("/auth/status"));
		assert!(!limiter.allow("/auth/url"));

		limiter.configure("/auth/url", 3);

		assert_eq!(limiter.limit("/auth/url"), 3);
		assert!(limiter.allow("/auth/url"));
	}
}
