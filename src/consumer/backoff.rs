//! Capped exponential backoff on top of [`backon`].

// crates.io
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
// self
use crate::_prelude::*;

/// Backoff bounds: the first delay doubles after each failure up to `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
	/// Delay after the first failure.
	pub initial: Duration,
	/// Upper bound on any delay.
	pub max: Duration,
}
impl BackoffPolicy {
	/// Creates a policy; `max` is raised to `initial` when smaller.
	pub fn new(initial: Duration, max: Duration) -> Self {
		Self { initial, max: max.max(initial) }
	}

	/// Starts a fresh backoff sequence.
	pub fn start(self) -> Backoff {
		Backoff { policy: self, delays: self.delays() }
	}

	fn delays(self) -> ExponentialBackoff {
		ExponentialBuilder::default()
			.with_min_delay(self.initial)
			.with_factor(2.)
			.with_max_delay(self.max)
			.without_max_times()
			.build()
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self { initial: Duration::from_secs(2), max: Duration::from_secs(60) }
	}
}

/// Running backoff sequence.
pub struct Backoff {
	policy: BackoffPolicy,
	delays: ExponentialBackoff,
}
impl Backoff {
	/// Returns the delay to wait now and advances the sequence.
	pub fn next_delay(&mut self) -> Duration {
		// Unbounded retries never exhaust the iterator.
		self.delays.next().unwrap_or(self.policy.max)
	}

	/// Restarts the sequence after a success.
	pub fn reset(&mut self) {
		self.delays = self.policy.delays();
	}
}
impl Debug for Backoff {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Backoff").field("policy", &self.policy).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn delays_double_until_capped() {
		let mut backoff = BackoffPolicy::default().start();
		let delays = (0..8).map(|_| backoff.next_delay().as_secs()).collect::<Vec<_>>();

		assert_eq!(delays, [2, 4, 8, 16, 32, 60, 60, 60]);

		backoff.reset();

		assert_eq!(backoff.next_delay(), Duration::from_secs(2));
	}

	#[test]
	fn max_never_undercuts_initial() {
		let policy = BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(1));

		assert_eq!(policy.max, Duration::from_secs(5));
		assert_eq!(policy.start().next_delay(), Duration::from_secs(5));
	}
}
