//! Sliding-window admission control per transport mode and endpoint tier.
//!
//! Every network attempt (first tries and retries alike) acquires one slot. A window
//! keeps the grant instants of the last `window` duration; a request is admitted while
//! fewer than `max_requests` grants are inside it, otherwise it sleeps until the oldest
//! grant leaves the window. Waiters queue on a fair turnstile so they are admitted in
//! arrival order. A slot is reserved only at the instant of admission, so dropping a
//! waiting future leaks nothing.
//!
//! After the controller answers 429, [`RateLimiter::penalize`] blocks the window until
//! the server's retry hint elapses and halves the effective budget for one full window.

// self
use crate::{
	_prelude::*,
	auth::TransportMode,
	error::ConfigError,
	obs,
	operation::EndpointTier,
};

/// Published budget of the early-access API tier.
pub const EARLY_ACCESS_BUDGET: RateBudget = RateBudget::new(100, Duration::from_secs(60));
/// Published budget of the versioned integration API tier.
pub const GENERAL_BUDGET: RateBudget = RateBudget::new(10_000, Duration::from_secs(60));

const DEFAULT_PENALTY: Duration = Duration::from_secs(1);

/// Request budget over a sliding window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
	/// Maximum admissions inside any window.
	pub max_requests: u32,
	/// Window length.
	pub window: Duration,
}
impl RateBudget {
	/// Creates a budget.
	pub const fn new(max_requests: u32, window: Duration) -> Self {
		Self { max_requests, window }
	}

	/// Rejects budgets that would never admit a request.
	pub fn validate(&self, tier: EndpointTier) -> Result<(), ConfigError> {
		if self.max_requests == 0 || self.window.is_zero() {
			return Err(ConfigError::EmptyBudget { tier: tier.as_str() });
		}

		Ok(())
	}
}

/// Shared sliding-window limiter keyed by `(mode, tier)`.
#[derive(Debug)]
pub struct RateLimiter {
	early_access: RateBudget,
	general: RateBudget,
	windows: Mutex<HashMap<(TransportMode, EndpointTier), Arc<Window>>>,
}
impl RateLimiter {
	/// Creates a limiter with explicit per-tier budgets.
	pub fn new(early_access: RateBudget, general: RateBudget) -> Result<Self, ConfigError> {
		early_access.validate(EndpointTier::EarlyAccess)?;
		general.validate(EndpointTier::General)?;

		Ok(Self { early_access, general, windows: Mutex::new(HashMap::new()) })
	}

	/// Budget applied to the given tier.
	pub fn budget(&self, tier: EndpointTier) -> RateBudget {
		match tier {
			EndpointTier::EarlyAccess => self.early_access,
			EndpointTier::General => self.general,
		}
	}

	/// Waits for a slot and reserves it. Returns how long the caller waited.
	pub async fn acquire(&self, mode: TransportMode, tier: EndpointTier) -> Duration {
		let window = self.window(mode, tier);
		let started = Instant::now();
		let _turn = window.turnstile.lock().await;
		let mut waited = false;

		loop {
			let decision = window.state.lock().try_admit(Instant::now(), window.budget);
			let Some(until) = decision else { break };

			if !waited {
				waited = true;

				obs::record_rate_limit_wait(tier);

				#[cfg(feature = "tracing")]
				tracing::debug!(
					mode = mode.as_str(),
					tier = tier.as_str(),
					wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
					"Rate budget exhausted; waiting for a slot."
				);
			}

			tokio::time::sleep_until(until).await;
		}

		started.elapsed()
	}

	/// Applies controller back-pressure after an HTTP 429.
	///
	/// The window admits nothing until `retry_after` (or a short default) has elapsed,
	/// and runs at half budget for one window length afterwards.
	pub fn penalize(&self, mode: TransportMode, tier: EndpointTier, retry_after: Option<Duration>) {
		let window = self.window(mode, tier);
		let now = Instant::now();
		let blocked_until = now + retry_after.unwrap_or(DEFAULT_PENALTY);

		window.state.lock().throttle =
			Some(Throttle { blocked_until, cooldown_until: blocked_until + window.budget.window });

		#[cfg(feature = "tracing")]
		tracing::warn!(
			mode = mode.as_str(),
			tier = tier.as_str(),
			retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
			"Controller throttled the request; tightening the rate budget."
		);
	}

	/// Number of admissions currently inside the window.
	pub fn in_window(&self, mode: TransportMode, tier: EndpointTier) -> usize {
		let window = self.window(mode, tier);
		let mut state = window.state.lock();

		state.prune(Instant::now(), window.budget.window);

		state.grants.len()
	}

	fn window(&self, mode: TransportMode, tier: EndpointTier) -> Arc<Window> {
		let budget = self.budget(tier);

		self.windows
			.lock()
			.entry((mode, tier))
			.or_insert_with(|| {
				Arc::new(Window {
					budget,
					turnstile: tokio::sync::Mutex::new(()),
					state: Mutex::new(WindowState::default()),
				})
			})
			.clone()
	}
}
impl Default for RateLimiter {
	fn default() -> Self {
		Self {
			early_access: EARLY_ACCESS_BUDGET,
			general: GENERAL_BUDGET,
			windows: Mutex::new(HashMap::new()),
		}
	}
}

#[derive(Debug)]
struct Window {
	budget: RateBudget,
	turnstile: tokio::sync::Mutex<()>,
	state: Mutex<WindowState>,
}

#[derive(Debug, Default)]
struct WindowState {
	grants: VecDeque<Instant>,
	throttle: Option<Throttle>,
}
impl WindowState {
	fn prune(&mut self, now: Instant, window: Duration) {
		while self.grants.front().is_some_and(|granted| *granted + window <= now) {
			self.grants.pop_front();
		}
	}

	/// Admits at `now` or returns the instant worth re-checking at.
	fn try_admit(&mut self, now: Instant, budget: RateBudget) -> Option<Instant> {
		self.prune(now, budget.window);

		let mut limit = budget.max_requests as usize;
		let mut recheck_cap = None;

		if let Some(throttle) = self.throttle {
			if now < throttle.blocked_until {
				return Some(throttle.blocked_until);
			}
			if now < throttle.cooldown_until {
				limit = (limit / 2).max(1);
				recheck_cap = Some(throttle.cooldown_until);
			} else {
				self.throttle = None;
			}
		}

		if self.grants.len() < limit {
			self.grants.push_back(now);

			return None;
		}

		let oldest_blocking = self.grants[self.grants.len() - limit] + budget.window;

		Some(recheck_cap.map_or(oldest_blocking, |cap: Instant| cap.min(oldest_blocking)))
	}
}

#[derive(Clone, Copy, Debug)]
struct Throttle {
	blocked_until: Instant,
	cooldown_until: Instant,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const MODE: TransportMode = TransportMode::Cloud;
	const TIER: EndpointTier = EndpointTier::EarlyAccess;

	fn limiter(max: u32) -> RateLimiter {
		RateLimiter::new(RateBudget::new(max, Duration::from_secs(60)), GENERAL_BUDGET)
			.expect("Limiter fixture should build.")
	}

	#[tokio::test(start_paused = true)]
	async fn request_over_budget_waits_for_the_window() {
		let limiter = limiter(40);

		for _ in 0..40 {
			assert_eq!(limiter.acquire(MODE, TIER).await, Duration::ZERO);
		}

		assert_eq!(limiter.in_window(MODE, TIER), 40);

		let waited = limiter.acquire(MODE, TIER).await;

		assert!(waited >= Duration::from_secs(60), "41st request waited only {waited:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn no_window_ever_exceeds_the_budget() {
		let limiter = limiter(3);
		let mut grants = Vec::new();

		for _ in 0..10 {
			limiter.acquire(MODE, TIER).await;
			grants.push(Instant::now());
			tokio::time::advance(Duration::from_secs(7)).await;
		}

		for (idx, start) in grants.iter().enumerate() {
			let inside = grants[idx..]
				.iter()
				.filter(|at| at.duration_since(*start) < Duration::from_secs(60))
				.count();

			assert!(inside <= 3, "window starting at grant {idx} admitted {inside}");
		}
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_callers_are_admitted_in_arrival_order() {
		// std
		use std::sync::atomic::{AtomicUsize, Ordering};

		const BUDGET: usize = 3;
		const CALLERS: usize = 8;

		let limiter = Arc::new(limiter(BUDGET as u32));
		let arrived = Arc::new(AtomicUsize::new(0));
		let grants = Arc::new(Mutex::new(Vec::new()));
		let started = Instant::now();
		let mut handles = Vec::new();

		for idx in 0..CALLERS {
			let limiter = limiter.clone();
			let arrived_in_task = arrived.clone();
			let grants = grants.clone();

			handles.push(tokio::spawn(async move {
				arrived_in_task.fetch_add(1, Ordering::SeqCst);
				limiter.acquire(MODE, TIER).await;
				grants.lock().push((idx, Instant::now()));
			}));

			// Each caller must be queued before the next one is spawned.
			while arrived.load(Ordering::SeqCst) <= idx {
				tokio::task::yield_now().await;
			}
		}
		for handle in handles {
			handle.await.expect("Limiter task should not panic.");
		}

		let grants = grants.lock().clone();
		let order = grants.iter().map(|(idx, _)| *idx).collect::<Vec<_>>();

		assert_eq!(order, (0..CALLERS).collect::<Vec<_>>());

		for (window, expected) in [(0, BUDGET), (1, BUDGET), (2, CALLERS - 2 * BUDGET)] {
			let inside = grants
				.iter()
				.filter(|(_, at)| at.duration_since(started).as_secs() / 60 == window)
				.count();

			assert_eq!(inside, expected, "window {window} admitted {inside}");
		}
	}

	#[tokio::test(start_paused = true)]
	async fn tiers_and_modes_have_separate_windows() {
		let limiter = limiter(1);

		limiter.acquire(MODE, TIER).await;

		assert_eq!(limiter.acquire(MODE, EndpointTier::General).await, Duration::ZERO);
		assert_eq!(limiter.acquire(TransportMode::Local, TIER).await, Duration::ZERO);
	}

	#[tokio::test(start_paused = true)]
	async fn penalty_blocks_then_halves_the_budget() {
		let limiter = limiter(4);

		limiter.penalize(MODE, TIER, Some(Duration::from_secs(5)));

		let waited = limiter.acquire(MODE, TIER).await;

		assert!(waited >= Duration::from_secs(5));
		assert_eq!(limiter.acquire(MODE, TIER).await, Duration::ZERO);

		let waited = limiter.acquire(MODE, TIER).await;

		assert!(waited > Duration::ZERO, "third request must wait while the budget is halved");
	}

	#[tokio::test(start_paused = true)]
	async fn dropped_waiter_does_not_consume_a_slot() {
		let limiter = limiter(1);

		limiter.acquire(MODE, TIER).await;

		let timed_out =
			tokio::time::timeout(Duration::from_secs(10), limiter.acquire(MODE, TIER)).await;

		assert!(timed_out.is_err());
		assert_eq!(limiter.in_window(MODE, TIER), 1);
	}

	#[test]
	fn empty_budgets_are_rejected() {
		let err = RateLimiter::new(RateBudget::new(0, Duration::from_secs(60)), GENERAL_BUDGET)
			.expect_err("Zero budgets must be rejected.");

		assert!(matches!(err, ConfigError::EmptyBudget { tier: "early_access" }));
		assert!(RateLimiter::new(EARLY_ACCESS_BUDGET, RateBudget::new(5, Duration::ZERO)).is_err());
	}
}
