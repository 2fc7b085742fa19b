//! Bounded restart policy for the probe process.
//!
//! A burst starts at the first restart after a quiet period and lasts
//! [`RESTART_WINDOW`]. Every further restart inside the burst bumps the
//! counter; once it reaches the limit the supervisor gives up and escalates.
//! The window is anchored at the start of the burst, not slid forward on each
//! restart, so a probe that takes longer than the window to fail never trips
//! the limit.

use std::time::{Duration, Instant};

pub const RESTART_WINDOW: Duration = Duration::from_millis(300_000);
pub const RESTART_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
	Restart { count: u32 },
	Exhausted { count: u32 },
}

#[derive(Debug, Clone)]
pub struct RestartBudget {
	window: Duration,
	limit: u32,
	last_restart_at: Option<Instant>,
	restart_count: u32,
}

impl RestartBudget {
	pub fn new(window: Duration, limit: u32) -> Self {
		Self {
			window,
			limit,
			last_restart_at: None,
			restart_count: 0,
		}
	}

	/// Record an unexpected exit at `now` and decide whether to respawn.
	pub fn record(&mut self, now: Instant) -> RestartDecision {
		let in_burst = self
			.last_restart_at
			.is_some_and(|at| now.saturating_duration_since(at) < self.window);

		if in_burst {
			self.restart_count += 1;
		} else {
			self.restart_count = 0;
			self.last_restart_at = Some(now);
		}

		if self.restart_count >= self.limit {
			RestartDecision::Exhausted {
				count: self.restart_count,
			}
		} else {
			RestartDecision::Restart {
				count: self.restart_count,
			}
		}
	}

	pub fn restart_count(&self) -> u32 {
		self.restart_count
	}
}

impl Default for RestartBudget {
	fn default() -> Self {
		Self::new(RESTART_WINDOW, RESTART_LIMIT)
	}
}
