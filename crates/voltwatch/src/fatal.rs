use std::time::Duration;

/// Host exit codes a monitoring layer can key on. `1xx` belongs to the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalCode {
	/// The interpreter module the probe script needs is not importable.
	CapabilityUnavailable,
	/// The probe crashed too often inside one restart window.
	RestartBurst,
}

impl FatalCode {
	pub fn code(self) -> i32 {
		match self {
			FatalCode::CapabilityUnavailable => 101,
			FatalCode::RestartBurst => 102,
		}
	}
}

impl std::fmt::Display for FatalCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			FatalCode::CapabilityUnavailable => write!(f, "capability unavailable ({})", self.code()),
			FatalCode::RestartBurst => write!(f, "too many restarts ({})", self.code()),
		}
	}
}

/// Terminates the host when the supervisor cannot continue.
pub trait FatalExit: Send + Sync {
	fn exit(&self, code: FatalCode);
}

/// Exits the current process after a short delay so pending log lines flush.
pub struct ProcessExit {
	pub delay: Duration,
}

impl Default for ProcessExit {
	fn default() -> Self {
		Self {
			delay: Duration::from_millis(100),
		}
	}
}

impl FatalExit for ProcessExit {
	fn exit(&self, code: FatalCode) {
		tracing::error!("exiting: {}", code);
		let delay = self.delay;
		std::thread::spawn(move || {
			std::thread::sleep(delay);
			std::process::exit(code.code());
		});
	}
}
