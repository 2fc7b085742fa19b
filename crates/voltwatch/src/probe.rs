use std::process::{Command, Stdio};

/// Pre-flight check that the probe script's runtime dependencies are present.
#[derive(Debug, Clone)]
pub struct CapabilityProbe {
	interpreter: String,
}

impl CapabilityProbe {
	pub fn new(interpreter: impl Into<String>) -> Self {
		Self {
			interpreter: interpreter.into(),
		}
	}

	/// Runs `<interpreter> -c "import <capability>"` and blocks until it exits.
	/// Returns `true` only on exit status 0.
	pub fn is_available(&self, capability: &str) -> bool {
		if !is_module_path(capability) {
			tracing::warn!("refusing to probe malformed module name {:?}", capability);
			return false;
		}

		let status = Command::new(&self.interpreter)
			.args(["-c", &format!("import {}", capability)])
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.status();

		match status {
			Ok(status) => status.success(),
			Err(e) => {
				tracing::debug!("capability probe via {} failed: {}", self.interpreter, e);
				false
			}
		}
	}
}

fn is_module_path(name: &str) -> bool {
	!name.is_empty()
		&& name.split('.').all(|seg| {
			let mut chars = seg.chars();
			matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
				&& chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
		})
}
