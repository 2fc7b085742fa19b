use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ProbeSettings;
use crate::error::LifecycleError;
use crate::fatal::{FatalCode, FatalExit};
use crate::probe::CapabilityProbe;
use crate::supervisor::Supervisor;

/// Host-facing start/stop for the probe service.
pub struct Lifecycle {
	supervisor: Arc<Supervisor>,
	probe: CapabilityProbe,
	capability: String,
	fatal: Arc<dyn FatalExit>,
	shutdown: CancellationToken,
	hooked: AtomicBool,
}

impl Lifecycle {
	pub fn new(
		supervisor: Arc<Supervisor>,
		probe: CapabilityProbe,
		capability: impl Into<String>,
		fatal: Arc<dyn FatalExit>,
		shutdown: CancellationToken,
	) -> Self {
		Self {
			supervisor,
			probe,
			capability: capability.into(),
			fatal,
			shutdown,
			hooked: AtomicBool::new(false),
		}
	}

	pub fn from_settings(
		settings: &ProbeSettings,
		fatal: Arc<dyn FatalExit>,
		shutdown: CancellationToken,
	) -> Self {
		let supervisor = Supervisor::new(settings.clone(), Arc::clone(&fatal));
		let probe = CapabilityProbe::new(settings.interpreter.clone());
		Self::new(supervisor, probe, settings.capability.clone(), fatal, shutdown)
	}

	pub fn supervisor(&self) -> &Arc<Supervisor> {
		&self.supervisor
	}

	/// Check the capability, start the probe and arm the shutdown hook.
	///
	/// A missing capability escalates through [`FatalExit`] before returning.
	pub async fn initializer(&self) -> Result<(), LifecycleError> {
		tracing::info!("starting service");

		if self.supervisor.settings().enabled {
			let probe = self.probe.clone();
			let capability = self.capability.clone();
			let available = tokio::task::spawn_blocking(move || probe.is_available(&capability))
				.await
				.unwrap_or(false);

			if !available {
				tracing::error!("{:?} is not available, aborting", self.capability);
				self.fatal.exit(FatalCode::CapabilityUnavailable);
				return Err(LifecycleError::CapabilityUnavailable {
					capability: self.capability.clone(),
				});
			}
		}

		self.supervisor.start().await?;
		self.install_shutdown_hook();

		tracing::info!("service started");
		Ok(())
	}

	pub async fn destructor(&self) {
		tracing::info!("stopping service");
		self.supervisor.stop().await;
		tracing::info!("service stopped");
	}

	fn install_shutdown_hook(&self) {
		if self.hooked.swap(true, Ordering::SeqCst) {
			return;
		}
		let supervisor = Arc::clone(&self.supervisor);
		let token = self.shutdown.clone();
		tokio::spawn(async move {
			token.cancelled().await;
			tracing::info!("shutdown requested");
			supervisor.stop().await;
		});
	}
}
