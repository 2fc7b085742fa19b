//! Host termination signals.
//!
//! The library never installs global handlers. A host awaits
//! [`wait_for_shutdown_signal`] (or uses [`cancel_on_signal`]) and cancels the
//! shutdown token it handed to the [`Lifecycle`](crate::lifecycle::Lifecycle).

use tokio_util::sync::CancellationToken;

/// Completes on SIGINT, SIGTERM or SIGQUIT.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigint = signal(SignalKind::interrupt())?;
	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigquit = signal(SignalKind::quit())?;

	tokio::select! {
		_ = sigint.recv() => tracing::info!("received SIGINT"),
		_ = sigterm.recv() => tracing::info!("received SIGTERM"),
		_ = sigquit.recv() => tracing::info!("received SIGQUIT"),
	}
	Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
	tokio::signal::ctrl_c().await
}

/// Cancel `token` on the first termination signal. Also returns early if the
/// token is cancelled by someone else.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		tokio::select! {
			res = wait_for_shutdown_signal() => {
				if let Err(e) = res {
					tracing::error!("failed to listen for signals: {}", e);
					return;
				}
				token.cancel();
			}
			_ = token.cancelled() => {}
		}
	})
}
