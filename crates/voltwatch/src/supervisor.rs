use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, watch, Mutex};

use crate::config::ProbeSettings;
use crate::error::SupervisorError;
use crate::fatal::{FatalCode, FatalExit};
use crate::policy::{RestartBudget, RestartDecision};
use crate::telemetry::{self, Readout};

const READOUT_CHANNEL_SIZE: usize = 64;
const DEBUG_READOUT_EVERY: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
	Idle,
	Starting,
	Running { pid: u32 },
	Exited { exit_code: Option<i32> },
}

impl ProbeState {
	pub fn is_running(&self) -> bool {
		matches!(self, ProbeState::Running { .. })
	}
}

/// Keeps one probe process alive and turns its output into [`Readout`]s.
pub struct Supervisor {
	settings: ProbeSettings,
	state: Mutex<SupervisorState>,
	readouts: broadcast::Sender<Readout>,
	fatal: Arc<dyn FatalExit>,
}

struct SupervisorState {
	child: Option<ChildHandle>,
	stop_requested: bool,
	budget: RestartBudget,
	state: ProbeState,
	generation: u64,
}

struct ChildHandle {
	pid: u32,
	generation: u64,
	terminate: Option<oneshot::Sender<()>>,
	closed: watch::Receiver<bool>,
}

impl ChildHandle {
	fn has_exited(&self) -> bool {
		*self.closed.borrow()
	}
}

impl Supervisor {
	pub fn new(settings: ProbeSettings, fatal: Arc<dyn FatalExit>) -> Arc<Self> {
		let (readouts, _) = broadcast::channel(READOUT_CHANNEL_SIZE);
		let budget = RestartBudget::new(settings.restart_window(), settings.restart_limit);
		Arc::new(Self {
			settings,
			state: Mutex::new(SupervisorState {
				child: None,
				stop_requested: false,
				budget,
				state: ProbeState::Idle,
				generation: 0,
			}),
			readouts,
			fatal,
		})
	}

	pub(crate) fn settings(&self) -> &ProbeSettings {
		&self.settings
	}

	/// Receive every complete readout parsed from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<Readout> {
		self.readouts.subscribe()
	}

	pub async fn state(&self) -> ProbeState {
		self.state.lock().await.state
	}

	pub async fn restart_count(&self) -> u32 {
		self.state.lock().await.budget.restart_count()
	}

	/// Spawn the probe unless it is disabled or already running.
	///
	/// Returns once the OS has launched the process. A launch failure is
	/// returned as is; it is not retried here.
	pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
		if !self.settings.enabled {
			tracing::info!("probe disabled, staying idle");
			return Ok(());
		}

		let mut st = self.state.lock().await;
		if st.child.as_ref().is_some_and(|c| !c.has_exited()) {
			return Ok(());
		}
		st.stop_requested = false;
		self.launch(&mut st)
	}

	/// Terminate the probe and wait until it has been reaped. Idempotent.
	pub async fn stop(&self) {
		let closed = {
			let mut st = self.state.lock().await;
			st.stop_requested = true;
			match st.child.as_mut() {
				Some(handle) if !handle.has_exited() => {
					tracing::info!("stopping probe (pid {})", handle.pid);
					if let Some(terminate) = handle.terminate.take() {
						let _ = terminate.send(());
					}
					Some(handle.closed.clone())
				}
				_ => None,
			}
		};

		if let Some(mut closed) = closed {
			let _ = closed.wait_for(|done| *done).await;
			tracing::info!("probe stopped");
		}

		let mut st = self.state.lock().await;
		if st.stop_requested {
			st.child = None;
			st.state = ProbeState::Idle;
		}
	}

	fn launch(self: &Arc<Self>, st: &mut SupervisorState) -> Result<(), SupervisorError> {
		tracing::info!(
			"starting probe: {} -u {}",
			self.settings.interpreter,
			self.settings.script.display()
		);
		st.state = ProbeState::Starting;

		let mut child = match spawn_probe(&self.settings) {
			Ok(child) => child,
			Err(e) => {
				st.child = None;
				st.state = ProbeState::Exited { exit_code: None };
				return Err(e);
			}
		};

		let pid = child.id().unwrap_or(0);
		st.generation += 1;
		let generation = st.generation;

		if let Some(stdout) = child.stdout.take() {
			let readouts = self.readouts.clone();
			tokio::spawn(async move {
				read_telemetry(stdout, readouts).await;
			});
		}
		if let Some(stderr) = child.stderr.take() {
			tokio::spawn(async move {
				log_stderr(stderr).await;
			});
		}

		let (terminate_tx, terminate_rx) = oneshot::channel();
		let (closed_tx, closed_rx) = watch::channel(false);
		st.child = Some(ChildHandle {
			pid,
			generation,
			terminate: Some(terminate_tx),
			closed: closed_rx,
		});
		st.state = ProbeState::Running { pid };

		let sup = Arc::clone(self);
		tokio::spawn(async move {
			watch_child(sup, child, generation, terminate_rx, closed_tx).await;
		});

		tracing::info!("probe running (pid {})", pid);
		Ok(())
	}

	/// Called after an unexpected exit. Spawn failures count as exits and go
	/// around the loop again, so they are bounded by the same budget.
	async fn restart(self: &Arc<Self>) {
		loop {
			let decision = {
				let mut st = self.state.lock().await;
				if st.stop_requested {
					return;
				}
				st.budget.record(Instant::now())
			};

			match decision {
				RestartDecision::Exhausted { count } => {
					tracing::error!(
						"probe restarted {} times within {:?}, giving up",
						count,
						self.settings.restart_window()
					);
					self.fatal.exit(FatalCode::RestartBurst);
					return;
				}
				RestartDecision::Restart { count } => {
					tracing::info!(
						"restarting probe ({}/{} in window)",
						count,
						self.settings.restart_limit
					);
				}
			}

			let delay = self.settings.restart_delay();
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			let mut st = self.state.lock().await;
			if st.stop_requested || st.child.as_ref().is_some_and(|c| !c.has_exited()) {
				return;
			}
			match self.launch(&mut st) {
				Ok(()) => return,
				Err(e) => tracing::warn!("{}", e),
			}
		}
	}
}

fn spawn_probe(settings: &ProbeSettings) -> Result<Child, SupervisorError> {
	let mut cmd = Command::new(&settings.interpreter);
	cmd.arg("-u")
		.arg(&settings.script)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped())
		.kill_on_drop(true)
		.process_group(0);

	cmd.spawn().map_err(|source| SupervisorError::Spawn {
		program: settings.interpreter.clone(),
		source,
	})
}

async fn watch_child(
	supervisor: Arc<Supervisor>,
	mut child: Child,
	generation: u64,
	terminate: oneshot::Receiver<()>,
	closed: watch::Sender<bool>,
) {
	let grace = supervisor.settings.stop_timeout();
	let status = tokio::select! {
		status = child.wait() => status,
		_ = terminate => terminate_child(&mut child, grace).await,
	};
	let exit_code = status.as_ref().ok().and_then(|s| s.code());

	let unexpected = {
		let mut st = supervisor.state.lock().await;
		let current = st.child.as_ref().is_some_and(|c| c.generation == generation);
		if current {
			st.child = None;
			st.state = if st.stop_requested {
				ProbeState::Idle
			} else {
				ProbeState::Exited { exit_code }
			};
		}
		current && !st.stop_requested
	};
	let _ = closed.send(true);

	if unexpected {
		match status {
			Ok(status) => tracing::warn!("probe exited unexpectedly ({})", status),
			Err(e) => tracing::warn!("probe wait failed: {}", e),
		}
		supervisor.restart().await;
	}
}

async fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;

	// Already reaped; there is no group left to signal.
	let Some(pid) = child.id() else {
		return child.wait().await;
	};
	let pgid = Pid::from_raw(pid as i32);
	let _ = killpg(pgid, Signal::SIGTERM);

	match tokio::time::timeout(grace, child.wait()).await {
		Ok(status) => status,
		Err(_) => {
			tracing::warn!("probe (pid {}) ignored SIGTERM for {:?}, killing", pid, grace);
			let _ = killpg(pgid, Signal::SIGKILL);
			child.wait().await
		}
	}
}

async fn read_telemetry<R: AsyncRead + Unpin>(mut reader: R, readouts: broadcast::Sender<Readout>) {
	let mut buf = [0u8; 4096];
	let mut emitted: u64 = 0;
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				let chunk = String::from_utf8_lossy(&buf[..n]);
				let Some(readout) = telemetry::parse(&chunk) else {
					tracing::trace!("dropped incomplete chunk ({} bytes)", n);
					continue;
				};
				emitted += 1;
				if emitted % DEBUG_READOUT_EVERY == 0 {
					tracing::debug!(
						voltage = readout.voltage,
						current = readout.current,
						power = readout.power,
						charge = readout.charge,
						"readout #{}",
						emitted
					);
				}
				// No subscribers is fine.
				let _ = readouts.send(readout);
			}
			Err(e) => {
				tracing::debug!("probe stdout closed: {}", e);
				break;
			}
		}
	}
}

/// Drains stderr until EOF. Bytes are decoded lossily; closing the pipe early
/// would kill the probe on its next write.
async fn log_stderr<R: AsyncRead + Unpin>(reader: R) {
	let mut reader = BufReader::new(reader);
	let mut line = Vec::new();
	loop {
		line.clear();
		match reader.read_until(b'\n', &mut line).await {
			Ok(0) => break,
			Ok(_) => {
				let text = String::from_utf8_lossy(&line);
				let text = text.trim_end();
				if !text.is_empty() {
					tracing::warn!("probe stderr: {}", text);
				}
			}
			Err(e) => {
				tracing::debug!("probe stderr closed: {}", e);
				break;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_running_is_running() {
		assert!(ProbeState::Running { pid: 1 }.is_running());
		assert!(!ProbeState::Idle.is_running());
		assert!(!ProbeState::Starting.is_running());
		assert!(!ProbeState::Exited { exit_code: Some(1) }.is_running());
	}

	#[tokio::test]
	async fn read_telemetry_forwards_complete_chunks() {
		let (tx, mut rx) = broadcast::channel(4);
		let input: &[u8] = b"Load Voltage: 4.1 V\nCurrent: 0.9 A\nPower: 3.7 W\nPercent: 91%\n";
		read_telemetry(input, tx).await;
		let readout = rx.recv().await.unwrap();
		assert_eq!(readout.charge, 91.0);
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn log_stderr_reads_past_invalid_utf8() {
		let input: &[u8] = b"\xff\xfe garbled\nTraceback (most recent call last):\n";
		let mut reader = input;
		log_stderr(&mut reader).await;
		assert!(reader.is_empty());
	}
}
