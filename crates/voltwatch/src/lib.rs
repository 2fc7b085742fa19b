//! # voltwatch
//!
//! Supervisor for an external battery telemetry probe.
//!
//! Spawns the probe script, parses its text output into [`Readout`]s, restarts
//! it when it crashes and gives up (with a fixed host exit code) when it
//! crashes too often.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use voltwatch::{Lifecycle, ProbeSettings, ProcessExit};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let shutdown = CancellationToken::new();
//! let lifecycle = Lifecycle::from_settings(
//!     &ProbeSettings::default(),
//!     Arc::new(ProcessExit::default()),
//!     shutdown.clone(),
//! );
//!
//! let mut readouts = lifecycle.supervisor().subscribe();
//! lifecycle.initializer().await.unwrap();
//!
//! while let Ok(r) = readouts.recv().await {
//!     println!("{:.3} V {:.1} %", r.voltage, r.charge);
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fatal;
pub mod lifecycle;
pub mod policy;
pub mod probe;
pub mod signals;
pub mod supervisor;
pub mod telemetry;

pub use config::{LoggingSettings, ProbeSettings, Settings};
pub use error::{ConfigError, LifecycleError, SupervisorError};
pub use fatal::{FatalCode, FatalExit, ProcessExit};
pub use lifecycle::Lifecycle;
pub use policy::{RestartBudget, RestartDecision};
pub use probe::CapabilityProbe;
pub use supervisor::{ProbeState, Supervisor};
pub use telemetry::Readout;
