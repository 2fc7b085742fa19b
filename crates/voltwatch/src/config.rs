use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::policy::{RESTART_LIMIT, RESTART_WINDOW};

pub const DEFAULT_CONFIG_FILE: &str = "voltwatch.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
	#[serde(default)]
	pub probe: ProbeSettings,
	#[serde(default)]
	pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_interpreter")]
	pub interpreter: String,
	#[serde(default = "default_script")]
	pub script: PathBuf,
	#[serde(default = "default_capability")]
	pub capability: String,
	#[serde(default = "default_restart_window_secs")]
	pub restart_window_secs: u64,
	#[serde(default = "default_restart_limit")]
	pub restart_limit: u32,
	#[serde(default)]
	pub restart_delay_ms: u64,
	#[serde(default = "default_stop_timeout_ms")]
	pub stop_timeout_ms: u64,
}

impl Default for ProbeSettings {
	fn default() -> Self {
		Self {
			enabled: true,
			interpreter: default_interpreter(),
			script: default_script(),
			capability: default_capability(),
			restart_window_secs: default_restart_window_secs(),
			restart_limit: default_restart_limit(),
			restart_delay_ms: 0,
			stop_timeout_ms: default_stop_timeout_ms(),
		}
	}
}

impl ProbeSettings {
	pub fn restart_window(&self) -> Duration {
		Duration::from_secs(self.restart_window_secs)
	}

	pub fn restart_delay(&self) -> Duration {
		Duration::from_millis(self.restart_delay_ms)
	}

	pub fn stop_timeout(&self) -> Duration {
		Duration::from_millis(self.stop_timeout_ms)
	}
}

fn default_true() -> bool {
	true
}
fn default_interpreter() -> String {
	"python3".into()
}
fn default_script() -> PathBuf {
	PathBuf::from("python/INA219.py")
}
fn default_capability() -> String {
	"smbus".into()
}
fn default_restart_window_secs() -> u64 {
	RESTART_WINDOW.as_secs()
}
fn default_restart_limit() -> u32 {
	RESTART_LIMIT
}
fn default_stop_timeout_ms() -> u64 {
	3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
	#[serde(default = "default_level")]
	pub level: String,
}

impl Default for LoggingSettings {
	fn default() -> Self {
		Self {
			level: default_level(),
		}
	}
}

fn default_level() -> String {
	"info".into()
}

/// Load settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
	if !path.exists() {
		return Ok(Settings::default());
	}
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	parse_settings(&content).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}

pub fn parse_settings(content: &str) -> Result<Settings, toml::de::Error> {
	toml::from_str(content)
}
