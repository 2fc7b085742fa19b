use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// One complete sample from the probe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Readout {
	pub voltage: f64,
	pub current: f64,
	pub power: f64,
	pub charge: f64,
}

// Load Voltage:   4.136 V
// Current:        0.921 A
// Power:          3.804 W
// Percent:        94.7%
static LINE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^\s*(Load Voltage|Current|Power|Percent):\s*(-?\d+(?:\.\d+)?)\s*[AVW%]?")
		.expect("telemetry line pattern is valid")
});

#[derive(Default)]
struct Partial {
	voltage: Option<f64>,
	current: Option<f64>,
	power: Option<f64>,
	charge: Option<f64>,
}

impl Partial {
	fn complete(self) -> Option<Readout> {
		Some(Readout {
			voltage: self.voltage?,
			current: self.current?,
			power: self.power?,
			charge: self.charge?,
		})
	}
}

/// Parse one chunk of probe output.
///
/// Fields are collected from this chunk only. The probe does not flush whole
/// samples atomically, so a chunk missing any of the four labels yields `None`
/// and its fields are dropped rather than carried into the next call.
pub fn parse(chunk: &str) -> Option<Readout> {
	let mut partial = Partial::default();

	for line in chunk.split('\n') {
		let Some(caps) = LINE.captures(line) else {
			continue;
		};
		let Ok(value) = caps[2].parse::<f64>() else {
			continue;
		};
		match &caps[1] {
			"Load Voltage" => partial.voltage = Some(value),
			"Current" => partial.current = Some(value),
			"Power" => partial.power = Some(value),
			"Percent" => partial.charge = Some(value),
			_ => {}
		}
	}

	partial.complete()
}
