use std::path::PathBuf;
use std::sync::Arc;

use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use voltwatch::config::{self, DEFAULT_CONFIG_FILE};
use voltwatch::{signals, CapabilityProbe, FatalCode, Lifecycle, LifecycleError, ProcessExit, Readout, Settings};

#[tokio::main]
async fn main() {
	let args: Vec<String> = std::env::args().skip(1).collect();

	if args.iter().any(|a| a == "--help" || a == "-h") {
		print_usage();
		return;
	}

	let command = args
		.first()
		.map(|s| s.as_str())
		.filter(|s| !s.starts_with('-'))
		.unwrap_or("run");

	match command {
		"help" => print_usage(),
		"version" => println!("voltwatch {}", env!("CARGO_PKG_VERSION")),
		"run" => {
			let settings = load(&args);
			cmd_run(settings, args.iter().any(|a| a == "--json")).await;
		}
		"check" => {
			let settings = load(&args);
			cmd_check(&settings);
		}
		other => {
			eprintln!("unknown command: {}", other);
			eprintln!("run 'voltwatch help' for usage");
			std::process::exit(1);
		}
	}
}

fn print_usage() {
	eprintln!("{} {} — battery probe supervisor", "voltwatch".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} [command] [options]", "voltwatch".bold());
	eprintln!();
	eprintln!("{}", "commands".cyan().bold());
	eprintln!("  {}       Supervise the probe and print readouts (default)", "run".bold());
	eprintln!("  {}     Check that the probe's interpreter module is importable", "check".bold());
	eprintln!("  {}   Print version", "version".bold());
	eprintln!();
	eprintln!("{}", "options".cyan().bold());
	eprintln!("  {} <path>  Config file (default {})", "--config".bold(), DEFAULT_CONFIG_FILE);
	eprintln!("  {}           Print readouts as JSON lines", "--json".bold());
}

fn config_path(args: &[String]) -> PathBuf {
	args.iter()
		.position(|a| a == "--config" || a == "-c")
		.and_then(|i| args.get(i + 1))
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn load(args: &[String]) -> Settings {
	let path = config_path(args);
	let settings = match config::load_settings(&path) {
		Ok(s) => s,
		Err(e) => {
			eprintln!("error: {}", e);
			std::process::exit(1);
		}
	};

	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();

	if !path.exists() {
		tracing::warn!("{} not found, using defaults", path.display());
	}
	settings
}

async fn cmd_run(settings: Settings, json: bool) {
	let shutdown = CancellationToken::new();
	let lifecycle = Lifecycle::from_settings(
		&settings.probe,
		Arc::new(ProcessExit::default()),
		shutdown.clone(),
	);
	let mut readouts = lifecycle.supervisor().subscribe();
	let _ = signals::cancel_on_signal(shutdown.clone());

	match lifecycle.initializer().await {
		Ok(()) => {}
		// ProcessExit is already taking the host down.
		Err(LifecycleError::CapabilityUnavailable { .. }) => std::future::pending::<()>().await,
		Err(e) => {
			tracing::error!("{}", e);
			std::process::exit(1);
		}
	}

	loop {
		tokio::select! {
			_ = shutdown.cancelled() => break,
			msg = readouts.recv() => match msg {
				Ok(readout) => print_readout(&readout, json),
				Err(RecvError::Lagged(n)) => tracing::warn!("skipped {} readouts", n),
				Err(RecvError::Closed) => break,
			},
		}
	}

	lifecycle.destructor().await;
}

fn cmd_check(settings: &Settings) {
	let probe = CapabilityProbe::new(settings.probe.interpreter.clone());
	let capability = &settings.probe.capability;
	if probe.is_available(capability) {
		println!("{} {} importable via {}", "●".green(), capability.bold(), settings.probe.interpreter);
	} else {
		println!("{} {} not importable via {}", "●".red(), capability.bold(), settings.probe.interpreter);
		std::process::exit(FatalCode::CapabilityUnavailable.code());
	}
}

fn print_readout(r: &Readout, json: bool) {
	if json {
		match serde_json::to_string(r) {
			Ok(line) => println!("{}", line),
			Err(e) => tracing::warn!("failed to encode readout: {}", e),
		}
		return;
	}

	let charge = format!("{:>5.1} %", r.charge);
	let charge = if r.charge < 20.0 {
		charge.red().to_string()
	} else if r.charge < 50.0 {
		charge.yellow().to_string()
	} else {
		charge.green().to_string()
	};
	println!(
		"{:>7.3} V  {:>7.3} A  {:>7.3} W  {}",
		r.voltage, r.current, r.power, charge
	);
}
