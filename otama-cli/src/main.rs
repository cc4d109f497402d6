// otama-cli/src/main.rs

mod cli_args;
mod sink;

use std::io::BufRead;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use otama_core::audio::start_audio_capture;
use otama_core::{CalibrationPhase, Config, OutputPolicy, Session};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli_args::{Cli, Commands, Settings};
use sink::LogSink;

/// Capture blocks waiting for the processing thread.
const AUDIO_QUEUE_CAPACITY: usize = 32;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { settings, verbose } => {
            init_logging(verbose);
            run(load_config(&settings)?)
        }
        Commands::Config { settings } => {
            let config = load_config(&settings)?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(settings: &Settings) -> Result<Config> {
    let mut config = match &settings.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(policy) = settings.policy {
        config.output_policy = policy.into();
    }
    if settings.no_calibration {
        config.calibration_enabled = false;
    }
    if settings.no_middle {
        config.middle_tone_enabled = false;
    }
    if let Some(rate) = settings.sample_rate {
        config.sample_rate = rate;
    }
    config.validate()?;
    Ok(config)
}

fn run(config: Config) -> Result<()> {
    let mut session = Session::new(config.clone())?;
    let outputs = session.outputs();

    let (audio_tx, audio_rx) = crossbeam_channel::bounded(AUDIO_QUEUE_CAPACITY);
    session.start(audio_rx)?;
    let stream = start_audio_capture(&config, audio_tx).context("Failed to start audio capture")?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let velocity = config.note_velocity;
    let consumer = thread::spawn(move || {
        let mut sink = LogSink::new(velocity);
        loop {
            crossbeam_channel::select! {
                recv(outputs) -> msg => match msg {
                    Ok(tick) => sink.handle(&tick),
                    Err(_) => break,
                },
                recv(shutdown_rx) -> _ => break,
            }
        }
        sink.finish();
    });

    info!("Press Enter to stop, or type r and Enter to recalibrate");
    for line in std::io::stdin().lock().lines() {
        match line?.trim() {
            "r" => {
                session.restart_calibration()?;
                if config.calibration_enabled && config.output_policy == OutputPolicy::Position {
                    info!("{}", CalibrationPhase::MeasuringTop.prompt());
                }
            }
            _ => break,
        }
    }

    drop(stream);
    session.stop()?;
    let _ = shutdown_tx.send(());
    if consumer.join().is_err() {
        warn!("Output thread panicked");
    }
    info!("Stopped");
    Ok(())
}
