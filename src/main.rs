//! Repitch CLI - Pitch-Shifting Playback and Render
//!
//! Command-line interface for the Repitch engine.

use clap::Parser;
use env_logger::Env;
use log::info;

use repitch::cli::commands;
use repitch::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger; RUST_LOG still wins over --verbose
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Repitch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Repitch v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Info { input } => commands::info(&input),
        Commands::Render {
            input,
            pitch,
            output,
            config,
        } => commands::render(&input, pitch, output.as_deref(), config.as_deref()),
        Commands::Play {
            input,
            pitch,
            device,
            speed,
            config,
        } => commands::play(&input, pitch, device, speed, config.as_deref()),
        Commands::Script {
            input,
            script,
            device,
            config,
        } => commands::script(&input, &script, device, config.as_deref()),
        Commands::Tone {
            output,
            frequency,
            duration,
            sample_rate,
            channels,
            float,
        } => commands::tone(&output, frequency, duration, sample_rate, channels, float),
    }
}
