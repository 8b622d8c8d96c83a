//! CLI Module
//!
//! Command-line front end standing in for the app's UI: it loads a source,
//! plays or renders it, and replays scripted UI and session activity.

pub mod commands;
pub mod script;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Repitch - pitch-shifting playback and offline render engine
#[derive(Parser, Debug)]
#[command(name = "repitch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output device used for live playback
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Software clock, no sound
    Simulated,
    /// Default system output (needs the `cpal` feature)
    Cpal,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a source's format and levels as JSON
    #[command(name = "info")]
    Info {
        /// Input WAV file
        input: PathBuf,
    },

    /// Render a source offline through the pitch shifter
    #[command(name = "render")]
    Render {
        /// Input WAV file
        input: PathBuf,

        /// Pitch shift in cents
        #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
        pitch: f32,

        /// Output file (defaults to the configured output path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Engine config JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Play a source live until it ends
    #[command(name = "play")]
    Play {
        /// Input WAV file
        input: PathBuf,

        /// Pitch shift in cents
        #[arg(short, long, default_value_t = 0.0, allow_negative_numbers = true)]
        pitch: f32,

        #[arg(short, long, value_enum, default_value_t = DeviceKind::Simulated)]
        device: DeviceKind,

        /// Clock multiplier for the simulated device
        #[arg(long)]
        speed: Option<f64>,

        /// Engine config JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Replay a JSON script of UI commands and session events
    #[command(name = "script")]
    Script {
        /// Input WAV file
        input: PathBuf,

        /// Script JSON file
        script: PathBuf,

        #[arg(short, long, value_enum, default_value_t = DeviceKind::Simulated)]
        device: DeviceKind,

        /// Engine config JSON
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a sine test tone
    #[command(name = "tone")]
    Tone {
        /// Output WAV file
        output: PathBuf,

        #[arg(short, long, default_value_t = 440.0)]
        frequency: f32,

        /// Length in seconds
        #[arg(short, long, default_value_t = 1.0)]
        duration: f32,

        #[arg(short = 'r', long, default_value_t = 44100)]
        sample_rate: u32,

        #[arg(short, long, default_value_t = 2)]
        channels: u16,

        /// Write 32-bit float instead of 16-bit PCM
        #[arg(long)]
        float: bool,
    },
}
