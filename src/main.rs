// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-pipeline")]
#[command(about = "Frame-synchronous camera pipeline with virtual backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session against the virtual camera with a few demo modules
    Simulate {
        /// Number of frames to run before stopping
        #[arg(short, long, default_value = "300")]
        frames: u64,

        /// Frame rate (overrides the config file)
        #[arg(long)]
        fps: Option<u32>,

        /// Config file (default: the user config, if any)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Let the session drive its own run loop (enables onRender)
        #[arg(long)]
        own_loop: bool,
    },

    /// Show the environment compatibility report and device estimate
    Info,

    /// Print the engine version
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_pipeline=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            frames,
            fps,
            config,
            own_loop,
        } => cli::simulate(frames, fps, config, own_loop),
        Commands::Info => cli::show_info(),
        Commands::Version => {
            println!("{}", camera_pipeline::version());
            Ok(())
        }
    }
}
