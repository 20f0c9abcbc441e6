//! gesture-lock: foreground monitor that challenges protected apps with a gesture.
//!
//! ## Subcommands
//!
//! - `run`: monitor loop; requests on stdout, submissions on stdin
//! - `enroll`: save one gesture sample for a package
//! - `remove`: drop a package's protection
//! - `status`: list saved gestures and the monitoring flag
//! - `verify`: score a gesture file against the saved samples
//! - `autostart`: exit 0 when monitoring should resume after boot

mod commands;
mod journal;
mod lines;
mod logging;
mod stdio;

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::error;

use gesture_lock_core::StorageConfig;

use crate::commands::Context;

#[derive(Parser)]
#[command(name = "gesture-lock")]
#[command(about = "Gesture-gated app lock")]
#[command(version)]
struct Cli {
    /// Storage root (defaults to ~/.gesture-lock)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the foreground monitor
    Run,

    /// Add a gesture sample for a package
    Enroll {
        #[arg(long)]
        package: String,

        /// JSON file with a `strokes` array of `[x, y]` points
        #[arg(long, value_name = "FILE")]
        gesture: PathBuf,
    },

    /// Remove every saved sample for a package
    Remove {
        #[arg(long)]
        package: String,
    },

    /// Show saved gestures and monitor flags
    Status,

    /// Score a gesture file and print the verdict
    Verify {
        #[arg(long)]
        package: String,

        #[arg(long, value_name = "FILE")]
        gesture: PathBuf,
    },

    /// Exit 0 if monitoring should start after boot
    Autostart,
}

fn main() {
    let cli = Cli::parse();

    let storage = match cli.root.clone() {
        Some(root) => Ok(StorageConfig::with_root(root)),
        None => StorageConfig::resolve(),
    };
    let logging_guard = logging::init(storage.as_ref().ok());

    let storage = match storage {
        Ok(storage) => storage,
        Err(err) => {
            error!(error = %err, "Failed to resolve storage root");
            process::exit(1);
        }
    };
    let ctx = match Context::load(storage) {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            process::exit(1);
        }
    };

    let mut out = io::stdout();
    let result = match cli.command {
        Commands::Run => commands::run(&ctx).map(|_| true),
        Commands::Enroll { package, gesture } => {
            commands::enroll(&ctx, &package, &gesture, &mut out).map(|_| true)
        }
        Commands::Remove { package } => commands::remove(&ctx, &package, &mut out).map(|_| true),
        Commands::Status => commands::status(&ctx, &mut out).map(|_| true),
        Commands::Verify { package, gesture } => {
            commands::verify(&ctx, &package, &gesture, &mut out)
        }
        Commands::Autostart => commands::autostart(&ctx, &mut out),
    };

    match result {
        Ok(true) => {}
        Ok(false) => {
            drop(logging_guard);
            process::exit(2);
        }
        Err(err) => {
            error!(error = %err, "gesture-lock command failed");
            drop(logging_guard);
            process::exit(1);
        }
    }
}
