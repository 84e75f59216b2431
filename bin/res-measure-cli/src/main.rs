// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # res-measure
//!
//! Command-line interval monitor for system and process resource usage.
//!
//! ## Usage
//! ```bash
//! # Monitor the whole system once a second
//! res-measure monitor
//!
//! # Monitor the system and one process, 10 samples
//! res-measure monitor --pid 1234 --count 10
//!
//! # Replay saved /proc + /sys captures
//! res-measure monitor --root ./captured-rootfs --count 1
//!
//! # One-shot system status
//! res-measure status --json
//! ```

mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::MonitorConfig;

#[derive(Parser)]
#[command(
    name = "res-measure",
    about = "Interval monitor for system and process resource usage",
    version,
    author
)]
struct Cli {
    /// Path to a TOML configuration file (CLI flags take precedence).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print resource-usage deltas at a fixed interval.
    Monitor {
        /// Process to monitor alongside the system.
        #[arg(short, long)]
        pid: Option<i32>,

        /// Sampling interval in milliseconds.
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Number of samples to print; 0 runs until interrupted.
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Substitute filesystem root (saved /proc + /sys captures).
        #[arg(short, long)]
        root: Option<std::path::PathBuf>,

        /// Control-group name pattern for cgroup memory accounting.
        #[arg(short = 'g', long)]
        cgroup: Option<String>,
    },

    /// Print a one-shot snapshot of current system state.
    Status {
        /// Substitute filesystem root (saved /proc + /sys captures).
        #[arg(short, long)]
        root: Option<std::path::PathBuf>,

        /// Emit machine-readable JSON instead of the summary.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    let mut base = match &cli.config {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };

    match cli.command {
        Commands::Monitor {
            pid,
            interval_ms,
            count,
            root,
            cgroup,
        } => {
            if let Some(pid) = pid {
                base.pid = Some(pid);
            }
            if let Some(interval_ms) = interval_ms {
                base.interval_ms = interval_ms;
            }
            if let Some(count) = count {
                base.count = count;
            }
            if let Some(root) = root {
                base.root = Some(root);
            }
            if let Some(cgroup) = cgroup {
                base.cgroup = Some(cgroup);
            }
            commands::monitor::execute(&base)
        }
        Commands::Status { root, json } => {
            if let Some(root) = root {
                base.root = Some(root);
            }
            commands::status::execute(&base, json)
        }
    }
}
