//! qcut Command-Line Interface
//!
//! Drives the circuit-cutting experiment grid: calibrate sampling plans,
//! run the main and robustness grids, and aggregate the resulting records.
//!
//! ```text
//!   grid.yaml ──► qcut calibrate ──► calibration.json
//!                                         │
//!   grid.yaml ──► qcut run-main ◄─────────┘ ──► main.jsonl
//!   grid.yaml ──► qcut run-robustness ────────► robustness.jsonl
//!
//!   *.jsonl ──► qcut summarize   (table or JSON)
//!   *.jsonl ──► qcut plot        (CSV series)
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{calibrate, plot, run, summarize};

/// qcut - quasiprobability circuit cutting experiments
#[derive(Parser)]
#[command(name = "qcut")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pilot sampling and commit one plan per calibration tag
    Calibrate {
        /// Grid configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Where to write committed plans
        #[arg(short, long, default_value = "results/calibration.json")]
        output: PathBuf,

        /// Noise trajectories per simulator call
        #[arg(long, default_value_t = qcut_adapter_sim::DEFAULT_TRAJECTORIES)]
        trajectories: usize,
    },

    /// Run the main grid against committed calibration plans
    RunMain {
        /// Grid configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Calibration file from `qcut calibrate`
        #[arg(long, default_value = "results/calibration.json")]
        calibration: PathBuf,

        /// JSON-lines output, appended to
        #[arg(short, long, default_value = "results/main.jsonl")]
        output: PathBuf,

        /// Noise trajectories per simulator call
        #[arg(long, default_value_t = qcut_adapter_sim::DEFAULT_TRAJECTORIES)]
        trajectories: usize,
    },

    /// Calibrate a robustness grid in-process, then run it
    RunRobustness {
        /// Grid configuration (YAML), tagged `robustness`
        #[arg(short, long)]
        config: PathBuf,

        /// JSON-lines output, appended to
        #[arg(short, long, default_value = "results/robustness.jsonl")]
        output: PathBuf,

        /// Noise trajectories per simulator call
        #[arg(long, default_value_t = qcut_adapter_sim::DEFAULT_TRAJECTORIES)]
        trajectories: usize,
    },

    /// Aggregate records per pipeline, kernel and topology
    Summarize {
        /// Record files (JSON lines)
        #[arg(required = true)]
        records: Vec<PathBuf>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Write a metric series per pipeline as CSV
    Plot {
        /// Record files (JSON lines)
        #[arg(required = true)]
        records: Vec<PathBuf>,

        /// Metric on the y axis (m1, m2, m3, m4)
        #[arg(short, long, default_value = "m1")]
        metric: String,

        /// Grid axis on the x axis (noise_level, depth_budget, max_cuts, num_qubits)
        #[arg(short, long, default_value = "noise_level")]
        x: String,

        /// CSV output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Calibrate {
            config,
            output,
            trajectories,
        } => calibrate::execute(&config, &output, trajectories).await,

        Commands::RunMain {
            config,
            calibration,
            output,
            trajectories,
        } => run::execute_main(&config, &calibration, &output, trajectories).await,

        Commands::RunRobustness {
            config,
            output,
            trajectories,
        } => run::execute_robustness(&config, &output, trajectories).await,

        Commands::Summarize { records, format } => summarize::execute(&records, &format),

        Commands::Plot {
            records,
            metric,
            x,
            output,
        } => plot::execute(&records, &metric, &x, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
