//! Summarize command implementation.

use std::path::PathBuf;

use anyhow::Result;
use console::style;

use qcut_core::summarize;

use super::common::{fmt_opt, load_records};

/// Execute the summarize command.
pub fn execute(paths: &[PathBuf], format: &str) -> Result<()> {
    let records = load_records(paths)?;
    let rows = summarize(&records);

    match format.to_lowercase().as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        "table" => {
            println!(
                "{} {} record(s) in {} group(s)",
                style("→").cyan().bold(),
                records.len(),
                rows.len()
            );
            println!();
            println!(
                "{}",
                style(format!(
                    "{:<4} {:<5} {:<7} {:>5} {:>5} {:>5} {:>5} {:>9} {:>9} {:>9} {:>9} {:>10}",
                    "pipe", "kern", "topo", "n", "ok", "flag", "fail", "M1 mae", "M1 rmse", "M2 depth",
                    "M3 calls", "M4 var"
                ))
                .bold()
            );
            for r in &rows {
                println!(
                    "{:<4} {:<5} {:<7} {:>5} {:>5} {:>5} {:>5} {:>9} {:>9} {:>9} {:>9} {:>10}",
                    r.pipeline.to_string(),
                    r.kernel.to_string(),
                    r.topology.to_string(),
                    r.records,
                    r.succeeded,
                    r.flagged,
                    r.failed,
                    fmt_opt(r.m1_mae),
                    fmt_opt(r.m1_rmse),
                    fmt_opt(r.m2_depth_ratio),
                    fmt_opt(r.m3_overhead),
                    r.m4_variance.map_or_else(|| "-".to_string(), |v| format!("{v:.3e}")),
                );
            }
        }
        other => anyhow::bail!("Unknown format: '{other}'. Available: table, json"),
    }
    Ok(())
}
