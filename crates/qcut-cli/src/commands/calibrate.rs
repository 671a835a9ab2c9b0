//! Calibrate command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use qcut_core::{CalibrationFile, CommittedPlans, ConfigurationStatus, GridRunner, SamplingPlanCache};

use super::common::{context, ensure_no_fatal, load_grid, print_summary, progress_bar, status_label};

/// Execute the calibrate command.
pub async fn execute(config_path: &Path, output: &Path, trajectories: usize) -> Result<()> {
    let config = load_grid(config_path)?;
    let configs = config.expand();
    let cutting = configs.iter().filter(|c| c.pipeline.is_cutting()).count();
    println!(
        "{} Calibrating {} ({} cutting configurations, ε = {})",
        style("→").cyan().bold(),
        style(&config.name).green(),
        cutting,
        config.target_precision
    );

    let cache = SamplingPlanCache::new();
    let runner = GridRunner::new(
        context(&config, CommittedPlans::default(), trajectories),
        config.grid_workers,
    );

    let bar = progress_bar(cutting);
    let report = runner
        .calibrate(&configs, &cache, |cfg, status| {
            if status != ConfigurationStatus::Succeeded {
                bar.println(format!("  {} {cfg}", status_label(status)));
            }
            bar.set_message(cfg.to_string());
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    let file = CalibrationFile::new(report.run_id, &config.name, &report.plans, report.trials);
    file.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!();
    println!("{}", style("Committed plans").bold().underlined());
    println!(
        "  {:<44} {:>8} {:>10} {:>10}  {}",
        "tag", "κ", "σ̂²", "N*", "budget"
    );
    for plan in file.plans.iter() {
        println!(
            "  {:<44} {:>8.2} {:>10.4} {:>10}  {}",
            plan.tag.to_string(),
            plan.kappa,
            plan.pilot_variance,
            plan.samples,
            if plan.under_budget {
                style("under").yellow()
            } else {
                style("ok").green()
            }
        );
    }
    println!(
        "{} Wrote {} plan(s) to {}",
        style("OK").green().bold(),
        file.plans.len(),
        output.display()
    );

    print_summary(&report.summary);
    ensure_no_fatal(&report.summary)
}
