//! Grid run command implementations.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;

use qcut_core::{
    CalibrationFile, CommittedPlans, ConfigurationStatus, GridConfig, GridRunner, RecordWriter,
    SamplingPlanCache,
};

use super::common::{context, ensure_no_fatal, load_grid, print_summary, progress_bar, status_label};

/// Execute `run-main`: cutting pipelines use only committed plans.
pub async fn execute_main(
    config_path: &Path,
    calibration: &Path,
    output: &Path,
    trajectories: usize,
) -> Result<()> {
    let config = load_grid(config_path)?;
    if config.is_robustness() {
        anyhow::bail!(
            "grid '{}' is tagged robustness; use `qcut run-robustness`",
            config.name
        );
    }
    let file = CalibrationFile::load(calibration).with_context(|| {
        format!(
            "No calibration at {}; run `qcut calibrate` first",
            calibration.display()
        )
    })?;
    if file.grid != config.name {
        tracing::warn!(calibrated = %file.grid, grid = %config.name, "calibration was made for another grid");
    }
    println!(
        "  Pinned {} plan(s) from calibration run {}",
        file.plans.len(),
        file.run_id
    );
    let runner = GridRunner::new(
        context(&config, file.committed(), trajectories),
        config.grid_workers,
    );
    run_grid(&config, runner, output).await
}

/// Execute `run-robustness`: tags without a plan are calibrated before the
/// grid runs.
pub async fn execute_robustness(config_path: &Path, output: &Path, trajectories: usize) -> Result<()> {
    let config = load_grid(config_path)?;
    if !config.is_robustness() {
        anyhow::bail!(
            "grid '{}' is not tagged robustness; use `qcut run-main`",
            config.name
        );
    }
    let configs = config.expand();
    let runner = GridRunner::new(
        context(&config, CommittedPlans::default(), trajectories),
        config.grid_workers,
    );
    let cache = SamplingPlanCache::new();
    let calibration = runner.calibrate(&configs, &cache, |_, _| {}).await;
    println!(
        "  Calibrated {} plan(s) ({} failed)",
        calibration.plans.len(),
        calibration.summary.failed
    );
    run_grid(&config, runner.with_plans(calibration.plans), output).await
}

async fn run_grid(config: &GridConfig, runner: GridRunner, output: &Path) -> Result<()> {
    let configs = config.expand();
    println!(
        "{} Running {} ({} configurations, {} in flight)",
        style("→").cyan().bold(),
        style(&config.name).green(),
        configs.len(),
        config.grid_workers
    );

    let bar = progress_bar(configs.len());
    let report = runner
        .run(&configs, |cfg, status| {
            if status != ConfigurationStatus::Succeeded {
                bar.println(format!("  {} {cfg}", status_label(status)));
            }
            bar.set_message(cfg.to_string());
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    let mut writer = RecordWriter::append(output)
        .with_context(|| format!("Failed to open {}", output.display()))?;
    for record in &report.records {
        writer.write(record)?;
    }
    writer.flush()?;
    println!(
        "{} Appended {} record(s) to {} (run {})",
        style("OK").green().bold(),
        report.records.len(),
        output.display(),
        report.run_id
    );

    print_summary(&report.summary);
    ensure_no_fatal(&report.summary)
}
