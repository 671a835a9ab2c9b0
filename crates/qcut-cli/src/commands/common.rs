//! Shared helpers for CLI commands.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::{StyledObject, style};
use indicatif::{ProgressBar, ProgressStyle};

use qcut_adapter_sim::{StatevectorOracle, StatevectorReference};
use qcut_compile::{StandardKernels, SwapRouter};
use qcut_core::{
    CommittedPlans, ConfigurationStatus, GridConfig, GridSummary, MetricRecord, PipelineContext, read_records,
};

/// Load and validate a grid file.
pub fn load_grid(path: &Path) -> Result<GridConfig> {
    GridConfig::load(path).with_context(|| format!("Invalid grid file: {}", path.display()))
}

/// Wire the simulator, router and kernels into a pipeline context.
pub fn context(config: &GridConfig, plans: CommittedPlans, trajectories: usize) -> PipelineContext {
    PipelineContext {
        kernels: Arc::new(StandardKernels),
        compiler: Arc::new(SwapRouter),
        oracle: Arc::new(StatevectorOracle::new().with_trajectories(trajectories)),
        reference: Arc::new(StatevectorReference::new()),
        settings: Arc::new(config.run_settings()),
        plans,
    }
}

/// Progress bar over `len` configurations.
pub fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(s) = ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(s.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub fn status_label(status: ConfigurationStatus) -> StyledObject<&'static str> {
    match status {
        ConfigurationStatus::Succeeded => style("ok").green(),
        ConfigurationStatus::Flagged => style("flagged").yellow(),
        ConfigurationStatus::Failed => style("failed").red().bold(),
    }
}

/// Print grid counts.
pub fn print_summary(summary: &GridSummary) {
    println!();
    println!("{}", style("Summary").bold().underlined());
    println!("  Configurations: {}", summary.total);
    println!("  Succeeded:      {}", style(summary.succeeded).green());
    println!("  Flagged:        {}", style(summary.flagged).yellow());
    println!("  Failed:         {}", style(summary.failed).red());
    for (kind, n) in &summary.failures_by_kind {
        println!("    - {kind}: {n}");
    }
}

/// Turn fatal failures into a non-zero exit.
pub fn ensure_no_fatal(summary: &GridSummary) -> Result<()> {
    if summary.has_fatal() {
        anyhow::bail!(
            "{} configuration(s) ended in an execution failure or infeasible cut",
            summary.fatal
        );
    }
    Ok(())
}

/// Read and concatenate record files.
pub fn load_records(paths: &[impl AsRef<Path>]) -> Result<Vec<MetricRecord>> {
    let mut out = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let records =
            read_records(path).with_context(|| format!("Failed to read records: {}", path.display()))?;
        out.extend(records);
    }
    Ok(out)
}

/// `-` for missing values, four significant decimals otherwise.
pub fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.4}"))
}
