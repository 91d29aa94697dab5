use std::{fmt::Write, path::Path};

use aptsync_core::report::SyncProgressReport;
use nu_ansi_term::Color::{Cyan, Green, Red, Yellow};
use tracing::info;

use crate::{
    error::CliResult,
    snapshot::load_snapshots,
    utils::{format_seconds, state_label, Colored, Icons},
};

/// Renders a progress report as indented text.
pub fn render_report(report: &SyncProgressReport) -> String {
    let mut out = String::new();
    let index = &report.index;
    let packages = &report.packages;

    let _ = writeln!(out, "{}", Colored(Cyan, report.repo_id()));
    let _ = writeln!(
        out,
        "  index     {} ({})",
        state_label(index.state),
        format_seconds(index.execution_time)
    );
    if let Some(message) = &index.error_message {
        let _ = writeln!(out, "    {message}");
    }
    if let Some(traceback) = &index.traceback {
        for line in traceback.lines() {
            let _ = writeln!(out, "    {line}");
        }
    }

    let _ = write!(
        out,
        "  packages  {} ({})",
        state_label(packages.state),
        format_seconds(packages.execution_time)
    );
    if let Some(total) = packages.total_count {
        let _ = write!(
            out,
            "  {}/{total} imported",
            packages.finished_count.unwrap_or(0)
        );
        if let Some(errors) = packages.error_count.filter(|n| *n > 0) {
            let _ = write!(out, ", {}", Colored(Red, format!("{errors} failed")));
        }
    }
    if let Some(removed) = packages.removed_count {
        let _ = write!(out, ", {removed} removed");
    }
    out.push('\n');

    if let Some(message) = &packages.error_message {
        let _ = writeln!(out, "    {message}");
    }
    if let Some(error) = &packages.error {
        let _ = writeln!(out, "    {error}");
    }
    for (key, error) in packages.individual_errors.iter().flatten() {
        let mut lines = error.lines();
        let first = lines.next().unwrap_or_default();
        let _ = writeln!(out, "    {} {key}: {first}", Colored(Red, Icons::CROSS));
        for line in lines {
            let _ = writeln!(out, "      {line}");
        }
    }
    for (key, error) in packages.removal_errors.iter().flatten() {
        let first = error.lines().next().unwrap_or_default();
        let _ = writeln!(
            out,
            "    {} {key}: {first}",
            Colored(Yellow, "removal failed")
        );
    }

    let final_report = report.build_final_report();
    let result = if final_report.success {
        Colored(Green, "success").to_string()
    } else {
        Colored(Red, "failed").to_string()
    };
    let total = match final_report.summary.total_execution_time {
        -1 => "-".to_string(),
        seconds => format_seconds(Some(seconds as u64)),
    };
    let _ = writeln!(out, "  result    {result} ({total})");

    out
}

pub fn display_status(path: &Path) -> CliResult<()> {
    let snapshots = load_snapshots(path)?;
    if snapshots.is_empty() {
        info!("No repositories recorded in {}", path.display());
        return Ok(());
    }

    for (repo_id, snapshot) in snapshots {
        let report = SyncProgressReport::from_progress_snapshot(repo_id, snapshot);
        print!("{}", render_report(&report));
    }

    Ok(())
}
