//! Printing and exporting run reports

use std::path::Path;

use anyhow::{Context, Result};
use nim_bench_core::{ControllerReport, IterationRecord};

/// Render the iteration table and the verdict
pub fn render(report: &ControllerReport) -> String {
    let rule = "=".repeat(70);
    let mut out = String::new();

    out.push_str(&format!("\n{rule}\n"));
    out.push_str(&format!("   Results: {}\n", report.model));
    out.push_str(&format!("{rule}\n"));
    out.push_str(&format!(
        "{:>4}  {:>11}  {:>8}  {:>10}  {:>8}  {:>12}\n",
        "#", "concurrency", "requests", "tok/s", "ok/fail", "p90 lat (ms)"
    ));
    for record in &report.iterations {
        out.push_str(&row(record));
        out.push('\n');
    }
    out.push_str(&format!("{rule}\n"));
    out.push_str(&format!("Stopped: {}\n", report.stop_reason));
    match report.best() {
        Some(best) => out.push_str(&format!(
            "Highest load at or above {:.1} tok/s: {best}\n",
            report.threshold
        )),
        None => out.push_str(&format!(
            "No iteration reached {:.1} tok/s\n",
            report.threshold
        )),
    }
    out
}

fn row(record: &IterationRecord) -> String {
    let (ok_fail, p90) = match &record.stats {
        Some(stats) => (
            format!("{}/{}", stats.successful_requests, stats.failed_requests),
            stats
                .latency_ms
                .map(|d| format!("{:.0}", d.p90))
                .unwrap_or_else(|| "-".to_string()),
        ),
        None => ("-".to_string(), "-".to_string()),
    };
    let tps = match (&record.error, record.throughput.value) {
        (Some(_), _) => "error".to_string(),
        (None, Some(tps)) => format!("{tps:.2}"),
        (None, None) => "n/a".to_string(),
    };
    format!(
        "{:>4}  {:>11}  {:>8}  {:>10}  {:>8}  {:>12}",
        record.index, record.load.concurrency, record.load.total_requests, tps, ok_fail, p90
    )
}

/// Write the report as pretty JSON
pub fn write_json(report: &ControllerReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nim_bench_core::{
        BenchmarkOutcome, BenchmarkStats, Distribution, LoadLevel, Mode, StopReason,
    };

    fn stats(tps: f64) -> BenchmarkOutcome {
        BenchmarkOutcome::Stats(BenchmarkStats {
            total_requests: 50,
            successful_requests: 50,
            tokens_per_second: Distribution::from_samples(&[tps]),
            ..Default::default()
        })
    }

    fn report() -> ControllerReport {
        ControllerReport {
            mode: Mode::Auto,
            threshold: 12.0,
            model: "meta/llama3-8b-instruct".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            iterations: vec![
                IterationRecord::new(1, LoadLevel::adaptive(10), &stats(150.0)),
                IterationRecord::new(2, LoadLevel::adaptive(20), &stats(9.5)),
            ],
            stop_reason: StopReason::ThresholdBreach {
                tps: 9.5,
                concurrency: 20,
            },
        }
    }

    #[test]
    fn test_render_lists_iterations_and_best() {
        let text = render(&report());
        assert!(text.contains("meta/llama3-8b-instruct"));
        assert!(text.contains("150.00"));
        assert!(text.contains("9.50"));
        assert!(text.contains("Highest load at or above 12.0 tok/s"));
    }

    #[test]
    fn test_write_json_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out/report.json");
        write_json(&report(), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["stop_reason"]["reason"], "threshold_breach");
        assert_eq!(value["iterations"].as_array().unwrap().len(), 2);
        assert_eq!(value["iterations"][0]["load"]["total_requests"], 50);
    }
}
