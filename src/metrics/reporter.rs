//! Console reporter with a live panel and the final summary

use super::collector::MetricsCollector;
use super::names;
use super::types::{rate, AggregateSummary, SeriesValue, TrendStats};
use crate::engine::{RunProgress, RunResult};
use std::io::{self, Write};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Redraw the live panel every `every` until the task is aborted.
pub async fn start_periodic_reporter(
    collector: MetricsCollector,
    progress: RunProgress,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick fires immediately; nothing to show yet.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        collector.update_system_metrics();

        print_live_metrics(&collector, &progress);
    }
}

/// Print live metrics (clears screen and updates in place)
pub fn print_live_metrics(collector: &MetricsCollector, progress: &RunProgress) {
    print!("\x1B[2J\x1B[1;1H");

    let snapshot = collector.snapshot();
    let elapsed = snapshot.elapsed.as_secs();
    let system = collector.system_metrics();

    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║              Journey Load Test - Live Metrics                  ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    println!(
        "\n⏱️  Elapsed Time: {:02}:{:02}:{:02}    State: {}",
        elapsed / 3600,
        (elapsed % 3600) / 60,
        elapsed % 60,
        progress.state()
    );

    println!("\n┌─ VIRTUAL USERS ─────────────────────────────────────────────┐");
    println!(
        "│  Active:       {:>8}    Target:     {:>8}              │",
        progress.active_units(),
        progress.target()
    );
    println!(
        "│  Peak:         {:>8}                                      │",
        progress.peak_units()
    );
    println!("└─────────────────────────────────────────────────────────────┘");

    let requests = match snapshot.metric(names::HTTP_REQS) {
        Some(SeriesValue::Counter { sum, .. }) => sum,
        _ => 0.0,
    };
    println!("\n┌─ REQUESTS ──────────────────────────────────────────────────┐");
    if let Some(SeriesValue::Rate { passes, total }) = snapshot.metric(names::HTTP_REQ_FAILED) {
        let throughput = if elapsed > 0 {
            requests / elapsed as f64
        } else {
            0.0
        };
        println!(
            "│  Total:        {:>8.0}    Throughput: {:>7.2}/sec        │",
            requests, throughput
        );
        println!(
            "│  Failed:       {:>8}    Fail Rate:  {:>7.2}%          │",
            passes,
            rate(passes, total) * 100.0
        );
    }
    if let Some(SeriesValue::Rate { passes, total }) = snapshot.metric(names::CHECKS) {
        println!(
            "│  Checks:       {:>8}    Pass Rate:  {:>7.2}%          │",
            total,
            rate(passes, total) * 100.0
        );
    }
    println!("└─────────────────────────────────────────────────────────────┘");

    if let Some(SeriesValue::Trend(hist)) = snapshot.metric(names::HTTP_REQ_DURATION) {
        let stats = TrendStats::from_histogram(&hist);
        if stats.count > 0 {
            println!("\n┌─ REQUEST LATENCY (ms) ──────────────────────────────────────┐");
            println!(
                "│  Min: {:>7.1}  Med: {:>7.1}  P95: {:>7.1}  P99: {:>7.1}    │",
                stats.min, stats.med, stats.p95, stats.p99
            );
            println!(
                "│  Avg: {:>7.1}  Max: {:>7.1}  Count: {:>10}            │",
                stats.avg, stats.max, stats.count
            );
            println!("└─────────────────────────────────────────────────────────────┘");
        }
    }

    println!("\n┌─ SYSTEM ────────────────────────────────────────────────────┐");
    println!(
        "│  CPU Usage:    {:>6.1}%    Memory: {:>6} / {:>6} MB       │",
        system.cpu_usage, system.memory_used_mb, system.memory_total_mb
    );
    println!("└─────────────────────────────────────────────────────────────┘");

    println!("\n  [Press Ctrl+C to stop test]");

    let _ = io::stdout().flush();
}

/// Print final summary report
pub fn print_final_report(result: &RunResult) {
    println!("\n╔════════════════════════════════════════════════════════════════╗");
    println!("║                    FINAL TEST REPORT                           ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    println!("\n🧭 RUN");
    println!("   Scenario:             {:>10}", result.scenario);
    println!("   Run ID:               {}", result.run_id);
    println!("   Started:              {}", result.started_at.to_rfc3339());
    println!("   Peak VUs:             {:>10}", result.peak_vus);
    println!("   Iterations:           {:>10}", result.iterations);
    if result.interrupted {
        println!("   ⚠️  Graceful stop expired, some iterations were interrupted");
    }

    if !result.checks.is_empty() {
        println!("\n✅ CHECKS");
        for check in &result.checks {
            let mark = if check.fails == 0 { "✓" } else { "✗" };
            println!(
                "   {} {}/{} {:<28} {:>7} ✓ {:>7} ✗",
                mark, check.journey, check.step, check.check, check.passes, check.fails
            );
        }
    }

    println!("\n📊 METRICS");
    for metric in &result.metrics {
        println!("   {:<24} {}", metric.name, format_aggregate(&metric.aggregate));
    }

    let tagged: Vec<_> = result
        .series
        .iter()
        .filter(|s| s.name == names::HTTP_REQ_DURATION && !s.tags.is_empty())
        .collect();
    if !tagged.is_empty() {
        println!("\n📈 LATENCY BY STEP");
        for series in tagged {
            let label = series
                .tags
                .iter()
                .map(|(k, v)| format!("{}:{}", k, v))
                .collect::<Vec<_>>()
                .join(",");
            println!("   {:<40} {}", label, format_aggregate(&series.aggregate));
        }
    }

    if !result.thresholds.is_empty() {
        println!("\n🎯 THRESHOLDS");
        for threshold in &result.thresholds {
            let observed = threshold
                .observed
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "-".to_string());
            match &threshold.failure {
                None => println!(
                    "   PASS  {} {} (observed {})",
                    threshold.metric, threshold.expression, observed
                ),
                Some(reason) => println!(
                    "   FAIL  {} {} (observed {}, {})",
                    threshold.metric, threshold.expression, observed, reason
                ),
            }
        }
    }

    println!("\n⏱️  Test Duration: {:.2} seconds", result.duration_secs);
    println!(
        "   Result: {}",
        if result.passed { "PASSED" } else { "FAILED" }
    );
    println!("════════════════════════════════════════════════════════════════\n");
}

fn format_aggregate(aggregate: &AggregateSummary) -> String {
    match aggregate {
        AggregateSummary::Counter { count, per_second } => {
            format!("{:.0} ({:.2}/s)", count, per_second)
        }
        AggregateSummary::Rate {
            rate,
            passes,
            fails,
        } => format!("{:.2}% ({} of {})", rate * 100.0, passes, passes + fails),
        AggregateSummary::Trend(stats) => format!(
            "avg={:.2} min={:.2} med={:.2} max={:.2} p(90)={:.2} p(95)={:.2} p(99)={:.2}",
            stats.avg, stats.min, stats.med, stats.max, stats.p90, stats.p95, stats.p99
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_aggregate() {
        let counter = AggregateSummary::Counter {
            count: 12.0,
            per_second: 1.5,
        };
        assert_eq!(format_aggregate(&counter), "12 (1.50/s)");

        let rate = AggregateSummary::Rate {
            rate: 0.25,
            passes: 1,
            fails: 3,
        };
        assert_eq!(format_aggregate(&rate), "25.00% (1 of 4)");
    }
}
