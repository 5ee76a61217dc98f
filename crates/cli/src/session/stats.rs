//! Session statistics.

use std::time::Duration;

use dispatcher::DispatcherReport;
use observability::StatsSummary;

/// Heartbeat results of one dispatcher
#[derive(Debug, Clone)]
pub struct HeartbeatStats {
    pub dispatcher: String,
    pub beats: u64,
    /// Spacing between beats in ms
    pub spacing: StatsSummary,
}

/// Statistics from a session run
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Total duration of the session
    pub duration: Duration,

    /// Registry report taken before teardown
    pub dispatchers: Vec<DispatcherReport>,

    pub heartbeats: Vec<HeartbeatStats>,

    /// Registry dumps performed on the system dispatcher
    pub reports: u64,
}

impl SessionStats {
    pub fn total_executed(&self) -> u64 {
        self.dispatchers.iter().map(|d| d.metrics.executed).sum()
    }

    /// Executions per second across all dispatchers
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.total_executed() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Session Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Dispatchers: {}", self.dispatchers.len());
        println!("   ├─ Executed: {}", self.total_executed());
        println!("   ├─ Throughput: {:.2}/s", self.throughput());
        println!("   └─ Registry dumps: {}", self.reports);

        for report in &self.dispatchers {
            let m = &report.metrics;
            let marker = if report.is_system { " (system)" } else { "" };
            println!("\n📈 [{}] {}{}", report.index, report.name, marker);
            println!("   ├─ Posted: {}", m.posted);
            println!("   ├─ Executed: {}", m.executed);
            println!("   ├─ Callback failures: {}", m.callback_failures);
            println!("   ├─ Rejected: {} / timeouts: {}", m.rejected, m.timeouts);
            println!("   ├─ Cancelled: {} / too late: {}", m.cancelled, m.too_late);
            println!("   └─ Callback latency (us): {}", report.latency);
        }

        if !self.heartbeats.is_empty() {
            println!("\n💓 Heartbeats");
            for hb in &self.heartbeats {
                println!(
                    "   ├─ {}: {} beats, spacing (ms) {}",
                    hb.dispatcher, hb.beats, hb.spacing
                );
            }
        }

        println!();
    }
}
