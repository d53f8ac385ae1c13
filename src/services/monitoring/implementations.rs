// 進捗監視の具象実装

use crate::core::{ProgressReporter, RunSummary};

/// コンソール出力による進捗報告実装
#[derive(Debug, Clone)]
pub struct ConsoleProgressReporter {
    quiet: bool,
    interval: usize,
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self {
            quiet: false,
            interval: 1_000,
        }
    }
}

impl ConsoleProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    /// 進捗を出力する間隔（回数）を指定
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    fn should_report(&self, completed: usize, total: usize) -> bool {
        !self.quiet && (completed % self.interval == 0 || completed == total)
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_started(&self, threads: usize, iterations: usize) {
        if !self.quiet {
            println!("🚀 Starting {threads} workers x {iterations} iterations...");
        }
    }

    fn report_progress(&self, worker_id: usize, completed: usize, total: usize) {
        if self.should_report(completed, total) {
            let percentage = (completed as f64 / total as f64) * 100.0;
            println!("📊 Worker {worker_id}: {completed}/{total} ({percentage:.1}%)");
        }
    }

    fn report_error(&self, worker_id: usize, error: &str) {
        if !self.quiet {
            eprintln!("❌ Worker {worker_id} error: {error}");
        }
    }

    fn report_completed(&self, summary: &RunSummary) {
        if self.quiet {
            return;
        }

        if summary.is_success() {
            println!(
                "✅ Completed! Calls: {}, Errors: {}, Throughput: {:.1} calls/s",
                summary.successful_calls, summary.failed_calls, summary.throughput_per_sec
            );
        } else {
            println!(
                "⚠️  Finished with failures! Calls: {}, Errors: {}, Failed workers: {:?}",
                summary.successful_calls,
                summary.failed_calls,
                summary.failed_workers()
            );
        }
    }
}

/// 何もしない進捗報告実装（テスト・ベンチマーク用）
#[derive(Debug, Default, Clone)]
pub struct NoOpProgressReporter;

impl NoOpProgressReporter {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NoOpProgressReporter {
    fn report_started(&self, _threads: usize, _iterations: usize) {
        // 何もしない
    }

    fn report_progress(&self, _worker_id: usize, _completed: usize, _total: usize) {
        // 何もしない
    }

    fn report_error(&self, _worker_id: usize, _error: &str) {
        // 何もしない
    }

    fn report_completed(&self, _summary: &RunSummary) {
        // 何もしない
    }
}
