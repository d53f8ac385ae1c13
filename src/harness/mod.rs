// ConcurrentTestHarness - T本のOSスレッドから共有ゲートを叩くストレステスト
//
// ハーネス自身はロックを持たず抽出も行わない。ワーカーを起動し、全員をjoinして
// 結果を RunSummary にまとめるだけ。

pub mod state;
pub mod worker;

pub use state::HarnessState;
pub use worker::WorkerPlan;

use crate::core::{
    ExecutionMode, FeatureExtractor, GateError, GateResult, GateStats, HarnessConfig,
    ProgressReporter, RunSummary, WorkerReport,
};
use crate::gate::SerializedExtractionGate;
use crate::workload::{Assignment, Workload};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// 並行ストレステストハーネス
pub struct ConcurrentTestHarness<E, C, R>
where
    E: FeatureExtractor + 'static,
    C: HarnessConfig,
    R: ProgressReporter + 'static,
{
    gate: Arc<SerializedExtractionGate<E>>,
    config: C,
    reporter: Arc<R>,
    state: HarnessState,
}

impl<E, C, R> ConcurrentTestHarness<E, C, R>
where
    E: FeatureExtractor + 'static,
    C: HarnessConfig,
    R: ProgressReporter + 'static,
{
    pub fn new(gate: Arc<SerializedExtractionGate<E>>, config: C, reporter: R) -> Self {
        Self {
            gate,
            config,
            reporter: Arc::new(reporter),
            state: HarnessState::Idle,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn gate(&self) -> &Arc<SerializedExtractionGate<E>> {
        &self.gate
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// ワークロードを実行し、全ワーカーの結果をまとめる
    ///
    /// 個々の抽出失敗はエラーとして返さず、該当ワーカーのステータスに記録する。
    /// `Err` になるのは入力不正・スレッド起動失敗・再実行の場合のみ。
    pub fn run(&mut self, workload: &Workload) -> GateResult<RunSummary> {
        if self.state != HarnessState::Idle {
            return Err(GateError::invalid_state(self.state, HarnessState::Spawning));
        }

        if let Err(error) = self.validate(workload) {
            log::error!("Harness input rejected: {error}");
            self.transition(HarnessState::Failed)?;
            return Err(error);
        }

        let plan = WorkerPlan {
            layer: self.config.layer(),
            iterations: self.config.iterations(),
            continue_on_error: self.config.continue_on_error(),
            tolerance: self.config.tolerance(),
            progress_interval: self.config.progress_interval(),
        };
        let threads = workload.threads();

        self.transition(HarnessState::Spawning)?;
        log::info!(
            "Starting {threads} workers x {} iterations (layer: {}, mode: {}, backend: {})",
            plan.iterations,
            plan.layer,
            self.gate.mode(),
            self.gate.backend_name()
        );
        self.reporter.report_started(threads, plan.iterations);

        let started_at = chrono::Utc::now();
        let start_time = Instant::now();

        let mut handles = Vec::with_capacity(threads);
        let mut spawn_error = None;
        for assignment in workload.assignments() {
            match self.spawn_worker(assignment, &plan) {
                Ok(handle) => handles.push((assignment, handle)),
                Err(error) => {
                    log::error!("{error}");
                    spawn_error = Some(error);
                    break;
                }
            }
        }

        if spawn_error.is_none() {
            self.transition(HarnessState::Running)?;
        }
        self.transition(HarnessState::Joining)?;

        let workers: Vec<WorkerReport> = handles
            .into_iter()
            .map(|(assignment, handle)| match handle.join() {
                Ok(report) => report,
                Err(payload) => worker::panicked_report(assignment, payload),
            })
            .collect();

        if let Some(error) = spawn_error {
            self.transition(HarnessState::Failed)?;
            return Err(error);
        }

        let elapsed = start_time.elapsed();
        let aliasing_mismatches = Self::check_aliasing(&workers, &plan);
        let summary = Self::summarize(
            started_at,
            elapsed,
            &plan,
            threads,
            self.gate.mode(),
            self.gate.stats(),
            workers,
            aliasing_mismatches,
        );

        let final_state = if summary.is_success() {
            HarnessState::Done
        } else {
            HarnessState::Failed
        };
        self.transition(final_state)?;

        log::info!(
            "Run finished in {} ms: {} successful, {} failed, peak concurrency {}",
            summary.elapsed_ms,
            summary.successful_calls,
            summary.failed_calls,
            summary.gate.peak_concurrency
        );
        self.reporter.report_completed(&summary);

        Ok(summary)
    }

    fn validate(&self, workload: &Workload) -> GateResult<()> {
        let threads = self.config.threads();
        if threads == 0 {
            return Err(GateError::validation("threads", "値は1以上である必要があります"));
        }
        if self.config.iterations() == 0 {
            return Err(GateError::validation(
                "iterations",
                "値は1以上である必要があります",
            ));
        }
        if self.config.mode() != self.gate.mode() {
            return Err(GateError::validation(
                "mode",
                format!(
                    "設定のモード({})とゲートのモード({})が一致しません",
                    self.config.mode(),
                    self.gate.mode()
                ),
            ));
        }
        if workload.threads() != threads {
            return Err(GateError::validation(
                "workload",
                format!(
                    "割り当て数({})がスレッド数({threads})と一致しません",
                    workload.threads()
                ),
            ));
        }
        Ok(())
    }

    fn transition(&mut self, next: HarnessState) -> GateResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(GateError::invalid_state(self.state, next));
        }
        log::debug!("Harness state: {} -> {next}", self.state);
        self.state = next;
        Ok(())
    }

    fn spawn_worker(
        &self,
        assignment: &Assignment,
        plan: &WorkerPlan,
    ) -> GateResult<JoinHandle<WorkerReport>> {
        let worker_id = assignment.worker_id();
        let gate = Arc::clone(&self.gate);
        let reporter = Arc::clone(&self.reporter);
        let assignment = assignment.clone();
        let plan = plan.clone();

        thread::Builder::new()
            .name(format!("worker-{worker_id}"))
            .spawn(move || worker::run_worker(gate.as_ref(), reporter.as_ref(), &assignment, &plan))
            .map_err(|e| GateError::spawn(worker_id, e))
    }

    /// 同じ元画像を割り当てられたワーカー同士の基準ベクトルを比較する
    fn check_aliasing(workers: &[WorkerReport], plan: &WorkerPlan) -> Vec<usize> {
        let mut groups: BTreeMap<usize, &WorkerReport> = BTreeMap::new();
        let mut mismatches = Vec::new();

        for report in workers {
            let Some(vector) = report.reference.as_ref() else {
                continue;
            };

            let Some(first) = groups.get(&report.source_index).copied() else {
                groups.insert(report.source_index, report);
                continue;
            };
            let Some(expected) = first.reference.as_ref() else {
                continue;
            };

            if plan
                .check_determinism(report.worker_id, 0, expected, vector)
                .is_err()
            {
                log::error!(
                    "Worker {} diverged from worker {} on source image {}",
                    report.worker_id,
                    first.worker_id,
                    report.source_index
                );
                mismatches.push(report.worker_id);
            }
        }

        mismatches
    }

    #[allow(clippy::too_many_arguments)]
    fn summarize(
        started_at: chrono::DateTime<chrono::Utc>,
        elapsed: std::time::Duration,
        plan: &WorkerPlan,
        threads: usize,
        mode: ExecutionMode,
        gate: GateStats,
        workers: Vec<WorkerReport>,
        aliasing_mismatches: Vec<usize>,
    ) -> RunSummary {
        let successful_calls: usize = workers.iter().map(|w| w.completed_iterations).sum();
        let failed_calls: usize = workers.iter().map(|w| w.failed_iterations).sum();
        let total_calls = successful_calls + failed_calls;
        let seconds = elapsed.as_secs_f64();
        let throughput_per_sec = if seconds > 0.0 {
            total_calls as f64 / seconds
        } else {
            0.0
        };

        RunSummary {
            started_at,
            threads,
            iterations: plan.iterations,
            layer: plan.layer.clone(),
            mode,
            total_calls,
            successful_calls,
            failed_calls,
            elapsed_ms: elapsed.as_millis() as u64,
            throughput_per_sec,
            aliasing_mismatches,
            gate,
            workers,
        }
    }
}
