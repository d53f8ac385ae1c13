// Worker - 1スレッド分の抽出ループ

use crate::core::{
    FeatureExtractor, FeatureVector, GateError, GateResult, ProgressReporter, WorkerReport,
    WorkerStatus,
};
use crate::gate::SerializedExtractionGate;
use crate::output::DistanceFunction;
use crate::workload::Assignment;
use std::any::Any;
use std::time::Instant;

/// 全ワーカー共通の実行パラメータ
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    pub layer: String,
    pub iterations: usize,
    pub continue_on_error: bool,
    pub tolerance: f64,
    pub progress_interval: usize,
}

impl WorkerPlan {
    /// 基準ベクトルとの一致を確認する
    ///
    /// 許容誤差0ではビット単位の一致、それ以外はL∞距離で判定。
    pub fn check_determinism(
        &self,
        worker_id: usize,
        iteration: usize,
        reference: &FeatureVector,
        vector: &FeatureVector,
    ) -> GateResult<()> {
        if self.tolerance == 0.0 && reference.is_bit_identical(vector) {
            return Ok(());
        }

        let distance = DistanceFunction::Infinity
            .distance(reference.values(), vector.values())
            .unwrap_or(f64::INFINITY);

        if self.tolerance > 0.0 && distance <= self.tolerance {
            Ok(())
        } else {
            Err(GateError::determinism(worker_id, iteration, distance))
        }
    }

    fn should_report(&self, completed: usize) -> bool {
        completed % self.progress_interval.max(1) == 0 || completed == self.iterations
    }
}

/// 割り当てられた画像でR回の抽出を実行する
pub fn run_worker<E, R>(
    gate: &SerializedExtractionGate<E>,
    reporter: &R,
    assignment: &Assignment,
    plan: &WorkerPlan,
) -> WorkerReport
where
    E: FeatureExtractor,
    R: ProgressReporter + ?Sized,
{
    let worker_id = assignment.worker_id();
    let start_time = Instant::now();
    let mut reference: Option<FeatureVector> = None;
    let mut completed_iterations = 0;
    let mut failed_iterations = 0;
    let mut first_error: Option<String> = None;

    log::debug!(
        "Worker {worker_id} started with {} ({} iterations)",
        assignment.image().label(),
        plan.iterations
    );

    for iteration in 0..plan.iterations {
        let image = assignment.image_for(iteration);
        let outcome = gate
            .extract(image, &plan.layer)
            .and_then(|vector| match &reference {
                Some(expected) => plan
                    .check_determinism(worker_id, iteration, expected, &vector)
                    .map(|_| None),
                None => Ok(Some(vector)),
            });

        match outcome {
            Ok(first) => {
                completed_iterations += 1;
                if first.is_some() {
                    reference = first;
                }
            }
            Err(error) => {
                failed_iterations += 1;
                let severity = error.severity();
                log::log!(
                    severity.log_level(),
                    "[{}] Worker {worker_id} iteration {iteration}: {error}",
                    severity.as_str()
                );
                reporter.report_error(worker_id, &error.to_string());
                if first_error.is_none() {
                    first_error = Some(error.to_string());
                }
                if !plan.continue_on_error {
                    break;
                }
            }
        }

        let attempted = iteration + 1;
        if plan.should_report(attempted) {
            reporter.report_progress(worker_id, attempted, plan.iterations);
        }
    }

    let status = match first_error {
        None => WorkerStatus::Completed,
        Some(error) => WorkerStatus::Failed { error },
    };

    WorkerReport {
        worker_id,
        image_label: assignment.image().label().to_string(),
        source_index: assignment.image().source_index(),
        completed_iterations,
        failed_iterations,
        status,
        fingerprint: reference.as_ref().map(FeatureVector::fingerprint),
        elapsed_ms: start_time.elapsed().as_millis() as u64,
        reference,
    }
}

/// join時に回収したパニックからレポートを組み立てる
pub fn panicked_report(assignment: &Assignment, payload: Box<dyn Any + Send>) -> WorkerReport {
    let message = panic_message(payload.as_ref());
    let error = GateError::worker_panicked(assignment.worker_id(), message.clone());
    log::error!("{error}");

    WorkerReport {
        worker_id: assignment.worker_id(),
        image_label: assignment.image().label().to_string(),
        source_index: assignment.image().source_index(),
        completed_iterations: 0,
        failed_iterations: 0,
        status: WorkerStatus::Panicked { message },
        fingerprint: None,
        elapsed_ms: 0,
        reference: None,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
