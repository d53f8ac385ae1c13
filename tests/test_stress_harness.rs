// ストレステストハーネスのエンドツーエンドテスト
mod fixtures;

use extractor_gate::core::FeatureExtractor;
use extractor_gate::extractor::{ModelSpec, ReferenceExtractor};
use extractor_gate::services::{DefaultHarnessConfig, NoOpProgressReporter};
use extractor_gate::workload::DirectoryImageSource;
use extractor_gate::{
    ConcurrentTestHarness, ExecutionMode, HarnessState, SerializedExtractionGate, WorkerStatus,
    WorkloadConfig, WorkloadGenerator,
};
use fixtures::{blank_image, reference_gate, synthetic_workload, write_png, ProbeExtractor};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_liveness_four_threads_ten_thousand_iterations() {
    let probe = ProbeExtractor::new();
    let calls = Arc::clone(&probe.calls);
    let max_active = Arc::clone(&probe.max_active);
    let gate = Arc::new(SerializedExtractionGate::new(probe, ExecutionMode::Gpu));
    let config = DefaultHarnessConfig::new(4, 10_000).with_layer("probe");

    let mut harness = ConcurrentTestHarness::new(gate, config, NoOpProgressReporter);
    let summary = harness.run(&synthetic_workload(4)).unwrap();

    assert_eq!(harness.state(), HarnessState::Done);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(summary.total_calls, 40_000);
    assert_eq!(calls.load(Ordering::SeqCst), 40_000);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(summary.gate.peak_concurrency, 1);
    assert!(summary
        .workers
        .iter()
        .all(|worker| worker.completed_iterations == 10_000));
}

#[test]
fn test_repeated_extraction_is_deterministic() {
    let config = DefaultHarnessConfig::new(4, 40);
    let mut harness =
        ConcurrentTestHarness::new(reference_gate(ExecutionMode::Gpu), config, NoOpProgressReporter);

    let summary = harness.run(&synthetic_workload(4)).unwrap();

    assert!(summary.is_success());
    assert!(summary.workers.iter().all(|w| w.failed_iterations == 0));
}

#[test]
fn test_aliased_workers_produce_identical_vectors() {
    let config = DefaultHarnessConfig::new(6, 10);
    let workload = synthetic_workload(6);
    // 割り当ては [0, 2, 4, 3, 4, 5] となり、worker 2 と 4 が同じ画像を共有する
    assert_eq!(workload.aliased_pairs(), vec![(2, 4)]);

    let mut harness =
        ConcurrentTestHarness::new(reference_gate(ExecutionMode::Gpu), config, NoOpProgressReporter);
    let summary = harness.run(&workload).unwrap();

    assert!(summary.aliasing_mismatches.is_empty());
    for (a, b) in workload.aliased_pairs() {
        assert_eq!(summary.workers[a].fingerprint, summary.workers[b].fingerprint);
    }
    // 異なる元画像からは異なるベクトル
    assert_ne!(summary.workers[0].fingerprint, summary.workers[3].fingerprint);
}

#[test]
fn test_directory_wrap_around_groups_same_file() {
    let temp_dir = TempDir::new().unwrap();
    write_png(&temp_dir.path().join("0.png"), 40);
    write_png(&temp_dir.path().join("1.png"), 200);
    let source = DirectoryImageSource::new(temp_dir.path()).unwrap();

    // 2ファイルから4枚のプールを作ると、0と2、1と3が同じファイルになる
    let workload = WorkloadGenerator::new(
        WorkloadConfig::default()
            .with_distinct_images(4)
            .with_aliasing(false),
    )
    .generate(&source, 4)
    .unwrap();
    let indices: Vec<usize> = workload
        .pool()
        .iter()
        .map(|image| image.source_index())
        .collect();
    assert_eq!(indices, vec![0, 1, 0, 1]);
    assert!(workload.aliased_pairs().is_empty());

    let mut harness = ConcurrentTestHarness::new(
        reference_gate(ExecutionMode::Gpu),
        DefaultHarnessConfig::new(4, 5),
        NoOpProgressReporter,
    );
    let summary = harness.run(&workload).unwrap();

    assert!(summary.is_success());
    assert!(summary.aliasing_mismatches.is_empty());
    assert_eq!(summary.workers[0].source_index, summary.workers[2].source_index);
    assert_eq!(summary.workers[0].fingerprint, summary.workers[2].fingerprint);
    assert_ne!(summary.workers[0].fingerprint, summary.workers[1].fingerprint);
}

#[test]
fn test_error_isolation() {
    let config = DefaultHarnessConfig::new(4, 30);
    let mut workload = synthetic_workload(4);
    workload.inject_fault(1, 10, blank_image()).unwrap();

    let mut harness = ConcurrentTestHarness::new(
        reference_gate(ExecutionMode::Cpu),
        config.with_mode(ExecutionMode::Cpu),
        NoOpProgressReporter,
    );
    let summary = harness.run(&workload).unwrap();

    assert_eq!(harness.state(), HarnessState::Failed);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(summary.failed_workers(), vec![1]);
    assert!(matches!(
        summary.workers[1].status,
        WorkerStatus::Failed { ref error } if error.contains("blank")
    ));
    assert_eq!(summary.workers[1].completed_iterations, 10);

    for worker in [0, 2, 3] {
        assert_eq!(summary.workers[worker].status, WorkerStatus::Completed);
        assert_eq!(summary.workers[worker].completed_iterations, 30);
    }
}

#[test]
fn test_error_isolation_continue_on_error() {
    let config = DefaultHarnessConfig::new(2, 30).with_continue_on_error(true);
    let mut workload = synthetic_workload(2);
    workload.inject_fault(0, 0, blank_image()).unwrap();
    workload.inject_fault(0, 29, blank_image()).unwrap();

    let mut harness =
        ConcurrentTestHarness::new(reference_gate(ExecutionMode::Gpu), config, NoOpProgressReporter);
    let summary = harness.run(&workload).unwrap();

    assert_eq!(summary.workers[0].completed_iterations, 28);
    assert_eq!(summary.workers[0].failed_iterations, 2);
    assert_eq!(summary.workers[1].status, WorkerStatus::Completed);
    assert_eq!(summary.failed_calls, 2);
    assert_eq!(summary.exit_code(), 1);
}

#[test]
fn test_single_thread_single_iteration_matches_direct_call() {
    let workload = synthetic_workload(1);
    let image = workload.assignments()[0].image().clone();

    let mut direct = ReferenceExtractor::load(&ModelSpec::default()).unwrap();
    direct.set_execution_mode(ExecutionMode::Gpu).unwrap();
    let expected = direct.extract(image.image(), "fc7").unwrap();

    let gate = reference_gate(ExecutionMode::Gpu);
    let config = DefaultHarnessConfig::new(1, 1);
    let mut harness = ConcurrentTestHarness::new(Arc::clone(&gate), config, NoOpProgressReporter);
    let summary = harness.run(&workload).unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.total_calls, 1);

    let gated = gate.extract(&image, "fc7").unwrap();
    assert_eq!(gated.values(), expected.as_slice());
    assert_eq!(summary.workers[0].fingerprint.as_deref(), Some(gated.fingerprint().as_str()));
}
