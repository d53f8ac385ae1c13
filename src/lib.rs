//! 非リエントラントな特徴抽出器を複数スレッドから安全に共有するための
//! 直列化ゲートと、その並行ストレステストハーネス。
//! 抽出した特徴の検索精度（mAP）評価も含む。

pub mod cli;
pub mod core;
pub mod evaluation;
pub mod extractor;
pub mod gate;
pub mod harness;
pub mod image_loader;
pub mod output;
pub mod services;
pub mod workload;

pub use crate::core::{
    ExecutionMode, FeatureExtractor, FeatureVector, GateError, GateResult, GateStats,
    HarnessConfig, ImageSource, ProgressReporter, RunSummary, SharedImage, WorkerReport,
    WorkerStatus,
};
pub use evaluation::{EvaluationReport, MapEvaluator};
pub use extractor::{ModelSpec, ReferenceExtractor};
pub use gate::SerializedExtractionGate;
pub use harness::{ConcurrentTestHarness, HarnessState};
pub use workload::{Workload, WorkloadConfig, WorkloadGenerator};
