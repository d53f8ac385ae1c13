use crate::core::{ExecutionMode, HarnessConfig, ImageSource, RunSummary};
use crate::extractor::{ModelSpec, ReferenceExtractor};
use crate::gate::SerializedExtractionGate;
use crate::harness::ConcurrentTestHarness;
use crate::output::write_report;
use crate::services::{ConsoleProgressReporter, DefaultHarnessConfig, RunConfig};
use crate::workload::{DirectoryImageSource, SyntheticImageSource, WorkloadGenerator};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// stress コマンドの引数をまとめた構造体
#[derive(Debug, Default, Clone)]
pub struct StressOptions {
    pub threads: Option<usize>,
    pub iterations: Option<usize>,
    pub layer: Option<String>,
    pub mode: Option<ExecutionMode>,
    pub model: Option<PathBuf>,
    pub images: Option<PathBuf>,
    pub distinct_images: Option<usize>,
    pub no_alias: bool,
    pub continue_on_error: bool,
    pub tolerance: Option<f64>,
    pub config_preset: Option<String>,
    pub config: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub quiet: bool,
}

impl StressOptions {
    /// 設定ファイル → プリセット → コマンドライン引数の順に重ねて実行設定を作る
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut run_config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(preset) = &self.config_preset {
            run_config.harness = DefaultHarnessConfig::preset(preset)?;
        }

        let mut harness = run_config.harness.clone();
        if let Some(threads) = self.threads {
            harness = harness.with_threads(threads);
        }
        if let Some(iterations) = self.iterations {
            harness = harness.with_iterations(iterations);
        }
        if let Some(layer) = &self.layer {
            harness = harness.with_layer(layer.clone());
        }
        if let Some(mode) = self.mode {
            harness = harness.with_mode(mode);
        }
        if let Some(tolerance) = self.tolerance {
            harness = harness.with_tolerance(tolerance);
        }
        if self.continue_on_error {
            harness = harness.with_continue_on_error(true);
        }
        run_config.harness = harness;

        if let Some(distinct_images) = self.distinct_images {
            run_config.workload = run_config.workload.with_distinct_images(distinct_images);
        }
        if self.no_alias {
            run_config.workload = run_config.workload.with_aliasing(false);
        }
        if self.model.is_some() {
            run_config.model = self.model.clone();
        }
        if self.images.is_some() {
            run_config.images = self.images.clone();
        }

        run_config.validate()?;
        Ok(run_config)
    }
}

/// ストレステストを実行し、プロセス終了コードを返す
pub fn execute_stress(options: StressOptions) -> Result<i32> {
    let run_config = options.resolve()?;
    let harness_config = run_config.harness.clone();

    // 1. 抽出器の初期化（失敗したらワーカーは1本も起動しない）
    let model = match &run_config.model {
        Some(path) => ModelSpec::from_json_file(path)?,
        None => ModelSpec::default(),
    };
    let extractor = ReferenceExtractor::load(&model)?;
    let gate = Arc::new(SerializedExtractionGate::new(extractor, harness_config.mode()));

    // 2. 入力画像の準備
    let source: Box<dyn ImageSource> = match &run_config.images {
        Some(dir) => {
            let source = DirectoryImageSource::new(dir)
                .with_context(|| format!("Failed to open image directory: {}", dir.display()))?;
            let requested = run_config.workload.distinct_images;
            if source.files().len() < requested {
                log::warn!(
                    "{} holds only {} images but {requested} distinct images were requested; files will repeat in the pool",
                    dir.display(),
                    source.files().len()
                );
            }
            Box::new(source)
        }
        None => {
            let (width, height) = synthetic_size(&model)?;
            Box::new(SyntheticImageSource::new(width, height))
        }
    };
    let workload = WorkloadGenerator::new(run_config.workload.clone())
        .generate(source.as_ref(), harness_config.threads())?;

    if !options.quiet {
        println!("🔬 抽出ゲート ストレステスト");
        println!("   - モデル: {} ({})", model.name, gate.backend_name());
        println!("   - 画像: {}", source.describe());
        println!("⚙️  設定:");
        println!("   - スレッド数: {}", harness_config.threads());
        println!("   - 反復回数: {}", harness_config.iterations());
        println!("   - レイヤー: {}", harness_config.layer());
        println!("   - モード: {}", harness_config.mode());
        println!("   - エイリアス: {:?}", workload.aliased_pairs());
    }

    // 3. 実行
    let reporter = if options.quiet {
        ConsoleProgressReporter::quiet()
    } else {
        ConsoleProgressReporter::new().with_interval(harness_config.progress_interval())
    };
    let mut harness = ConcurrentTestHarness::new(Arc::clone(&gate), harness_config, reporter);
    let summary = harness.run(&workload)?;

    if let Some(path) = &options.report {
        write_report(path, &summary)?;
    }

    if !options.quiet {
        print_summary(&summary);
    }

    Ok(summary.exit_code())
}

/// 合成画像はモデル入力の2倍の大きさ（必ず縮小処理を通る）
fn synthetic_size(model: &ModelSpec) -> Result<(u32, u32)> {
    model
        .input_width
        .checked_mul(2)
        .zip(model.input_height.checked_mul(2))
        .with_context(|| {
            format!(
                "Synthetic image size overflows for input {}x{}",
                model.input_width, model.input_height
            )
        })
}

fn print_summary(summary: &RunSummary) {
    println!("📊 結果:");
    println!("   - 総呼び出し数: {}", summary.total_calls);
    println!("   - 成功: {}", summary.successful_calls);
    println!("   - 失敗: {}", summary.failed_calls);
    println!("   - 処理時間: {:.2}秒", summary.elapsed_ms as f64 / 1000.0);
    println!("   - スループット: {:.1} calls/s", summary.throughput_per_sec);
    println!("   - 最大同時実行数: {}", summary.gate.peak_concurrency);
    println!("   - モード切替回数: {}", summary.gate.mode_switches);

    for worker in &summary.workers {
        println!(
            "   - worker-{}: {} ({}/{}), fingerprint {}",
            worker.worker_id,
            worker.image_label,
            worker.completed_iterations,
            summary.iterations,
            worker
                .fingerprint
                .as_deref()
                .map(|fp| &fp[..fp.len().min(16)])
                .unwrap_or("-")
        );
    }

    if !summary.aliasing_mismatches.is_empty() {
        println!(
            "⚠️  同じ画像で結果が一致しないワーカー: {:?}",
            summary.aliasing_mismatches
        );
    }
}
