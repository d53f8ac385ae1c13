// 抽出処理に関連するデータ型定義

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// 抽出リソースの実行モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// アクセラレータ（GPU）モード
    Gpu,
    /// フォールバック（CPU）モード
    Cpu,
}

impl ExecutionMode {
    /// 何件ごとにログを出すかのデフォルト値
    pub const fn default_log_every_nth(&self) -> usize {
        match self {
            Self::Gpu => 100,
            Self::Cpu => 10,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "GPU"),
            Self::Cpu => write!(f, "CPU"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(Self::Gpu),
            "cpu" => Ok(Self::Cpu),
            other => anyhow::bail!("Unknown execution mode: {other}"),
        }
    }
}

/// スレッド間で読み取り専用に共有される画像
///
/// `clone` はピクセルデータをコピーせず `Arc` を共有する。
#[derive(Debug, Clone)]
pub struct SharedImage {
    label: String,
    source_index: usize,
    image: Arc<DynamicImage>,
}

impl SharedImage {
    pub fn new(label: impl Into<String>, source_index: usize, image: DynamicImage) -> Self {
        Self {
            label: label.into(),
            source_index,
            image: Arc::new(image),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// 画像プール内での元のインデックス
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// 同一のピクセルバッファを共有しているかどうか
    pub fn shares_pixels_with(&self, other: &SharedImage) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

/// 抽出された特徴ベクトル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    layer: String,
    values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(layer: impl Into<String>, values: Vec<f32>) -> Self {
        Self {
            layer: layer.into(),
            values,
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// リトルエンディアンのバイト列を16進文字列化したもの
    pub fn fingerprint(&self) -> String {
        let bytes: Vec<u8> = self
            .values
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect();
        hex::encode(bytes)
    }

    /// ビット単位で完全に一致するかどうか
    pub fn is_bit_identical(&self, other: &FeatureVector) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// ゲートの統計情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateStats {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub mode_switches: u64,
    /// 同時にクリティカルセクション内にいた抽出の最大数（常に1以下であるべき）
    pub peak_concurrency: usize,
    pub time_in_gate_ms: u64,
}

/// ワーカーの最終ステータス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerStatus {
    Completed,
    Failed { error: String },
    Panicked { message: String },
}

impl WorkerStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// ワーカー単位の実行結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub image_label: String,
    pub source_index: usize,
    pub completed_iterations: usize,
    pub failed_iterations: usize,
    pub status: WorkerStatus,
    /// 最初に得られた特徴ベクトルのフィンガープリント
    pub fingerprint: Option<String>,
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub reference: Option<FeatureVector>,
}

/// ストレステスト全体のサマリー
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub threads: usize,
    pub iterations: usize,
    pub layer: String,
    pub mode: ExecutionMode,
    pub total_calls: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub elapsed_ms: u64,
    pub throughput_per_sec: f64,
    pub aliasing_mismatches: Vec<usize>,
    pub gate: GateStats,
    pub workers: Vec<WorkerReport>,
}

impl RunSummary {
    /// 全ワーカーがエラーなく完了し、エイリアス整合性も保たれているか
    pub fn is_success(&self) -> bool {
        self.workers.iter().all(|worker| worker.status.is_success())
            && self.aliasing_mismatches.is_empty()
    }

    pub fn failed_workers(&self) -> Vec<usize> {
        self.workers
            .iter()
            .filter(|worker| !worker.status.is_success())
            .map(|worker| worker.worker_id)
            .collect()
    }

    /// プロセス終了コード
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}
