use crate::core::GateError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod reference;

pub use reference::ReferenceExtractor;

/// 前処理済み入力を表すブロブ名
pub const DATA_BLOB: &str = "data";

/// 1ブロブあたりの要素数の上限（重み行列を含む）
pub const MAX_BLOB_LEN: usize = 1 << 26;

/// レイヤーの種類
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    /// 入力をgrid x gridのブロックに分けてチャンネルごとに平均化
    AvgPool { grid: u32 },
    /// 入力値のヒストグラム（合計1に正規化）
    Histogram { bins: usize },
    /// 全結合層（重みはシードから決定的に生成）
    InnerProduct {
        input: String,
        outputs: usize,
        seed: u64,
        #[serde(default)]
        relu: bool,
    },
}

/// レイヤー定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: LayerKind,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// 抽出モデルの記述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub input_width: u32,
    pub input_height: u32,
    /// 1（グレースケール）または3（RGB）
    pub channels: usize,
    /// チャンネルごとの平均値（0-255スケール）
    pub mean: Vec<f32>,
    pub layers: Vec<LayerSpec>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            name: "reference".to_string(),
            input_width: 32,
            input_height: 32,
            channels: 3,
            mean: vec![104.0, 117.0, 123.0],
            layers: vec![
                LayerSpec::new("pool5", LayerKind::AvgPool { grid: 4 }),
                LayerSpec::new("hist", LayerKind::Histogram { bins: 16 }),
                LayerSpec::new(
                    "fc6",
                    LayerKind::InnerProduct {
                        input: "pool5".to_string(),
                        outputs: 128,
                        seed: 6,
                        relu: true,
                    },
                ),
                LayerSpec::new(
                    "fc7",
                    LayerKind::InnerProduct {
                        input: "fc6".to_string(),
                        outputs: 64,
                        seed: 7,
                        relu: true,
                    },
                ),
            ],
        }
    }
}

impl ModelSpec {
    /// JSONファイルからモデル記述を読み込む
    pub fn from_json_file(path: &Path) -> Result<Self, GateError> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file: {}", path.display()))
            .map_err(|e| GateError::resource_unavailable(path.display().to_string(), e))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse model file: {}", path.display()))
            .map_err(|e| GateError::resource_unavailable(path.display().to_string(), e))
    }

    /// 入力ブロブの要素数（オーバーフロー時は None）
    pub fn input_len(&self) -> Option<usize> {
        self.channels
            .checked_mul(self.input_width as usize)?
            .checked_mul(self.input_height as usize)
    }

    /// レイヤー出力の1チャンネルあたりの要素数
    ///
    /// 全結合層とヒストグラムは1x1の空間サイズとみなす。
    pub fn spatial_window(&self, layer: &str) -> Option<usize> {
        if layer == DATA_BLOB {
            return (self.input_width as usize).checked_mul(self.input_height as usize);
        }
        self.layers
            .iter()
            .find(|spec| spec.name == layer)
            .and_then(|spec| match spec.kind {
                LayerKind::AvgPool { grid } => (grid as usize).checked_mul(grid as usize),
                LayerKind::Histogram { .. } | LayerKind::InnerProduct { .. } => Some(1),
            })
    }
}
