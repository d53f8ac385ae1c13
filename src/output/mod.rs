// 出力機能
// 特徴ベクトルのテキスト形式、距離関数、JSONレポート出力

pub mod distance;
pub mod text;

pub use distance::DistanceFunction;
pub use text::{
    format_line, kernel_max_pool, layer_output_path, parse_line, read_feature_file,
    FeatureTextWriter,
};

use crate::core::{GateError, GateResult};
use serde::Serialize;
use std::path::Path;

/// 実行サマリーや評価結果をJSONファイルに保存
pub fn write_report<T: Serialize>(path: &Path, report: &T) -> GateResult<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| GateError::output(path.display().to_string(), e.into()))?;
    std::fs::write(path, json)
        .map_err(|e| GateError::output(path.display().to_string(), e.into()))?;

    log::info!("Report written to {}", path.display());
    Ok(())
}
