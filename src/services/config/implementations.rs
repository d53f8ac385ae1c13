// 設定管理の具象実装

use crate::core::{
    ExecutionMode, GateError, GateResult, HarnessConfig, ValidationError, ValidationResult,
};
use crate::workload::WorkloadConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// デフォルト設定実装
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultHarnessConfig {
    threads: usize,
    iterations: usize,
    layer: String,
    mode: ExecutionMode,
    continue_on_error: bool,
    tolerance: f64,
    progress_interval: usize,
}

impl DefaultHarnessConfig {
    pub fn new(threads: usize, iterations: usize) -> Self {
        Self {
            threads,
            iterations,
            ..Self::default()
        }
    }

    /// 名前付きプリセットから設定を作成
    pub fn preset(name: &str) -> GateResult<Self> {
        match name {
            "default" => Ok(Self::default()),
            "quick" => Ok(Self::new(2, 100).with_progress_interval(50)),
            "saturate" => Ok(Self::new(num_cpus::get().max(1) * 2, 10_000)),
            other => Err(GateError::configuration(format!(
                "不明なプリセットです: {other} (default, quick, saturate)"
            ))),
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = layer.into();
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_continue_on_error(mut self, enable: bool) -> Self {
        self.continue_on_error = enable;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// 設定値の検証
    pub fn validate(&self) -> ValidationResult<()> {
        if self.threads == 0 {
            return Err(ValidationError::new("threads", "値は1以上である必要があります"));
        }
        if self.iterations == 0 {
            return Err(ValidationError::new("iterations", "値は1以上である必要があります"));
        }
        if self.layer.trim().is_empty() {
            return Err(ValidationError::new("layer", "レイヤー名が空です"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ValidationError::new("tolerance", "値は0以上の有限値である必要があります"));
        }
        Ok(())
    }
}

impl Default for DefaultHarnessConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 10_000,
            layer: "fc7".to_string(),
            mode: ExecutionMode::Gpu,
            continue_on_error: false,
            tolerance: 0.0,
            progress_interval: 1_000,
        }
    }
}

impl HarnessConfig for DefaultHarnessConfig {
    fn threads(&self) -> usize {
        self.threads
    }

    fn iterations(&self) -> usize {
        self.iterations
    }

    fn layer(&self) -> String {
        self.layer.clone()
    }

    fn mode(&self) -> ExecutionMode {
        self.mode
    }

    fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }

    fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn progress_interval(&self) -> usize {
        self.progress_interval
    }
}

/// 実行設定ファイル（JSON）の内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub harness: DefaultHarnessConfig,
    pub workload: WorkloadConfig,
    /// モデル記述ファイル（未指定なら組み込みのリファレンスモデル）
    pub model: Option<PathBuf>,
    /// 画像ディレクトリ（未指定なら合成画像）
    pub images: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))
            .map_err(|e| GateError::configuration(format!("{e:#}")))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
            .map_err(|e| GateError::configuration(format!("{e:#}")))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ValidationResult<()> {
        self.harness.validate()?;
        self.workload.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_harness_config() {
        let config = DefaultHarnessConfig::default();

        assert_eq!(config.threads(), 4);
        assert_eq!(config.iterations(), 10_000);
        assert_eq!(config.layer(), "fc7");
        assert_eq!(config.mode(), ExecutionMode::Gpu);
        assert!(!config.continue_on_error());
        assert_eq!(config.tolerance(), 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_harness_config_builder() {
        let config = DefaultHarnessConfig::new(1, 1)
            .with_layer("pool5")
            .with_mode(ExecutionMode::Cpu)
            .with_continue_on_error(true)
            .with_tolerance(1e-6)
            .with_progress_interval(10);

        assert_eq!(config.threads(), 1);
        assert_eq!(config.iterations(), 1);
        assert_eq!(config.layer(), "pool5");
        assert_eq!(config.mode(), ExecutionMode::Cpu);
        assert!(config.continue_on_error());
        assert_eq!(config.progress_interval(), 10);
    }

    #[test]
    fn test_presets() {
        assert_eq!(DefaultHarnessConfig::preset("default").unwrap(), DefaultHarnessConfig::default());
        assert_eq!(DefaultHarnessConfig::preset("quick").unwrap().iterations(), 100);
        assert!(DefaultHarnessConfig::preset("saturate").unwrap().threads() >= 2);
        assert!(matches!(
            DefaultHarnessConfig::preset("turbo"),
            Err(GateError::Configuration { .. })
        ));
    }

    #[test]
    fn test_validation_failures() {
        assert_eq!(
            DefaultHarnessConfig::default().with_threads(0).validate().unwrap_err().field,
            "threads"
        );
        assert_eq!(
            DefaultHarnessConfig::default().with_iterations(0).validate().unwrap_err().field,
            "iterations"
        );
        assert_eq!(
            DefaultHarnessConfig::default().with_layer(" ").validate().unwrap_err().field,
            "layer"
        );
        assert_eq!(
            DefaultHarnessConfig::default().with_tolerance(-1.0).validate().unwrap_err().field,
            "tolerance"
        );
    }

    #[test]
    fn test_run_config_from_json_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{
                "harness": { "threads": 8, "mode": "cpu" },
                "workload": { "alias_first_half": false },
                "model": "vgg.json"
            }"#,
        )
        .unwrap();

        let config = RunConfig::from_json_file(&path).unwrap();
        assert_eq!(config.harness.threads(), 8);
        assert_eq!(config.harness.iterations(), 10_000);
        assert_eq!(config.harness.mode(), ExecutionMode::Cpu);
        assert!(!config.workload.alias_first_half);
        assert_eq!(config.workload.distinct_images, 10);
        assert_eq!(config.model, Some(PathBuf::from("vgg.json")));
        assert_eq!(config.images, None);
    }

    #[test]
    fn test_run_config_errors() {
        let temp_dir = tempdir().unwrap();

        let missing = RunConfig::from_json_file(&temp_dir.path().join("missing.json"));
        assert!(matches!(missing, Err(GateError::Configuration { .. })));

        let invalid_path = temp_dir.path().join("invalid.json");
        std::fs::write(&invalid_path, r#"{ "harness": { "threads": 0 } }"#).unwrap();
        let invalid = RunConfig::from_json_file(&invalid_path);
        assert!(matches!(invalid, Err(GateError::Validation { .. })));
    }
}
