// 抽出ゲート・ハーネス専用のカスタムエラー型定義

use thiserror::Error;

/// 抽出ゲートとストレステストハーネス固有のエラー型
#[derive(Error, Debug)]
pub enum GateError {
    #[error("リソース初期化エラー: {resource} - {source}")]
    ResourceUnavailable {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("特徴抽出エラー: {image} (レイヤー: {layer}) - {source}")]
    Extraction {
        image: String,
        layer: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("排他制御違反: {observed}個の抽出が同時に実行されました")]
    ConcurrencyInvariantViolation { observed: usize },

    #[error("決定性違反: ワーカー{worker_id} の{iteration}回目の結果が基準と異なります (距離: {distance})")]
    DeterminismViolation {
        worker_id: usize,
        iteration: usize,
        distance: f64,
    },

    #[error("ワーカーパニック: ワーカー{worker_id} - {message}")]
    WorkerPanicked { worker_id: usize, message: String },

    #[error("スレッド起動エラー: ワーカー{worker_id} - {source}")]
    Spawn {
        worker_id: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("不正な状態遷移: {from} -> {to}")]
    InvalidState { from: String, to: String },

    #[error("設定エラー: {message}")]
    Configuration { message: String },

    #[error("バリデーションエラー: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("出力エラー: {path} - {source}")]
    Output {
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

impl GateError {
    /// リソース初期化エラーの作成
    pub fn resource_unavailable(resource: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ResourceUnavailable {
            resource: resource.into(),
            source,
        }
    }

    /// 特徴抽出エラーの作成
    pub fn extraction(
        image: impl Into<String>,
        layer: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Extraction {
            image: image.into(),
            layer: layer.into(),
            source,
        }
    }

    /// 決定性違反エラーの作成
    pub fn determinism(worker_id: usize, iteration: usize, distance: f64) -> Self {
        Self::DeterminismViolation {
            worker_id,
            iteration,
            distance,
        }
    }

    /// ワーカーパニックエラーの作成
    pub fn worker_panicked(worker_id: usize, message: impl Into<String>) -> Self {
        Self::WorkerPanicked {
            worker_id,
            message: message.into(),
        }
    }

    /// スレッド起動エラーの作成
    pub fn spawn(worker_id: usize, source: std::io::Error) -> Self {
        Self::Spawn { worker_id, source }
    }

    /// 不正な状態遷移エラーの作成
    pub fn invalid_state(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidState {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// 設定エラーの作成
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// バリデーションエラーの作成
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 出力エラーの作成
    pub fn output(path: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ConcurrencyInvariantViolation { .. } => ErrorSeverity::Critical,
            Self::ResourceUnavailable { .. } | Self::Spawn { .. } => ErrorSeverity::Critical,
            Self::DeterminismViolation { .. } | Self::WorkerPanicked { .. } => ErrorSeverity::High,
            Self::InvalidState { .. } | Self::Configuration { .. } | Self::Validation { .. } => {
                ErrorSeverity::High
            }
            Self::Extraction { .. } | Self::Output { .. } => ErrorSeverity::Medium,
        }
    }

    /// エラーが回復可能かどうかを判定
    ///
    /// 回復可能なのは単発の呼び出し単位で完結するエラーのみ。
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Extraction { .. } => true,
            Self::DeterminismViolation { .. } => true,
            Self::Output { .. } => true,
            Self::ResourceUnavailable { .. } => false,
            Self::ConcurrencyInvariantViolation { .. } => false,
            Self::WorkerPanicked { .. } => false,
            Self::Spawn { .. } => false,
            Self::InvalidState { .. } => false,
            Self::Configuration { .. } | Self::Validation { .. } => false,
        }
    }
}

/// エラーの重要度レベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// 中重要度 - 警告レベル
    Medium,
    /// 高重要度 - 要対応
    High,
    /// 致命的 - 実行停止レベル
    Critical,
}

impl ErrorSeverity {
    /// 重要度の文字列表現を取得
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// ログ出力時のレベル
    pub const fn log_level(&self) -> log::Level {
        match self {
            Self::Medium => log::Level::Warn,
            Self::High | Self::Critical => log::Level::Error,
        }
    }
}

/// ゲート・ハーネスの結果型
pub type GateResult<T> = std::result::Result<T, GateError>;

/// 検証結果 - バリデーション専用の結果型
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// バリデーション専用エラー型
#[derive(Error, Debug, Clone, PartialEq)]
#[error("バリデーションエラー: {field} - {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    /// 新しいバリデーションエラーを作成
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for GateError {
    fn from(error: ValidationError) -> Self {
        GateError::Validation {
            field: error.field,
            reason: error.reason,
        }
    }
}
