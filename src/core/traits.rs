// 抽出ゲート・ハーネスのトレイト定義
// 全ての抽象化インターフェースを定義

use super::types::{ExecutionMode, RunSummary, SharedImage};
use anyhow::Result;
use image::DynamicImage;
use mockall::automock;

/// 特徴抽出リソースの抽象化トレイト
///
/// 実装は内部状態（実行モード、デバイスバッファ）を持ち、同時呼び出しに対して
/// 安全ではない。変更を伴う操作はすべて `&mut self` を要求する。
#[automock]
pub trait FeatureExtractor: Send {
    /// 実行モードを設定
    fn set_execution_mode(&mut self, mode: ExecutionMode) -> Result<()>;

    /// 現在の実行モード（未設定なら `None`）
    fn execution_mode(&self) -> Option<ExecutionMode>;

    /// 画像から指定レイヤーの出力を抽出
    fn extract(&mut self, image: &DynamicImage, layer: &str) -> Result<Vec<f32>>;

    /// 抽出可能なレイヤー名の一覧
    fn layer_names(&self) -> Vec<String>;

    /// バックエンド名
    fn backend_name(&self) -> &'static str;
}

/// 入力画像の供給元の抽象化トレイト
#[automock]
pub trait ImageSource: Send + Sync {
    /// インデックスに対応する画像を読み込む
    fn load(&self, index: usize) -> Result<SharedImage>;

    /// 供給元の説明
    fn describe(&self) -> String;
}

/// 進捗報告の抽象化トレイト
#[automock]
pub trait ProgressReporter: Send + Sync {
    /// 実行開始時の報告
    fn report_started(&self, threads: usize, iterations: usize);

    /// ワーカーの進捗報告
    fn report_progress(&self, worker_id: usize, completed: usize, total: usize);

    /// エラー発生時の報告
    fn report_error(&self, worker_id: usize, error: &str);

    /// 実行完了時の報告
    fn report_completed(&self, summary: &RunSummary);
}

/// ストレステスト設定の抽象化トレイト
#[automock]
pub trait HarnessConfig: Send + Sync {
    /// ワーカースレッド数
    fn threads(&self) -> usize;

    /// ワーカーごとの抽出回数
    fn iterations(&self) -> usize;

    /// 出力を取り出すレイヤー名
    fn layer(&self) -> String;

    /// 実行モード
    fn mode(&self) -> ExecutionMode;

    /// エラー発生後もワーカーのループを継続するか
    fn continue_on_error(&self) -> bool;

    /// 決定性チェックの許容誤差（0ならビット一致を要求）
    fn tolerance(&self) -> f64;

    /// 進捗報告の間隔（回数）
    fn progress_interval(&self) -> usize;
}

impl HarnessConfig for Box<dyn HarnessConfig> {
    fn threads(&self) -> usize {
        self.as_ref().threads()
    }

    fn iterations(&self) -> usize {
        self.as_ref().iterations()
    }

    fn layer(&self) -> String {
        self.as_ref().layer()
    }

    fn mode(&self) -> ExecutionMode {
        self.as_ref().mode()
    }

    fn continue_on_error(&self) -> bool {
        self.as_ref().continue_on_error()
    }

    fn tolerance(&self) -> f64 {
        self.as_ref().tolerance()
    }

    fn progress_interval(&self) -> usize {
        self.as_ref().progress_interval()
    }
}

impl ProgressReporter for Box<dyn ProgressReporter> {
    fn report_started(&self, threads: usize, iterations: usize) {
        self.as_ref().report_started(threads, iterations)
    }

    fn report_progress(&self, worker_id: usize, completed: usize, total: usize) {
        self.as_ref().report_progress(worker_id, completed, total)
    }

    fn report_error(&self, worker_id: usize, error: &str) {
        self.as_ref().report_error(worker_id, error)
    }

    fn report_completed(&self, summary: &RunSummary) {
        self.as_ref().report_completed(summary)
    }
}
