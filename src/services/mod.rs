// サービス層 - 機能別の補助ロジック
// 設定と進捗監視はハーネス本体から疎結合で差し替え可能

pub mod config;
pub mod monitoring;

// 公開API - 各サービスの主要機能を明示的にエクスポート
pub use config::{DefaultHarnessConfig, RunConfig};
pub use monitoring::{ConsoleProgressReporter, NoOpProgressReporter};
