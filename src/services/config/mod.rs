// 設定管理機能
// ハーネス設定、プリセット、実行設定ファイル

pub mod implementations;

// 公開API
pub use implementations::{DefaultHarnessConfig, RunConfig};
