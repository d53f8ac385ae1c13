// 進捗監視機能
// ワーカーの進捗、エラー、実行完了のサマリーを報告

pub mod implementations;

pub use implementations::{ConsoleProgressReporter, NoOpProgressReporter};
