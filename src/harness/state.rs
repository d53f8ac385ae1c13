use serde::{Deserialize, Serialize};
use std::fmt;

/// ハーネスのライフサイクル
///
/// `Idle → Spawning → Running → Joining → Done | Failed`
///
/// スレッド起動に失敗した場合は `Spawning → Joining` で起動済みのワーカーを回収し、
/// 入力が不正な場合は `Idle → Failed` となる。`Joining` 以降に `Running` へ戻ることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessState {
    Idle,
    Spawning,
    Running,
    Joining,
    Done,
    Failed,
}

impl HarnessState {
    pub fn can_transition_to(&self, next: HarnessState) -> bool {
        use HarnessState::*;

        matches!(
            (self, next),
            (Idle, Spawning)
                | (Idle, Failed)
                | (Spawning, Running)
                | (Spawning, Joining)
                | (Running, Joining)
                | (Joining, Done)
                | (Joining, Failed)
        )
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Spawning => "Spawning",
            Self::Running => "Running",
            Self::Joining => "Joining",
            Self::Done => "Done",
            Self::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}
