//! State - タスクの状態
//!
//! # 状態遷移
//! ```text
//! CREATED ──claim──▶ RUNNING ──finish──▶ FINISHED
//!                        └─────fail────▶ FAILED
//! ```
//! FINISHED / FAILED は終端。RUNNING から CREATED に戻る遷移はない。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// TaskState はタスクの状態を表現
///
/// store には `as_str()` の大文字表記で保存される。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// 投入済み、未 claim
    Created,
    /// ある worker が claim して実行中
    Running,
    /// 正常終了
    Finished,
    /// handler がエラーを返した
    Failed,
}

impl TaskState {
    pub const ALL: [TaskState; 4] = [
        TaskState::Created,
        TaskState::Running,
        TaskState::Finished,
        TaskState::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }

    /// 遷移の合法性はここだけで判定する
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Created, TaskState::Running)
                | (TaskState::Running, TaskState::Finished)
                | (TaskState::Running, TaskState::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Created => "CREATED",
            TaskState::Running => "RUNNING",
            TaskState::Finished => "FINISHED",
            TaskState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for TaskState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStateError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskState::Created, TaskState::Running, true)]
    #[case(TaskState::Running, TaskState::Finished, true)]
    #[case(TaskState::Running, TaskState::Failed, true)]
    #[case(TaskState::Created, TaskState::Finished, false)]
    #[case(TaskState::Created, TaskState::Failed, false)]
    #[case(TaskState::Running, TaskState::Created, false)]
    #[case(TaskState::Finished, TaskState::Running, false)]
    #[case(TaskState::Failed, TaskState::Created, false)]
    #[case(TaskState::Finished, TaskState::Failed, false)]
    fn transitions(#[case] from: TaskState, #[case] to: TaskState, #[case] legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn terminal_states_have_no_way_out() {
        for state in TaskState::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(TaskState::ALL.iter().all(|next| !state.can_transition_to(*next)));
        }
    }

    #[test]
    fn string_form_round_trips_through_serde_and_from_str() {
        for state in TaskState::ALL {
            let json = serde_json::to_value(state).unwrap();
            assert_eq!(json, serde_json::Value::String(state.as_str().to_string()));
            assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
        }
        assert_eq!("running".parse::<TaskState>().unwrap(), TaskState::Running);
        assert!("queued".parse::<TaskState>().is_err());
    }
}
