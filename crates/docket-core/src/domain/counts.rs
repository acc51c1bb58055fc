//! QueueCounts - 状態ごとの件数

use serde::Serialize;

use super::state::TaskState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub created: u64,
    pub running: u64,
    pub finished: u64,
    pub failed: u64,
}

impl QueueCounts {
    pub fn add(&mut self, state: TaskState, n: u64) {
        match state {
            TaskState::Created => self.created += n,
            TaskState::Running => self.running += n,
            TaskState::Finished => self.finished += n,
            TaskState::Failed => self.failed += n,
        }
    }

    pub fn get(&self, state: TaskState) -> u64 {
        match state {
            TaskState::Created => self.created,
            TaskState::Running => self.running,
            TaskState::Finished => self.finished,
            TaskState::Failed => self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.created + self.running + self.finished + self.failed
    }

    /// CREATED も RUNNING も残っていない
    pub fn is_drained(&self) -> bool {
        self.created == 0 && self.running == 0
    }
}
