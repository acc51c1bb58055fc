//! Task record - store に保存されるタスクの正本
//!
//! - `TaskDraft`: insert 前の形（id なし、state は常に CREATED で保存される）
//! - `TaskRecord`: store から読んだ形
//! - `TaskUpdate`: conditional update で書き込む差分

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dependency::DependencyRefs;
use super::ids::TaskId;
use super::priority::Priority;
use super::schedule::Schedule;
use super::state::TaskState;
use super::task_type::TaskType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub task_type: TaskType,
    pub state: TaskState,
    pub priority: Priority,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// scheduled タスクのみ `Some`
    pub schedule: Option<Schedule>,
    /// 依存フィールド名 → 参照
    pub dependencies: BTreeMap<String, DependencyRefs>,
    /// タスク型固有のフィールド（JSON object）
    pub payload: Value,
    pub last_error: Option<String>,
}

impl TaskRecord {
    /// 選択時の due 判定・ソートに使う時刻。schedule がなければ created_at
    pub fn run_at(&self) -> DateTime<Utc> {
        self.schedule
            .map(|s| s.run_at)
            .unwrap_or(self.created_at)
    }

    /// interval 付き scheduled タスクの次回分
    ///
    /// payload・priority・category・依存・interval を引き継ぎ、
    /// `run_at` だけ interval 分進める。`created_at` は `now`（claim 時刻）。
    pub fn successor(&self, now: DateTime<Utc>) -> Option<TaskDraft> {
        let schedule = self.schedule?.next_occurrence()?;
        Some(TaskDraft {
            task_type: self.task_type.clone(),
            priority: self.priority,
            category: self.category.clone(),
            created_at: now,
            schedule: Some(schedule),
            dependencies: self.dependencies.clone(),
            payload: self.payload.clone(),
        })
    }

    /// conditional update の差分を適用（条件判定は呼び出し側の責任）
    pub fn apply(&mut self, update: TaskUpdate) {
        self.state = update.state;
        self.updated_at = update.updated_at;
        if let Some(payload) = update.payload {
            self.payload = payload;
        }
        if let Some(error) = update.last_error {
            self.last_error = Some(error);
        }
    }
}

/// insert 前のタスク
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub task_type: TaskType,
    pub priority: Priority,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub schedule: Option<Schedule>,
    pub dependencies: BTreeMap<String, DependencyRefs>,
    pub payload: Value,
}

impl TaskDraft {
    pub fn new(task_type: TaskType, payload: Value, created_at: DateTime<Utc>) -> Self {
        Self {
            task_type,
            priority: Priority::default(),
            category: None,
            created_at,
            schedule: None,
            dependencies: BTreeMap::new(),
            payload,
        }
    }

    /// store が採番した id で CREATED のレコードにする
    pub fn into_record(self, id: TaskId) -> TaskRecord {
        TaskRecord {
            id,
            task_type: self.task_type,
            state: TaskState::Created,
            priority: self.priority,
            category: self.category,
            created_at: self.created_at,
            updated_at: self.created_at,
            schedule: self.schedule,
            dependencies: self.dependencies,
            payload: self.payload,
            last_error: None,
        }
    }
}

/// conditional update で書き込む内容
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub state: TaskState,
    pub updated_at: DateTime<Utc>,
    /// `Some` のときだけ payload を置き換える
    pub payload: Option<Value>,
    pub last_error: Option<String>,
}

impl TaskUpdate {
    /// CREATED → RUNNING
    pub fn claim(now: DateTime<Utc>) -> Self {
        Self {
            state: TaskState::Running,
            updated_at: now,
            payload: None,
            last_error: None,
        }
    }

    pub fn finish(now: DateTime<Utc>, payload: Value) -> Self {
        Self {
            state: TaskState::Finished,
            updated_at: now,
            payload: Some(payload),
            last_error: None,
        }
    }

    pub fn fail(now: DateTime<Utc>, payload: Value, error: impl Into<String>) -> Self {
        Self {
            state: TaskState::Failed,
            updated_at: now,
            payload: Some(payload),
            last_error: Some(error.into()),
        }
    }

    /// RUNNING のまま payload だけ書き込む
    pub fn save(now: DateTime<Utc>, payload: Value) -> Self {
        Self {
            state: TaskState::Running,
            updated_at: now,
            payload: Some(payload),
            last_error: None,
        }
    }
}
