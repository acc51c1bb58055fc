//! Docket - store と clock を束ねたハンドル
//!
//! push 側（producer）も worker 側もここから始める。
//!
//! # 使用例
//! ```ignore
//! let docket = Docket::connect("sqlite://docket.db").await?;
//! docket.queue::<Shout>().push(&Shout { s: "hi".into() }).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use super::queue::Queue;
use crate::domain::{Priority, QueueCounts, Schedule, TaskDraft, TaskId, TaskRecord, TaskType};
use crate::error::{DocketError, DocketResult};
use crate::impls::open_store;
use crate::ports::{Clock, SystemClock, TaskStore};
use crate::queue::RetentionPolicy;
use crate::typed::{CodecError, PayloadCodec, Task, TaskDescriptor};

/// push 時のオプション
///
/// `run_at` / `every` は scheduled タスク型でのみ使える。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushOptions {
    pub priority: Priority,
    pub category: Option<String>,
    /// scheduled タスクの初回実行時刻（省略時は push した時刻）
    pub run_at: Option<DateTime<Utc>>,
    pub interval: Option<Duration>,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// 空文字列は category なしと同じ
    pub fn category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        self.category = (!category.is_empty()).then_some(category);
        self
    }

    pub fn run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = Some(run_at);
        self
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

#[derive(Clone)]
pub struct Docket {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl Docket {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// `open_store` で store を開く（SQLite ならマイグレーションも流す）
    pub async fn connect(url: &str) -> DocketResult<Self> {
        Ok(Self::new(open_store(url).await?))
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn queue<T: Task>(&self) -> Queue<T> {
        Queue::new(self.clone())
    }

    /// Rust の型を介さずに payload（JSON object）を push する
    pub async fn push_json(
        &self,
        descriptor: &TaskDescriptor,
        payload: Value,
        options: PushOptions,
    ) -> DocketResult<TaskRecord> {
        if !payload.is_object() {
            return Err(CodecError::NotAnObject {
                task_type: descriptor.task_type.to_string(),
            }
            .into());
        }
        let wants_schedule = options.run_at.is_some() || options.interval.is_some();
        if wants_schedule && !descriptor.scheduled {
            return Err(DocketError::NotScheduled(descriptor.task_type.clone()));
        }

        let now = self.clock.now();
        let mut draft = TaskDraft::new(descriptor.task_type.clone(), payload, now);
        draft.dependencies =
            PayloadCodec::extract_dependencies(&descriptor.dependencies, &draft.payload)?;
        draft.priority = options.priority;
        draft.category = options.category.filter(|c| !c.is_empty());
        if descriptor.scheduled {
            draft.schedule = Some(Schedule {
                run_at: options.run_at.unwrap_or(now),
                interval: options.interval,
            });
        }

        let record = self.store.insert(draft).await?;
        info!(
            task_id = %record.id,
            task_type = %record.task_type,
            priority = %record.priority,
            category = record.category.as_deref().unwrap_or("-"),
            "task pushed"
        );
        Ok(record)
    }

    pub async fn get(&self, id: TaskId) -> DocketResult<Option<TaskRecord>> {
        Ok(self.store.get(id).await?)
    }

    pub async fn counts(&self, task_type: Option<&TaskType>) -> DocketResult<QueueCounts> {
        Ok(self.store.counts(task_type).await?)
    }

    /// retention window を過ぎた終端レコードを削除する
    pub async fn purge(&self, policy: &RetentionPolicy) -> DocketResult<u64> {
        let cutoff = policy.cutoff(self.clock.now());
        let purged = self.store.purge_terminal(cutoff).await?;
        info!(purged, %cutoff, "terminal tasks purged");
        Ok(purged)
    }
}
