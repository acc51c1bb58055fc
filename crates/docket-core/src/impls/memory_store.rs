//! In-memory TaskStore.
//!
//! Single-process only: the records live behind one `tokio::sync::Mutex`,
//! which also makes `conditional_update` trivially atomic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    CategoryFilter, QueueCounts, TaskDraft, TaskId, TaskRecord, TaskState, TaskType, TaskUpdate,
};
use crate::ports::{IdGenerator, StoreResult, SystemClock, TaskStore, UlidGenerator};
use crate::queue::Selection;

pub struct InMemoryTaskStore {
    records: Mutex<HashMap<TaskId, TaskRecord>>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(UlidGenerator::new(SystemClock)))
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ids,
        }
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, draft: TaskDraft) -> StoreResult<TaskRecord> {
        let record = draft.into_record(self.ids.task_id());
        self.records.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: TaskId) -> StoreResult<Option<TaskRecord>> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn find_first(&self, selection: &Selection) -> StoreResult<Option<TaskRecord>> {
        let records = self.records.lock().await;
        let state_of = |id: TaskId| records.get(&id).map(|r| r.state);
        let best = records
            .values()
            .filter(|record| selection.matches(record, &state_of))
            .min_by(|a, b| selection.compare(a, b))
            .cloned();
        Ok(best)
    }

    async fn conditional_update(
        &self,
        id: TaskId,
        expected: TaskState,
        update: TaskUpdate,
    ) -> StoreResult<Option<TaskRecord>> {
        let mut records = self.records.lock().await;
        match records.get_mut(&id) {
            Some(record) if record.state == expected => {
                record.apply(update);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn exists_created(
        &self,
        task_type: &TaskType,
        category: &CategoryFilter,
    ) -> StoreResult<bool> {
        let records = self.records.lock().await;
        Ok(records.values().any(|r| {
            r.state == TaskState::Created
                && &r.task_type == task_type
                && category.matches(r.category.as_deref())
        }))
    }

    async fn counts(&self, task_type: Option<&TaskType>) -> StoreResult<QueueCounts> {
        let records = self.records.lock().await;
        let mut counts = QueueCounts::default();
        records
            .values()
            .filter(|r| task_type.is_none_or(|t| &r.task_type == t))
            .for_each(|r| counts.add(r.state, 1));
        Ok(counts)
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| !(r.state.is_terminal() && r.created_at < older_than));
        Ok((before - records.len()) as u64)
    }
}
