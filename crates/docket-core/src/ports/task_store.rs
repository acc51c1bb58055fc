//! TaskStore port - タスクレコードの正本（source of truth）
//!
//! 全プロセスで共有される唯一の可変リソース。core が要求するのは以下だけ:
//! - insert（採番込み）
//! - `Selection` による「先頭 1 件」の検索
//! - 単一レコードに対する conditional update（compare-and-set）
//!
//! 複数レコードにまたがるトランザクションは要求しない。
//!
//! # 実装
//! - `impls::memory_store::InMemoryTaskStore`（テスト・単一プロセス用）
//! - `impls::sqlite_store::SqliteTaskStore`（複数プロセスで共有）

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    CategoryFilter, QueueCounts, TaskDraft, TaskId, TaskRecord, TaskState, TaskType, TaskUpdate,
};
use crate::queue::Selection;

/// StoreError は store 操作のエラー
///
/// core はこれを分類もリトライもしない。呼び出し元にそのまま伝播する。
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store backend error: {0}")]
    Backend(Arc<dyn StdError + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl StdError + Send + Sync + 'static) -> Self {
        StoreError::Backend(Arc::new(err))
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        StoreError::Corrupt(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// TaskStore はタスクレコードの永続化
///
/// # 設計原則
/// - `conditional_update` は 1 レコードに対してアトミック
/// - `find_first` は読み取りだけ。claim は呼び出し側が CAS で行う
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 新しい CREATED レコードを書き込み、採番済みのレコードを返す
    async fn insert(&self, draft: TaskDraft) -> StoreResult<TaskRecord>;

    async fn get(&self, id: TaskId) -> StoreResult<Option<TaskRecord>>;

    /// `selection` に一致する中で最上位の 1 件（claim はしない）
    async fn find_first(&self, selection: &Selection) -> StoreResult<Option<TaskRecord>>;

    /// 保存されている state が `expected` のときだけ `update` を適用する
    ///
    /// 条件が成立しなければ `Ok(None)`（他の worker が先に書き換えた）。
    async fn conditional_update(
        &self,
        id: TaskId,
        expected: TaskState,
        update: TaskUpdate,
    ) -> StoreResult<Option<TaskRecord>>;

    /// CREATED のタスクが 1 件でもあるか（依存・due は見ない）
    async fn exists_created(
        &self,
        task_type: &TaskType,
        category: &CategoryFilter,
    ) -> StoreResult<bool>;

    /// `task_type` が `None` なら全タスク
    async fn counts(&self, task_type: Option<&TaskType>) -> StoreResult<QueueCounts>;

    /// `older_than` より前に作られた FINISHED / FAILED を削除し、件数を返す
    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
impl<S: TaskStore + ?Sized> TaskStore for Arc<S> {
    async fn insert(&self, draft: TaskDraft) -> StoreResult<TaskRecord> {
        (**self).insert(draft).await
    }

    async fn get(&self, id: TaskId) -> StoreResult<Option<TaskRecord>> {
        (**self).get(id).await
    }

    async fn find_first(&self, selection: &Selection) -> StoreResult<Option<TaskRecord>> {
        (**self).find_first(selection).await
    }

    async fn conditional_update(
        &self,
        id: TaskId,
        expected: TaskState,
        update: TaskUpdate,
    ) -> StoreResult<Option<TaskRecord>> {
        (**self).conditional_update(id, expected, update).await
    }

    async fn exists_created(
        &self,
        task_type: &TaskType,
        category: &CategoryFilter,
    ) -> StoreResult<bool> {
        (**self).exists_created(task_type, category).await
    }

    async fn counts(&self, task_type: Option<&TaskType>) -> StoreResult<QueueCounts> {
        (**self).counts(task_type).await
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        (**self).purge_terminal(older_than).await
    }
}
