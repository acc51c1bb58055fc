//! Queue<T> - 型付きの push / claim
//!
//! handler を登録せずに、アプリケーションが自分でタスクを取り出して
//! 終端状態を書き込むための API。poll loop も内部で同じ
//! `complete_task` を使う。

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use super::docket::{Docket, PushOptions};
use super::shutdown::Shutdown;
use crate::domain::{CategoryFilter, TaskId, TaskRecord, TaskState, TaskUpdate};
use crate::error::{DocketError, DocketResult};
use crate::ports::{Clock, StoreError, TaskStore};
use crate::queue::{ClaimTarget, Claimer};
use crate::typed::{PayloadCodec, Task, TaskDescriptor};

/// Queue は 1 つの task_type に対する型付きハンドル
///
/// # 使用例
/// ```ignore
/// let queue = docket.queue::<Shout>().with_category("blue");
/// queue.push(&Shout { s: "hi".into() }).await?;
///
/// if let Some(mut claimed) = queue.try_claim().await? {
///     claimed.task_mut().s.make_ascii_uppercase();
///     claimed.finish().await?;
/// }
/// ```
pub struct Queue<T: Task> {
    docket: Docket,
    descriptor: TaskDescriptor,
    category: CategoryFilter,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            docket: self.docket.clone(),
            descriptor: self.descriptor.clone(),
            category: self.category.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Task> Queue<T> {
    pub(crate) fn new(docket: Docket) -> Self {
        Self {
            docket,
            descriptor: T::descriptor(),
            category: CategoryFilter::Untagged,
            _marker: PhantomData,
        }
    }

    /// claim 対象の category を絞る（push には影響しない）
    pub fn with_category(mut self, category: impl Into<CategoryFilter>) -> Self {
        self.category = category.into();
        self
    }

    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub async fn push(&self, task: &T) -> DocketResult<TaskRecord> {
        self.push_with(task, PushOptions::default()).await
    }

    pub async fn push_with(&self, task: &T, options: PushOptions) -> DocketResult<TaskRecord> {
        let payload = PayloadCodec::encode(task)?;
        self.docket
            .push_json(&self.descriptor, payload, options)
            .await
    }

    fn claim_target(&self) -> ClaimTarget {
        self.descriptor.claim_target(self.category.clone())
    }

    fn claimer(&self) -> Claimer {
        Claimer::new(self.docket.store().clone(), self.docket.clock().clone())
    }

    /// 条件を満たす最上位のタスクを 1 件 claim する。なければ `None`
    ///
    /// payload が `T` に decode できない場合、タスクは FAILED にしてから
    /// `CodecError` を返す。
    pub async fn try_claim(&self) -> DocketResult<Option<Claimed<T>>> {
        let Some(record) = self.claimer().claim(&self.claim_target()).await? else {
            return Ok(None);
        };

        let task = match PayloadCodec::decode::<T>(&record.payload) {
            Ok(task) => task,
            Err(e) => {
                let now = self.docket.clock().now();
                let update = TaskUpdate::fail(now, record.payload.clone(), e.to_string());
                complete_task(self.docket.store().as_ref(), record.id, update).await?;
                return Err(e.into());
            }
        };

        Ok(Some(Claimed {
            record,
            task,
            store: self.docket.store().clone(),
            clock: self.docket.clock().clone(),
        }))
    }

    /// claim できるまで `idle` 間隔で待つ。shutdown が来たら `None`
    pub async fn next(&self, idle: Duration, shutdown: &Shutdown) -> DocketResult<Option<Claimed<T>>> {
        loop {
            if shutdown.is_triggered() {
                return Ok(None);
            }
            if let Some(claimed) = self.try_claim().await? {
                return Ok(Some(claimed));
            }
            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = shutdown.triggered() => return Ok(None),
            }
        }
    }

    /// CREATED のタスクが残っていないか
    ///
    /// 依存や run_at は見ない。まだ実行できないタスクがあっても `false`。
    pub async fn is_empty(&self) -> DocketResult<bool> {
        let pending = self
            .docket
            .store()
            .exists_created(&self.descriptor.task_type, &self.category)
            .await?;
        Ok(!pending)
    }
}

/// Claimed は RUNNING に遷移済みのタスク
///
/// `finish` / `fail` で終端状態を書き込む。どちらも呼ばずに drop した
/// タスクは RUNNING のまま残る。
pub struct Claimed<T: Task> {
    record: TaskRecord,
    task: T,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl<T: Task> std::fmt::Debug for Claimed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claimed")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

impl<T: Task> Claimed<T> {
    pub fn id(&self) -> TaskId {
        self.record.id
    }

    /// claim 時点のレコード
    pub fn record(&self) -> &TaskRecord {
        &self.record
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut T {
        &mut self.task
    }

    pub fn into_task(self) -> T {
        self.task
    }

    fn payload(&self) -> DocketResult<Value> {
        Ok(PayloadCodec::encode(&self.task)?)
    }

    /// 現在の payload を保存して FINISHED にする
    pub async fn finish(self) -> DocketResult<TaskRecord> {
        let update = TaskUpdate::finish(self.clock.now(), self.payload()?);
        complete_task(self.store.as_ref(), self.record.id, update).await
    }

    /// 現在の payload とエラーメッセージを保存して FAILED にする
    pub async fn fail(self, message: impl Into<String>) -> DocketResult<TaskRecord> {
        let update = TaskUpdate::fail(self.clock.now(), self.payload()?, message.into());
        complete_task(self.store.as_ref(), self.record.id, update).await
    }

    /// RUNNING のまま payload だけ保存する（途中経過の記録）
    pub async fn save(&mut self) -> DocketResult<()> {
        let update = TaskUpdate::save(self.clock.now(), self.payload()?);
        let saved = self
            .store
            .conditional_update(self.record.id, TaskState::Running, update)
            .await?;
        match saved {
            Some(record) => {
                self.record = record;
                Ok(())
            }
            None => Err(transition_error(self.store.as_ref(), self.record.id, TaskState::Running).await),
        }
    }
}

/// RUNNING のタスクを `update.state` に遷移させる
pub(crate) async fn complete_task(
    store: &dyn TaskStore,
    id: TaskId,
    update: TaskUpdate,
) -> DocketResult<TaskRecord> {
    let to = update.state;
    if !TaskState::Running.can_transition_to(to) {
        return Err(DocketError::InvalidTransition {
            task_id: id,
            from: TaskState::Running,
            to,
        });
    }

    match store.conditional_update(id, TaskState::Running, update).await? {
        Some(record) => {
            info!(task_id = %id, task_type = %record.task_type, state = %to, "task completed");
            Ok(record)
        }
        None => Err(transition_error(store, id, to).await),
    }
}

async fn transition_error(store: &dyn TaskStore, id: TaskId, to: TaskState) -> DocketError {
    match store.get(id).await {
        Ok(Some(current)) => DocketError::InvalidTransition {
            task_id: id,
            from: current.state,
            to,
        },
        Ok(None) => StoreError::NotFound(id).into(),
        Err(e) => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::impls::InMemoryTaskStore;
    use crate::ports::FixedClock;
    use crate::typed::CodecError;
    use crate::typed::task::fixtures::{Child, Shout, Tick};
    use chrono::{TimeDelta, TimeZone, Utc};
    use serde_json::json;

    fn docket() -> (Docket, FixedClock) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let docket = Docket::with_clock(Arc::new(InMemoryTaskStore::new()), Arc::new(clock.clone()));
        (docket, clock)
    }

    #[tokio::test]
    async fn claimed_task_finishes_with_modified_payload() {
        let (docket, _clock) = docket();
        let queue = docket.queue::<Shout>();
        queue.push(&Shout { s: "hi".into() }).await.unwrap();

        let mut claimed = queue.try_claim().await.unwrap().unwrap();
        assert_eq!(claimed.record().state, TaskState::Running);
        claimed.task_mut().s = "HI".into();
        let id = claimed.id();

        let record = claimed.finish().await.unwrap();
        assert_eq!(record.state, TaskState::Finished);
        assert_eq!(record.payload, json!({"s": "HI"}));
        assert_eq!(docket.get(id).await.unwrap().unwrap().state, TaskState::Finished);
        assert!(queue.try_claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_records_the_message() {
        let (docket, _clock) = docket();
        let queue = docket.queue::<Shout>();
        queue.push(&Shout { s: "hi".into() }).await.unwrap();

        let claimed = queue.try_claim().await.unwrap().unwrap();
        let record = claimed.fail("disk full").await.unwrap();
        assert_eq!(record.state, TaskState::Failed);
        assert_eq!(record.last_error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn save_keeps_the_task_running() {
        let (docket, clock) = docket();
        let queue = docket.queue::<Shout>();
        queue.push(&Shout { s: "a".into() }).await.unwrap();

        let mut claimed = queue.try_claim().await.unwrap().unwrap();
        claimed.task_mut().s = "ab".into();
        clock.advance(TimeDelta::seconds(1));
        claimed.save().await.unwrap();

        let stored = docket.get(claimed.id()).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Running);
        assert_eq!(stored.payload, json!({"s": "ab"}));
        assert_eq!(stored.updated_at, clock.now());
    }

    #[tokio::test]
    async fn completing_twice_is_an_invalid_transition() {
        let (docket, clock) = docket();
        let queue = docket.queue::<Shout>();
        queue.push(&Shout { s: "a".into() }).await.unwrap();

        let claimed = queue.try_claim().await.unwrap().unwrap();
        let id = claimed.id();
        claimed.finish().await.unwrap();

        let err = complete_task(
            docket.store().as_ref(),
            id,
            TaskUpdate::fail(clock.now(), json!({}), "late"),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DocketError::InvalidTransition { from: TaskState::Finished, to: TaskState::Failed, .. }
        ));
    }

    #[tokio::test]
    async fn undecodable_payload_fails_the_task() {
        let (docket, _clock) = docket();
        docket
            .push_json(&Shout::descriptor(), json!({"nope": 1}), PushOptions::new())
            .await
            .unwrap();

        let err = docket.queue::<Shout>().try_claim().await.unwrap_err();
        assert!(matches!(err, DocketError::Codec(CodecError::Decode { .. })));
        let counts = docket.counts(None).await.unwrap();
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn is_empty_ignores_blocked_dependencies() {
        let (docket, _clock) = docket();
        let parent = docket.queue::<Shout>().push(&Shout { s: "p".into() }).await.unwrap();
        let children = docket.queue::<Child>();
        children
            .push(&Child { s: "c".into(), parent: Some(parent.id) })
            .await
            .unwrap();

        assert!(children.try_claim().await.unwrap().is_none());
        assert!(!children.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn category_scoping_applies_to_claims() {
        let (docket, _clock) = docket();
        let queue = docket.queue::<Shout>();
        queue
            .push_with(&Shout { s: "b".into() }, PushOptions::new().category("blue").priority(Priority::Low))
            .await
            .unwrap();

        assert!(queue.try_claim().await.unwrap().is_none());
        assert!(queue.is_empty().await.unwrap());

        let blue = queue.clone().with_category("blue");
        assert!(!blue.is_empty().await.unwrap());
        assert!(blue.try_claim().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn typed_push_of_scheduled_task_waits_for_run_at() {
        let (docket, clock) = docket();
        let queue = docket.queue::<Tick>();
        queue
            .push_with(
                &Tick { label: "t".into() },
                PushOptions::new().run_at(clock.now() + TimeDelta::minutes(5)),
            )
            .await
            .unwrap();

        assert!(queue.try_claim().await.unwrap().is_none());
        clock.advance(TimeDelta::minutes(5));
        assert!(queue.try_claim().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn next_returns_none_after_shutdown() {
        let (docket, _clock) = docket();
        let queue = docket.queue::<Shout>();
        let shutdown = Shutdown::new();

        let waiter = {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.next(Duration::from_secs(60), &shutdown).await })
        };
        tokio::task::yield_now().await;
        shutdown.trigger();

        assert!(waiter.await.unwrap().unwrap().is_none());
    }
}
