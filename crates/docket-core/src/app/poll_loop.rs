//! PollLoop - 1 つの task_type を処理し続けるループ
//!
//! # フロー
//! 1. `Claimer::claim` で最上位のタスクを RUNNING にする
//! 2. `DynHandler::execute_dyn` で handler を実行
//! 3. 成功なら FINISHED、失敗（エラー / panic / decode 失敗）なら FAILED
//! 4. 何も取れなければ `idle_interval` だけ待つ（shutdown で中断）
//!
//! handler の失敗はループを止めない。store のエラーはループを止める。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::queue::complete_task;
use super::shutdown::Shutdown;
use crate::domain::{CategoryFilter, TaskRecord, TaskType, TaskUpdate};
use crate::error::{DocketError, DocketResult};
use crate::queue::{ClaimTarget, Claimer};
use crate::typed::DynHandler;

pub struct PollLoop {
    handler: Arc<dyn DynHandler>,
    claimer: Claimer,
    target: ClaimTarget,
    idle_interval: Duration,
    shutdown: Shutdown,
    running: AtomicBool,
}

/// start() を抜けるときに running を戻す
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl PollLoop {
    pub fn new(
        handler: Arc<dyn DynHandler>,
        claimer: Claimer,
        category: CategoryFilter,
        idle_interval: Duration,
        shutdown: Shutdown,
    ) -> Self {
        let target = handler.descriptor().claim_target(category);
        Self {
            handler,
            claimer,
            target,
            idle_interval,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    pub fn task_type(&self) -> &TaskType {
        &self.target.selection.task_type
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 実行中の handler は最後まで走らせる。次の claim はしない
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// 1 件 claim して処理する。処理したら `true`
    pub async fn run_once(&self) -> DocketResult<bool> {
        Ok(self.try_next().await?.is_some())
    }

    /// claim だけして RUNNING のレコードを返す（handler は呼ばない）
    pub async fn try_claim(&self) -> DocketResult<Option<TaskRecord>> {
        Ok(self.claimer.claim(&self.target).await?)
    }

    /// 1 件 claim して処理し、終端状態のレコードを返す。なければ `None`
    pub async fn try_next(&self) -> DocketResult<Option<TaskRecord>> {
        let Some(record) = self.try_claim().await? else {
            return Ok(None);
        };
        self.process(record).await.map(Some)
    }

    /// 1 件処理できるまで `idle_interval` ごとに claim を試す
    ///
    /// shutdown が来たら `None`。`start` を使わずに自前で回す場合向け。
    pub async fn next(&self) -> DocketResult<Option<TaskRecord>> {
        loop {
            if self.shutdown.is_triggered() {
                return Ok(None);
            }
            if let Some(record) = self.try_next().await? {
                return Ok(Some(record));
            }
            if !self.idle().await {
                return Ok(None);
            }
        }
    }

    /// idle_interval だけ待つ。shutdown で起こされたら `false`
    async fn idle(&self) -> bool {
        debug!(task_type = %self.task_type(), "nothing to claim");
        tokio::select! {
            _ = tokio::time::sleep(self.idle_interval) => true,
            _ = self.shutdown.triggered() => false,
        }
    }

    async fn process(&self, record: TaskRecord) -> DocketResult<TaskRecord> {
        let id = record.id;
        let execution = self.handler.execute_dyn(record.payload).await;
        let now = self.claimer.clock().now();

        let update = match execution.outcome {
            Ok(()) => TaskUpdate::finish(now, execution.payload),
            Err(e) => {
                warn!(task_id = %id, task_type = %record.task_type, error = %e, "task failed");
                TaskUpdate::fail(now, execution.payload, e.to_string())
            }
        };
        complete_task(self.claimer.store().as_ref(), id, update).await
    }

    /// shutdown まで claim → 実行を繰り返す
    ///
    /// 同じループを二重に start すると `AlreadyStarted`。
    pub async fn start(&self) -> DocketResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DocketError::AlreadyStarted(format!(
                "poll loop for {}",
                self.task_type()
            )));
        }
        let _guard = RunningGuard(&self.running);

        info!(task_type = %self.task_type(), "poll loop started");
        while !self.shutdown.is_triggered() {
            match self.run_once().await {
                Ok(true) => continue,
                Ok(false) => {
                    self.idle().await;
                }
                Err(e) => {
                    error!(task_type = %self.task_type(), error = %e, "poll loop aborted");
                    return Err(e);
                }
            }
        }
        info!(task_type = %self.task_type(), "poll loop stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::docket::{Docket, PushOptions};
    use crate::domain::TaskState;
    use crate::impls::InMemoryTaskStore;
    use crate::typed::handler::fixtures::{ExplodeHandler, ShoutHandler};
    use crate::typed::task::fixtures::{Explode, Shout};
    use crate::typed::{Task, TypedHandler};
    use serde_json::json;

    fn poll_loop<H: DynHandler + 'static>(docket: &Docket, handler: H) -> PollLoop {
        PollLoop::new(
            Arc::new(handler),
            Claimer::new(docket.store().clone(), docket.clock().clone()),
            CategoryFilter::Untagged,
            Duration::from_millis(10),
            Shutdown::new(),
        )
    }

    #[tokio::test]
    async fn run_once_finishes_task() {
        let docket = Docket::new(Arc::new(InMemoryTaskStore::new()));
        let record = docket.queue::<Shout>().push(&Shout { s: "hey".into() }).await.unwrap();
        let poll = poll_loop(&docket, TypedHandler::<Shout, _>::new(ShoutHandler));

        assert!(poll.run_once().await.unwrap());
        assert!(!poll.run_once().await.unwrap());

        let stored = docket.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Finished);
        assert_eq!(stored.payload, json!({"s": "HEY"}));
    }

    #[tokio::test]
    async fn handler_error_marks_task_failed() {
        let docket = Docket::new(Arc::new(InMemoryTaskStore::new()));
        let record = docket
            .queue::<Explode>()
            .push(&Explode { reason: "boom".into() })
            .await
            .unwrap();
        let poll = poll_loop(&docket, TypedHandler::<Explode, _>::new(ExplodeHandler));

        assert!(poll.run_once().await.unwrap());
        let stored = docket.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn mismatched_payload_marks_task_failed() {
        let docket = Docket::new(Arc::new(InMemoryTaskStore::new()));
        docket
            .push_json(&Shout::descriptor(), json!({"x": 1}), PushOptions::new())
            .await
            .unwrap();
        let poll = poll_loop(&docket, TypedHandler::<Shout, _>::new(ShoutHandler));

        assert!(poll.run_once().await.unwrap());
        assert_eq!(docket.counts(None).await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn start_drains_then_stops_on_shutdown() {
        let docket = Docket::new(Arc::new(InMemoryTaskStore::new()));
        let queue = docket.queue::<Shout>();
        for s in ["a", "b", "c"] {
            queue.push(&Shout { s: s.into() }).await.unwrap();
        }

        let poll = Arc::new(poll_loop(&docket, TypedHandler::<Shout, _>::new(ShoutHandler)));
        let handle = {
            let poll = poll.clone();
            tokio::spawn(async move { poll.start().await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while docket.counts(None).await.unwrap().finished < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(poll.is_running());
        assert!(matches!(poll.start().await, Err(DocketError::AlreadyStarted(_))));

        poll.stop();
        handle.await.unwrap().unwrap();
        assert!(!poll.is_running());
    }

    #[tokio::test]
    async fn try_claim_leaves_the_task_running() {
        let docket = Docket::new(Arc::new(InMemoryTaskStore::new()));
        docket.queue::<Shout>().push(&Shout { s: "x".into() }).await.unwrap();
        let poll = poll_loop(&docket, TypedHandler::<Shout, _>::new(ShoutHandler));

        let record = poll.try_claim().await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Running);
        assert_eq!(record.payload, json!({"s": "x"}));
        assert!(poll.try_claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn next_waits_for_a_task() {
        let docket = Docket::new(Arc::new(InMemoryTaskStore::new()));
        let poll = Arc::new(poll_loop(&docket, TypedHandler::<Shout, _>::new(ShoutHandler)));
        let waiter = {
            let poll = poll.clone();
            tokio::spawn(async move { poll.next().await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        docket.queue::<Shout>().push(&Shout { s: "late".into() }).await.unwrap();

        let record = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(record.state, TaskState::Finished);
        assert_eq!(record.payload, json!({"s": "LATE"}));

        poll.stop();
        assert!(poll.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_after_stop_returns_immediately() {
        let docket = Docket::new(Arc::new(InMemoryTaskStore::new()));
        let poll = poll_loop(&docket, TypedHandler::<Shout, _>::new(ShoutHandler));
        poll.stop();

        tokio::time::timeout(Duration::from_secs(1), poll.start())
            .await
            .unwrap()
            .unwrap();
    }
}
