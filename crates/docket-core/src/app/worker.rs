//! Worker - 登録された task_type ごとの PollLoop を束ねる
//!
//! 1 プロセス = 1 Worker。各ループは同じ `Shutdown` を共有し、
//! どれか 1 つが store エラーで止まったら残りも止める。

use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tracing::{error, info};

use super::poll_loop::PollLoop;
use super::shutdown::Shutdown;
use crate::domain::{TaskType, WorkerId};
use crate::error::{DocketError, DocketResult};

pub struct Worker {
    id: WorkerId,
    loops: Vec<PollLoop>,
    shutdown: Shutdown,
    running: AtomicBool,
}

impl Worker {
    pub(crate) fn new(id: WorkerId, loops: Vec<PollLoop>, shutdown: Shutdown) -> Self {
        Self {
            id,
            loops,
            shutdown,
            running: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn task_types(&self) -> Vec<&TaskType> {
        self.loops.iter().map(PollLoop::task_type).collect()
    }

    pub fn loops(&self) -> &[PollLoop] {
        &self.loops
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// 全ループが止まるまで返らない
    ///
    /// ループのどれかがエラーで止まったら他のループにも停止を要求し、
    /// 最初のエラーを返す。
    pub async fn start(&self) -> DocketResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DocketError::AlreadyStarted(self.id.to_string()));
        }

        info!(worker_id = %self.id, task_types = ?self.task_types(), "worker started");
        let runs = self.loops.iter().map(|poll| async move {
            let result = poll.start().await;
            if result.is_err() {
                self.shutdown.trigger();
            }
            result
        });
        let results = join_all(runs).await;
        self.running.store(false, Ordering::SeqCst);

        match results.into_iter().find_map(Result::err) {
            Some(e) => {
                error!(worker_id = %self.id, error = %e, "worker stopped with error");
                Err(e)
            }
            None => {
                info!(worker_id = %self.id, "worker stopped");
                Ok(())
            }
        }
    }
}
