//! WorkerBuilder - Worker の構築とワイヤリング
//!
//! # 起動時検証
//! - `expect_tasks()` で期待される task_type を宣言
//! - `build()` 時に「期待集合 ⊆ 登録済み集合」をチェック
//! - handler が 1 つもなければ起動しない

use std::time::Duration;

use super::docket::Docket;
use super::poll_loop::PollLoop;
use super::shutdown::Shutdown;
use super::worker::Worker;
use crate::domain::CategoryFilter;
use crate::ports::{IdGenerator, UlidGenerator};
use crate::queue::Claimer;
use crate::typed::{Handler, RegistryError, Task, TypedRegistry};

/// WorkerBuilder は Worker を構築
///
/// # 使用例
/// ```ignore
/// let worker = WorkerBuilder::new(docket)
///     .register::<Resize, _>(ResizeHandler)?
///     .expect_tasks(&["media.resize.v1"])
///     .category("media")
///     .build()?;
/// worker.start().await?;
/// ```
pub struct WorkerBuilder {
    docket: Docket,
    registry: TypedRegistry,
    expected_tasks: Option<Vec<String>>,
    idle_interval: Duration,
    category: CategoryFilter,
    shutdown: Option<Shutdown>,
}

/// BuildError は Worker 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing task types: {0:?}. These tasks were expected but not registered.")]
    MissingTaskTypes(Vec<String>),

    #[error("No task types registered")]
    NoTaskTypes,
}

impl WorkerBuilder {
    pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(docket: Docket) -> Self {
        Self {
            docket,
            registry: TypedRegistry::new(),
            expected_tasks: None,
            idle_interval: Self::DEFAULT_IDLE_INTERVAL,
            category: CategoryFilter::Untagged,
            shutdown: None,
        }
    }

    /// Handler を登録。同じ task_type の二重登録はエラー
    pub fn register<T: Task, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// 空振り時の待ち時間（デフォルト 1 秒）
    pub fn idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval;
        self
    }

    /// 全ループ共通の category フィルタ
    pub fn category(mut self, category: impl Into<CategoryFilter>) -> Self {
        self.category = category.into();
        self
    }

    /// 外から停止させたいときに渡す（省略時は Worker 専用のものを作る）
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<Worker, BuildError> {
        if let Some(expected_tasks) = &self.expected_tasks {
            let registered_types = self.registry.registered_types();
            let missing_tasks: Vec<String> = expected_tasks
                .iter()
                .filter(|x| !registered_types.contains(x))
                .cloned()
                .collect();
            if !missing_tasks.is_empty() {
                return Err(BuildError::MissingTaskTypes(missing_tasks));
            }
        }
        if self.registry.is_empty() {
            return Err(BuildError::NoTaskTypes);
        }

        let shutdown = self.shutdown.unwrap_or_default();
        let claimer = Claimer::new(self.docket.store().clone(), self.docket.clock().clone());
        let loops = self
            .registry
            .handlers()
            .map(|handler| {
                PollLoop::new(
                    handler.clone(),
                    claimer.clone(),
                    self.category.clone(),
                    self.idle_interval,
                    shutdown.clone(),
                )
            })
            .collect();

        let id = UlidGenerator::new(self.docket.clock().clone()).worker_id();
        Ok(Worker::new(id, loops, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryTaskStore;
    use crate::typed::handler::fixtures::{ShoutHandler, TickHandler};
    use crate::typed::task::fixtures::{Shout, Tick};
    use std::sync::Arc;

    fn docket() -> Docket {
        Docket::new(Arc::new(InMemoryTaskStore::new()))
    }

    #[test]
    fn build_success() {
        let worker = WorkerBuilder::new(docket())
            .register::<Shout, _>(ShoutHandler)
            .unwrap()
            .register::<Tick, _>(TickHandler)
            .unwrap()
            .expect_tasks(&[Shout::TYPE])
            .category("cron")
            .build()
            .unwrap();

        let types: Vec<&str> = worker.task_types().iter().map(|t| t.as_str()).collect();
        assert_eq!(types, vec![Shout::TYPE, Tick::TYPE]);
        assert!(worker.id().to_string().starts_with("worker-"));
    }

    #[test]
    fn build_missing_task_types() {
        let worker = WorkerBuilder::new(docket())
            .register::<Shout, _>(ShoutHandler)
            .unwrap()
            .expect_tasks(&[Shout::TYPE, Tick::TYPE])
            .build();
        assert!(matches!(
            worker,
            Err(BuildError::MissingTaskTypes(missing)) if missing == vec![Tick::TYPE.to_string()]
        ));
    }

    #[test]
    fn build_without_handlers_fails() {
        assert!(matches!(
            WorkerBuilder::new(docket()).build(),
            Err(BuildError::NoTaskTypes)
        ));
    }

    #[test]
    fn shared_shutdown_reaches_the_loops() {
        let shutdown = Shutdown::new();
        let worker = WorkerBuilder::new(docket())
            .register::<Shout, _>(ShoutHandler)
            .unwrap()
            .shutdown(shutdown.clone())
            .build()
            .unwrap();

        shutdown.trigger();
        assert!(worker.loops().iter().all(|l| l.shutdown().is_triggered()));
    }
}
