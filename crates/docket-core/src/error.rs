use thiserror::Error;

use crate::app::BuildError;
use crate::config::ConfigError;
use crate::domain::{TaskId, TaskState, TaskType};
use crate::ports::StoreError;
use crate::typed::{CodecError, RegistryError};

/// DocketError は queue / loop / worker / runner レベルのエラー
#[derive(Debug, Error)]
pub enum DocketError {
    #[error("{0} is already running")]
    AlreadyStarted(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("task type {0} is not scheduled; run_at / interval are not allowed")]
    NotScheduled(TaskType),

    #[error("worker process error: {0}")]
    Process(#[from] std::io::Error),
}

pub type DocketResult<T> = Result<T, DocketError>;
