//! Handler trait - Task を実行する Handler の定義
//!
//! - `Handler<T>`: アプリケーションが実装する。型安全
//! - `DynHandler`: poll loop が使う object-safe な形（payload は JSON）
//! - `TypedHandler<T, H>`: `Handler<T>` → `DynHandler` の type erasure

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use super::codec::PayloadCodec;
use super::task::{Task, TaskDescriptor};

/// TaskError は handler が返すエラー
///
/// poll loop はこれを FAILED として記録し、メッセージを `last_error` に残す。
/// 自動リトライはしない。
#[derive(Debug)]
pub struct TaskError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message, source),
            None => f.write_str(&self.message),
        }
    }
}

impl StdError for TaskError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Handler は claim されたタスクを 1 回だけ実行する
///
/// `task` は変更してよい。変更後の値は終端状態と一緒に保存される。
///
/// # 使用例
/// ```ignore
/// struct ShoutHandler;
///
/// #[async_trait]
/// impl Handler<Shout> for ShoutHandler {
///     async fn execute(&self, task: &mut Shout) -> Result<(), TaskError> {
///         task.s = task.s.to_uppercase();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    async fn execute(&self, task: &mut T) -> Result<(), TaskError>;
}

/// 1 回の実行結果。`payload` は handler 実行後の（変更済みかもしれない）値
#[derive(Debug)]
pub struct Execution {
    pub payload: Value,
    pub outcome: Result<(), TaskError>,
}

/// DynHandler は object-safe な Handler
#[async_trait]
pub trait DynHandler: Send + Sync {
    fn descriptor(&self) -> &TaskDescriptor;

    /// decode → execute → encode。panic も失敗として返す
    async fn execute_dyn(&self, payload: Value) -> Execution;
}

pub struct TypedHandler<T: Task, H: Handler<T>> {
    handler: H,
    descriptor: TaskDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Task, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            descriptor: T::descriptor(),
            _marker: PhantomData,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[async_trait]
impl<T: Task, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    async fn execute_dyn(&self, payload: Value) -> Execution {
        let mut task: T = match PayloadCodec::decode(&payload) {
            Ok(task) => task,
            Err(e) => {
                return Execution {
                    payload,
                    outcome: Err(TaskError::with_source("payload does not match task type", e)),
                };
            }
        };

        let outcome = match AssertUnwindSafe(self.handler.execute(&mut task))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(TaskError::new(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };

        match PayloadCodec::encode(&task) {
            Ok(payload) => Execution { payload, outcome },
            Err(e) => Execution {
                payload,
                outcome: outcome.and(Err(TaskError::with_source(
                    "task could not be re-encoded",
                    e,
                ))),
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! テスト用の Handler

    use async_trait::async_trait;

    use super::{Handler, TaskError};
    use crate::typed::task::fixtures::{Child, Explode, Shout, Tick};

    pub struct ShoutHandler;

    #[async_trait]
    impl Handler<Shout> for ShoutHandler {
        async fn execute(&self, task: &mut Shout) -> Result<(), TaskError> {
            task.s = task.s.to_uppercase();
            Ok(())
        }
    }

    pub struct ExplodeHandler;

    #[async_trait]
    impl Handler<Explode> for ExplodeHandler {
        async fn execute(&self, task: &mut Explode) -> Result<(), TaskError> {
            Err(TaskError::new(task.reason.clone()))
        }
    }

    pub struct ChildHandler;

    #[async_trait]
    impl Handler<Child> for ChildHandler {
        async fn execute(&self, task: &mut Child) -> Result<(), TaskError> {
            task.s = task.s.to_uppercase();
            Ok(())
        }
    }

    pub struct TickHandler;

    #[async_trait]
    impl Handler<Tick> for TickHandler {
        async fn execute(&self, task: &mut Tick) -> Result<(), TaskError> {
            task.label.push('!');
            Ok(())
        }
    }
}
