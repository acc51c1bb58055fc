//! docket-core
//!
//! SQLite（または in-memory）をバックエンドにした分散タスクキュー。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, priority, category, dependency, schedule, record）
//! - **ports**: 抽象化レイヤー（TaskStore, Clock, IdGenerator）
//! - **queue**: 選択条件と claim プロトコル、retention
//! - **typed**: 型付き Task API（Task trait, Handler trait, TypedRegistry, PayloadCodec）
//! - **impls**: TaskStore の実装（InMemoryTaskStore, SqliteTaskStore）
//! - **app**: push / poll loop / worker / runner
//! - **config**: TOML + 環境変数の設定
//!
//! # 使用例
//! ```ignore
//! let docket = Docket::connect("sqlite://docket.db").await?;
//! docket.queue::<Resize>().push(&Resize { path: "a.png".into(), parent: None }).await?;
//!
//! let worker = WorkerBuilder::new(docket)
//!     .register::<Resize, _>(ResizeHandler)?
//!     .build()?;
//! worker.start().await?;
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod queue;
pub mod typed;

pub use app::{Docket, PushOptions, Worker, WorkerBuilder};
pub use config::DocketConfig;
pub use domain::{CategoryFilter, Priority, TaskId, TaskRecord, TaskState, TaskType};
pub use error::{DocketError, DocketResult};
pub use typed::{Handler, Task, TaskError};
