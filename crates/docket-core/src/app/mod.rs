//! App - アプリケーション層
//!
//! ports と queue を組み合わせて、push / 実行 / プロセス管理を提供する。
//!
//! # 主要コンポーネント
//! - **Docket**: store と clock のハンドル（push, counts, purge）
//! - **Queue / Claimed**: 型付きの push と手動 claim
//! - **WorkerBuilder / Worker**: handler 登録と task_type ごとの PollLoop
//! - **Runner**: worker プロセスのプール
//! - **RetentionLoop**: 終端レコードの定期削除

pub mod builder;
pub mod docket;
pub mod poll_loop;
pub mod process;
pub mod queue;
pub mod retention_loop;
pub mod runner;
pub mod shutdown;
pub mod status;
pub mod worker;

pub use self::builder::{BuildError, WorkerBuilder};
pub use self::docket::{Docket, PushOptions};
pub use self::poll_loop::PollLoop;
pub use self::process::{STOP_COMMAND, WORKER_INDEX_ENV, run_worker_process};
pub use self::queue::{Claimed, Queue};
pub use self::retention_loop::RetentionLoop;
pub use self::runner::{Runner, WorkerCommand};
pub use self::shutdown::Shutdown;
pub use self::status::{StatusReport, status};
pub use self::worker::Worker;
