//! Ports - 外部依存の抽象化レイヤー
//!
//! - **TaskStore**: タスクレコードの永続化（SQLite / in-memory）
//! - **Clock**: 時刻（テストでは FixedClock）
//! - **IdGenerator**: ULID の採番

pub mod clock;
pub mod id_generator;
pub mod task_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_store::{StoreError, StoreResult, TaskStore};
