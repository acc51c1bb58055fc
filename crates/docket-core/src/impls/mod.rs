//! Impls - ports の実装
//!
//! - **InMemoryTaskStore**: 単一プロセス用（テスト・デモ）
//! - **SqliteTaskStore**: 複数 worker プロセスで共有する store

pub mod memory_store;
pub mod sqlite_store;


pub use self::memory_store::InMemoryTaskStore;
pub use self::sqlite_store::SqliteTaskStore;

use std::sync::Arc;

use crate::ports::{StoreResult, TaskStore};

/// URL から store を開く
///
/// `memory:` で始まる URL は InMemoryTaskStore、それ以外は SQLite として扱う。
pub async fn open_store(url: &str) -> StoreResult<Arc<dyn TaskStore>> {
    if url.starts_with("memory:") {
        return Ok(Arc::new(InMemoryTaskStore::new()));
    }
    Ok(Arc::new(SqliteTaskStore::connect(url).await?))
}
