//! Task trait - 型付き Task の定義
//!
//! 1 つの Rust 型 = 1 つの task_type。型ごとのメタデータ
//! （scheduled かどうか、依存フィールド）は `TaskDescriptor` にまとめ、
//! 登録時に一度だけ作る。

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{CategoryFilter, DependencySchema, TaskType};
use crate::queue::{ClaimTarget, Selection};

/// Task は task_type と payload の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Resize {
///     path: String,
///     parent: Option<TaskId>,
/// }
///
/// impl Task for Resize {
///     const TYPE: &'static str = "media.resize.v1";
///
///     fn dependencies() -> DependencySchema {
///         DependencySchema::new().direct("parent")
///     }
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize` / `DeserializeOwned`: payload（JSON object）との相互変換
/// - `Send + Sync + 'static`: worker の各ループから使うため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// task_type（`{namespace}.{action}.v{major}`）
    const TYPE: &'static str;

    /// `true` なら run_at / interval を持つ scheduled タスク
    const SCHEDULED: bool = false;

    /// payload 上の依存フィールド。値は `TaskId` / `Option<TaskId>` / `Vec<TaskId>`
    fn dependencies() -> DependencySchema {
        DependencySchema::new()
    }

    fn descriptor() -> TaskDescriptor {
        TaskDescriptor {
            task_type: TaskType::new(Self::TYPE),
            scheduled: Self::SCHEDULED,
            dependencies: Self::dependencies(),
        }
    }
}

/// TaskDescriptor は task_type ごとの不変メタデータ
///
/// Rust の型を持たない呼び出し元（CLI の `push` など）は
/// `plain` / `scheduled` で直接作る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub task_type: TaskType,
    pub scheduled: bool,
    pub dependencies: DependencySchema,
}

impl TaskDescriptor {
    pub fn plain(task_type: impl Into<TaskType>) -> Self {
        Self {
            task_type: task_type.into(),
            scheduled: false,
            dependencies: DependencySchema::new(),
        }
    }

    pub fn scheduled(task_type: impl Into<TaskType>) -> Self {
        Self {
            scheduled: true,
            ..Self::plain(task_type)
        }
    }

    pub fn with_dependencies(mut self, dependencies: DependencySchema) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn selection(&self, category: CategoryFilter) -> Selection {
        Selection::new(self.task_type.clone())
            .with_category(category)
            .with_dependencies(self.dependencies.clone())
    }

    pub fn claim_target(&self, category: CategoryFilter) -> ClaimTarget {
        ClaimTarget {
            selection: self.selection(category),
            scheduled: self.scheduled,
        }
    }
}
