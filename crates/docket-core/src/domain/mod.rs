//! Domain model (IDs, states, records, dependencies, schedules).

pub mod category;
pub mod counts;
pub mod dependency;
pub mod ids;
pub mod priority;
pub mod record;
pub mod schedule;
pub mod state;
pub mod task_type;

pub use category::CategoryFilter;
pub use counts::QueueCounts;
pub use dependency::{DependencyField, DependencyRefs, DependencySchema, DependencyType};
pub use ids::{Id, IdMarker, ParseIdError, TaskId, WorkerId};
pub use priority::{ParsePriorityError, Priority};
pub use record::{TaskDraft, TaskRecord, TaskUpdate};
pub use schedule::Schedule;
pub use state::{ParseStateError, TaskState};
pub use task_type::TaskType;
