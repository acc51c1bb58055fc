//! Selection: the predicate + sort order that picks the next claim candidate.
//!
//! A `Selection` is plain data. Stores either evaluate it directly
//! (`matches` / `compare`) or compile it into their own query language.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::domain::{
    CategoryFilter, DependencyRefs, DependencySchema, TaskId, TaskRecord, TaskState, TaskType,
};

/// How candidates are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// priority desc, created_at asc
    Priority,
    /// run_at asc, priority desc, created_at asc
    DueTime,
}

/// Conjunction of:
/// - `state == CREATED`
/// - `task_type` equality
/// - category filter
/// - one gate per declared dependency field
/// - `run_at <= due_at` (scheduled types only)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub task_type: TaskType,
    pub category: CategoryFilter,
    pub dependencies: DependencySchema,
    /// `Some(now)` for scheduled task types.
    pub due_at: Option<DateTime<Utc>>,
}

impl Selection {
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            category: CategoryFilter::Untagged,
            dependencies: DependencySchema::default(),
            due_at: None,
        }
    }

    pub fn with_category(mut self, category: CategoryFilter) -> Self {
        self.category = category;
        self
    }

    pub fn with_dependencies(mut self, dependencies: DependencySchema) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn due_at(mut self, now: DateTime<Utc>) -> Self {
        self.due_at = Some(now);
        self
    }

    pub fn order(&self) -> SortOrder {
        if self.due_at.is_some() {
            SortOrder::DueTime
        } else {
            SortOrder::Priority
        }
    }

    /// Evaluates every predicate except the dependency gates' lookups,
    /// which go through `state_of` (current state of a referenced task,
    /// `None` when the record does not exist).
    pub fn matches<F>(&self, record: &TaskRecord, state_of: F) -> bool
    where
        F: Fn(TaskId) -> Option<TaskState>,
    {
        if record.state != TaskState::Created || record.task_type != self.task_type {
            return false;
        }
        if !self.category.matches(record.category.as_deref()) {
            return false;
        }
        if let Some(now) = self.due_at
            && record.run_at() > now
        {
            return false;
        }
        self.dependencies.fields().iter().all(|field| {
            record
                .dependencies
                .get(&field.name)
                .unwrap_or(&DependencyRefs::Unset)
                .is_satisfied(field.kind, &state_of)
        })
    }

    /// `Ordering::Less` means `a` ranks ahead of `b`. Ties on the timestamp
    /// fall back to the id, which is itself time-ordered.
    pub fn compare(&self, a: &TaskRecord, b: &TaskRecord) -> Ordering {
        let by_priority = b
            .priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id));
        match self.order() {
            SortOrder::Priority => by_priority,
            SortOrder::DueTime => a.run_at().cmp(&b.run_at()).then(by_priority),
        }
    }
}
