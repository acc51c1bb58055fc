//! Claim protocol: select a candidate, then compare-and-set it to RUNNING.
//!
//! Two pollers may select the same candidate. Only one conditional update
//! (`CREATED -> RUNNING`) can match; the loser re-runs the full selection
//! because the ranking may have changed in the meantime. No lock is held
//! across the two steps, so the loop is lock-free but not starvation-free.
//!
//! For scheduled task types the selection is additionally gated on
//! `run_at <= now`, and a claimed record with an interval spawns its next
//! occurrence before the claim is returned.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{TaskRecord, TaskState, TaskUpdate};
use crate::ports::{Clock, StoreResult, TaskStore};

use super::Selection;

/// What one poller is allowed to claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimTarget {
    pub selection: Selection,
    pub scheduled: bool,
}

impl ClaimTarget {
    pub fn plain(selection: Selection) -> Self {
        Self {
            selection,
            scheduled: false,
        }
    }

    pub fn scheduled(selection: Selection) -> Self {
        Self {
            selection,
            scheduled: true,
        }
    }
}

#[derive(Clone)]
pub struct Claimer {
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
}

impl Claimer {
    pub fn new(store: Arc<dyn TaskStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the claimed record (already RUNNING), or `None` when nothing
    /// is eligible. Store errors are returned as-is.
    pub async fn claim(&self, target: &ClaimTarget) -> StoreResult<Option<TaskRecord>> {
        let mut lost_races = 0u32;
        loop {
            let now = self.clock.now();
            let selection = if target.scheduled {
                target.selection.clone().due_at(now)
            } else {
                target.selection.clone()
            };

            let Some(candidate) = self.store.find_first(&selection).await? else {
                return Ok(None);
            };

            let claimed = self
                .store
                .conditional_update(candidate.id, TaskState::Created, TaskUpdate::claim(now))
                .await?;

            let Some(claimed) = claimed else {
                lost_races += 1;
                debug!(
                    task_id = %candidate.id,
                    task_type = %target.selection.task_type,
                    lost_races,
                    "claim race lost, reselecting"
                );
                continue;
            };

            info!(
                task_id = %claimed.id,
                task_type = %claimed.task_type,
                priority = %claimed.priority,
                "task claimed"
            );

            if target.scheduled
                && let Some(next) = claimed.successor(now)
            {
                let next = self.store.insert(next).await?;
                info!(
                    task_id = %next.id,
                    previous = %claimed.id,
                    run_at = %next.run_at(),
                    "next occurrence scheduled"
                );
            }

            return Ok(Some(claimed));
        }
    }
}
