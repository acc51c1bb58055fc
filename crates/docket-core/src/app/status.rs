//! Status - task_type ごとの件数レポート
//!
//! CLI の `status` と Runner の完了判定で使う。

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::docket::Docket;
use crate::domain::{QueueCounts, TaskType};
use crate::error::DocketResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub by_type: BTreeMap<String, QueueCounts>,
    /// `by_type` に出てこない task_type も含めた全体
    pub total: QueueCounts,
}

impl StatusReport {
    pub fn get(&self, task_type: &str) -> Option<&QueueCounts> {
        self.by_type.get(task_type)
    }
}

/// `task_types` が空なら全体の件数だけを返す
pub async fn status(docket: &Docket, task_types: &[TaskType]) -> DocketResult<StatusReport> {
    let mut by_type = BTreeMap::new();
    for task_type in task_types {
        let counts = docket.counts(Some(task_type)).await?;
        by_type.insert(task_type.to_string(), counts);
    }
    let total = docket.counts(None).await?;
    Ok(StatusReport { by_type, total })
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .by_type
            .keys()
            .map(String::len)
            .chain(["task_type".len(), "(all)".len()])
            .max()
            .unwrap_or(0);

        writeln!(
            f,
            "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}",
            "task_type", "CREATED", "RUNNING", "FINISHED", "FAILED"
        )?;
        let rows = self
            .by_type
            .iter()
            .map(|(name, counts)| (name.as_str(), counts))
            .chain(std::iter::once(("(all)", &self.total)));
        for (name, c) in rows {
            writeln!(
                f,
                "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}",
                name, c.created, c.running, c.finished, c.failed
            )?;
        }
        Ok(())
    }
}
