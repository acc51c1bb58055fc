//! Schedule - scheduled タスクの実行予定
//!
//! - `run_at` より前は選択対象にならない
//! - `interval` があれば claim 時に次回分（`run_at + interval`）を作る。
//!   基準は元の `run_at` で、実際の完了時刻ではない（固定ケイデンス）

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub run_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
}

impl Schedule {
    pub fn at(run_at: DateTime<Utc>) -> Self {
        Self {
            run_at,
            interval: None,
        }
    }

    pub fn every(run_at: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            run_at,
            interval: Some(interval),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at <= now
    }

    /// 次回分のスケジュール。interval がない、または時刻が表現できなければ `None`
    pub fn next_occurrence(&self) -> Option<Schedule> {
        let interval = self.interval?;
        let delta = TimeDelta::from_std(interval).ok()?;
        let run_at = self.run_at.checked_add_signed(delta)?;
        Some(Schedule {
            run_at,
            interval: self.interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn due_from_run_at_onwards() {
        let schedule = Schedule::at(t0());
        assert!(!schedule.is_due(t0() - TimeDelta::seconds(1)));
        assert!(schedule.is_due(t0()));
        assert!(schedule.is_due(t0() + TimeDelta::seconds(1)));
    }

    #[test]
    fn next_occurrence_keeps_fixed_cadence() {
        let schedule = Schedule::every(t0(), Duration::from_secs(5));
        let next = schedule.next_occurrence().unwrap();
        assert_eq!(next.run_at, t0() + TimeDelta::seconds(5));
        assert_eq!(next.interval, Some(Duration::from_secs(5)));

        let after = next.next_occurrence().unwrap();
        assert_eq!(after.run_at, t0() + TimeDelta::seconds(10));
    }

    #[test]
    fn one_shot_has_no_successor() {
        assert_eq!(Schedule::at(t0()).next_occurrence(), None);
    }
}
