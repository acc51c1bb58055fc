//! Priority - タスクの優先度
//!
//! `Ord` は LOW < MEDIUM < HIGH。選択時は降順（HIGH が先頭）で並べる。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Priority {
    /// store に保存する数値（大きいほど優先）
    pub fn rank(self) -> i64 {
        self as i64
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown priority: {0} (expected low, medium or high)")]
pub struct ParsePriorityError(pub String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "1" => Ok(Priority::Low),
            "medium" | "2" => Ok(Priority::Medium),
            "high" | "3" => Ok(Priority::High),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn high_sorts_above_low() {
        let mut all = vec![Priority::Medium, Priority::High, Priority::Low];
        all.sort_by(|a, b| b.cmp(a));
        assert_eq!(all, vec![Priority::High, Priority::Medium, Priority::Low]);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[rstest]
    #[case("low", Priority::Low)]
    #[case("MEDIUM", Priority::Medium)]
    #[case("High", Priority::High)]
    #[case("3", Priority::High)]
    fn parses_names_and_ranks(#[case] input: &str, #[case] expected: Priority) {
        assert_eq!(input.parse::<Priority>().unwrap(), expected);
        assert_eq!(Priority::from_rank(expected.rank()), Some(expected));
    }

    #[test]
    fn rejects_unknown_rank() {
        assert_eq!(Priority::from_rank(0), None);
        assert!("urgent".parse::<Priority>().is_err());
    }
}
