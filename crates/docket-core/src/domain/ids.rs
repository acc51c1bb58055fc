//! Domain identifiers (strongly-typed IDs).
//!
//! ID は ULID を `Id<T>` で包んだもの。`T` はコンパイル時にだけ存在するマーカー型。
//! 複数の worker プロセスが同じ store を共有するので、調整なしで生成できて
//! 生成順にソートできる ULID を使う。
//!
//! `Id<T>` は素の ULID 文字列として serialize される。
//! payload の `Option<TaskId>` フィールドは `null` か `"01H..."` で保存される。
//! deserialize はプレフィックス付き（`"task-01H..."`）も受け付ける。

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// ID の種類を表すマーカー trait
///
/// `Display` のプレフィックス（"task-", "worker-"）を返す。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ULID ベースのジェネリック ID
///
/// ```ignore
/// let task_id: TaskId = Id::from(Ulid::new());
/// let worker_id: WorkerId = Id::from(Ulid::new());
/// // TaskId と WorkerId は別の型なので取り違えられない
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// 素の ULID と `Display` 形式（プレフィックス付き）のどちらも受け付ける
    pub fn parse(value: &str) -> Result<Self, ParseIdError> {
        let raw = value.strip_prefix(T::prefix()).unwrap_or(value);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError(value.to_string()))
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// ID として解釈できない文字列
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid identifier: {0}")]
pub struct ParseIdError(pub String);

// ========================================
// Markers
// ========================================

/// タスクレコード用マーカー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Worker 用マーカー（プロセスごとに 1 つ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// タスクレコードの ID。insert 時に store が採番する
pub type TaskId = Id<Task>;

/// Worker の ID。ログの相関に使う
pub type WorkerId = Id<Worker>;
