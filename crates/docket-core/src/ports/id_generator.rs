//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数から ULID を作る

use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use crate::domain::ids::{TaskId, WorkerId};
use crate::ports::Clock;
use ulid::{Generator, Ulid};

pub trait IdGenerator: Send + Sync {
    fn task_id(&self) -> TaskId;

    fn worker_id(&self) -> WorkerId;
}

/// UlidGenerator は Clock ベースの ULID 生成器
///
/// 同じ生成器から出た ID は同じミリ秒内でも単調増加する
/// （同時刻に push したタスクの順序が id で決まるように）。
pub struct UlidGenerator<C> {
    clock: C,
    monotonic: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            monotonic: Mutex::new(Generator::new()),
        }
    }

    fn next(&self) -> Ulid {
        let now = self.clock.now();
        let mut generator = self.monotonic.lock().unwrap_or_else(PoisonError::into_inner);
        match generator.generate_from_datetime(SystemTime::from(now)) {
            Ok(ulid) => ulid,
            // 乱数部分が溢れた場合だけ単調性を諦める
            Err(_) => {
                let timestamp_ms = now.timestamp_millis().max(0) as u64;
                Ulid::from_parts(timestamp_ms, rand::random())
            }
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn task_id(&self) -> TaskId {
        TaskId::from(self.next())
    }

    fn worker_id(&self) -> WorkerId {
        WorkerId::from(self.next())
    }
}
