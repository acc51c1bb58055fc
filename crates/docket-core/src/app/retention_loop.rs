//! RetentionLoop - 終端レコードの定期削除
//!
//! FINISHED / FAILED のうち `created_at` が retention window より古いものを
//! `sweep_interval` ごとに消す。CREATED / RUNNING は消さない。

use tracing::{error, info};

use super::docket::Docket;
use super::shutdown::Shutdown;
use crate::error::DocketResult;
use crate::queue::RetentionPolicy;

pub struct RetentionLoop {
    docket: Docket,
    policy: RetentionPolicy,
    shutdown: Shutdown,
}

impl RetentionLoop {
    pub fn new(docket: Docket, policy: RetentionPolicy, shutdown: Shutdown) -> Self {
        Self {
            docket,
            policy,
            shutdown,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// 1 回分の削除。消した件数を返す
    pub async fn sweep(&self) -> DocketResult<u64> {
        self.docket.purge(&self.policy).await
    }

    /// shutdown まで sweep を繰り返す。sweep の失敗はログに残して続ける
    pub async fn run(&self) {
        info!(
            window_secs = self.policy.window.as_secs(),
            sweep_interval_secs = self.policy.sweep_interval.as_secs(),
            "retention loop started"
        );
        let mut ticker = tokio::time::interval(self.policy.sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "retention sweep failed");
                    }
                }
                _ = self.shutdown.triggered() => break,
            }
        }
        info!("retention loop stopped");
    }
}
