//! Shutdown - 停止要求の共有
//!
//! `watch::Sender<bool>` を `Arc` で共有する。一度 `true` になったら戻らない
//! （level-triggered）ので、後から待ち始めたループも取りこぼさない。

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// 受信側がいなくても値は残る
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// 停止要求が来るまで待つ（すでに来ていれば即座に返る）
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // Sender は self が持っているので Err にはならない
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
