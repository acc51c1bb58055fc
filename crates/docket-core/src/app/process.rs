//! Worker process entry point.
//!
//! A worker process runs one [`Worker`] until asked to stop. The parent
//! [`Runner`](super::runner::Runner) asks by writing [`STOP_COMMAND`] to the
//! child's stdin. Closing stdin, or Ctrl-C, has the same effect, so a worker
//! whose parent died does not linger.

use std::io::BufRead;

use tracing::{info, warn};

use super::shutdown::Shutdown;
use super::worker::Worker;
use crate::error::DocketResult;

/// Line the runner writes to a child's stdin to request a graceful stop.
pub const STOP_COMMAND: &str = "stop";

/// Environment variable carrying the child's index within its runner.
pub const WORKER_INDEX_ENV: &str = "DOCKET_WORKER_INDEX";

/// Runs `worker` in the current process until stdin says stop.
///
/// In-flight handlers are allowed to finish; no new task is claimed after
/// the stop request.
pub async fn run_worker_process(worker: Worker) -> DocketResult<()> {
    let index = std::env::var(WORKER_INDEX_ENV).ok();
    info!(
        worker_id = %worker.id(),
        pid = std::process::id(),
        index = index.as_deref().unwrap_or("-"),
        "worker process started"
    );

    watch_stdin(worker.shutdown().clone());

    let ctrl_c = {
        let shutdown = worker.shutdown().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping worker");
                shutdown.trigger();
            }
        })
    };

    let result = worker.start().await;
    ctrl_c.abort();
    result
}

/// Blocking stdin reads live on a plain thread so they never hold up
/// runtime shutdown.
fn watch_stdin(shutdown: Shutdown) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim() == STOP_COMMAND => {
                    info!("stop requested by runner");
                    break;
                }
                Ok(line) => warn!(line = %line, "ignoring unknown command"),
                Err(e) => {
                    warn!(error = %e, "stdin closed with error");
                    break;
                }
            }
        }
        shutdown.trigger();
    });
}
