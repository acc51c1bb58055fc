//! Runner: a pool of worker processes.
//!
//! Each child is the same program started with a `worker` style command
//! line (see [`WorkerCommand`]). Children share nothing but the store, so
//! the claim protocol is what keeps them from running a task twice.

use std::ffi::OsString;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{info, warn};

use super::process::{STOP_COMMAND, WORKER_INDEX_ENV};
use crate::config::ConfigError;
use crate::error::{DocketError, DocketResult};

/// Program and arguments used to start one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// The running executable, for binaries that re-exec themselves.
    pub fn current_exe() -> DocketResult<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn spawn(&self, index: usize) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(WORKER_INDEX_ENV, index.to_string())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

struct WorkerProcess {
    index: usize,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl WorkerProcess {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Writes the stop line, then closes stdin. A child that already exited
    /// gives a broken pipe, which is fine.
    async fn request_stop(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            let line = format!("{STOP_COMMAND}\n");
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                warn!(index = self.index, error = %e, "could not send stop to worker");
            }
            let _ = stdin.flush().await;
        }
    }
}

pub struct Runner {
    command: WorkerCommand,
    processes: usize,
    status_interval: Duration,
    children: Vec<WorkerProcess>,
}

impl Runner {
    pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(command: WorkerCommand, processes: usize) -> Self {
        Self {
            command,
            processes,
            status_interval: Self::DEFAULT_STATUS_INTERVAL,
            children: Vec::new(),
        }
    }

    /// How often [`wait`](Self::wait) checks that the children are alive.
    pub fn with_status_interval(mut self, status_interval: Duration) -> Self {
        self.status_interval = status_interval;
        self
    }

    pub fn processes(&self) -> usize {
        self.processes
    }

    /// Spawns every worker process. If one fails to spawn, the ones already
    /// started are stopped again and the spawn error is returned.
    /// A pool of zero processes is rejected.
    pub async fn start(&mut self) -> DocketResult<()> {
        if self.processes == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()).into());
        }
        if self.is_alive() {
            return Err(DocketError::AlreadyStarted("runner".to_string()));
        }
        self.children.clear();

        for index in 0..self.processes {
            match self.command.spawn(index) {
                Ok(mut child) => {
                    info!(index, pid = child.id(), "worker process spawned");
                    let stdin = child.stdin.take();
                    self.children.push(WorkerProcess { index, child, stdin });
                }
                Err(e) => {
                    warn!(index, error = %e, "failed to spawn worker process");
                    self.stop().await?;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Asks every child to stop and waits for all of them to exit.
    pub async fn stop(&mut self) -> DocketResult<()> {
        for process in &mut self.children {
            process.request_stop().await;
        }
        for process in &mut self.children {
            let status = process.child.wait().await?;
            info!(index = process.index, %status, "worker process exited");
        }
        Ok(())
    }

    /// `true` while at least one child is still running.
    pub fn is_alive(&mut self) -> bool {
        let mut alive = false;
        for process in &mut self.children {
            alive |= process.is_alive();
        }
        alive
    }

    pub fn pids(&self) -> Vec<u32> {
        self.children.iter().filter_map(|p| p.child.id()).collect()
    }

    /// Blocks until every child has exited or Ctrl-C arrives, then stops
    /// the rest.
    pub async fn wait(&mut self) -> DocketResult<()> {
        let mut ticker = tokio::time::interval(self.status_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.is_alive() {
                        info!("all worker processes exited");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, stopping worker processes");
                    break;
                }
            }
        }
        self.stop().await
    }
}
