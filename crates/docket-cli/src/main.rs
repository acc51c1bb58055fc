//! docket - タスクキューの CLI
//!
//! - `push`: タスクを 1 件投入
//! - `run`: worker プロセスのプールを起動（retention も回す）
//! - `worker`: worker プロセス本体（`run` が起動する。直接は使わない）
//! - `status`: task_type ごとの件数
//! - `purge`: retention window を過ぎた終端レコードを削除

mod tasks;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use docket_core::app::{
    Docket, PushOptions, RetentionLoop, Runner, Shutdown, WorkerBuilder, WorkerCommand,
    run_worker_process, status,
};
use docket_core::config::DocketConfig;
use docket_core::domain::Priority;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "docket", version, about = "SQLite-backed distributed task queue")]
struct Cli {
    /// Store URL (`sqlite://path.db`, `sqlite::memory:`, `memory:`).
    #[arg(long, global = true, env = "DOCKET_STORE_URL")]
    store_url: Option<String>,

    /// Path to a docket.toml config file.
    #[arg(long, global = true, env = "DOCKET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push one task.
    Push {
        /// Task type, e.g. `demo.uppercase.v1`.
        task_type: String,

        /// JSON object payload.
        #[arg(default_value = "{}")]
        payload: String,

        /// low, medium, high (or 1-3).
        #[arg(long, default_value = "medium")]
        priority: Priority,

        #[arg(long)]
        category: Option<String>,

        /// Scheduled types only: first run this many seconds from now.
        #[arg(long)]
        delay_secs: Option<u64>,

        /// Scheduled types only: repeat every N seconds.
        #[arg(long)]
        every_secs: Option<u64>,
    },

    /// Run a pool of worker processes until Ctrl-C.
    Run {
        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        idle_ms: Option<u64>,

        /// Only claim tasks in these categories (repeatable).
        #[arg(long = "category")]
        categories: Vec<String>,
    },

    /// One worker process. Started by `run`.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        idle_ms: Option<u64>,

        #[arg(long = "category")]
        categories: Vec<String>,
    },

    /// Show task counts per type.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Delete terminal tasks older than the retention window.
    Purge {
        #[arg(long)]
        retention_secs: Option<u64>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<DocketConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = DocketConfig::from_file(path)?;
            info!(path = %path.display(), "loaded config");
            config
        }
        None => DocketConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(url) = &cli.store_url {
        config.store_url = url.clone();
    }
    Ok(config)
}

fn apply_worker_flags(config: &mut DocketConfig, idle_ms: Option<u64>, categories: &[String]) {
    if let Some(idle_ms) = idle_ms {
        config.idle_interval_ms = idle_ms;
    }
    if !categories.is_empty() {
        config.categories = categories.to_vec();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.command {
        Command::Push {
            task_type,
            payload,
            priority,
            category,
            delay_secs,
            every_secs,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let mut options = PushOptions::new().priority(priority);
            if let Some(category) = category {
                options = options.category(category);
            }
            if let Some(delay) = delay_secs {
                let delay = i64::try_from(delay)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .context("--delay-secs is out of range")?;
                options = options.run_at(Utc::now() + delay);
            }
            if let Some(every) = every_secs {
                if every == 0 {
                    bail!("--every-secs must be at least 1");
                }
                options = options.every(Duration::from_secs(every));
            }

            let docket = Docket::connect(&config.store_url).await?;
            let descriptor = tasks::descriptor_for(&task_type);
            let record = docket.push_json(&descriptor, payload, options).await?;
            println!("{}", record.id);
        }

        Command::Run {
            workers,
            idle_ms,
            categories,
        } => {
            if let Some(workers) = workers {
                config.workers = workers;
            }
            apply_worker_flags(&mut config, idle_ms, &categories);
            config.validate()?;
            if config.store_url.starts_with("memory:") {
                warn!("memory: store is per process; worker processes will not see pushed tasks");
            }

            // migrations run once here, before the children race for them
            let docket = Docket::connect(&config.store_url).await?;

            let mut command = WorkerCommand::current_exe()?.args([
                "--store-url".to_string(),
                config.store_url.clone(),
                "worker".to_string(),
                "--idle-ms".to_string(),
                config.idle_interval_ms.to_string(),
            ]);
            for category in &config.categories {
                command = command.args(["--category", category.as_str()]);
            }

            let shutdown = Shutdown::new();
            let retention = RetentionLoop::new(docket, config.retention(), shutdown.clone());
            let retention = tokio::spawn(async move { retention.run().await });

            let mut runner = Runner::new(command, config.workers);
            runner.start().await?;
            info!(workers = config.workers, pids = ?runner.pids(), "runner started");
            let result = runner.wait().await;

            shutdown.trigger();
            retention.await?;
            result?;
        }

        Command::Worker {
            idle_ms,
            categories,
        } => {
            apply_worker_flags(&mut config, idle_ms, &categories);
            config.validate()?;

            let docket = Docket::connect(&config.store_url).await?;
            let worker = tasks::register_all(WorkerBuilder::new(docket))?
                .idle_interval(config.idle_interval())
                .category(config.category_filter())
                .build()?;
            run_worker_process(worker).await?;
        }

        Command::Status { json } => {
            let docket = Docket::connect(&config.store_url).await?;
            let report = status(&docket, &tasks::task_types()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }

        Command::Purge { retention_secs } => {
            if let Some(secs) = retention_secs {
                config.retention_secs = secs;
            }
            let docket = Docket::connect(&config.store_url).await?;
            let purged = docket.purge(&config.retention()).await?;
            println!("purged {purged} terminal tasks");
        }
    }

    Ok(())
}
