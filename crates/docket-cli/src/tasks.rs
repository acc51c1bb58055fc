//! デモ用のタスク型
//!
//! `docket push demo.uppercase.v1 '{"s": "hello"}'` のように CLI から投入し、
//! `docket run` の worker プロセスが処理する。

use std::time::Duration;

use async_trait::async_trait;
use docket_core::app::WorkerBuilder;
use docket_core::domain::{DependencySchema, TaskId, TaskType};
use docket_core::typed::{Handler, RegistryError, Task, TaskDescriptor, TaskError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// `s` を大文字にする
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Uppercase {
    pub s: String,
}

impl Task for Uppercase {
    const TYPE: &'static str = "demo.uppercase.v1";
}

/// 必ず失敗する（`last_error` の確認用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fail {
    #[serde(default = "Fail::default_reason")]
    pub reason: String,
}

impl Fail {
    fn default_reason() -> String {
        "demo failure".to_string()
    }
}

impl Task for Fail {
    const TYPE: &'static str = "demo.fail.v1";
}

/// `ms` ミリ秒待ってから `slept` を立てる
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sleep {
    pub ms: u64,
    #[serde(default)]
    pub slept: bool,
}

impl Task for Sleep {
    const TYPE: &'static str = "demo.sleep.v1";
}

/// interval 付きで投入する scheduled タスク。実行回数を数える
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub runs: u64,
}

impl Task for Tick {
    const TYPE: &'static str = "demo.tick.v1";
    const SCHEDULED: bool = true;
}

/// `parent` が FINISHED になってから `s` を大文字にする
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub s: String,
    #[serde(default)]
    pub parent: Option<TaskId>,
}

impl Task for Chain {
    const TYPE: &'static str = "demo.chain.v1";

    fn dependencies() -> DependencySchema {
        DependencySchema::new().direct("parent")
    }
}

pub struct UppercaseHandler;

#[async_trait]
impl Handler<Uppercase> for UppercaseHandler {
    async fn execute(&self, task: &mut Uppercase) -> Result<(), TaskError> {
        task.s = task.s.to_uppercase();
        Ok(())
    }
}

pub struct FailHandler;

#[async_trait]
impl Handler<Fail> for FailHandler {
    async fn execute(&self, task: &mut Fail) -> Result<(), TaskError> {
        Err(TaskError::new(task.reason.clone()))
    }
}

pub struct SleepHandler;

#[async_trait]
impl Handler<Sleep> for SleepHandler {
    async fn execute(&self, task: &mut Sleep) -> Result<(), TaskError> {
        tokio::time::sleep(Duration::from_millis(task.ms)).await;
        task.slept = true;
        Ok(())
    }
}

pub struct TickHandler;

#[async_trait]
impl Handler<Tick> for TickHandler {
    async fn execute(&self, task: &mut Tick) -> Result<(), TaskError> {
        task.runs += 1;
        info!(label = %task.label, runs = task.runs, "tick");
        Ok(())
    }
}

pub struct ChainHandler;

#[async_trait]
impl Handler<Chain> for ChainHandler {
    async fn execute(&self, task: &mut Chain) -> Result<(), TaskError> {
        task.s = task.s.to_uppercase();
        Ok(())
    }
}

/// デモ用の handler を全部登録する
pub fn register_all(builder: WorkerBuilder) -> Result<WorkerBuilder, RegistryError> {
    builder
        .register::<Uppercase, _>(UppercaseHandler)?
        .register::<Fail, _>(FailHandler)?
        .register::<Sleep, _>(SleepHandler)?
        .register::<Tick, _>(TickHandler)?
        .register::<Chain, _>(ChainHandler)
}

pub fn descriptors() -> Vec<TaskDescriptor> {
    vec![
        Uppercase::descriptor(),
        Fail::descriptor(),
        Sleep::descriptor(),
        Tick::descriptor(),
        Chain::descriptor(),
    ]
}

pub fn task_types() -> Vec<TaskType> {
    descriptors().into_iter().map(|d| d.task_type).collect()
}

/// 既知のデモ型ならその descriptor、それ以外は依存なしの通常タスク
pub fn descriptor_for(task_type: &str) -> TaskDescriptor {
    descriptors()
        .into_iter()
        .find(|d| d.task_type.as_str() == task_type)
        .unwrap_or_else(|| TaskDescriptor::plain(task_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_for_knows_the_demo_types() {
        assert!(descriptor_for(Tick::TYPE).scheduled);
        assert!(!descriptor_for(Uppercase::TYPE).scheduled);
        assert!(!descriptor_for(Chain::TYPE).dependencies.is_empty());

        let other = descriptor_for("app.other.v1");
        assert_eq!(other, TaskDescriptor::plain("app.other.v1"));
    }

    #[tokio::test]
    async fn sleep_handler_marks_the_task() {
        let mut task = Sleep { ms: 1, slept: false };
        SleepHandler.execute(&mut task).await.unwrap();
        assert!(task.slept);
    }
}
