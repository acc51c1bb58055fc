//! Worker processes spawned from the real `docket` binary share one SQLite
//! file and drain it together.

use std::time::Duration;

use docket_core::app::{Docket, PushOptions, Runner, WorkerCommand};
use docket_core::domain::{DependencySchema, TaskState, TaskType};
use docket_core::typed::TaskDescriptor;
use serde_json::json;

fn worker_command(store_url: &str) -> WorkerCommand {
    WorkerCommand::new(env!("CARGO_BIN_EXE_docket"))
        .args(["--store-url", store_url, "worker", "--idle-ms", "50"])
        .env("RUST_LOG", "warn")
}

async fn wait_until_drained(docket: &Docket, expected_terminal: u64) {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let counts = docket.counts(None).await.unwrap();
            if counts.finished + counts.failed >= expected_terminal && counts.is_drained() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("worker processes did not drain the queue");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_processes_drain_a_shared_store() {
    let dir = tempfile::tempdir().unwrap();
    let store_url = format!("sqlite://{}", dir.path().join("docket.db").display());
    let docket = Docket::connect(&store_url).await.unwrap();

    let uppercase = TaskDescriptor::plain("demo.uppercase.v1");
    let mut ids = Vec::new();
    for i in 0..20 {
        let record = docket
            .push_json(&uppercase, json!({ "s": format!("task {i}") }), PushOptions::new())
            .await
            .unwrap();
        ids.push(record.id);
    }
    let failing = docket
        .push_json(
            &TaskDescriptor::plain("demo.fail.v1"),
            json!({ "reason": "on purpose" }),
            PushOptions::new(),
        )
        .await
        .unwrap();

    let mut runner = Runner::new(worker_command(&store_url), 2)
        .with_status_interval(Duration::from_millis(100));
    runner.start().await.unwrap();
    assert_eq!(runner.pids().len(), 2);

    wait_until_drained(&docket, 21).await;
    runner.stop().await.unwrap();
    assert!(!runner.is_alive());

    for (i, id) in ids.iter().enumerate() {
        let record = docket.get(*id).await.unwrap().unwrap();
        assert_eq!(record.state, TaskState::Finished);
        assert_eq!(record.payload, json!({ "s": format!("TASK {i}") }));
    }
    let failed = docket.get(failing.id).await.unwrap().unwrap();
    assert_eq!(failed.state, TaskState::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("on purpose"));

    let uppercase_counts = docket
        .counts(Some(&TaskType::new("demo.uppercase.v1")))
        .await
        .unwrap();
    assert_eq!(uppercase_counts.finished, 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn chained_task_runs_after_its_parent() {
    let dir = tempfile::tempdir().unwrap();
    let store_url = format!("sqlite://{}", dir.path().join("docket.db").display());
    let docket = Docket::connect(&store_url).await.unwrap();

    let parent = docket
        .push_json(
            &TaskDescriptor::plain("demo.sleep.v1"),
            json!({ "ms": 200 }),
            PushOptions::new(),
        )
        .await
        .unwrap();
    let chain = TaskDescriptor::plain("demo.chain.v1")
        .with_dependencies(DependencySchema::new().direct("parent"));
    let child = docket
        .push_json(
            &chain,
            json!({ "s": "after", "parent": parent.id.to_string() }),
            PushOptions::new(),
        )
        .await
        .unwrap();

    let mut runner = Runner::new(worker_command(&store_url), 2);
    runner.start().await.unwrap();
    wait_until_drained(&docket, 2).await;
    runner.stop().await.unwrap();

    let parent = docket.get(parent.id).await.unwrap().unwrap();
    let child = docket.get(child.id).await.unwrap().unwrap();
    assert_eq!(child.state, TaskState::Finished);
    assert_eq!(child.payload["s"], json!("AFTER"));
    assert!(child.updated_at >= parent.updated_at);
}
