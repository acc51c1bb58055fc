//! SQLite TaskStore.
//!
//! The database file is the only thing shared between worker processes.
//! Every state change is a single `UPDATE ... WHERE id = ? AND state = ?`,
//! which SQLite executes atomically under its write lock; WAL mode plus a
//! generous busy timeout keep concurrent pollers from failing on contention.
//!
//! Dependency references are mirrored into `task_links` so the gate can be
//! evaluated inside the candidate query instead of in Rust.
//!
//! # Migrations
//!
//! `sqlx::migrate!("./migrations")` embeds `crates/docket-core/migrations`
//! at compile time; [`SqliteTaskStore::connect`] applies pending ones.
//! Runtime-checked `sqlx::query` is used throughout, so no `DATABASE_URL`
//! is needed to build.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::domain::{
    CategoryFilter, DependencyRefs, DependencyType, Priority, QueueCounts, Schedule, TaskDraft,
    TaskId, TaskRecord, TaskState, TaskType, TaskUpdate,
};
use crate::ports::{IdGenerator, StoreError, StoreResult, SystemClock, TaskStore, UlidGenerator};
use crate::queue::{Selection, SortOrder};

const COLUMNS: &str = "id, task_type, state, priority, category, created_at, updated_at, \
                       run_at, scheduled, interval_us, dependencies, payload, last_error";

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
    ids: Arc<dyn IdGenerator>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL such as `sqlite://docket.db` or
    /// `sqlite::memory:`. An in-memory database lives in a single pooled
    /// connection, so it is only visible to this store.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::backend)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StoreError::backend)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::backend)?;

        info!(url, "sqlite task store ready");
        Ok(Self {
            pool,
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        })
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(us: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::corrupt(format!("timestamp out of range: {us}")))
}

fn decode(row: &SqliteRow) -> StoreResult<TaskRecord> {
    let get_err = |e: sqlx::Error| StoreError::backend(e);

    let id: String = row.try_get("id").map_err(get_err)?;
    let id = TaskId::parse(&id).map_err(|e| StoreError::corrupt(e.to_string()))?;

    let state: String = row.try_get("state").map_err(get_err)?;
    let state = state
        .parse::<TaskState>()
        .map_err(|e| StoreError::corrupt(e.to_string()))?;

    let rank: i64 = row.try_get("priority").map_err(get_err)?;
    let priority = Priority::from_rank(rank)
        .ok_or_else(|| StoreError::corrupt(format!("{id}: priority {rank}")))?;

    let scheduled: i64 = row.try_get("scheduled").map_err(get_err)?;
    let run_at = from_micros(row.try_get("run_at").map_err(get_err)?)?;
    let interval_us: Option<i64> = row.try_get("interval_us").map_err(get_err)?;
    let schedule = (scheduled != 0).then(|| Schedule {
        run_at,
        interval: interval_us.map(|us| Duration::from_micros(us.max(0) as u64)),
    });

    let dependencies: String = row.try_get("dependencies").map_err(get_err)?;
    let dependencies: BTreeMap<String, DependencyRefs> = serde_json::from_str(&dependencies)
        .map_err(|e| StoreError::corrupt(format!("{id}: dependencies: {e}")))?;

    let payload: String = row.try_get("payload").map_err(get_err)?;
    let payload: Value = serde_json::from_str(&payload)
        .map_err(|e| StoreError::corrupt(format!("{id}: payload: {e}")))?;

    let task_type: String = row.try_get("task_type").map_err(get_err)?;

    Ok(TaskRecord {
        id,
        task_type: TaskType::new(task_type),
        state,
        priority,
        category: row.try_get("category").map_err(get_err)?,
        created_at: from_micros(row.try_get("created_at").map_err(get_err)?)?,
        updated_at: from_micros(row.try_get("updated_at").map_err(get_err)?)?,
        schedule,
        dependencies,
        payload,
        last_error: row.try_get("last_error").map_err(get_err)?,
    })
}

fn push_category(qb: &mut QueryBuilder<'_, Sqlite>, category: &CategoryFilter) {
    match category {
        CategoryFilter::Untagged => {
            qb.push(" AND t.category IS NULL");
        }
        CategoryFilter::AnyOf(set) => {
            qb.push(" AND t.category IN (");
            let mut list = qb.separated(", ");
            for c in set {
                list.push_bind(c.clone());
            }
            list.push_unseparated(")");
        }
    }
}

fn push_dependency_gate(qb: &mut QueryBuilder<'_, Sqlite>, field: &str, kind: DependencyType) {
    // links whose target row is gone (purged) drop out of both joins
    match kind {
        DependencyType::Direct | DependencyType::AllOf => {
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM task_links l \
                 JOIN tasks d ON d.id = l.target_id \
                 WHERE l.task_id = t.id AND l.field = ",
            )
            .push_bind(field.to_owned())
            .push(" AND d.state <> 'FINISHED')");
        }
        DependencyType::AnyOf => {
            qb.push(
                " AND (NOT EXISTS (SELECT 1 FROM task_links l \
                 JOIN tasks d ON d.id = l.target_id \
                 WHERE l.task_id = t.id AND l.field = ",
            )
            .push_bind(field.to_owned())
            .push(
                ") OR EXISTS (SELECT 1 FROM task_links l \
                 JOIN tasks d ON d.id = l.target_id \
                 WHERE l.task_id = t.id AND l.field = ",
            )
            .push_bind(field.to_owned())
            .push(" AND d.state = 'FINISHED'))");
        }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, draft: TaskDraft) -> StoreResult<TaskRecord> {
        let id = self.ids.task_id().as_ulid().to_string();
        let run_at = draft.schedule.map(|s| s.run_at).unwrap_or(draft.created_at);
        let interval_us = draft
            .schedule
            .and_then(|s| s.interval)
            .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX));
        let dependencies = serde_json::to_string(&draft.dependencies).map_err(StoreError::backend)?;
        let payload = serde_json::to_string(&draft.payload).map_err(StoreError::backend)?;

        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let sql = format!(
            "INSERT INTO tasks ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8, ?9, ?10, ?11, NULL) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&id)
            .bind(draft.task_type.as_str())
            .bind(TaskState::Created.as_str())
            .bind(draft.priority.rank())
            .bind(draft.category.as_deref())
            .bind(to_micros(draft.created_at))
            .bind(to_micros(run_at))
            .bind(i64::from(draft.schedule.is_some()))
            .bind(interval_us)
            .bind(&dependencies)
            .bind(&payload)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

        for (field, refs) in &draft.dependencies {
            for (position, target) in refs.targets().iter().enumerate() {
                sqlx::query(
                    "INSERT INTO task_links (task_id, field, position, target_id) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(&id)
                .bind(field)
                .bind(position as i64)
                .bind(target.as_ulid().to_string())
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;
            }
        }

        tx.commit().await.map_err(StoreError::backend)?;
        decode(&row)
    }

    async fn get(&self, id: TaskId) -> StoreResult<Option<TaskRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.as_ulid().to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_first(&self, selection: &Selection) -> StoreResult<Option<TaskRecord>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {COLUMNS} FROM tasks t WHERE t.state = 'CREATED' AND t.task_type = "
        ));
        qb.push_bind(selection.task_type.as_str().to_owned());
        push_category(&mut qb, &selection.category);
        if let Some(now) = selection.due_at {
            qb.push(" AND t.run_at <= ").push_bind(to_micros(now));
        }
        for field in selection.dependencies.fields() {
            push_dependency_gate(&mut qb, &field.name, field.kind);
        }
        qb.push(match selection.order() {
            SortOrder::Priority => " ORDER BY t.priority DESC, t.created_at ASC, t.id ASC",
            SortOrder::DueTime => {
                " ORDER BY t.run_at ASC, t.priority DESC, t.created_at ASC, t.id ASC"
            }
        });
        qb.push(" LIMIT 1");

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.as_ref().map(decode).transpose()
    }

    async fn conditional_update(
        &self,
        id: TaskId,
        expected: TaskState,
        update: TaskUpdate,
    ) -> StoreResult<Option<TaskRecord>> {
        let payload = update
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::backend)?;

        let sql = format!(
            "UPDATE tasks SET state = ?1, updated_at = ?2, \
             payload = COALESCE(?3, payload), last_error = COALESCE(?4, last_error) \
             WHERE id = ?5 AND state = ?6 \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(update.state.as_str())
            .bind(to_micros(update.updated_at))
            .bind(payload)
            .bind(update.last_error)
            .bind(id.as_ulid().to_string())
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;

        if row.is_none() {
            debug!(task_id = %id, expected = %expected, "conditional update matched no row");
        }
        row.as_ref().map(decode).transpose()
    }

    async fn exists_created(
        &self,
        task_type: &TaskType,
        category: &CategoryFilter,
    ) -> StoreResult<bool> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT EXISTS (SELECT 1 FROM tasks t WHERE t.state = 'CREATED' AND t.task_type = ",
        );
        qb.push_bind(task_type.as_str().to_owned());
        push_category(&mut qb, category);
        qb.push(")");

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        let found: i64 = row.try_get(0).map_err(StoreError::backend)?;
        Ok(found != 0)
    }

    async fn counts(&self, task_type: Option<&TaskType>) -> StoreResult<QueueCounts> {
        let rows = match task_type {
            Some(t) => {
                sqlx::query(
                    "SELECT state, COUNT(*) AS n FROM tasks WHERE task_type = ?1 GROUP BY state",
                )
                .bind(t.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT state, COUNT(*) AS n FROM tasks GROUP BY state")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(StoreError::backend)?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let state: String = row.try_get("state").map_err(StoreError::backend)?;
            let n: i64 = row.try_get("n").map_err(StoreError::backend)?;
            let state = state
                .parse::<TaskState>()
                .map_err(|e| StoreError::corrupt(e.to_string()))?;
            counts.add(state, n.max(0) as u64);
        }
        Ok(counts)
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE state IN ('FINISHED', 'FAILED') AND created_at < ?1",
        )
        .bind(to_micros(older_than))
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }
}
