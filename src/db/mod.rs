use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

use crate::models::EventRecord;
use crate::store::RecordStore;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// SQLite-backed [`RecordStore`]. All statements run on one worker thread.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("webcarbon-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }
}

fn upsert_record(conn: &Connection, key: &str, value: &str, updated_at: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, updated_at],
    )
    .with_context(|| format!("failed to write record '{key}'"))?;
    Ok(())
}

fn insert_event(
    conn: &Connection,
    id: &str,
    timestamp: i64,
    category: &str,
    platform: &str,
    carbon_grams: f64,
    payload: &str,
) -> Result<()> {
    let exists = conn
        .query_row("SELECT 1 FROM events WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?
        .is_some();
    if exists {
        bail!("event {id} already recorded");
    }

    conn.execute(
        "INSERT INTO events (id, timestamp_ms, category, platform, carbon_grams, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, timestamp, category, platform, carbon_grams, payload],
    )
    .with_context(|| "failed to insert event record")?;
    Ok(())
}

fn decode_event(payload: &str) -> Result<EventRecord> {
    serde_json::from_str(payload).context("failed to decode stored event record")
}

#[async_trait]
impl RecordStore for Database {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM records WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read record '{key}'"))?;
            Ok(value)
        })
        .await
    }

    async fn put_raw(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| upsert_record(conn, &key, &value, &Utc::now().to_rfc3339()))
            .await
    }

    async fn append_event(&self, event: &EventRecord) -> Result<()> {
        let payload = serde_json::to_string(event).context("failed to encode event record")?;
        let id = event.id.clone();
        let timestamp = event.timestamp;
        let category = event.category.as_str();
        let platform = event.platform.clone();
        let carbon_grams = event.carbon_grams;

        self.execute(move |conn| {
            insert_event(conn, &id, timestamp, category, &platform, carbon_grams, &payload)
        })
        .await
    }

    async fn commit_event(&self, event: &EventRecord, records: Vec<(String, String)>) -> Result<()> {
        let payload = serde_json::to_string(event).context("failed to encode event record")?;
        let id = event.id.clone();
        let timestamp = event.timestamp;
        let category = event.category.as_str();
        let platform = event.platform.clone();
        let carbon_grams = event.carbon_grams;

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open event transaction")?;

            insert_event(&tx, &id, timestamp, category, &platform, carbon_grams, &payload)?;
            let updated_at = Utc::now().to_rfc3339();
            for (key, value) in &records {
                upsert_record(&tx, key, value, &updated_at)?;
            }

            tx.commit()
                .with_context(|| format!("failed to commit event {id}"))?;
            Ok(())
        })
        .await
    }

    async fn events_between(&self, start_ms: i64, end_ms: i64) -> Result<Vec<EventRecord>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM events
                 WHERE timestamp_ms >= ?1 AND timestamp_ms < ?2
                 ORDER BY timestamp_ms ASC, rowid ASC",
            )?;

            let payloads = stmt
                .query_map(params![start_ms, end_ms], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            payloads.iter().map(|payload| decode_event(payload)).collect()
        })
        .await
    }
}
