//! The client kit's local SQLite state: outbox rows and consumer
//! checkpoints.  Host applications share one `ClientDb` (usually behind
//! `Arc<tokio::sync::Mutex<_>>`) between their business code, the outbox
//! worker, and consumers.

use chrono::{SecondsFormat, Utc};
use evento_protocol::WriteOptions;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

use crate::error::{ClientError, ClientResult};

const SCHEMA_SQL: &str = include_str!("kit_schema.sql");

/// An event staged for publication.
#[derive(Debug, Clone)]
pub struct StagedEvent {
    pub namespace: String,
    pub stream: String,
    pub message_type: String,
    pub data: Value,
    pub metadata: Option<Value>,
    pub write_options: WriteOptions,
    /// Repeat submissions with the same key return the original row id.
    pub idempotency_key: Option<String>,
}

/// An outbox row awaiting (or after) publication.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: i64,
    pub namespace: String,
    pub stream: String,
    pub message_type: String,
    pub data: Value,
    pub metadata: Option<Value>,
    pub write_options: WriteOptions,
}

pub struct ClientDb {
    conn: Connection,
}

impl ClientDb {
    pub fn open(path: &Path) -> ClientResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> ClientResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ClientResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=FULL;
             PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(ClientDb { conn })
    }

    // -----------------------------------------------------------------------
    // Outbox
    // -----------------------------------------------------------------------

    /// Stage an event; returns its outbox row id.
    ///
    /// With an idempotency key that has been staged before, no new row is
    /// inserted and the original row's id is returned.
    pub fn stage(&self, event: &StagedEvent) -> ClientResult<i64> {
        let inserted = self.conn.execute(
            "INSERT INTO outbox
                 (namespace, stream, type, data, metadata, write_options, inserted_at, idempotency_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (idempotency_key) DO NOTHING",
            params![
                event.namespace,
                event.stream,
                event.message_type,
                serde_json::to_string(&event.data)?,
                event.metadata.as_ref().map(serde_json::to_string).transpose()?,
                serde_json::to_string(&event.write_options)?,
                now(),
                event.idempotency_key,
            ],
        )?;
        if inserted > 0 {
            return Ok(self.conn.last_insert_rowid());
        }
        // Idempotency-key hit: hand back the original row.
        let key = event
            .idempotency_key
            .as_deref()
            .ok_or_else(|| ClientError::Protocol("conflict without idempotency key".to_owned()))?;
        let id = self.conn.query_row(
            "SELECT id FROM outbox WHERE idempotency_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Unsent rows in staging order.
    pub fn pending(&self, limit: i64) -> ClientResult<Vec<OutboxRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, namespace, stream, type, data, metadata, write_options
             FROM outbox
             WHERE sent_at IS NULL
             ORDER BY inserted_at ASC, id ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, namespace, stream, message_type, data, metadata, write_options) = row?;
            out.push(OutboxRow {
                id,
                namespace,
                stream,
                message_type,
                data: serde_json::from_str(&data)?,
                metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
                write_options: write_options
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?
                    .unwrap_or_default(),
            });
        }
        Ok(out)
    }

    pub fn mark_sent(&self, id: i64) -> ClientResult<()> {
        self.conn.execute(
            "UPDATE outbox SET sent_at = ?2 WHERE id = ?1 AND sent_at IS NULL",
            params![id, now()],
        )?;
        Ok(())
    }

    pub fn unsent_count(&self) -> ClientResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM outbox WHERE sent_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Consumer checkpoints
    // -----------------------------------------------------------------------

    /// Last processed global position, or `None` for a fresh consumer.
    pub fn position(
        &self,
        namespace: &str,
        category: &str,
        consumer_id: &str,
    ) -> ClientResult<Option<i64>> {
        let position = self
            .conn
            .query_row(
                "SELECT position FROM consumer_positions
                 WHERE namespace = ?1 AND category = ?2 AND consumer_id = ?3",
                params![namespace, category, consumer_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(position)
    }

    /// Move the checkpoint forward.  Never moves it backward.
    pub fn advance_position(
        &self,
        namespace: &str,
        category: &str,
        consumer_id: &str,
        position: i64,
    ) -> ClientResult<()> {
        self.conn.execute(
            "INSERT INTO consumer_positions (namespace, category, consumer_id, position, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (namespace, category, consumer_id) DO UPDATE
             SET position = excluded.position, updated_at = excluded.updated_at
             WHERE excluded.position > consumer_positions.position",
            params![namespace, category, consumer_id, position, now()],
        )?;
        Ok(())
    }

    pub fn is_processed(&self, consumer_id: &str, event_id: &str) -> ClientResult<bool> {
        let row: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM processed_events WHERE consumer_id = ?1 AND event_id = ?2",
                params![consumer_id, event_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    /// Record a handled event and advance the checkpoint in one transaction.
    pub fn record_processed(
        &mut self,
        namespace: &str,
        category: &str,
        consumer_id: &str,
        event_id: &str,
        position: i64,
    ) -> ClientResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO processed_events (consumer_id, event_id, processed_at)
             VALUES (?1, ?2, ?3)",
            params![consumer_id, event_id, now()],
        )?;
        tx.execute(
            "INSERT INTO consumer_positions (namespace, category, consumer_id, position, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (namespace, category, consumer_id) DO UPDATE
             SET position = excluded.position, updated_at = excluded.updated_at
             WHERE excluded.position > consumer_positions.position",
            params![namespace, category, consumer_id, position, now()],
        )?;
        tx.commit()?;
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
