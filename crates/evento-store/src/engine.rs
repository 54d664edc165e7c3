//! The append-only message engine.
//!
//! One SQLite database per namespace under `<root>/namespaces/<id>.db`,
//! located through the registry.  Each open namespace holds two connections:
//! a writer guarded by a mutex (the namespace write barrier — position and
//! global-position assignment serialize on it) and a WAL reader for
//! non-blocking scans.
//!
//! # SQLite durability settings
//! Applied at open: WAL, synchronous=FULL, foreign_keys=ON, busy_timeout 5s.
//! PRAGMA integrity_check runs at open; returns error if it fails.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use evento_protocol::{GetCategoryOptions, GetStreamOptions, StreamsQuery, WriteResult};
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use evento_protocol::stream_name;

use crate::error::{StoreError, StoreResult};
use crate::registry::{NamespaceRecord, NamespaceRegistry};
use crate::token;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const DEFAULT_BATCH_SIZE: i64 = 1000;
const MAX_BATCH_SIZE: i64 = 10_000;

/// Scan granularity for category reads that filter after the range scan.
const FILTER_SCAN_CHUNK: i64 = 1000;

/// Attempts for writes that hit SQLITE_BUSY before surfacing INTERNAL.
const BUSY_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A stored message, read back from a namespace log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub stream_name: String,
    pub message_type: String,
    pub position: i64,
    pub global_position: i64,
    pub data: Value,
    pub metadata: Option<Value>,
    pub time: DateTime<Utc>,
}

/// A message to append.  Position, global position, and time are assigned by
/// the engine.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// UUID text, or `None` for a server-generated id.
    pub id: Option<String>,
    pub message_type: String,
    pub data: Value,
    pub metadata: Option<Value>,
}

/// A message to import with caller-supplied coordinates.
#[derive(Debug, Clone)]
pub struct ImportedMessage {
    pub id: String,
    pub stream_name: String,
    pub message_type: String,
    pub position: i64,
    pub global_position: i64,
    pub data: Value,
    pub metadata: Option<Value>,
    pub time: DateTime<Utc>,
}

/// One `list_streams` row.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    pub stream: String,
    pub version: i64,
    pub last_activity: DateTime<Utc>,
}

/// One `list_categories` row.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    pub category: String,
    pub stream_count: i64,
    pub message_count: i64,
}

// ---------------------------------------------------------------------------
// MessageStore
// ---------------------------------------------------------------------------

/// The multi-namespace message store.
///
/// Shared across request handlers; all methods take `&self`.  Writes to the
/// same namespace serialize on that namespace's writer mutex; writes to
/// different namespaces run in parallel.
pub struct MessageStore {
    root: PathBuf,
    registry: Mutex<NamespaceRegistry>,
    handles: RwLock<HashMap<String, Arc<NamespaceHandle>>>,
}

struct NamespaceHandle {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl NamespaceHandle {
    fn open(path: &Path) -> StoreResult<Self> {
        let writer = open_namespace_db(path)?;
        let reader = open_namespace_db(path)?;
        Ok(NamespaceHandle {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }
}

impl MessageStore {
    /// Open the store rooted at `root`, creating the directory layout and
    /// registry database as needed.
    pub fn open(root: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(root.join("namespaces"))?;
        let registry = NamespaceRegistry::open(&root.join("registry.db"))?;
        Ok(MessageStore {
            root: root.to_owned(),
            registry: Mutex::new(registry),
            handles: RwLock::new(HashMap::new()),
        })
    }

    // -----------------------------------------------------------------------
    // Namespace lifecycle
    // -----------------------------------------------------------------------

    /// Create a namespace and return its record plus the raw bearer token.
    ///
    /// The raw token is returned exactly once, here; only its hash persists.
    pub fn create_namespace(
        &self,
        id: &str,
        description: Option<&str>,
        supplied_token: Option<&str>,
    ) -> StoreResult<(NamespaceRecord, String)> {
        let raw_token = match supplied_token {
            Some(t) => t.to_owned(),
            None => token::mint(id),
        };
        let db_path = self.namespace_db_path(id);
        let record = {
            let registry = self.registry.lock().unwrap();
            registry.create(id, description, &raw_token, &db_path)?
        };
        // A leftover file from a crashed delete must not leak old messages
        // into the new namespace.
        remove_namespace_files(&db_path)?;
        let handle = Arc::new(NamespaceHandle::open(&db_path)?);
        self.handles
            .write()
            .unwrap()
            .insert(id.to_owned(), handle);
        info!(ns = %id, "namespace created");
        Ok((record, raw_token))
    }

    /// Delete a namespace: registry row and physical database, synchronously.
    ///
    /// Returns the record and the number of messages destroyed.
    pub fn delete_namespace(&self, id: &str) -> StoreResult<(NamespaceRecord, i64)> {
        let messages_deleted = self.message_count(id)?;
        let record = {
            let registry = self.registry.lock().unwrap();
            registry.delete(id)?
        };
        self.handles.write().unwrap().remove(id);
        remove_namespace_files(&record.db_path)?;
        info!(ns = %id, messages = messages_deleted, "namespace deleted");
        Ok((record, messages_deleted))
    }

    pub fn get_namespace(&self, id: &str) -> StoreResult<NamespaceRecord> {
        self.registry.lock().unwrap().get(id)
    }

    pub fn list_namespaces(&self) -> StoreResult<Vec<NamespaceRecord>> {
        self.registry.lock().unwrap().list()
    }

    /// Resolve a raw bearer token to its namespace id.
    pub fn resolve_token(&self, raw_token: &str) -> StoreResult<Option<String>> {
        self.registry.lock().unwrap().resolve_token(raw_token)
    }

    /// Apply the current schema to the registry and every namespace database.
    /// Idempotent; returns the number of namespace databases touched.
    pub fn migrate(&self) -> StoreResult<usize> {
        let records = self.list_namespaces()?;
        for record in &records {
            // Opening applies pragmas and the idempotent schema.
            let _ = open_namespace_db(&record.db_path)?;
        }
        Ok(records.len())
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Append a message to a stream.
    ///
    /// Assigns `position = version + 1` and the next namespace-wide global
    /// position atomically.  With `expected_version` set, fails with a
    /// version conflict unless it equals the current stream version
    /// (absent = -1).
    pub fn write_message(
        &self,
        ns: &str,
        stream: &str,
        msg: NewMessage,
        expected_version: Option<i64>,
    ) -> StoreResult<WriteResult> {
        if stream.is_empty() {
            return Err(StoreError::InvalidArgument(
                "stream name must not be empty".to_owned(),
            ));
        }
        if let Some(expected) = expected_version {
            if expected < -1 {
                return Err(StoreError::InvalidArgument(
                    "expectedVersion must be >= -1".to_owned(),
                ));
            }
        }
        if !msg.data.is_object() {
            return Err(StoreError::InvalidArgument(
                "data must be a JSON object".to_owned(),
            ));
        }
        if let Some(metadata) = &msg.metadata {
            if !metadata.is_object() {
                return Err(StoreError::InvalidArgument(
                    "metadata must be a JSON object".to_owned(),
                ));
            }
        }
        let id = match &msg.id {
            Some(id) => {
                Uuid::parse_str(id).map_err(|_| {
                    StoreError::InvalidArgument("message id must be a UUID".to_owned())
                })?;
                id.clone()
            }
            None => Uuid::new_v4().to_string(),
        };

        let handle = self.handle(ns)?;
        let mut attempts = 0;
        loop {
            let mut writer = handle.writer.lock().unwrap();
            let result = write_message_tx(&mut writer, stream, &id, &msg, expected_version);
            match result {
                Err(StoreError::Sqlite(e)) if is_busy(&e) && attempts < BUSY_RETRIES => {
                    drop(writer);
                    attempts += 1;
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                other => return other,
            }
        }
    }

    /// Insert messages with caller-supplied positions (idempotent import).
    ///
    /// Fails with `POSITION_EXISTS` when any `(stream, position)` or global
    /// position is already occupied; nothing is inserted in that case.  The
    /// namespace's global-position counter resumes above the imported
    /// maximum.
    pub fn import_batch(&self, ns: &str, messages: &[ImportedMessage]) -> StoreResult<usize> {
        for msg in messages {
            if msg.stream_name.is_empty() || msg.id.is_empty() {
                return Err(StoreError::InvalidArgument(
                    "imported messages need a stream name and id".to_owned(),
                ));
            }
            if msg.position < 0 || msg.global_position < 0 {
                return Err(StoreError::InvalidArgument(
                    "imported positions must be >= 0".to_owned(),
                ));
            }
            if !msg.data.is_object() {
                return Err(StoreError::InvalidArgument(
                    "data must be a JSON object".to_owned(),
                ));
            }
        }
        let handle = self.handle(ns)?;
        let mut writer = handle.writer.lock().unwrap();
        let tx = writer.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut max_gp = -1;
        for msg in messages {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO messages
                     (global_position, id, stream_name, category, type, position, data, metadata, time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    msg.global_position,
                    msg.id,
                    msg.stream_name,
                    stream_name::category(&msg.stream_name),
                    msg.message_type,
                    msg.position,
                    serde_json::to_string(&msg.data)?,
                    msg.metadata.as_ref().map(serde_json::to_string).transpose()?,
                    format_time(msg.time),
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::PositionExists {
                    stream: msg.stream_name.clone(),
                    position: msg.position,
                });
            }
            max_gp = max_gp.max(msg.global_position);
        }
        tx.execute(
            "UPDATE global_counter SET next_position = max(next_position, ?1)",
            params![max_gp + 1],
        )?;
        tx.commit()?;
        debug!(ns = %ns, count = messages.len(), "batch imported");
        Ok(messages.len())
    }

    // -----------------------------------------------------------------------
    // Read paths
    // -----------------------------------------------------------------------

    /// Messages of one stream, ascending by position.
    ///
    /// Starts at `opts.position` (default 0); when `opts.global_position` is
    /// present it takes precedence and the filter becomes
    /// `global_position >= value`.
    pub fn get_stream_messages(
        &self,
        ns: &str,
        stream: &str,
        opts: &GetStreamOptions,
    ) -> StoreResult<Vec<Message>> {
        let limit = effective_batch_size(opts.batch_size)?;
        let handle = self.handle(ns)?;
        let reader = handle.reader.lock().unwrap();
        let mut stmt = match opts.global_position {
            Some(_) => reader.prepare(
                "SELECT global_position, id, stream_name, type, position, data, metadata, time
                 FROM messages
                 WHERE stream_name = ?1 AND global_position >= ?2
                 ORDER BY position ASC
                 LIMIT ?3",
            )?,
            None => reader.prepare(
                "SELECT global_position, id, stream_name, type, position, data, metadata, time
                 FROM messages
                 WHERE stream_name = ?1 AND position >= ?2
                 ORDER BY position ASC
                 LIMIT ?3",
            )?,
        };
        let from = opts.global_position.or(opts.position).unwrap_or(0);
        let rows = stmt.query_map(params![stream, from, limit], map_raw)?;
        collect_messages(rows)
    }

    /// Messages across all streams of a category, ascending by global
    /// position, starting at `opts.position` (a global position; default 0).
    ///
    /// The correlation and consumer-group filters apply after the range
    /// scan, so a full batch means `batch_size` *matching* messages.
    pub fn get_category_messages(
        &self,
        ns: &str,
        category_name: &str,
        opts: &GetCategoryOptions,
    ) -> StoreResult<Vec<Message>> {
        if category_name.contains('-') {
            return Err(StoreError::InvalidArgument(
                "category must not contain a hyphen (stream name given?)".to_owned(),
            ));
        }
        if let Some(group) = &opts.consumer_group {
            if group.size < 1 || group.member < 0 || group.member >= group.size {
                return Err(StoreError::InvalidArgument(
                    "consumerGroup requires size >= 1 and member in 0..size".to_owned(),
                ));
            }
        }
        let limit = effective_batch_size(opts.batch_size)?;
        let handle = self.handle(ns)?;
        let reader = handle.reader.lock().unwrap();

        let unfiltered = opts.correlation.is_none() && opts.consumer_group.is_none();
        let mut stmt = reader.prepare(
            "SELECT global_position, id, stream_name, type, position, data, metadata, time
             FROM messages
             WHERE category = ?1 AND global_position >= ?2
             ORDER BY global_position ASC
             LIMIT ?3",
        )?;

        let mut from = opts.position.unwrap_or(0);
        if unfiltered {
            let rows = stmt.query_map(params![category_name, from, limit], map_raw)?;
            return collect_messages(rows);
        }

        // Filtered scan: walk the category in chunks of global positions,
        // keeping matches until the batch fills or the category is exhausted.
        let mut out = Vec::new();
        'scan: loop {
            let rows = stmt.query_map(params![category_name, from, FILTER_SCAN_CHUNK], map_raw)?;
            let mut scanned = 0usize;
            for raw in rows {
                let message = finish_message(raw?)?;
                scanned += 1;
                from = message.global_position + 1;
                if !passes_filters(&message, opts) {
                    continue;
                }
                out.push(message);
                if out.len() as i64 >= limit {
                    break 'scan;
                }
            }
            if (scanned as i64) < FILTER_SCAN_CHUNK {
                break;
            }
        }
        Ok(out)
    }

    /// The highest-position message of a stream, optionally filtered by type.
    pub fn get_last_stream_message(
        &self,
        ns: &str,
        stream: &str,
        type_filter: Option<&str>,
    ) -> StoreResult<Option<Message>> {
        let handle = self.handle(ns)?;
        let reader = handle.reader.lock().unwrap();
        let raw = match type_filter {
            Some(t) => reader
                .query_row(
                    "SELECT global_position, id, stream_name, type, position, data, metadata, time
                     FROM messages
                     WHERE stream_name = ?1 AND type = ?2
                     ORDER BY position DESC
                     LIMIT 1",
                    params![stream, t],
                    map_raw,
                )
                .optional()?,
            None => reader
                .query_row(
                    "SELECT global_position, id, stream_name, type, position, data, metadata, time
                     FROM messages
                     WHERE stream_name = ?1
                     ORDER BY position DESC
                     LIMIT 1",
                    params![stream],
                    map_raw,
                )
                .optional()?,
        };
        raw.map(finish_message).transpose()
    }

    /// Current stream version: max position, or `None` when the stream has
    /// no messages.
    pub fn get_stream_version(&self, ns: &str, stream: &str) -> StoreResult<Option<i64>> {
        let handle = self.handle(ns)?;
        let reader = handle.reader.lock().unwrap();
        let version = reader
            .query_row(
                "SELECT MAX(position) FROM messages WHERE stream_name = ?1",
                params![stream],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
        Ok(version)
    }

    /// Total messages in a namespace.
    pub fn message_count(&self, ns: &str) -> StoreResult<i64> {
        let handle = self.handle(ns)?;
        let reader = handle.reader.lock().unwrap();
        let count =
            reader.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Streams in a namespace, ordered by name, with version and last write
    /// time.  `cursor` resumes after the named stream (exclusive).
    pub fn list_streams(&self, ns: &str, query: &StreamsQuery) -> StoreResult<Vec<StreamSummary>> {
        let limit = effective_batch_size(query.limit)?;
        let prefix = query.prefix.as_deref().unwrap_or("");
        let cursor = query.cursor.as_deref().unwrap_or("");
        let handle = self.handle(ns)?;
        let reader = handle.reader.lock().unwrap();
        let mut stmt = reader.prepare(
            "SELECT stream_name, MAX(position), MAX(time)
             FROM messages
             WHERE substr(stream_name, 1, length(?1)) = ?1 AND stream_name > ?2
             GROUP BY stream_name
             ORDER BY stream_name ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![prefix, cursor, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (stream, version, time) = row?;
            out.push(StreamSummary {
                stream,
                version,
                last_activity: parse_time(&time)?,
            });
        }
        Ok(out)
    }

    /// Categories in a namespace with stream and message counts.
    pub fn list_categories(&self, ns: &str) -> StoreResult<Vec<CategorySummary>> {
        let handle = self.handle(ns)?;
        let reader = handle.reader.lock().unwrap();
        let mut stmt = reader.prepare(
            "SELECT category, COUNT(DISTINCT stream_name), COUNT(*)
             FROM messages
             GROUP BY category
             ORDER BY category ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CategorySummary {
                category: row.get(0)?,
                stream_count: row.get(1)?,
                message_count: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn namespace_db_path(&self, id: &str) -> PathBuf {
        self.root.join("namespaces").join(format!("{id}.db"))
    }

    fn handle(&self, ns: &str) -> StoreResult<Arc<NamespaceHandle>> {
        {
            let handles = self.handles.read().unwrap();
            if let Some(handle) = handles.get(ns) {
                return Ok(handle.clone());
            }
        }
        let record = self.get_namespace(ns)?;
        let mut handles = self.handles.write().unwrap();
        if let Some(handle) = handles.get(ns) {
            return Ok(handle.clone());
        }
        let handle = Arc::new(NamespaceHandle::open(&record.db_path)?);
        handles.insert(ns.to_owned(), handle.clone());
        Ok(handle)
    }
}

/// The write transaction: version check, position assignment, insert.
fn write_message_tx(
    conn: &mut Connection,
    stream: &str,
    id: &str,
    msg: &NewMessage,
    expected_version: Option<i64>,
) -> StoreResult<WriteResult> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let head: Option<(i64, String)> = tx
        .query_row(
            "SELECT position, time FROM messages
             WHERE stream_name = ?1
             ORDER BY position DESC
             LIMIT 1",
            params![stream],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let version = head.as_ref().map_or(-1, |(p, _)| *p);

    if let Some(expected) = expected_version {
        if expected != version {
            return Err(StoreError::VersionConflict {
                stream: stream.to_owned(),
                expected,
                actual: version,
            });
        }
    }

    let global_position: i64 = tx.query_row(
        "SELECT next_position FROM global_counter WHERE id = 0",
        [],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE global_counter SET next_position = next_position + 1",
        [],
    )?;

    let position = version + 1;
    // Wall clock, clamped so `time` never decreases within a stream.
    let mut time = Utc::now().trunc_subsecs(6);
    if let Some((_, head_time)) = &head {
        let head_time = parse_time(head_time)?;
        if time < head_time {
            time = head_time;
        }
    }

    tx.execute(
        "INSERT INTO messages
             (global_position, id, stream_name, category, type, position, data, metadata, time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            global_position,
            id,
            stream,
            stream_name::category(stream),
            msg.message_type,
            position,
            serde_json::to_string(&msg.data)?,
            msg.metadata.as_ref().map(serde_json::to_string).transpose()?,
            format_time(time),
        ],
    )?;
    tx.commit()?;

    Ok(WriteResult {
        position,
        global_position,
    })
}

fn passes_filters(message: &Message, opts: &GetCategoryOptions) -> bool {
    if let Some(correlation) = &opts.correlation {
        if !stream_name::correlation_matches(message.metadata.as_ref(), correlation) {
            return false;
        }
    }
    if let Some(group) = &opts.consumer_group {
        if stream_name::group_member(&message.stream_name, group.size) != group.member {
            return false;
        }
    }
    true
}

fn effective_batch_size(batch_size: Option<i64>) -> StoreResult<i64> {
    match batch_size {
        None => Ok(DEFAULT_BATCH_SIZE),
        Some(-1) => Ok(i64::MAX),
        Some(n) if n < -1 => Err(StoreError::InvalidArgument(
            "batchSize must be >= -1".to_owned(),
        )),
        Some(n) => Ok(n.min(MAX_BATCH_SIZE)),
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

fn open_namespace_db(path: &Path) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA foreign_keys=ON;",
    )?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    let check: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if check != "ok" {
        return Err(StoreError::IntegrityCheckFailed(check));
    }
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(conn)
}

fn remove_namespace_files(db_path: &Path) -> StoreResult<()> {
    match std::fs::remove_file(db_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    for suffix in ["-wal", "-shm"] {
        let mut sidecar = db_path.as_os_str().to_owned();
        sidecar.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(sidecar));
    }
    Ok(())
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(text: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .map_err(|e| StoreError::InvalidArgument(format!("corrupt timestamp: {e}")))?
        .with_timezone(&Utc))
}

type RawMessage = (
    i64,
    String,
    String,
    String,
    i64,
    String,
    Option<String>,
    String,
);

fn map_raw(row: &rusqlite::Row<'_>) -> Result<RawMessage, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn finish_message(raw: RawMessage) -> StoreResult<Message> {
    let (global_position, id, stream_name, message_type, position, data, metadata, time) = raw;
    Ok(Message {
        id,
        stream_name,
        message_type,
        position,
        global_position,
        data: serde_json::from_str(&data)?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        time: parse_time(&time)?,
    })
}

fn collect_messages(
    rows: impl Iterator<Item = Result<RawMessage, rusqlite::Error>>,
) -> StoreResult<Vec<Message>> {
    let mut out = Vec::new();
    for raw in rows {
        out.push(finish_message(raw?)?);
    }
    Ok(out)
}
