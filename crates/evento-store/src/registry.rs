//! Namespace registry: id → token hash, description, database locator.
//!
//! Lives in its own SQLite file (`registry.db`) at the data-directory root.
//! The registry owns namespace *metadata* only; message storage belongs to
//! the engine, which locates each namespace's database via `db_path`.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::token;

const SCHEMA_SQL: &str = include_str!("registry_schema.sql");

/// A registered namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceRecord {
    pub id: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub db_path: PathBuf,
}

/// The registry handle.  Callers serialize access externally (the engine
/// keeps it behind a lock); create/delete are single-statement atomic.
pub struct NamespaceRegistry {
    conn: Connection,
}

impl NamespaceRegistry {
    /// Open (or create) the registry database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(NamespaceRegistry { conn })
    }

    /// Register a namespace and return its record.
    ///
    /// `token` must be a token minted for `id` (the caller mints one when the
    /// client did not supply its own).  Fails with `NAMESPACE_EXISTS` when
    /// the id is already registered.
    pub fn create(
        &self,
        id: &str,
        description: Option<&str>,
        token: &str,
        db_path: &Path,
    ) -> StoreResult<NamespaceRecord> {
        validate_id(id)?;
        if token::parse_namespace_id(token).as_deref() != Some(id) {
            return Err(StoreError::InvalidArgument(
                "token does not embed this namespace id".to_owned(),
            ));
        }
        let created_at = Utc::now().trunc_subsecs(6);
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO namespaces (id, token_hash, description, created_at, db_path)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                token::hash(token),
                description,
                format_time(created_at),
                db_path.to_string_lossy().as_ref(),
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::NamespaceExists(id.to_owned()));
        }
        Ok(NamespaceRecord {
            id: id.to_owned(),
            description: description.map(str::to_owned),
            created_at,
            db_path: db_path.to_owned(),
        })
    }

    /// Remove a namespace row.  The engine releases the physical storage.
    pub fn delete(&self, id: &str) -> StoreResult<NamespaceRecord> {
        let record = self.get(id)?;
        self.conn
            .execute("DELETE FROM namespaces WHERE id = ?1", params![id])?;
        Ok(record)
    }

    pub fn get(&self, id: &str) -> StoreResult<NamespaceRecord> {
        self.try_get(id)?
            .ok_or_else(|| StoreError::NamespaceNotFound(id.to_owned()))
    }

    pub fn try_get(&self, id: &str) -> StoreResult<Option<NamespaceRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, description, created_at, db_path FROM namespaces WHERE id = ?1",
                params![id],
                map_record,
            )
            .optional()?;
        row.map(finish_record).transpose()
    }

    pub fn list(&self) -> StoreResult<Vec<NamespaceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, description, created_at, db_path FROM namespaces ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], map_record)?;
        let mut records = Vec::new();
        for r in rows {
            records.push(finish_record(r?)?);
        }
        Ok(records)
    }

    /// Resolve a raw bearer token to the namespace it authenticates.
    ///
    /// Returns `None` for malformed tokens and for tokens whose hash does not
    /// match any registered namespace — callers cannot distinguish the two.
    pub fn resolve_token(&self, raw_token: &str) -> StoreResult<Option<String>> {
        if token::parse_namespace_id(raw_token).is_none() {
            return Ok(None);
        }
        let hash = token::hash(raw_token);
        let id = self
            .conn
            .query_row(
                "SELECT id FROM namespaces WHERE token_hash = ?1",
                params![hash],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(id)
    }
}

fn validate_id(id: &str) -> StoreResult<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(StoreError::InvalidArgument(
            "namespace id must be 1-64 characters".to_owned(),
        ));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(StoreError::InvalidArgument(
            "namespace id must be [A-Za-z0-9_-]".to_owned(),
        ));
    }
    Ok(())
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

type RawRecord = (String, Option<String>, String, String);

fn map_record(row: &rusqlite::Row<'_>) -> Result<RawRecord, rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn finish_record(raw: RawRecord) -> StoreResult<NamespaceRecord> {
    let (id, description, created_at, db_path) = raw;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| StoreError::InvalidArgument(format!("corrupt created_at: {e}")))?
        .with_timezone(&Utc);
    Ok(NamespaceRecord {
        id,
        description,
        created_at,
        db_path: PathBuf::from(db_path),
    })
}

fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA foreign_keys=ON;",
    )?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

fn run_integrity_check(conn: &Connection) -> StoreResult<()> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(StoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}
