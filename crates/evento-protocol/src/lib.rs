// evento-protocol: EventoDB wire types and serialization.
//
// Every shape the server puts on the wire (and clients parse back) lives
// here.  Field naming is camelCase throughout; the positional tuple layouts
// of `stream.get` / `category.get` records are frozen v1 contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod codes;
pub mod stream_name;

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Body of the `error` key in a failed RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// One of the string codes in [`codes`].
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Failed RPC responses are `{"error": {...}}` regardless of HTTP status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorEnvelope {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Write path
// ---------------------------------------------------------------------------

/// The event to append, as supplied in `stream.write` arg 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInput {
    #[serde(rename = "type")]
    pub message_type: String,
    /// Opaque JSON object payload.
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Optional third argument of `stream.write`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    /// Client-supplied message id; server generates a UUID when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optimistic concurrency check: current stream version, or -1 for
    /// "stream must not yet exist".  Absent = no expectation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<i64>,
}

/// Successful `stream.write` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub position: i64,
    pub global_position: i64,
}

// ---------------------------------------------------------------------------
// Read options
// ---------------------------------------------------------------------------

/// Optional second argument of `stream.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStreamOptions {
    /// Lowest stream position to include (default 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// When present, takes precedence over `position`: lowest global
    /// position to include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_position: Option<i64>,
    /// Default 1000, hard cap 10000, -1 = unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
}

/// Consumer-group membership for partitioned category reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroup {
    /// Member index in `0..size`.
    pub member: i64,
    pub size: i64,
}

/// Optional second argument of `category.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCategoryOptions {
    /// Lowest global position to include (default 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
    /// Matches messages whose `metadata.correlationStreamName` starts with
    /// `"<value>-"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_group: Option<ConsumerGroup>,
}

/// Optional argument of `stream.last`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageOptions {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

/// Optional argument of `ns.streams`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Resume after this stream name (exclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Record tuples
// ---------------------------------------------------------------------------

/// One `stream.get` result record.
///
/// Serializes as the positional array
/// `[id, type, position, globalPosition, data, metadata, time]`.
/// The ordering is frozen; new fields require a new method, not a new slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord(
    pub String,
    pub String,
    pub i64,
    pub i64,
    pub Value,
    pub Option<Value>,
    pub DateTime<Utc>,
);

impl StreamRecord {
    pub fn id(&self) -> &str {
        &self.0
    }
    pub fn message_type(&self) -> &str {
        &self.1
    }
    pub fn position(&self) -> i64 {
        self.2
    }
    pub fn global_position(&self) -> i64 {
        self.3
    }
    pub fn data(&self) -> &Value {
        &self.4
    }
    pub fn metadata(&self) -> Option<&Value> {
        self.5.as_ref()
    }
    pub fn time(&self) -> DateTime<Utc> {
        self.6
    }
}

/// One `category.get` result record.
///
/// Serializes as the positional array
/// `[id, streamName, type, position, globalPosition, data, metadata, time]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord(
    pub String,
    pub String,
    pub String,
    pub i64,
    pub i64,
    pub Value,
    pub Option<Value>,
    pub DateTime<Utc>,
);

impl CategoryRecord {
    pub fn id(&self) -> &str {
        &self.0
    }
    pub fn stream_name(&self) -> &str {
        &self.1
    }
    pub fn message_type(&self) -> &str {
        &self.2
    }
    pub fn position(&self) -> i64 {
        self.3
    }
    pub fn global_position(&self) -> i64 {
        self.4
    }
    pub fn data(&self) -> &Value {
        &self.5
    }
    pub fn metadata(&self) -> Option<&Value> {
        self.6.as_ref()
    }
    pub fn time(&self) -> DateTime<Utc> {
        self.7
    }
}

// ---------------------------------------------------------------------------
// Namespace administration
// ---------------------------------------------------------------------------

/// Optional second argument of `ns.create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceCreateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Pre-minted token (test fixtures); server mints one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// `ns.create` result.  The raw token appears here and nowhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceCreated {
    pub namespace: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// `ns.delete` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceDeleted {
    pub namespace: String,
    pub deleted_at: DateTime<Utc>,
    pub messages_deleted: i64,
}

/// One `ns.list` / `ns.info` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInfo {
    pub namespace: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
}

/// One `ns.streams` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub stream: String,
    pub version: i64,
    pub last_activity: DateTime<Utc>,
}

/// One `ns.categories` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryInfo {
    pub category: String,
    pub stream_count: i64,
    pub message_count: i64,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// The SSE push notification.  Carries coordinates only, never the payload;
/// recipients fetch the message body via `stream.get` / `category.get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poke {
    pub stream: String,
    pub position: i64,
    pub global_position: i64,
}

/// Global-position sentinel used by client-side fallback polling: a poke
/// with this value means "no server notification, poll unconditionally".
pub const FALLBACK_GLOBAL_POSITION: i64 = -1;

/// SSE event name for pokes.  Other event names and comment frames must be
/// ignored by clients.
pub const POKE_EVENT: &str = "poke";

/// Response header carrying the auto-provisioned token in test mode.
pub const TOKEN_HEADER: &str = "X-EventoDB-Token";

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}
