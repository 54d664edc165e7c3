//! Typed RPC client over `POST /rpc`.
//!
//! Each method serializes the positional-array call, sends it with the
//! client's bearer token, and parses either the result value or the error
//! envelope.  Transport-level failures surface as `NETWORK_ERROR`.

use evento_protocol::{
    CategoryRecord, ErrorEnvelope, GetCategoryOptions, GetStreamOptions, HealthStatus,
    LastMessageOptions, MessageInput, NamespaceCreateOptions, NamespaceCreated, NamespaceDeleted,
    NamespaceInfo, StreamInfo, StreamRecord, StreamsQuery, WriteOptions, WriteResult,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{ClientError, ClientResult};

/// An EventoDB connection: base URL plus bearer token.
///
/// Cheap to clone; the underlying HTTP client pools connections.
#[derive(Debug, Clone)]
pub struct EventoClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl EventoClient {
    /// `base_url` without a trailing slash, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        EventoClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The same connection authenticated with a different token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        EventoClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Stream methods
    // -----------------------------------------------------------------------

    pub async fn write_message(
        &self,
        stream: &str,
        input: &MessageInput,
        opts: &WriteOptions,
    ) -> ClientResult<WriteResult> {
        self.call(json!(["stream.write", stream, input, opts])).await
    }

    pub async fn get_stream(
        &self,
        stream: &str,
        opts: &GetStreamOptions,
    ) -> ClientResult<Vec<StreamRecord>> {
        self.call(json!(["stream.get", stream, opts])).await
    }

    pub async fn get_last_message(
        &self,
        stream: &str,
        message_type: Option<&str>,
    ) -> ClientResult<Option<StreamRecord>> {
        let opts = LastMessageOptions {
            message_type: message_type.map(str::to_owned),
        };
        self.call(json!(["stream.last", stream, opts])).await
    }

    pub async fn stream_version(&self, stream: &str) -> ClientResult<Option<i64>> {
        self.call(json!(["stream.version", stream])).await
    }

    pub async fn get_category(
        &self,
        category: &str,
        opts: &GetCategoryOptions,
    ) -> ClientResult<Vec<CategoryRecord>> {
        self.call(json!(["category.get", category, opts])).await
    }

    // -----------------------------------------------------------------------
    // Namespace methods
    // -----------------------------------------------------------------------

    pub async fn create_namespace(
        &self,
        id: &str,
        opts: &NamespaceCreateOptions,
    ) -> ClientResult<NamespaceCreated> {
        self.call(json!(["ns.create", id, opts])).await
    }

    pub async fn delete_namespace(&self, id: &str) -> ClientResult<NamespaceDeleted> {
        self.call(json!(["ns.delete", id])).await
    }

    pub async fn list_namespaces(&self) -> ClientResult<Vec<NamespaceInfo>> {
        self.call(json!(["ns.list"])).await
    }

    pub async fn namespace_info(&self, id: &str) -> ClientResult<NamespaceInfo> {
        self.call(json!(["ns.info", id])).await
    }

    pub async fn list_streams(&self, query: &StreamsQuery) -> ClientResult<Vec<StreamInfo>> {
        self.call(json!(["ns.streams", query])).await
    }

    pub async fn list_categories(&self) -> ClientResult<Vec<evento_protocol::CategoryInfo>> {
        self.call(json!(["ns.categories"])).await
    }

    // -----------------------------------------------------------------------
    // System methods
    // -----------------------------------------------------------------------

    pub async fn server_version(&self) -> ClientResult<String> {
        self.call(json!(["sys.version"])).await
    }

    pub async fn health(&self) -> ClientResult<HealthStatus> {
        self.call(json!(["sys.health"])).await
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    async fn call<T: DeserializeOwned>(&self, args: Value) -> ClientResult<T> {
        let mut request = self.http.post(format!("{}/rpc", self.base_url)).json(&args);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let value: Value = response.json().await?;
        if value.get("error").is_some() {
            let envelope: ErrorEnvelope = serde_json::from_value(value)
                .map_err(|e| ClientError::Protocol(format!("unparseable error envelope: {e}")))?;
            return Err(ClientError::Api {
                code: envelope.error.code,
                message: envelope.error.message,
            });
        }
        serde_json::from_value(value)
            .map_err(|e| ClientError::Protocol(format!("unexpected result shape: {e}")))
    }
}
