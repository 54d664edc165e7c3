//! The `/rpc` dispatcher.
//!
//! One POST endpoint, positional-array JSON body `[method, arg1, ...]`.
//! Success returns the method's value; failure returns
//! `{"error": {code, message}}` — both HTTP 200, the body shape is the
//! contract.  Method names form a closed set; anything else is
//! `UNKNOWN_METHOD`.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use evento_protocol::{
    codes, CategoryInfo, CategoryRecord, GetCategoryOptions, GetStreamOptions, HealthStatus,
    LastMessageOptions, MessageInput, NamespaceCreateOptions, NamespaceCreated, NamespaceDeleted,
    NamespaceInfo, Poke, StreamInfo, StreamRecord, StreamsQuery, WriteOptions, TOKEN_HEADER,
};
use evento_store::{Message, NewMessage};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::{self, AuthError, NamespaceAuth};
use crate::response::{rpc_error, store_error};
use crate::state::AppState;

pub async fn rpc_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let call: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return rpc_error(codes::INVALID_ARGUMENT, format!("malformed JSON body: {e}")),
    };
    let Some(args) = call.as_array() else {
        return rpc_error(
            codes::INVALID_ARGUMENT,
            "body must be a positional array [method, args...]",
        );
    };
    let Some(method) = args.first().and_then(Value::as_str) else {
        return rpc_error(codes::INVALID_ARGUMENT, "first element must be the method name");
    };
    let token = auth::extract_bearer(&headers);
    debug!(method, "rpc call");

    match method {
        // System methods: no auth.
        "sys.version" => Json(json!(env!("CARGO_PKG_VERSION"))).into_response(),
        "sys.health" => Json(HealthStatus {
            status: "ok".to_owned(),
        })
        .into_response(),

        // Namespace administration: admin token.
        "ns.create" | "ns.delete" | "ns.list" | "ns.info" => {
            if let Err(e) = auth::require_admin(&state, token) {
                return auth_error(e);
            }
            match dispatch_admin(&state, method, args).await {
                Ok(value) => Json(value).into_response(),
                Err(response) => response,
            }
        }

        // Namespace-scoped methods: bearer token (or test-mode provisioning).
        "stream.write" | "stream.get" | "stream.last" | "stream.version" | "category.get"
        | "ns.streams" | "ns.categories" => {
            let (ns, minted) = match auth::resolve_namespace(&state, token).await {
                Ok(NamespaceAuth::Namespace(ns)) => (ns, None),
                Ok(NamespaceAuth::Provisioned { namespace, token }) => (namespace, Some(token)),
                Err(e) => return auth_error(e),
            };
            let mut response = match dispatch_namespace(&state, &ns, method, args).await {
                Ok(value) => Json(value).into_response(),
                Err(response) => response,
            };
            if let Some(token) = minted {
                if let Ok(header) = HeaderValue::from_str(&token) {
                    response.headers_mut().insert(TOKEN_HEADER, header);
                }
            }
            response
        }

        other => rpc_error(codes::UNKNOWN_METHOD, format!("no such method: {other}")),
    }
}

fn auth_error(err: AuthError) -> Response {
    match err {
        AuthError::Required => rpc_error(codes::AUTH_REQUIRED, "missing bearer token"),
        AuthError::Invalid => rpc_error(codes::AUTH_INVALID, "unknown or malformed token"),
        AuthError::Internal(message) => {
            tracing::error!(error = %message, "auth resolution failed");
            rpc_error(codes::INTERNAL, "internal error")
        }
    }
}

// ---------------------------------------------------------------------------
// Method dispatch
// ---------------------------------------------------------------------------

async fn dispatch_namespace(
    state: &AppState,
    ns: &str,
    method: &str,
    args: &[Value],
) -> Result<Value, Response> {
    match method {
        "stream.write" => {
            let stream: String = required_arg(args, 1, "stream")?;
            let input: MessageInput = required_arg(args, 2, "message")?;
            let opts: WriteOptions = optional_arg(args, 3)?;
            let msg = NewMessage {
                id: opts.id,
                message_type: input.message_type,
                data: input.data,
                metadata: input.metadata,
            };
            let result = state
                .store
                .write_message(ns, &stream, msg, opts.expected_version)
                .map_err(|e| store_error(&e))?;
            state
                .publish_poke(
                    ns,
                    Poke {
                        stream,
                        position: result.position,
                        global_position: result.global_position,
                    },
                )
                .await;
            Ok(serde_json::to_value(result).map_err(internal)?)
        }
        "stream.get" => {
            let stream: String = required_arg(args, 1, "stream")?;
            let opts: GetStreamOptions = optional_arg(args, 2)?;
            let messages = state
                .store
                .get_stream_messages(ns, &stream, &opts)
                .map_err(|e| store_error(&e))?;
            let records: Vec<StreamRecord> = messages.into_iter().map(stream_record).collect();
            Ok(serde_json::to_value(records).map_err(internal)?)
        }
        "stream.last" => {
            let stream: String = required_arg(args, 1, "stream")?;
            let opts: LastMessageOptions = optional_arg(args, 2)?;
            let message = state
                .store
                .get_last_stream_message(ns, &stream, opts.message_type.as_deref())
                .map_err(|e| store_error(&e))?;
            Ok(serde_json::to_value(message.map(stream_record)).map_err(internal)?)
        }
        "stream.version" => {
            let stream: String = required_arg(args, 1, "stream")?;
            let version = state
                .store
                .get_stream_version(ns, &stream)
                .map_err(|e| store_error(&e))?;
            Ok(serde_json::to_value(version).map_err(internal)?)
        }
        "category.get" => {
            let category: String = required_arg(args, 1, "category")?;
            let opts: GetCategoryOptions = optional_arg(args, 2)?;
            let messages = state
                .store
                .get_category_messages(ns, &category, &opts)
                .map_err(|e| store_error(&e))?;
            let records: Vec<CategoryRecord> = messages.into_iter().map(category_record).collect();
            Ok(serde_json::to_value(records).map_err(internal)?)
        }
        "ns.streams" => {
            let query: StreamsQuery = optional_arg(args, 1)?;
            let streams = state
                .store
                .list_streams(ns, &query)
                .map_err(|e| store_error(&e))?;
            let rows: Vec<StreamInfo> = streams
                .into_iter()
                .map(|s| StreamInfo {
                    stream: s.stream,
                    version: s.version,
                    last_activity: s.last_activity,
                })
                .collect();
            Ok(serde_json::to_value(rows).map_err(internal)?)
        }
        "ns.categories" => {
            let categories = state
                .store
                .list_categories(ns)
                .map_err(|e| store_error(&e))?;
            let rows: Vec<CategoryInfo> = categories
                .into_iter()
                .map(|c| CategoryInfo {
                    category: c.category,
                    stream_count: c.stream_count,
                    message_count: c.message_count,
                })
                .collect();
            Ok(serde_json::to_value(rows).map_err(internal)?)
        }
        _ => unreachable!("routed methods only"),
    }
}

async fn dispatch_admin(
    state: &AppState,
    method: &str,
    args: &[Value],
) -> Result<Value, Response> {
    match method {
        "ns.create" => {
            let id: String = required_arg(args, 1, "namespace id")?;
            let opts: NamespaceCreateOptions = optional_arg(args, 2)?;
            let (record, raw_token) = state
                .store
                .create_namespace(&id, opts.description.as_deref(), opts.token.as_deref())
                .map_err(|e| store_error(&e))?;
            Ok(serde_json::to_value(NamespaceCreated {
                namespace: record.id,
                token: raw_token,
                created_at: record.created_at,
            })
            .map_err(internal)?)
        }
        "ns.delete" => {
            let id: String = required_arg(args, 1, "namespace id")?;
            let (record, messages_deleted) = state
                .store
                .delete_namespace(&id)
                .map_err(|e| store_error(&e))?;
            state.drop_topic(&record.id).await;
            Ok(serde_json::to_value(NamespaceDeleted {
                namespace: record.id,
                deleted_at: chrono::Utc::now(),
                messages_deleted,
            })
            .map_err(internal)?)
        }
        "ns.list" => {
            let records = state.store.list_namespaces().map_err(|e| store_error(&e))?;
            let mut rows = Vec::with_capacity(records.len());
            for record in records {
                let message_count = state
                    .store
                    .message_count(&record.id)
                    .map_err(|e| store_error(&e))?;
                rows.push(NamespaceInfo {
                    namespace: record.id,
                    description: record.description,
                    created_at: record.created_at,
                    message_count,
                });
            }
            Ok(serde_json::to_value(rows).map_err(internal)?)
        }
        "ns.info" => {
            let id: String = required_arg(args, 1, "namespace id")?;
            let record = state.store.get_namespace(&id).map_err(|e| store_error(&e))?;
            let message_count = state
                .store
                .message_count(&record.id)
                .map_err(|e| store_error(&e))?;
            Ok(serde_json::to_value(NamespaceInfo {
                namespace: record.id,
                description: record.description,
                created_at: record.created_at,
                message_count,
            })
            .map_err(internal)?)
        }
        _ => unreachable!("routed methods only"),
    }
}

// ---------------------------------------------------------------------------
// Argument helpers and record mapping
// ---------------------------------------------------------------------------

fn required_arg<T: DeserializeOwned>(args: &[Value], index: usize, name: &str) -> Result<T, Response> {
    let Some(value) = args.get(index) else {
        return Err(rpc_error(
            codes::INVALID_ARGUMENT,
            format!("missing argument {index}: {name}"),
        ));
    };
    serde_json::from_value(value.clone()).map_err(|e| {
        rpc_error(
            codes::INVALID_ARGUMENT,
            format!("invalid argument {index} ({name}): {e}"),
        )
    })
}

fn optional_arg<T: DeserializeOwned + Default>(args: &[Value], index: usize) -> Result<T, Response> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            rpc_error(
                codes::INVALID_ARGUMENT,
                format!("invalid argument {index}: {e}"),
            )
        }),
    }
}

fn internal(err: serde_json::Error) -> Response {
    tracing::error!(error = %err, "response serialization failed");
    rpc_error(codes::INTERNAL, "internal error")
}

fn stream_record(m: Message) -> StreamRecord {
    StreamRecord(
        m.id,
        m.message_type,
        m.position,
        m.global_position,
        m.data,
        m.metadata,
        m.time,
    )
}

fn category_record(m: Message) -> CategoryRecord {
    CategoryRecord(
        m.id,
        m.stream_name,
        m.message_type,
        m.position,
        m.global_position,
        m.data,
        m.metadata,
        m.time,
    )
}
