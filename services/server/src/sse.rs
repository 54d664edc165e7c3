//! `GET /subscribe` — the SSE poke channel.
//!
//! Subscribers name either a stream or a category (optionally partitioned by
//! consumer group).  The server pushes `event: poke` frames carrying
//! coordinates only; it never replays history — the `position` parameter is
//! accepted for symmetry with the read calls but catch-up happens through
//! `stream.get` / `category.get`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
};
use evento_protocol::{codes, stream_name, Poke, POKE_EVENT};
use serde::Deserialize;
use std::time::Duration;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::debug;

use crate::response::status_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    pub stream: Option<String>,
    pub category: Option<String>,
    /// Informational starting position; the server does not replay.
    #[allow(dead_code)]
    pub position: Option<i64>,
    pub consumer: Option<i64>,
    pub size: Option<i64>,
    pub token: Option<String>,
}

/// What a subscription listens for.
///
/// With neither `stream` nor `category` given, the subscription is
/// namespace-wide: every poke in the namespace.  Shared client hubs use this
/// form to multiplex one connection across many consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Namespace,
    Stream(String),
    Category {
        name: String,
        group: Option<(i64, i64)>,
    },
}

impl Target {
    fn from_params(params: &SubscribeParams) -> Result<Target, String> {
        let group = match (params.consumer, params.size) {
            (None, None) => None,
            (Some(member), Some(size)) => {
                if size < 1 || member < 0 || member >= size {
                    return Err("consumer/size require size >= 1 and consumer in 0..size".into());
                }
                Some((member, size))
            }
            _ => return Err("consumer and size must be provided together".into()),
        };
        match (&params.stream, &params.category) {
            (Some(_), Some(_)) => Err("stream and category are mutually exclusive".into()),
            (Some(stream), None) => {
                if group.is_some() {
                    return Err("consumer groups apply to category subscriptions only".into());
                }
                Ok(Target::Stream(stream.clone()))
            }
            (None, Some(name)) => Ok(Target::Category {
                name: name.clone(),
                group,
            }),
            (None, None) => {
                if group.is_some() {
                    return Err("consumer groups apply to category subscriptions only".into());
                }
                Ok(Target::Namespace)
            }
        }
    }

    fn matches(&self, poke: &Poke) -> bool {
        match self {
            Target::Namespace => true,
            Target::Stream(name) => poke.stream == *name,
            Target::Category { name, group } => {
                if stream_name::category(&poke.stream) != name.as_str() {
                    return false;
                }
                match group {
                    Some((member, size)) => {
                        stream_name::group_member(&poke.stream, *size) == *member
                    }
                    None => true,
                }
            }
        }
    }
}

pub async fn subscribe_handler(
    State(state): State<AppState>,
    Query(params): Query<SubscribeParams>,
) -> Response {
    let Some(token) = params.token.as_deref() else {
        return status_error(
            StatusCode::UNAUTHORIZED,
            codes::AUTH_REQUIRED,
            "missing token query parameter",
        );
    };
    let ns = match state.store.resolve_token(token) {
        Ok(Some(ns)) => ns,
        Ok(None) => {
            return status_error(
                StatusCode::UNAUTHORIZED,
                codes::AUTH_INVALID,
                "unknown or malformed token",
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "token resolution failed");
            return status_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                "internal error",
            );
        }
    };
    let target = match Target::from_params(&params) {
        Ok(target) => target,
        Err(message) => {
            return status_error(StatusCode::BAD_REQUEST, codes::INVALID_ARGUMENT, message)
        }
    };
    debug!(ns = %ns, ?target, "subscription opened");

    let rx = state.topic(&ns).await.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(poke) if target.matches(&poke) => match serde_json::to_string(&poke) {
            Ok(json) => Some(Ok::<_, std::convert::Infallible>(
                Event::default().event(POKE_EVENT).data(json),
            )),
            Err(_) => None,
        },
        Ok(_) => None,
        Err(lagged) => {
            // Dropped pokes are fine; subscribers recover by polling.
            debug!(error = %lagged, "subscriber lagged, pokes dropped");
            None
        }
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}
