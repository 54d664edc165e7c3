use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use evento_protocol::{codes, ErrorEnvelope};
use evento_store::StoreError;

/// RPC failures keep HTTP 200; the body shape is the contract.
pub fn rpc_error(code: impl Into<String>, message: impl Into<String>) -> Response {
    (StatusCode::OK, Json(ErrorEnvelope::new(code, message))).into_response()
}

/// Non-RPC endpoints (the SSE handshake) carry a real status code with the
/// same envelope body.
pub fn status_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    (status, Json(ErrorEnvelope::new(code, message))).into_response()
}

pub fn store_error(err: &StoreError) -> Response {
    let code = err.wire_code();
    if code == codes::INTERNAL {
        tracing::error!(error = %err, "internal storage error");
        rpc_error(code, "internal error")
    } else {
        rpc_error(code, err.to_string())
    }
}
