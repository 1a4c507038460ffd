//! Response construction and error-to-status mapping.
//!
//! Clients always get a JSON body for failures: specific messages for 4xx,
//! and a deliberately generic `{"error":"Internal Error"}` for 5xx with the
//! real cause logged server-side only.

use blobstack_core::{ObjectData, StoreError};
use http::{StatusCode, header};
use serde::Serialize;
use tracing::error;

use crate::body::ResponseBody;

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable failure description.
    pub error: String,
}

/// JSON body carrying a created or affected object id.
#[derive(Debug, Serialize)]
pub struct IdResponse {
    /// The object id.
    pub id: String,
}

/// JSON body carrying a freshly minted presigned URL.
#[derive(Debug, Serialize)]
pub struct PresignedUrlResponse {
    /// Relative URL embedding the capability token.
    pub url: String,
}

/// Build a JSON response with the given status.
pub fn json(status: StatusCode, payload: &impl Serialize) -> http::Response<ResponseBody> {
    match serde_json::to_vec(payload) {
        Ok(body) => http::Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(ResponseBody::from_bytes(body))
            .unwrap_or_else(|_| fallback_internal_error()),
        Err(e) => {
            error!(error = %e, "failed to serialize response payload");
            fallback_internal_error()
        }
    }
}

/// Build a status-only response with an empty body.
#[must_use]
pub fn empty(status: StatusCode) -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(status)
        .body(ResponseBody::empty())
        .unwrap_or_else(|_| fallback_internal_error())
}

/// Build a JSON error response with the given status and message.
pub fn fail(status: StatusCode, message: impl Into<String>) -> http::Response<ResponseBody> {
    json(
        status,
        &ErrorResponse {
            error: message.into(),
        },
    )
}

/// 404 with a JSON body.
#[must_use]
pub fn not_found() -> http::Response<ResponseBody> {
    fail(StatusCode::NOT_FOUND, "Not Found")
}

/// 405 with a JSON body.
#[must_use]
pub fn method_not_allowed() -> http::Response<ResponseBody> {
    fail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// 500: log the real cause, return a generic body.
pub fn internal_error(err: &dyn std::fmt::Display) -> http::Response<ResponseBody> {
    error!(error = %err, "internal server error");
    fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal Error")
}

/// Map a store failure to a response, for handlers with no more specific
/// message to attach.
#[must_use]
pub fn store_error(err: &StoreError) -> http::Response<ResponseBody> {
    match err {
        StoreError::NotExist => not_found(),
        StoreError::AlreadyExists => fail(StatusCode::BAD_REQUEST, err.to_string()),
        other => internal_error(other),
    }
}

/// 200 carrying blob bytes, with the inferred content type when known.
#[must_use]
pub fn object(data: ObjectData) -> http::Response<ResponseBody> {
    let mut builder = http::Response::builder().status(StatusCode::OK);
    if let Some(content_type) = data.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder
        .body(ResponseBody::from_bytes(data.bytes))
        .unwrap_or_else(|_| fallback_internal_error())
}

/// Last-resort response when a builder itself fails.
fn fallback_internal_error() -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(ResponseBody::empty())
        .expect("static response should be valid")
}
