//! Operation handlers: the bridge from resolved routes to store, codec, and
//! event-bus calls.
//!
//! Every handler returns a complete response; error mapping follows one
//! rule: unknown things are 404, caller mistakes (duplicates, bad tokens,
//! stale links, malformed payloads) are 400, scope violations are 403, and
//! everything else is a logged 500 with a generic body.

use std::path::Path;

use blobstack_core::StoreError;
use blobstack_auth::{CapabilityToken, Permission};
use bytes::Bytes;
use chrono::{Duration, Utc};
use http::StatusCode;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::body::ResponseBody;
use crate::events::ObjectEvent;
use crate::multipart;
use crate::response::{self, IdResponse, PresignedUrlResponse};
use crate::router::{self, Route, RouteError};
use crate::service::AppState;

/// Resolve and dispatch one request.
pub fn handle_request(
    state: &AppState,
    parts: &http::request::Parts,
    body: Bytes,
) -> http::Response<ResponseBody> {
    match router::resolve(&parts.method, parts.uri.path()) {
        Ok(route) => dispatch(state, route, parts, body),
        Err(RouteError::NotFound) => response::not_found(),
        Err(RouteError::MethodNotAllowed) => response::method_not_allowed(),
    }
}

fn dispatch(
    state: &AppState,
    route: Route,
    parts: &http::request::Parts,
    body: Bytes,
) -> http::Response<ResponseBody> {
    match route {
        Route::ListObjects => list_objects(state),
        Route::GetObject(id) => get_object(state, &id),
        Route::CreateObject => create_object(state, parts, &body),
        Route::CopyObject(id) => copy_object(state, &id),
        Route::OverwriteObject(id) => update_object(state, &id, &body, true),
        Route::AppendObject(id) => update_object(state, &id, &body, false),
        Route::DeleteObject(id) => delete_object(state, &id),
        Route::CreatePresigned => create_presigned(state, &body),
        Route::PresignedWrite(token) => presigned_write(state, &token, &body),
        Route::PresignedRead(token) => presigned_read(state, &token),
        Route::Events => events_stream(state),
        Route::PublishCreated(id) => publish_created(state, &id),
    }
}

// ---------------------------------------------------------------------------
// Object lifecycle
// ---------------------------------------------------------------------------

fn list_objects(state: &AppState) -> http::Response<ResponseBody> {
    match state.store.list() {
        Ok(records) => response::json(StatusCode::OK, &records),
        Err(e) => response::store_error(&e),
    }
}

fn get_object(state: &AppState, id: &str) -> http::Response<ResponseBody> {
    match state.store.read(id) {
        Ok(data) => response::object(data),
        Err(e) => response::store_error(&e),
    }
}

fn create_object(
    state: &AppState,
    parts: &http::request::Parts,
    body: &Bytes,
) -> http::Response<ResponseBody> {
    let content_type = parts
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let boundary = match multipart::extract_boundary(content_type) {
        Ok(b) => b,
        Err(e) => {
            return response::fail(
                StatusCode::BAD_REQUEST,
                format!("error while parsing multipart: {e}"),
            );
        }
    };
    let form = match multipart::parse_upload(body, &boundary) {
        Ok(f) => f,
        Err(e) => {
            return response::fail(
                StatusCode::BAD_REQUEST,
                format!("malformed request payload: {e}"),
            );
        }
    };

    // Only the base name is honored; clients do not pick directories.
    let Some(base) = Path::new(&form.file_name).file_name() else {
        return response::fail(StatusCode::BAD_REQUEST, "invalid file name");
    };
    let dest = state.data_dir.join(base);

    match state.store.create(dest, &form.file_data) {
        Ok(record) => {
            state.events.publish(ObjectEvent::file_created(&record.id));
            response::json(StatusCode::CREATED, &IdResponse { id: record.id })
        }
        Err(StoreError::AlreadyExists) => response::fail(
            StatusCode::BAD_REQUEST,
            format!(
                "file with name '{}' already exists",
                base.to_string_lossy()
            ),
        ),
        Err(e) => response::store_error(&e),
    }
}

fn copy_object(state: &AppState, id: &str) -> http::Response<ResponseBody> {
    match state.store.copy(id) {
        Ok(record) => response::json(StatusCode::OK, &record),
        Err(e) => response::store_error(&e),
    }
}

fn update_object(
    state: &AppState,
    id: &str,
    body: &Bytes,
    overwrite: bool,
) -> http::Response<ResponseBody> {
    match state.store.update(id, body, overwrite) {
        Ok(()) => response::empty(StatusCode::OK),
        Err(e) => response::store_error(&e),
    }
}

fn delete_object(state: &AppState, id: &str) -> http::Response<ResponseBody> {
    match state.store.delete(id) {
        Ok(()) => response::empty(StatusCode::OK),
        Err(e) => response::store_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Presigned URLs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePresignedRequest {
    path: String,
    /// Token lifetime in seconds.
    expiry_length: u64,
    #[serde(default)]
    permission: Option<Permission>,
}

fn create_presigned(state: &AppState, body: &Bytes) -> http::Response<ResponseBody> {
    let request: CreatePresignedRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            return response::fail(
                StatusCode::BAD_REQUEST,
                format!("failed to parse request: {e}"),
            );
        }
    };
    let Ok(seconds) = i64::try_from(request.expiry_length) else {
        return response::fail(StatusCode::BAD_REQUEST, "expiryLength out of range");
    };

    let token = CapabilityToken {
        path: request.path,
        expiry: Utc::now() + Duration::seconds(seconds),
        permission: request.permission,
    };
    match blobstack_auth::encode(&state.secret, &token) {
        Ok(encoded) => response::json(
            StatusCode::OK,
            &PresignedUrlResponse {
                url: format!("/pre-signed/{encoded}"),
            },
        ),
        Err(e) => response::internal_error(&e),
    }
}

/// Decode + freshness-check a wire token, or produce the error response.
fn verify_token(
    state: &AppState,
    encoded: &str,
) -> Result<CapabilityToken, http::Response<ResponseBody>> {
    let token = match blobstack_auth::decode(&state.secret, encoded) {
        Ok(t) => t,
        Err(e) => {
            debug!(error = %e, "rejected presigned token");
            return Err(response::fail(StatusCode::BAD_REQUEST, "invalid signature"));
        }
    };
    if let Err(e) = token.check_fresh(Utc::now()) {
        debug!(error = %e, "rejected presigned token");
        return Err(response::fail(StatusCode::BAD_REQUEST, "link expired"));
    }
    Ok(token)
}

fn presigned_write(
    state: &AppState,
    encoded: &str,
    body: &Bytes,
) -> http::Response<ResponseBody> {
    let token = match verify_token(state, encoded) {
        Ok(t) => t,
        Err(response) => return response,
    };
    if token.permission == Some(Permission::Read) {
        return response::fail(
            StatusCode::FORBIDDEN,
            "signed url does not support writing",
        );
    }

    let dest = state.data_dir.join(&token.path);
    match state.store.upsert(dest, body) {
        Ok((record, created)) => {
            if created {
                state.events.publish(ObjectEvent::file_created(&record.id));
            }
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            response::json(status, &IdResponse { id: record.id })
        }
        Err(e) => response::store_error(&e),
    }
}

fn presigned_read(state: &AppState, encoded: &str) -> http::Response<ResponseBody> {
    let token = match verify_token(state, encoded) {
        Ok(t) => t,
        Err(response) => return response,
    };
    if token.permission == Some(Permission::Write) {
        return response::fail(
            StatusCode::FORBIDDEN,
            "signed url does not support reading",
        );
    }

    let path = state.data_dir.join(&token.path);
    let record = match state.store.find_by_path(path) {
        Ok(r) => r,
        Err(e) => return response::store_error(&e),
    };
    match state.store.read(&record.id) {
        Ok(data) => response::object(data),
        Err(e) => response::store_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn events_stream(state: &AppState) -> http::Response<ResponseBody> {
    let (history, mut live) = state.events.subscribe();
    let (tx, rx) = mpsc::channel::<Bytes>(16);

    // Relay history, then live events, until the client hangs up.
    tokio::spawn(async move {
        for event in history {
            if tx.send(event.to_frame()).await.is_err() {
                return;
            }
        }
        loop {
            match live.recv().await {
                Ok(event) => {
                    if tx.send(event.to_frame()).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, dropping events");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });

    http::Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "text/event-stream")
        .header(http::header::CACHE_CONTROL, "no-cache")
        .body(ResponseBody::Event(rx))
        .unwrap_or_else(|_| response::internal_error(&"failed to build event stream"))
}

fn publish_created(state: &AppState, id: &str) -> http::Response<ResponseBody> {
    match state.store.get(id) {
        Ok(record) => {
            state.events.publish(ObjectEvent::file_created(&record.id));
            response::empty(StatusCode::OK)
        }
        Err(e) => response::store_error(&e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use blobstack_core::MetadataStore;
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";

    struct Fixture {
        _dir: tempfile::TempDir,
        state: Arc<AppState>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MetadataStore::new();
        store
            .initialize(dir.path().join("metadata.log"))
            .expect("initialize");
        let state = Arc::new(AppState::new(store, SECRET.to_vec(), dir.path()));
        Fixture { _dir: dir, state }
    }

    fn request(method: &str, path: &str) -> http::request::Parts {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(path)
            .body(())
            .expect("request")
            .into_parts();
        parts
    }

    fn multipart_request(path: &str) -> http::request::Parts {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "multipart/form-data; boundary=xyzzy")
            .body(())
            .expect("request")
            .into_parts();
        parts
    }

    fn upload_body(file_name: &str, content: &str) -> Bytes {
        Bytes::from(format!(
            "--xyzzy\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             \r\n\
             {content}\r\n\
             --xyzzy--\r\n"
        ))
    }

    async fn body_bytes(response: http::Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn body_json(response: http::Response<ResponseBody>) -> Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    /// Upload `content` as `file_name`, returning the new object id.
    async fn create(f: &Fixture, file_name: &str, content: &str) -> String {
        let response = handle_request(
            &f.state,
            &multipart_request("/objects/"),
            upload_body(file_name, content),
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        json["id"].as_str().expect("id").to_owned()
    }

    // -----------------------------------------------------------------------
    // Object lifecycle over HTTP
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_create_and_fetch_object() {
        let f = fixture();
        let id = create(&f, "hello.txt", "hello").await;

        let response = handle_request(&f.state, &request("GET", &format!("/objects/{id}")), Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(http::header::CONTENT_TYPE)
                .unwrap(),
            "text/plain"
        );
        assert_eq!(body_bytes(response).await.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_should_list_created_objects() {
        let f = fixture();
        let id = create(&f, "a.txt", "a").await;

        let response = handle_request(&f.state, &request("GET", "/objects/"), Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let records = json.as_array().expect("array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], Value::String(id));
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_upload() {
        let f = fixture();
        create(&f, "a.txt", "one").await;

        let response = handle_request(
            &f.state,
            &multipart_request("/objects/"),
            upload_body("a.txt", "two"),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn test_should_reject_non_multipart_upload() {
        let f = fixture();
        let response = handle_request(
            &f.state,
            &request("POST", "/objects/"),
            Bytes::from("raw bytes"),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_should_return_404_for_unknown_object() {
        let f = fixture();
        for (method, path) in [
            ("GET", "/objects/ghost"),
            ("PUT", "/objects/ghost"),
            ("PATCH", "/objects/ghost"),
            ("DELETE", "/objects/ghost"),
            ("POST", "/objects/ghost/copy"),
        ] {
            let response = handle_request(&f.state, &request(method, path), Bytes::new());
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {path}");
        }
    }

    #[tokio::test]
    async fn test_should_overwrite_and_append_content() {
        let f = fixture();
        let id = create(&f, "a.txt", "hello").await;

        let response = handle_request(
            &f.state,
            &request("PATCH", &format!("/objects/{id}")),
            Bytes::from("!"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            f.state.store.read(&id).unwrap().bytes.as_ref(),
            b"hello!"
        );

        let response = handle_request(
            &f.state,
            &request("PUT", &format!("/objects/{id}")),
            Bytes::from("fresh"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(f.state.store.read(&id).unwrap().bytes.as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn test_should_copy_object() {
        let f = fixture();
        let id = create(&f, "a.txt", "content").await;

        let response = handle_request(
            &f.state,
            &request("POST", &format!("/objects/{id}/copy")),
            Bytes::new(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let copy_id = json["id"].as_str().unwrap();
        assert_ne!(copy_id, id);
        assert_eq!(
            f.state.store.read(copy_id).unwrap().bytes.as_ref(),
            b"content"
        );
    }

    #[tokio::test]
    async fn test_should_delete_object() {
        let f = fixture();
        let id = create(&f, "a.txt", "x").await;

        let response = handle_request(
            &f.state,
            &request("DELETE", &format!("/objects/{id}")),
            Bytes::new(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert!(f.state.store.get(&id).is_err());
    }

    #[tokio::test]
    async fn test_should_return_404_for_unknown_route() {
        let f = fixture();
        let response = handle_request(&f.state, &request("GET", "/nope"), Bytes::new());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // -----------------------------------------------------------------------
    // Presigned flow
    // -----------------------------------------------------------------------

    /// Mint a token URL via the handler, returning the raw token.
    async fn mint_token(f: &Fixture, body: &str) -> String {
        let response = handle_request(
            &f.state,
            &request("POST", "/pre-signed"),
            Bytes::from(body.to_owned()),
        );
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let url = json["url"].as_str().expect("url");
        url.strip_prefix("/pre-signed/").expect("prefix").to_owned()
    }

    #[tokio::test]
    async fn test_should_upsert_via_presigned_url() {
        let f = fixture();
        let token = mint_token(&f, r#"{"path":"b.txt","expiryLength":60}"#).await;

        // First write creates.
        let response = handle_request(
            &f.state,
            &request("PUT", &format!("/pre-signed/{token}")),
            Bytes::from("v1"),
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_owned();

        // Second write replaces in place: same id, status 200.
        let response = handle_request(
            &f.state,
            &request("PUT", &format!("/pre-signed/{token}")),
            Bytes::from("v2"),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"].as_str().unwrap(), id);
        assert_eq!(f.state.store.read(&id).unwrap().bytes.as_ref(), b"v2");

        // And the token also reads it back.
        let response = handle_request(
            &f.state,
            &request("GET", &format!("/pre-signed/{token}")),
            Bytes::new(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await.as_ref(), b"v2");
    }

    #[tokio::test]
    async fn test_should_reject_tampered_token() {
        let f = fixture();
        let token = mint_token(&f, r#"{"path":"b.txt","expiryLength":60}"#).await;
        let tampered = format!("A{}", &token[1..]);

        let response = handle_request(
            &f.state,
            &request("PUT", &format!("/pre-signed/{tampered}")),
            Bytes::from("x"),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid signature");
    }

    #[tokio::test]
    async fn test_should_reject_expired_link() {
        let f = fixture();
        let token = mint_token(&f, r#"{"path":"b.txt","expiryLength":0}"#).await;

        let response = handle_request(
            &f.state,
            &request("PUT", &format!("/pre-signed/{token}")),
            Bytes::from("x"),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "link expired");
    }

    #[tokio::test]
    async fn test_should_enforce_token_permission_scope() {
        let f = fixture();

        let read_token =
            mint_token(&f, r#"{"path":"b.txt","expiryLength":60,"permission":"read"}"#).await;
        let response = handle_request(
            &f.state,
            &request("PUT", &format!("/pre-signed/{read_token}")),
            Bytes::from("x"),
        );
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let write_token =
            mint_token(&f, r#"{"path":"b.txt","expiryLength":60,"permission":"write"}"#).await;
        let response = handle_request(
            &f.state,
            &request("GET", &format!("/pre-signed/{write_token}")),
            Bytes::new(),
        );
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_should_return_404_for_presigned_read_of_absent_path() {
        let f = fixture();
        let token = mint_token(&f, r#"{"path":"missing.txt","expiryLength":60}"#).await;

        let response = handle_request(
            &f.state,
            &request("GET", &format!("/pre-signed/{token}")),
            Bytes::new(),
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_should_reject_malformed_presign_request() {
        let f = fixture();
        let response = handle_request(
            &f.state,
            &request("POST", "/pre-signed"),
            Bytes::from("not json"),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_replay_creation_events_to_subscriber() {
        let f = fixture();
        let id = create(&f, "a.txt", "x").await;

        let response = handle_request(&f.state, &request("GET", "/events"), Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(http::header::CONTENT_TYPE)
                .unwrap(),
            "text/event-stream"
        );

        let mut body = response.into_body();
        let frame = body.frame().await.expect("frame").expect("frame data");
        let data = frame.into_data().expect("data frame");
        let text = std::str::from_utf8(&data).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains("FileCreated"));
        assert!(text.contains(&id));
    }

    #[tokio::test]
    async fn test_should_republish_event_for_existing_object() {
        let f = fixture();
        let id = create(&f, "a.txt", "x").await;
        let (_, mut rx) = f.state.events.subscribe();

        let response = handle_request(
            &f.state,
            &request("POST", &format!("/publish/{id}")),
            Bytes::new(),
        );
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap(), ObjectEvent::file_created(&id));
    }

    #[tokio::test]
    async fn test_should_return_404_when_publishing_unknown_id() {
        let f = fixture();
        let response = handle_request(
            &f.state,
            &request("POST", "/publish/ghost"),
            Bytes::new(),
        );
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
