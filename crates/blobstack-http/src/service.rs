//! The hyper `Service` implementation for Blobstack.
//!
//! [`BlobHttpService`] wraps the shared [`AppState`] and processes each
//! request through body collection (capped at [`MAX_UPLOAD_SIZE`]), route
//! resolution, and handler dispatch.

use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use blobstack_core::MetadataStore;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::service::Service;
use tracing::debug;

use crate::body::ResponseBody;
use crate::events::EventBus;
use crate::{handlers, response};

/// Maximum accepted request body size: 10 MiB.
pub const MAX_UPLOAD_SIZE: usize = 10 << 20;

/// Shared state for all request handlers: the store, the event bus, the
/// token-signing secret, and the blob storage root.
pub struct AppState {
    /// The metadata store.
    pub store: MetadataStore,
    /// Creation-event fan-out.
    pub events: EventBus,
    /// HMAC secret for capability tokens.
    pub secret: Vec<u8>,
    /// Directory that blob paths are resolved beneath.
    pub data_dir: PathBuf,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store)
            .field("events", &self.events)
            .field("secret", &"...")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl AppState {
    /// Assemble the service state around an initialized store.
    pub fn new(store: MetadataStore, secret: Vec<u8>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            events: EventBus::default(),
            secret,
            data_dir: data_dir.into(),
        }
    }
}

/// The Blobstack HTTP service, cloneable per connection.
#[derive(Debug, Clone)]
pub struct BlobHttpService {
    state: Arc<AppState>,
}

impl BlobHttpService {
    /// Create a service over shared state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl Service<http::Request<Incoming>> for BlobHttpService {
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            debug!(method = %parts.method, path = parts.uri.path(), "handling request");

            let body = match collect_body(body).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Ok(response::fail(
                        StatusCode::BAD_REQUEST,
                        format!("failed to read request body: {e}"),
                    ));
                }
            };

            Ok(handlers::handle_request(&state, &parts, body))
        })
    }
}

/// Collect a request body into `Bytes`, refusing bodies over
/// [`MAX_UPLOAD_SIZE`].
async fn collect_body<B>(body: B) -> Result<Bytes, Box<dyn std::error::Error + Send + Sync>>
where
    B: http_body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = Limited::new(body, MAX_UPLOAD_SIZE).collect().await?;
    Ok(collected.to_bytes())
}

#[cfg(test)]
mod tests {
    use http_body_util::Full;

    use super::*;

    #[tokio::test]
    async fn test_should_collect_body_within_limit() {
        let body = Full::new(Bytes::from("hello"));
        let bytes = collect_body(body).await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_should_refuse_oversized_body() {
        let body = Full::new(Bytes::from(vec![0_u8; MAX_UPLOAD_SIZE + 1]));
        assert!(collect_body(body).await.is_err());
    }

    #[test]
    fn test_should_redact_secret_in_debug_output() {
        let state = AppState::new(MetadataStore::new(), b"super-secret".to_vec(), "/tmp/data");
        let debug_str = format!("{state:?}");
        assert!(!debug_str.contains("super-secret"));
    }
}
