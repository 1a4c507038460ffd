//! HTTP response body supporting buffered, empty, and event-stream modes.
//!
//! [`ResponseBody`] is the body type used by every response in the service.
//! Most responses are small JSON or raw-byte payloads (**Buffered**) or have
//! no content at all (**Empty**). The `GET /events` subscription is the one
//! long-lived response: its frames arrive over a channel as subscribers'
//! events fire (**Event**).

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::Full;
use tokio::sync::mpsc;

/// Response body for the Blobstack HTTP service.
///
/// Implements [`http_body::Body`] so it can be used directly with hyper
/// responses.
#[derive(Debug, Default)]
pub enum ResponseBody {
    /// Buffered body for JSON payloads, error bodies, and blob bytes.
    Buffered(Full<Bytes>),
    /// Empty body for status-only responses.
    #[default]
    Empty,
    /// Server-sent-event stream; each received chunk is one wire frame. The
    /// stream ends when the sending side is dropped.
    Event(mpsc::Receiver<Bytes>),
}

impl ResponseBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl http_body::Body for ResponseBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Empty => Poll::Ready(None),
            Self::Event(rx) => rx
                .poll_recv(cx)
                .map(|chunk| chunk.map(|bytes| Ok(http_body::Frame::data(bytes)))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Empty => true,
            Self::Event(_) => false,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Empty => http_body::SizeHint::with_exact(0),
            Self::Event(_) => http_body::SizeHint::default(),
        }
    }
}
