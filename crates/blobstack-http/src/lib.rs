//! HTTP service layer for Blobstack.
//!
//! Maps requests onto the metadata store and the capability-token codec,
//! and republishes object-creation events to subscribers:
//!
//! 1. Route resolution from method + path ([`router`])
//! 2. Request body collection with an upload size cap ([`service`])
//! 3. Multipart form parsing for browser uploads ([`multipart`])
//! 4. Operation handlers and error-to-status mapping ([`handlers`],
//!    [`response`])
//! 5. Server-sent-event fan-out with history replay ([`events`])

pub mod body;
pub mod events;
pub mod handlers;
pub mod multipart;
pub mod response;
pub mod router;
pub mod service;

pub use body::ResponseBody;
pub use events::{EventBus, ObjectEvent};
pub use service::{AppState, BlobHttpService, MAX_UPLOAD_SIZE};
