//! Stateless HMAC-signed capability tokens for Blobstack.
//!
//! A capability token is a self-contained, signed, time-limited credential
//! granting access to one storage path without any server-side session. The
//! wire form is:
//!
//! ```text
//! base64url( HMAC-SHA256(secret, payload) || payload )
//! ```
//!
//! where `payload` is the canonical JSON of `{path, expiry, permission}`.
//! Verification is pure: signature correctness is checked here, freshness
//! (`expiry > now`) is the caller's job. There is no revocation; anyone
//! holding an unexpired token can exercise the permission it encodes, and
//! the secret alone gates forgery.

pub mod error;
pub mod token;

pub use error::TokenError;
pub use token::{CapabilityToken, Permission, SIGNATURE_LEN, decode, encode};
