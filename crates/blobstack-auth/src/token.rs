//! Capability-token encoding and verification.
//!
//! [`encode`] signs a [`CapabilityToken`] into its URL-safe wire form;
//! [`decode`] verifies a wire token and recovers the struct. The codec
//! checks integrity only -- callers must reject tokens whose expiry is not
//! in the future via [`CapabilityToken::is_expired_at`]. Clock skew between
//! minting and verifying hosts narrows or widens the usable window by the
//! skew amount; the comparison is not padded to compensate.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE as BASE64_URL;
use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of the HMAC-SHA256 tag prefixed to the payload.
pub const SIGNATURE_LEN: usize = 32;

/// The access scope a token grants. A token without a permission is accepted
/// for any operation; a scoped token is only accepted for its own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// The token may only fetch the path's content.
    Read,
    /// The token may only write the path's content.
    Write,
}

/// A self-contained, signed, time-limited grant of access to one path.
///
/// Never persisted: validity is purely a function of signature correctness
/// and the current time at verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToken {
    /// The storage path the token grants access to.
    pub path: String,
    /// Absolute expiry timestamp.
    pub expiry: DateTime<Utc>,
    /// Optional access scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<Permission>,
}

impl CapabilityToken {
    /// Freshness check: a token is usable only while `expiry > now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Enforce freshness, the caller-side half of verification.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Expired`] unless `expiry > now`.
    pub fn check_fresh(&self, now: DateTime<Utc>) -> Result<(), TokenError> {
        if self.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

/// Sign `token` into its URL-safe wire form.
///
/// # Errors
///
/// Returns [`TokenError::Encode`] if the payload cannot be serialized.
pub fn encode(secret: &[u8], token: &CapabilityToken) -> Result<String, TokenError> {
    let payload = serde_json::to_vec(token)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC can accept any key length");
    mac.update(&payload);
    let signature = mac.finalize().into_bytes();

    let mut combined = Vec::with_capacity(SIGNATURE_LEN + payload.len());
    combined.extend_from_slice(&signature);
    combined.extend_from_slice(&payload);
    Ok(BASE64_URL.encode(combined))
}

/// Verify a wire token and recover the [`CapabilityToken`] it encodes.
///
/// The expiry is **not** checked here; callers own freshness.
///
/// # Errors
///
/// Returns [`TokenError::VerificationFailed`] when the token is not valid
/// base64url, is shorter than the signature, has a degenerate payload, fails
/// the constant-time signature comparison, or carries an unparseable
/// payload.
pub fn decode(secret: &[u8], encoded: &str) -> Result<CapabilityToken, TokenError> {
    let decoded = BASE64_URL
        .decode(encoded)
        .map_err(|_| TokenError::VerificationFailed)?;
    if decoded.len() < SIGNATURE_LEN {
        return Err(TokenError::VerificationFailed);
    }
    let (signature, payload) = decoded.split_at(SIGNATURE_LEN);

    // Strip trailing zero-padding artifacts. The payload is structured text
    // and never legitimately ends in a NUL byte.
    let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let payload = &payload[..end];
    if payload.len() <= 1 {
        return Err(TokenError::VerificationFailed);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC can accept any key length");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    if !bool::from(expected.as_slice().ct_eq(signature)) {
        debug!("capability token signature mismatch");
        return Err(TokenError::VerificationFailed);
    }

    serde_json::from_slice(payload).map_err(|_| TokenError::VerificationFailed)
}
