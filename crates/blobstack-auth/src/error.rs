//! Error types for capability-token handling.

/// Errors produced when encoding or verifying capability tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token is malformed or its signature does not match.
    #[error("token signature verification failed")]
    VerificationFailed,

    /// The token is past its expiry. Produced by callers performing the
    /// freshness check, never by [`decode`](crate::token::decode) itself.
    #[error("token is past its expiry")]
    Expired,

    /// The token payload could not be serialized.
    #[error("failed to encode token payload: {0}")]
    Encode(#[from] serde_json::Error),
}
