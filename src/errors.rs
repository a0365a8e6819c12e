//! # Error Types Module
//!
//! Structured errors for the action token store and the macro oracle.
//! Database and transport failures travel as `anyhow::Error`.

use thiserror::Error;

/// Errors raised while minting or resolving action tokens
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TokenError {
    /// Token is unknown, evicted or discarded
    #[error("action token not found: {0}")]
    NotFound(String),
    /// Payload is too large even for a store-backed token
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    EncodingTooLarge { size: usize, limit: usize },
    /// No known token scheme could decode the token
    #[error("malformed action token: {0}")]
    MalformedLegacyToken(String),
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

impl TokenError {
    /// Whether the caller should treat this as an expired button
    pub fn is_expired(&self) -> bool {
        matches!(
            self,
            TokenError::NotFound(_) | TokenError::MalformedLegacyToken(_)
        )
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        TokenError::Serialization(err.to_string())
    }
}

/// Errors raised by the macro estimation oracle
#[derive(Debug, Error)]
pub enum OracleError {
    /// Circuit breaker is open after repeated failures
    #[error("macro oracle temporarily unavailable")]
    CircuitOpen,
    #[error("oracle request failed: {0}")]
    Request(String),
    #[error("oracle request timed out after {0} seconds")]
    Timeout(u64),
    /// Response did not contain a usable nutrition JSON object
    #[error("invalid oracle response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Request(err.to_string())
    }
}
