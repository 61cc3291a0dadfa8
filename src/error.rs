//! Failure taxonomy for the fetch-and-reconcile core.
//!
//! The variants matter: auth failures drive the single refresh-and-retry in
//! [`crate::graphql`], while transport and remote-query failures abort the
//! current call immediately. Storage and CLI layers wrap these in `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Sign-in rejected, or two consecutive authorization failures on one
    /// call.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Non-2xx, non-auth HTTP status or a connection failure. No retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// GraphQL-level `errors` array on an otherwise successful response.
    /// Carries the raw error list from the server.
    #[error("remote query error: {0}")]
    RemoteQuery(serde_json::Value),

    /// A token payload could not be parsed. Non-fatal; callers fall back
    /// to a default expiry estimate.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
