// src/error.rs
//! Error taxonomy shared by the job and its adapters.
//!
//! Only `ConfigError` and `FetchError` ever abort an invocation; the others are
//! logged and degraded at the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("search endpoint answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed search response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("blob endpoint answered {0}")]
    Status(u16),
    #[error("seen-set encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("could not sign blob request")]
    Signing,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid email address {0:?}")]
    InvalidAddress(String),
    #[error("email transport failed: {0}")]
    Transport(String),
    #[error("email provider rejected the message: {0}")]
    Rejected(String),
    #[error("email status still {0} after polling")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
