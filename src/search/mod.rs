//! Cursor-based pagination against a search backend.
//!
//! Sessions pin one of three wire dialects on first use and keep the backend
//! cursor alive across [`SessionManager::fetch_page`] calls.

pub mod client;
pub mod dialect;
pub mod query;
pub mod session;

pub use client::{AuthConfig, RetryPolicy, SearchClient};
pub use dialect::{Dialect, OpenOutcome};
pub use query::{FieldFilter, QuerySpec, TimeBound, TimeRange};
pub use session::{Page, PageRequest, PaginationSession, SessionManager};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid backend response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
