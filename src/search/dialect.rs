use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend pagination wire protocol, resolved once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// `POST /{index}/_pit`, searched via `POST /_search` with a `pit` clause.
    #[serde(rename = "search-pit")]
    SearchPit,
    /// `POST /{index}/_search/point_in_time`, same search shape.
    #[serde(rename = "opensearch-pit")]
    OpenSearchPit,
    /// Classic scroll: the first search opens the cursor.
    #[serde(rename = "legacy-scroll")]
    LegacyScroll,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::SearchPit => "search-pit",
            Dialect::OpenSearchPit => "opensearch-pit",
            Dialect::LegacyScroll => "legacy-scroll",
        }
    }

    pub fn is_point_in_time(&self) -> bool {
        !matches!(self, Dialect::LegacyScroll)
    }

    /// Path of the explicit open call, for dialects that have one.
    pub fn open_path(&self, index: &str) -> Option<String> {
        match self {
            Dialect::SearchPit => Some(format!("/{}/_pit", index)),
            Dialect::OpenSearchPit => Some(format!("/{}/_search/point_in_time", index)),
            Dialect::LegacyScroll => None,
        }
    }

    /// Field holding the cursor id in the open response.
    pub fn open_id_field(&self) -> &'static str {
        match self {
            Dialect::SearchPit => "id",
            Dialect::OpenSearchPit | Dialect::LegacyScroll => "pit_id",
        }
    }

    /// Path and body of the release call for an open cursor.
    pub fn close_request(&self, cursor_id: &str) -> (&'static str, serde_json::Value) {
        match self {
            Dialect::SearchPit => ("/_pit", serde_json::json!({ "id": cursor_id })),
            Dialect::OpenSearchPit => (
                "/_search/point_in_time",
                serde_json::json!({ "pit_id": [cursor_id] }),
            ),
            Dialect::LegacyScroll => (
                "/_search/scroll",
                serde_json::json!({ "scroll_id": [cursor_id] }),
            ),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of trying to open a cursor with one dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened(String),
    /// The backend does not recognize this dialect's endpoint.
    DialectMismatch,
    /// The credentials may search but not open this kind of cursor.
    AuthError,
}

/// How an open call's failure status should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFailure {
    DialectMismatch,
    AuthError,
    Fatal,
}

/// Classifies a failed open response by status and body.
pub fn classify_open_failure(status: StatusCode, body: &str) -> OpenFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OpenFailure::AuthError,
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
            OpenFailure::DialectMismatch
        }
        StatusCode::BAD_REQUEST => {
            let body = body.to_ascii_lowercase();
            if body.contains("no handler found")
                || body.contains("unrecognized parameter")
                || body.contains("invalid_index_name_exception")
            {
                OpenFailure::DialectMismatch
            } else {
                OpenFailure::Fatal
            }
        }
        _ => OpenFailure::Fatal,
    }
}
