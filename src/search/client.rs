use super::dialect::{classify_open_failure, Dialect, OpenFailure, OpenOutcome};
use super::SearchError;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Credentials attached to every backend call.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    None,
    Basic {
        username: String,
        password: String,
    },
    /// Pre-encoded API key, sent as `Authorization: ApiKey <key>`.
    ApiKey {
        key: String,
    },
    Bearer {
        token: String,
    },
}

impl AuthConfig {
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            AuthConfig::None => request,
            AuthConfig::Basic { username, password } => request.basic_auth(username, Some(password)),
            AuthConfig::ApiKey { key } => request.header(AUTHORIZATION, format!("ApiKey {}", key)),
            AuthConfig::Bearer { token } => request.bearer_auth(token),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => f.write_str("None"),
            AuthConfig::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthConfig::ApiKey { .. } => f.write_str("ApiKey(<redacted>)"),
            AuthConfig::Bearer { .. } => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Exponential backoff for transient failures: `base * 2^attempt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Connection details for one backend, as captured by a session.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub auth: AuthConfig,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Endpoint {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Thin HTTP layer for the search backend.
///
/// Responses are transparently decompressed (gzip, deflate, brotli); every
/// call carries the session's hard timeout.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: reqwest::Client,
}

impl SearchClient {
    pub fn new() -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    /// Sends a request, retrying 429/5xx responses and timeouts with
    /// exponential backoff. The final response is returned whatever its status.
    pub async fn send_with_retry<F>(&self, endpoint: &Endpoint, build: F) -> Result<Response, SearchError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut attempt = 0u32;

        loop {
            let request = endpoint.auth.apply(build(&self.client)).timeout(endpoint.timeout);
            let retry_reason = match request.send().await {
                Ok(response) if is_retryable_status(response.status()) => {
                    if attempt >= endpoint.retry.max_retries {
                        return Ok(response);
                    }
                    format!("status {}", response.status().as_u16())
                }
                Ok(response) => return Ok(response),
                Err(e) if is_transient(&e) && attempt < endpoint.retry.max_retries => e.to_string(),
                Err(e) => return Err(SearchError::Http(e)),
            };

            let backoff = endpoint.retry.backoff_for(attempt);
            warn!(
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                reason = %retry_reason,
                "Search request failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Tries to open a point-in-time cursor with one dialect.
    pub async fn open(
        &self,
        endpoint: &Endpoint,
        dialect: Dialect,
        index: &str,
        keep_alive: &str,
    ) -> Result<OpenOutcome, SearchError> {
        let Some(path) = dialect.open_path(index) else {
            return Err(SearchError::Protocol(format!(
                "dialect {} has no open call",
                dialect
            )));
        };
        let url = endpoint.url(&path);

        let response = self
            .send_with_retry(endpoint, |client| {
                client.post(&url).query(&[("keep_alive", keep_alive)])
            })
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response.json().await?;
            let id = body
                .get(dialect.open_id_field())
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    SearchError::Protocol(format!(
                        "{} open response missing '{}'",
                        dialect,
                        dialect.open_id_field()
                    ))
                })?;
            return Ok(OpenOutcome::Opened(id.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        match classify_open_failure(status, &body) {
            OpenFailure::DialectMismatch => {
                debug!(dialect = %dialect, status = status.as_u16(), "Open endpoint not recognized");
                Ok(OpenOutcome::DialectMismatch)
            }
            OpenFailure::AuthError => {
                debug!(dialect = %dialect, status = status.as_u16(), "Open call not authorized");
                Ok(OpenOutcome::AuthError)
            }
            OpenFailure::Fatal => Err(SearchError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }

    /// Point-in-time search: `POST /_search` with the cursor in the body.
    pub async fn search_pit(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, SearchError> {
        let url = endpoint.url("/_search");
        let response = self
            .send_with_retry(endpoint, |client| client.post(&url).json(body))
            .await?;
        read_json(response).await
    }

    /// First scroll page: a regular search that also opens the scroll.
    pub async fn scroll_open(
        &self,
        endpoint: &Endpoint,
        index: &str,
        keep_alive: &str,
        body: &Value,
    ) -> Result<Value, SearchError> {
        let url = endpoint.url(&format!("/{}/_search", index));
        let response = self
            .send_with_retry(endpoint, |client| {
                client.post(&url).query(&[("scroll", keep_alive)]).json(body)
            })
            .await?;
        read_json(response).await
    }

    /// Subsequent scroll page, keyed by the current scroll id.
    pub async fn scroll_continue(
        &self,
        endpoint: &Endpoint,
        scroll_id: &str,
        keep_alive: &str,
    ) -> Result<Value, SearchError> {
        let url = endpoint.url("/_search/scroll");
        let body = serde_json::json!({ "scroll": keep_alive, "scroll_id": scroll_id });
        let response = self
            .send_with_retry(endpoint, |client| client.post(&url).json(&body))
            .await?;
        read_json(response).await
    }

    /// Releases a backend cursor. Best effort: a single attempt, no retry.
    pub async fn close(&self, endpoint: &Endpoint, dialect: Dialect, cursor_id: &str) -> Result<(), SearchError> {
        let (path, body) = dialect.close_request(cursor_id);
        let url = endpoint.url(path);

        let response = endpoint
            .auth
            .apply(self.client.delete(&url).json(&body))
            .timeout(endpoint.timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(SearchError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

async fn read_json(response: Response) -> Result<Value, SearchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 4,
            backoff_base: Duration::from_millis(300),
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(300));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(600));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy {
            max_retries: 100,
            backoff_base: Duration::from_secs(u64::MAX / 2),
        };
        assert_eq!(policy.backoff_for(90), Duration::MAX);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let auth = AuthConfig::Basic {
            username: "elastic".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", auth);
        assert!(rendered.contains("elastic"));
        assert!(!rendered.contains("hunter2"));
        assert!(!format!("{:?}", AuthConfig::Bearer { token: "t0k".into() }).contains("t0k"));
    }
}
