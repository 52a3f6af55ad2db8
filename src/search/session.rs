use super::client::{AuthConfig, Endpoint, RetryPolicy, SearchClient};
use super::dialect::{Dialect, OpenOutcome};
use super::query::{build_search_body, QuerySpec, SortSpec};
use super::SearchError;
use crate::config::types::SearchConfig;
use crate::normalize::normalize_value;
use crate::record::CanonicalRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Options for one page request.
///
/// Backend coordinates, credentials and query are captured when the session
/// is created; later requests for the same session only need `session_id`.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub session_id: Option<String>,
    pub base_url: String,
    pub index: String,
    pub auth: AuthConfig,
    pub page_size: Option<usize>,
    pub query: QuerySpec,
    pub keep_alive: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub backoff_base: Option<Duration>,
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub entries: Vec<CanonicalRecord>,
    pub total: Option<u64>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
    pub session_id: String,
}

/// Ephemeral pagination state. Lives only in the [`SessionManager`]'s map.
#[derive(Debug)]
pub struct PaginationSession {
    pub session_id: String,
    /// Backend cursor (PIT id or scroll id); empty until opened.
    pub cursor_id: String,
    /// Pinned on first successful open, never re-probed.
    pub dialect: Option<Dialect>,
    pub index: String,
    pub endpoint: Endpoint,
    pub keep_alive: String,
    pub page_size: usize,
    pub last_used_at: Instant,
    query: QuerySpec,
    search_after: Option<Value>,
    closed: bool,
}

type SessionSlot = Arc<tokio::sync::Mutex<PaginationSession>>;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pit_id: Option<String>,
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    #[serde(default)]
    hits: HitsEnvelope,
}

#[derive(Debug, Default, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Tracked { value: u64 },
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            TotalHits::Count(value) | TotalHits::Tracked { value } => *value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    sort: Option<Value>,
}

impl Hit {
    fn to_record(&self) -> CanonicalRecord {
        let coordinates = format!("{}/{}", self.index, self.id);
        if self.source.is_null() {
            return CanonicalRecord::bare("", coordinates);
        }
        normalize_value(&self.source, "", &coordinates)
    }
}

/// Owns every open pagination session, keyed by an opaque session id.
///
/// Pages within one session are strictly sequential: each session sits behind
/// its own async lock, so a second request waits for the first to resolve.
pub struct SessionManager {
    client: SearchClient,
    config: SearchConfig,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionManager {
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        Ok(Self {
            client: SearchClient::new()?,
            config,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Fetches the next page for the request's session, creating the session
    /// (and opening a backend cursor) on first use.
    ///
    /// A short page means the cursor is exhausted: it is released and the
    /// session forgotten, so reusing its id starts over.
    pub async fn fetch_page(&self, request: PageRequest) -> Result<Page, SearchError> {
        loop {
            let slot = self.resolve(&request)?;
            let mut session = slot.lock().await;

            // Closed while we waited for the lock; resolve again.
            if session.closed {
                continue;
            }

            session.last_used_at = Instant::now();
            return self.fetch_locked(&mut session).await;
        }
    }

    /// Releases the backend cursor and forgets the session.
    ///
    /// Local state is removed even if the backend release fails.
    pub async fn close_session(&self, session_id: &str) {
        let Some(slot) = self.take(session_id) else {
            debug!(session_id = %session_id, "Close requested for unknown session");
            return;
        };

        let mut session = slot.lock().await;
        session.closed = true;
        self.release(&session).await;
        info!(session_id = %session_id, "Search session closed");
    }

    pub async fn close_all(&self) {
        let ids: Vec<String> = self
            .sessions
            .lock()
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default();

        for id in ids {
            self.close_session(&id).await;
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(session_id))
            .unwrap_or(false)
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }

    /// Dialect pinned for a live session, if it has opened a cursor.
    pub async fn dialect_of(&self, session_id: &str) -> Option<Dialect> {
        let slot = self.sessions.lock().ok()?.get(session_id).cloned()?;
        let session = slot.lock().await;
        session.dialect
    }

    /// Closes sessions unused for longer than `max_idle`. Sessions with a page
    /// in flight are skipped. Returns how many were reaped.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let slots: Vec<(String, SessionSlot)> = self
            .sessions
            .lock()
            .map(|sessions| {
                sessions
                    .iter()
                    .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
                    .collect()
            })
            .unwrap_or_default();

        let mut reaped = 0;
        for (id, slot) in slots {
            let Ok(mut session) = slot.try_lock() else {
                continue;
            };
            if session.closed || session.last_used_at.elapsed() < max_idle {
                continue;
            }

            self.forget(&id, &slot);
            session.closed = true;
            self.release(&session).await;
            reaped += 1;
            info!(session_id = %id, "Reaped idle search session");
        }
        reaped
    }

    /// Spawns the background idle reaper when an idle timeout is configured.
    pub fn spawn_reaper(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let idle_timeout = self.config.idle_timeout?;
        let period = (idle_timeout / 2).max(Duration::from_secs(1));
        let manager = Arc::clone(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = manager.reap_idle(idle_timeout).await;
                        if reaped > 0 {
                            debug!(reaped = reaped, "Idle reaper pass");
                        }
                    }
                }
            }
        }))
    }

    fn resolve(&self, request: &PageRequest) -> Result<SessionSlot, SearchError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| SearchError::Protocol("session map poisoned".to_string()))?;

        if let Some(slot) = request.session_id.as_ref().and_then(|id| sessions.get(id)) {
            return Ok(Arc::clone(slot));
        }

        let session = self.new_session(request)?;
        let id = session.session_id.clone();
        let slot = Arc::new(tokio::sync::Mutex::new(session));
        sessions.insert(id.clone(), Arc::clone(&slot));
        debug!(session_id = %id, "Created search session");
        Ok(slot)
    }

    fn new_session(&self, request: &PageRequest) -> Result<PaginationSession, SearchError> {
        if request.base_url.trim().is_empty() {
            return Err(SearchError::InvalidRequest(match &request.session_id {
                Some(id) => format!("unknown session '{}' and no backend URL given", id),
                None => "backend URL is required".to_string(),
            }));
        }
        if request.index.trim().is_empty() {
            return Err(SearchError::InvalidRequest("index is required".to_string()));
        }

        let page_size = request.page_size.unwrap_or(self.config.page_size);
        if page_size == 0 {
            return Err(SearchError::InvalidRequest(
                "page size must be at least 1".to_string(),
            ));
        }

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(PaginationSession {
            session_id,
            cursor_id: String::new(),
            dialect: None,
            index: request.index.clone(),
            endpoint: Endpoint {
                base_url: request.base_url.clone(),
                auth: request.auth.clone(),
                timeout: request.timeout.unwrap_or(self.config.timeout),
                retry: RetryPolicy {
                    max_retries: request.max_retries.unwrap_or(self.config.max_retries),
                    backoff_base: request.backoff_base.unwrap_or(self.config.backoff_base),
                },
            },
            keep_alive: request
                .keep_alive
                .clone()
                .unwrap_or_else(|| self.config.keep_alive.clone()),
            page_size,
            last_used_at: Instant::now(),
            query: request.query.clone(),
            search_after: None,
            closed: false,
        })
    }

    async fn fetch_locked(&self, session: &mut PaginationSession) -> Result<Page, SearchError> {
        let dialect = match session.dialect {
            Some(dialect) => dialect,
            None => match self.open_cursor(session).await {
                Ok(dialect) => dialect,
                Err(e) => {
                    let id = session.session_id.clone();
                    self.take(&id);
                    session.closed = true;
                    return Err(e);
                }
            },
        };

        let raw = self.request_page(session, dialect).await?;
        let response: SearchResponse = serde_json::from_value(raw)?;

        match dialect {
            Dialect::SearchPit | Dialect::OpenSearchPit => {
                if let Some(pit_id) = response.pit_id.filter(|id| !id.is_empty()) {
                    session.cursor_id = pit_id;
                }
            }
            Dialect::LegacyScroll => match response.scroll_id.filter(|id| !id.is_empty()) {
                Some(scroll_id) => session.cursor_id = scroll_id,
                None if session.cursor_id.is_empty() => {
                    return Err(SearchError::Protocol(
                        "scroll response missing '_scroll_id'".to_string(),
                    ));
                }
                None => {}
            },
        }

        let entries: Vec<CanonicalRecord> = response.hits.hits.iter().map(Hit::to_record).collect();
        let total = if self.config.track_total_hits {
            response.hits.total.as_ref().map(TotalHits::value)
        } else {
            None
        };
        let has_more = entries.len() >= session.page_size;

        let next_cursor = if !has_more {
            None
        } else if dialect.is_point_in_time() {
            let sort = response
                .hits
                .hits
                .last()
                .and_then(|hit| hit.sort.clone())
                .ok_or_else(|| {
                    SearchError::Protocol("hit is missing sort values".to_string())
                })?;
            let cursor = sort.to_string();
            session.search_after = Some(sort);
            Some(cursor)
        } else {
            Some(session.cursor_id.clone())
        };

        debug!(
            session_id = %session.session_id,
            dialect = %dialect,
            returned = entries.len(),
            has_more = has_more,
            "Fetched search page"
        );

        let session_id = session.session_id.clone();
        if !has_more {
            self.take(&session_id);
            session.closed = true;
            self.release(session).await;
            debug!(session_id = %session_id, "Search session exhausted");
        }

        Ok(Page {
            entries,
            total,
            has_more,
            next_cursor,
            session_id,
        })
    }

    /// Opens a cursor, falling back across dialects, and pins the result.
    async fn open_cursor(&self, session: &mut PaginationSession) -> Result<Dialect, SearchError> {
        let endpoint = &session.endpoint;
        let index = session.index.as_str();
        let keep_alive = session.keep_alive.as_str();

        let primary = self
            .client
            .open(endpoint, Dialect::SearchPit, index, keep_alive)
            .await?;

        let (dialect, cursor_id) = match primary {
            OpenOutcome::Opened(id) => (Dialect::SearchPit, id),
            OpenOutcome::AuthError => (Dialect::LegacyScroll, String::new()),
            OpenOutcome::DialectMismatch => {
                match self
                    .client
                    .open(endpoint, Dialect::OpenSearchPit, index, keep_alive)
                    .await?
                {
                    OpenOutcome::Opened(id) => (Dialect::OpenSearchPit, id),
                    OpenOutcome::DialectMismatch | OpenOutcome::AuthError => {
                        (Dialect::LegacyScroll, String::new())
                    }
                }
            }
        };

        info!(session_id = %session.session_id, dialect = %dialect, "Pinned search dialect");
        session.dialect = Some(dialect);
        session.cursor_id = cursor_id;
        Ok(dialect)
    }

    async fn request_page(
        &self,
        session: &PaginationSession,
        dialect: Dialect,
    ) -> Result<Value, SearchError> {
        let sort = SortSpec {
            timestamp_field: self.config.timestamp_field.clone(),
            tiebreak_field: self.config.tiebreak_field.clone(),
            order: self.config.sort_order,
        };
        let mut body = build_search_body(
            &session.query,
            &sort,
            session.page_size,
            self.config.track_total_hits,
        );

        match dialect {
            Dialect::SearchPit | Dialect::OpenSearchPit => {
                body.insert(
                    "pit".to_string(),
                    json!({ "id": session.cursor_id, "keep_alive": session.keep_alive }),
                );
                if let Some(search_after) = &session.search_after {
                    body.insert("search_after".to_string(), search_after.clone());
                }
                self.client
                    .search_pit(&session.endpoint, &Value::Object(body))
                    .await
            }
            Dialect::LegacyScroll if session.cursor_id.is_empty() => {
                self.client
                    .scroll_open(
                        &session.endpoint,
                        &session.index,
                        &session.keep_alive,
                        &Value::Object(body),
                    )
                    .await
            }
            Dialect::LegacyScroll => {
                self.client
                    .scroll_continue(&session.endpoint, &session.cursor_id, &session.keep_alive)
                    .await
            }
        }
    }

    async fn release(&self, session: &PaginationSession) {
        let Some(dialect) = session.dialect else {
            return;
        };
        if session.cursor_id.is_empty() {
            return;
        }

        if let Err(e) = self
            .client
            .close(&session.endpoint, dialect, &session.cursor_id)
            .await
        {
            warn!(
                session_id = %session.session_id,
                dialect = %dialect,
                error = %e,
                "Failed to release backend cursor"
            );
        }
    }

    fn take(&self, session_id: &str) -> Option<SessionSlot> {
        self.sessions
            .lock()
            .ok()
            .and_then(|mut sessions| sessions.remove(session_id))
    }

    /// Removes `session_id` only if it still maps to `slot`.
    fn forget(&self, session_id: &str, slot: &SessionSlot) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if sessions
                .get(session_id)
                .is_some_and(|current| Arc::ptr_eq(current, slot))
            {
                sessions.remove(session_id);
            }
        }
    }
}
