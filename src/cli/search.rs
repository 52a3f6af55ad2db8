use super::output::{write_records, OutputFormat};
use crate::config::Config;
use crate::search::{
    AuthConfig, FieldFilter, PageRequest, QuerySpec, SearchError, SessionManager, TimeBound,
    TimeRange,
};
use clap::Args;
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Backend base URL, e.g. http://localhost:9200
    #[arg(long)]
    pub url: String,

    /// Index or index pattern to search
    #[arg(long)]
    pub index: String,

    /// Free-text query; `*` and `?` make it a wildcard query
    #[arg(long)]
    pub query: Option<String>,

    /// Field filter as FIELD=VALUE (repeatable)
    #[arg(long = "filter", value_name = "FIELD=VALUE")]
    pub filters: Vec<String>,

    /// Relative window ending now, in backend date-math units (15m, 2h, 1d)
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub last: Option<String>,

    /// Window start: epoch milliseconds or an ISO date
    #[arg(long)]
    pub from: Option<String>,

    /// Window end: epoch milliseconds or an ISO date
    #[arg(long)]
    pub to: Option<String>,

    /// Backend date format for --from/--to, overriding the inferred one
    #[arg(long)]
    pub date_format: Option<String>,

    #[arg(long)]
    pub page_size: Option<usize>,

    /// Stop after this many pages, closing the session early
    #[arg(long)]
    pub max_pages: Option<usize>,

    #[arg(long, requires = "password", conflicts_with_all = ["api_key", "bearer"])]
    pub user: Option<String>,

    #[arg(long, requires = "user")]
    pub password: Option<String>,

    #[arg(long, conflicts_with = "bearer")]
    pub api_key: Option<String>,

    #[arg(long)]
    pub bearer: Option<String>,

    /// Print records as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn auth(&self) -> AuthConfig {
        if let (Some(username), Some(password)) = (&self.user, &self.password) {
            AuthConfig::Basic {
                username: username.clone(),
                password: password.clone(),
            }
        } else if let Some(key) = &self.api_key {
            AuthConfig::ApiKey { key: key.clone() }
        } else if let Some(token) = &self.bearer {
            AuthConfig::Bearer {
                token: token.clone(),
            }
        } else {
            AuthConfig::None
        }
    }

    pub fn query_spec(&self) -> Result<QuerySpec, SearchError> {
        let filters = self
            .filters
            .iter()
            .map(|spec| {
                FieldFilter::parse(spec).ok_or_else(|| {
                    SearchError::InvalidRequest(format!(
                        "invalid filter '{}', expected FIELD=VALUE",
                        spec
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let time_range = match (&self.last, &self.from, &self.to) {
            (Some(last), _, _) => Some(TimeRange::Relative { last: last.clone() }),
            (None, None, None) => None,
            (None, from, to) => Some(TimeRange::Absolute {
                from: from.as_deref().map(TimeBound::parse),
                to: to.as_deref().map(TimeBound::parse),
                format: self.date_format.clone(),
            }),
        };

        Ok(QuerySpec {
            text: self.query.clone(),
            filters,
            time_range,
        })
    }
}

/// Pages through a search and prints every record.
pub async fn search(config: &Config, args: &SearchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let manager = SessionManager::new(config.search.clone())?;
    let format = OutputFormat::from_json_flag(args.json);

    let mut request = PageRequest {
        session_id: None,
        base_url: args.url.clone(),
        index: args.index.clone(),
        auth: args.auth(),
        page_size: args.page_size,
        query: args.query_spec()?,
        ..PageRequest::default()
    };

    let mut pages = 0usize;
    let mut printed = 0usize;
    loop {
        let page = manager.fetch_page(request.clone()).await?;
        pages += 1;
        printed += page.entries.len();

        if pages == 1 {
            if let Some(total) = page.total {
                info!(total = total, "Search matched");
            }
        }

        let stdout = std::io::stdout();
        write_records(&mut stdout.lock(), &page.entries, format)?;

        if !page.has_more {
            break;
        }
        if args.max_pages.is_some_and(|max| pages >= max) {
            manager.close_session(&page.session_id).await;
            info!(pages = pages, "Stopped at page limit");
            break;
        }
        request.session_id = Some(page.session_id);
    }

    info!(pages = pages, records = printed, "Search complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: SearchArgs,
    }

    fn parse(argv: &[&str]) -> SearchArgs {
        let mut full = vec!["search", "--url", "http://localhost:9200", "--index", "logs-*"];
        full.extend_from_slice(argv);
        Harness::parse_from(full).args
    }

    #[test]
    fn test_relative_window_and_filters() {
        let args = parse(&["--last", "15m", "--filter", "level=ERROR", "--filter", "host=web-*"]);
        let spec = args.query_spec().unwrap();
        assert_eq!(
            spec.time_range,
            Some(TimeRange::Relative {
                last: "15m".to_string()
            })
        );
        assert_eq!(spec.filters.len(), 2);
        assert_eq!(spec.filters[1], FieldFilter::new("host", "web-*"));
    }

    #[test]
    fn test_absolute_window() {
        let args = parse(&["--from", "1704067200000", "--to", "2024-01-02T00:00:00Z"]);
        assert_eq!(
            args.query_spec().unwrap().time_range,
            Some(TimeRange::Absolute {
                from: Some(TimeBound::EpochMillis(1704067200000)),
                to: Some(TimeBound::Iso("2024-01-02T00:00:00Z".to_string())),
                format: None,
            })
        );
    }

    #[test]
    fn test_bad_filter_is_rejected() {
        let args = parse(&["--filter", "no-equals-sign"]);
        assert!(matches!(
            args.query_spec(),
            Err(SearchError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_auth_selection() {
        assert_eq!(parse(&[]).auth(), AuthConfig::None);
        assert_eq!(
            parse(&["--user", "elastic", "--password", "changeme"]).auth(),
            AuthConfig::Basic {
                username: "elastic".to_string(),
                password: "changeme".to_string()
            }
        );
        assert_eq!(
            parse(&["--api-key", "abc=="]).auth(),
            AuthConfig::ApiKey {
                key: "abc==".to_string()
            }
        );
    }
}
