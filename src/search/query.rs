use crate::config::types::SortOrder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Restricts hits to those whose `field` matches `value`.
///
/// Values containing `*` or `?` are wildcard patterns; anything else is
/// matched as an exact phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Parses `field=value`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (field, value) = spec.split_once('=')?;
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        Some(Self::new(field, value.trim()))
    }
}

/// One end of an absolute time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeBound {
    EpochMillis(i64),
    Iso(String),
}

impl TimeBound {
    /// All-digit input is epoch milliseconds, anything else is ISO text.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.parse::<i64>() {
            Ok(millis) => TimeBound::EpochMillis(millis),
            Err(_) => TimeBound::Iso(text.to_string()),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            TimeBound::EpochMillis(millis) => json!(millis),
            TimeBound::Iso(text) => json!(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// `now - last` up to `now`, with `last` in backend date-math units (`15m`, `2h`).
    Relative { last: String },
    Absolute {
        from: Option<TimeBound>,
        to: Option<TimeBound>,
        /// Overrides the inferred date format.
        format: Option<String>,
    },
}

/// The searchable part of a page request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Free text matched across all fields.
    pub text: Option<String>,
    pub filters: Vec<FieldFilter>,
    pub time_range: Option<TimeRange>,
}

/// Sort and size settings fixed for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub timestamp_field: String,
    pub tiebreak_field: String,
    pub order: SortOrder,
}

fn is_pattern(value: &str) -> bool {
    value.contains('*') || value.contains('?')
}

fn text_clause(text: &str) -> Value {
    if is_pattern(text) {
        json!({ "query_string": { "query": text, "analyze_wildcard": true } })
    } else {
        json!({ "multi_match": { "query": text, "type": "phrase", "lenient": true } })
    }
}

fn filter_clause(filter: &FieldFilter) -> Value {
    if is_pattern(&filter.value) {
        json!({ "wildcard": { filter.field.as_str(): { "value": filter.value, "case_insensitive": true } } })
    } else {
        json!({ "match_phrase": { filter.field.as_str(): filter.value } })
    }
}

fn range_clause(range: &TimeRange, timestamp_field: &str) -> Option<Value> {
    let mut bounds = Map::new();

    match range {
        TimeRange::Relative { last } => {
            bounds.insert("gte".to_string(), json!(format!("now-{}", last.trim())));
            bounds.insert("lte".to_string(), json!("now"));
        }
        TimeRange::Absolute { from, to, format } => {
            if from.is_none() && to.is_none() {
                return None;
            }
            if let Some(from) = from {
                bounds.insert("gte".to_string(), from.to_value());
            }
            if let Some(to) = to {
                bounds.insert("lte".to_string(), to.to_value());
            }
            let format = format
                .clone()
                .unwrap_or_else(|| infer_format(from.as_ref(), to.as_ref()).to_string());
            bounds.insert("format".to_string(), json!(format));
        }
    }

    Some(json!({ "range": { timestamp_field: Value::Object(bounds) } }))
}

fn infer_format(from: Option<&TimeBound>, to: Option<&TimeBound>) -> &'static str {
    let bounds: Vec<&TimeBound> = from.into_iter().chain(to).collect();
    let epoch = bounds
        .iter()
        .filter(|b| matches!(b, TimeBound::EpochMillis(_)))
        .count();

    if epoch == bounds.len() {
        "epoch_millis"
    } else if epoch == 0 {
        "strict_date_optional_time"
    } else {
        "strict_date_optional_time||epoch_millis"
    }
}

/// Builds the `query` clause.
pub fn build_query(spec: &QuerySpec, timestamp_field: &str) -> Value {
    let mut clauses: Vec<Value> = Vec::new();

    if let Some(text) = spec.text.as_deref().filter(|t| !t.trim().is_empty()) {
        clauses.push(text_clause(text));
    }
    clauses.extend(spec.filters.iter().map(filter_clause));
    if let Some(range) = spec
        .time_range
        .as_ref()
        .and_then(|range| range_clause(range, timestamp_field))
    {
        clauses.push(range);
    }

    if clauses.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "filter": clauses } })
    }
}

/// Deterministic sort: timestamp first, then the tiebreak field.
pub fn build_sort(sort: &SortSpec) -> Value {
    let order = sort.order.as_str();
    json!([
        { sort.timestamp_field.as_str(): { "order": order, "unmapped_type": "date" } },
        { sort.tiebreak_field.as_str(): { "order": order } },
    ])
}

/// Full search body without any pagination clause.
pub fn build_search_body(
    spec: &QuerySpec,
    sort: &SortSpec,
    page_size: usize,
    track_total_hits: bool,
) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("size".to_string(), json!(page_size));
    body.insert("query".to_string(), build_query(spec, &sort.timestamp_field));
    body.insert("sort".to_string(), build_sort(sort));
    body.insert("track_total_hits".to_string(), json!(track_total_hits));
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sort() -> SortSpec {
        SortSpec {
            timestamp_field: "@timestamp".to_string(),
            tiebreak_field: "_id".to_string(),
            order: SortOrder::Desc,
        }
    }

    #[test]
    fn test_empty_query_matches_all() {
        assert_eq!(
            build_query(&QuerySpec::default(), "@timestamp"),
            json!({"match_all": {}})
        );
    }

    #[test]
    fn test_filters_route_by_pattern() {
        let spec = QuerySpec {
            filters: vec![
                FieldFilter::new("service", "checkout"),
                FieldFilter::new("host", "web-*"),
            ],
            ..QuerySpec::default()
        };
        let query = build_query(&spec, "@timestamp");
        let clauses = query["bool"]["filter"].as_array().unwrap();
        assert_eq!(clauses[0], json!({"match_phrase": {"service": "checkout"}}));
        assert_eq!(
            clauses[1],
            json!({"wildcard": {"host": {"value": "web-*", "case_insensitive": true}}})
        );
    }

    #[test]
    fn test_free_text() {
        let exact = QuerySpec {
            text: Some("payment failed".to_string()),
            ..QuerySpec::default()
        };
        assert_eq!(
            build_query(&exact, "ts")["bool"]["filter"][0]["multi_match"]["type"],
            "phrase"
        );

        let pattern = QuerySpec {
            text: Some("time?ut*".to_string()),
            ..QuerySpec::default()
        };
        assert_eq!(
            build_query(&pattern, "ts")["bool"]["filter"][0]["query_string"]["query"],
            "time?ut*"
        );
    }

    #[test]
    fn test_relative_range() {
        let spec = QuerySpec {
            time_range: Some(TimeRange::Relative {
                last: "15m".to_string(),
            }),
            ..QuerySpec::default()
        };
        let query = build_query(&spec, "@timestamp");
        assert_eq!(
            query["bool"]["filter"][0],
            json!({"range": {"@timestamp": {"gte": "now-15m", "lte": "now"}}})
        );
    }

    #[test]
    fn test_absolute_range_formats() {
        let epoch = TimeRange::Absolute {
            from: Some(TimeBound::parse("1704067200000")),
            to: Some(TimeBound::parse("1704070800000")),
            format: None,
        };
        let clause = range_clause(&epoch, "ts").unwrap();
        assert_eq!(clause["range"]["ts"]["gte"], json!(1704067200000i64));
        assert_eq!(clause["range"]["ts"]["format"], "epoch_millis");

        let iso = TimeRange::Absolute {
            from: Some(TimeBound::parse("2024-01-01T00:00:00Z")),
            to: None,
            format: None,
        };
        let clause = range_clause(&iso, "ts").unwrap();
        assert_eq!(clause["range"]["ts"]["format"], "strict_date_optional_time");
        assert!(clause["range"]["ts"].get("lte").is_none());

        let mixed = TimeRange::Absolute {
            from: Some(TimeBound::parse("2024-01-01")),
            to: Some(TimeBound::parse("1704070800000")),
            format: Some("yyyy-MM-dd||epoch_millis".to_string()),
        };
        let clause = range_clause(&mixed, "ts").unwrap();
        assert_eq!(clause["range"]["ts"]["format"], "yyyy-MM-dd||epoch_millis");
    }

    #[test]
    fn test_open_absolute_range_is_skipped() {
        let range = TimeRange::Absolute {
            from: None,
            to: None,
            format: None,
        };
        assert_eq!(range_clause(&range, "ts"), None);
    }

    #[test]
    fn test_sort_is_tie_broken() {
        let body = build_search_body(&QuerySpec::default(), &sort(), 50, true);
        assert_eq!(body["size"], 50);
        assert_eq!(
            body["sort"],
            json!([
                {"@timestamp": {"order": "desc", "unmapped_type": "date"}},
                {"_id": {"order": "desc"}},
            ])
        );
    }

    #[test]
    fn test_field_filter_parse() {
        assert_eq!(
            FieldFilter::parse("level = ERROR"),
            Some(FieldFilter::new("level", "ERROR"))
        );
        assert_eq!(FieldFilter::parse("=x"), None);
        assert_eq!(FieldFilter::parse("novalue"), None);
    }
}
