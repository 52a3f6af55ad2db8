pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# LOGTIDE CONFIGURATION
# =============================================================================
# Every section is optional; omitted settings fall back to the defaults shown.
# Values may reference environment variables with $env{VAR_NAME}.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/logtide/config.yml
#   3. /etc/logtide/config.yml

# =============================================================================
# SOCKET SOURCE
# =============================================================================
# Accepts newline-delimited log events over TCP (e.g. a logback/log4j socket
# appender emitting JSON lines).

socket:
  enabled: false
  bind: 0.0.0.0
  port: 4560
  # Longer lines are flushed as-is once they reach this size
  max_line_bytes: 1048576
  # When non-empty, only these peer addresses may connect
  allowed_peers: []

# =============================================================================
# POLLING SOURCES
# =============================================================================
# URLs fetched on an interval by `logtide run`. Only records not seen on a
# previous tick are forwarded.

polls: []
#  - url: http://localhost:8080/actuator/logfile
#    interval: 5s

poll:
  # Intervals shorter than this are raised to it
  min_interval: 500ms
  timeout: 30s
  # Fresh records are forwarded in slices of this size
  forward_chunk: 1000

# =============================================================================
# SEARCH SOURCE
# =============================================================================
# Defaults for paginated searches against an Elasticsearch/OpenSearch-style
# backend. The wire dialect (PIT, OpenSearch PIT, or scroll) is detected per
# session.

search:
  page_size: 1000
  # Backend cursor lease, in the backend's own duration syntax
  keep_alive: 1m
  timeout: 30s
  # Retries for 429/5xx responses and timeouts, with exponential backoff
  max_retries: 4
  backoff_base: 300ms
  # Sessions unused for this long are closed locally
  idle_timeout: 10m
  timestamp_field: '@timestamp'
  tiebreak_field: _id
  # 'asc' or 'desc'
  sort_order: desc
  track_total_hits: true

# =============================================================================
# DELIVERY
# =============================================================================

delivery:
  batch_size: 200
  # String fields longer than this are cut and marked truncated
  max_field_bytes: 10240
  # Per-consumer queue capacity; the oldest records are dropped on overflow
  capacity: 50000
  min_capacity: 1000
  pacing:
    floor: 4ms
    ceiling: 100ms
    initial: 16ms
    slow_threshold: 50ms
    fast_threshold: 10ms
  memory:
    # 'process_memory' (resident set size) or 'queued_bytes'
    signal: process_memory
    sample_interval: 5s
    high_water: 0.85
    low_water: 0.6
    shrink_factor: 0.5
    grow_factor: 1.25
    # Pressure denominator; defaults to total system memory for
    # process_memory and 256 MiB for queued_bytes
    # budget_bytes: 536870912
"#
    .to_string()
}
