use crate::delivery::{Consumer, DeliveryError};
use crate::record::CanonicalRecord;
use async_trait::async_trait;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One human-readable line per record, stack traces indented below.
    Text,
    /// One JSON object per line.
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub fn render(record: &CanonicalRecord, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string(record),
        OutputFormat::Text => Ok(render_text(record)),
    }
}

fn render_text(record: &CanonicalRecord) -> String {
    let mut line = String::new();
    if let Some(timestamp) = &record.timestamp {
        line.push_str(timestamp);
        line.push(' ');
    }
    line.push_str(&format!("{:<5} ", record.level.as_deref().unwrap_or("-")));
    if let Some(logger) = &record.logger {
        line.push_str(&format!("[{}] ", logger));
    }
    line.push_str(&record.message);
    if let Some(trace_id) = &record.trace_id {
        line.push_str(&format!(" trace={}", trace_id));
    }
    if let Some(stack) = &record.stack_trace {
        for frame in stack.lines() {
            line.push_str("\n    ");
            line.push_str(frame);
        }
    }
    line
}

pub fn write_records<W: Write>(
    out: &mut W,
    records: &[CanonicalRecord],
    format: OutputFormat,
) -> Result<(), DeliveryError> {
    for record in records {
        writeln!(out, "{}", render(record, format)?)?;
    }
    out.flush()?;
    Ok(())
}

/// Consumer that prints delivered batches to stdout.
pub struct StdoutConsumer {
    id: String,
    format: OutputFormat,
}

impl StdoutConsumer {
    pub fn new(id: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            id: id.into(),
            format,
        }
    }
}

#[async_trait]
impl Consumer for StdoutConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, batch: &[CanonicalRecord]) -> Result<(), DeliveryError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        write_records(&mut out, batch, self.format)
    }
}
