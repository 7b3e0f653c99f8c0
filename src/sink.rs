//! Destinations for finished-call summaries.

use std::io;

use crate::summary::{AnalyticsSink, CallSummary, SinkError};

/// Appends each summary as one JSON object per line. `W` is typically a
/// locked stdout or an append-mode file.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W> JsonLinesSink<W>
where
    W: io::Write + Send + 'static,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> AnalyticsSink for JsonLinesSink<W>
where
    W: io::Write + Send + 'static,
{
    async fn record(&mut self, summary: &CallSummary) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, summary)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Swallows summaries. For runs where nobody is collecting.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AnalyticsSink for NullSink {
    async fn record(&mut self, _summary: &CallSummary) -> Result<(), SinkError> {
        Ok(())
    }
}
