use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DatasetStatus, ProgressEvent, ProgressSink, UpdateReport};
use crate::fasta::MergeSummary;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_update(report: &UpdateReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_status(statuses: &[DatasetStatus]) -> io::Result<()> {
        Self::print_json(&statuses)
    }

    pub fn print_merge(summary: &MergeSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                dataset = %event.dataset,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!(dataset = %event.dataset, "{}", event.message),
        }
    }
}
