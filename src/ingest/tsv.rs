//! Tab-separated search log reader
//!
//! Each line holds `timestamp<TAB>query`. Bad lines are skipped with a
//! warning rather than failing the whole load; only I/O errors are
//! returned to the caller.

use crate::config::IngestConfig;
use crate::core::event::QueryEvent;
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Log a progress line every this many lines
pub const PROGRESS_EVERY_N_LINES: u64 = 10_000;

/// Counters for one pass over a log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Lines read, good or bad
    pub lines: u64,
    /// Events handed out
    pub events: u64,
    /// Lines skipped as malformed
    pub skipped: u64,
}

/// Streaming reader turning a TSV log into [`QueryEvent`]s
pub struct TsvLogReader<R: Read> {
    records: StringRecordsIntoIter<R>,
    options: IngestConfig,
    stats: IngestStats,
    finished: bool,
}

impl TsvLogReader<File> {
    /// Open a log file
    pub fn open<P: AsRef<Path>>(path: P, options: IngestConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        info!(path = %path.display(), "Processing log file");
        Ok(Self::from_reader(file, options))
    }
}

impl<R: Read> TsvLogReader<R> {
    /// Read a log from any byte source
    pub fn from_reader(reader: R, options: IngestConfig) -> Self {
        let records = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(reader)
            .into_records();
        Self {
            records,
            options,
            stats: IngestStats::default(),
            finished: false,
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    fn skip(&mut self, error: &Error) {
        self.stats.skipped += 1;
        warn!("{}. It will be ignored.", error);
    }
}

impl<R: Read> Iterator for TsvLogReader<R> {
    type Item = Result<QueryEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let Some(record) = self.records.next() else {
                self.finished = true;
                info!(
                    lines = self.stats.lines,
                    events = self.stats.events,
                    skipped = self.stats.skipped,
                    "Finished processing log file"
                );
                return None;
            };
            self.stats.lines += 1;
            let line = self.stats.lines;

            if self.stats.lines % PROGRESS_EVERY_N_LINES == 0 {
                info!("Read {} lines", self.stats.lines);
            }

            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_io_error() => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                Err(e) => {
                    let error = Error::MalformedEvent {
                        line,
                        reason: e.to_string(),
                    };
                    self.skip(&error);
                    continue;
                }
            };

            match parse_record(&record, line, &self.options) {
                Ok(event) => {
                    self.stats.events += 1;
                    return Some(Ok(event));
                }
                Err(error) => self.skip(&error),
            }
        }
    }
}

/// Turn one TSV record into an event.
///
/// Both fields are trimmed. The record must have exactly two columns, a
/// non-empty query and a non-empty timestamp that, when validation is on,
/// parses with the configured format.
pub fn parse_record(
    record: &StringRecord,
    line: u64,
    options: &IngestConfig,
) -> Result<QueryEvent> {
    let malformed = |reason: String| Error::MalformedEvent { line, reason };

    if record.len() != 2 {
        return Err(malformed(format!(
            "expected 2 columns, found {}",
            record.len()
        )));
    }

    let timestamp = record[0].trim();
    if timestamp.is_empty() {
        return Err(malformed("timestamp is empty".to_string()));
    }
    if options.validate_timestamps
        && NaiveDateTime::parse_from_str(timestamp, &options.timestamp_format).is_err()
    {
        return Err(malformed(format!("timestamp {} is invalid", timestamp)));
    }

    let query = record[1].trim();
    if query.is_empty() {
        return Err(malformed("search query is empty".to_string()));
    }

    Ok(QueryEvent::new(timestamp, query))
}
