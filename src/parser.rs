use crate::aggregator::Aggregator;
use crate::config::TrailingRecord;
use crate::error::{AnalyzerError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use regex::Regex;
use std::io::BufRead;
use std::mem;
use std::path::Path;
use std::sync::OnceLock;

/// One slow log record: the metadata line plus the SQL text that followed it.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub query_time: f64,
    pub lock_time: f64,
    pub rows_sent: u64,
    pub rows_examined: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub sql: String,
}

impl Query {
    pub fn new(query_time: f64, lock_time: f64, rows_sent: u64, rows_examined: u64) -> Self {
        Self {
            query_time,
            lock_time,
            rows_sent,
            rows_examined,
            timestamp: None,
            sql: String::new(),
        }
    }

    /// Appends a line of statement text as a new segment.
    pub fn add_sql(&mut self, line: &str) {
        if !self.sql.is_empty() {
            self.sql.push('\n');
        }
        self.sql.push_str(line);
    }
}

static RE_METADATA: OnceLock<Regex> = OnceLock::new();
static RE_TIME: OnceLock<Regex> = OnceLock::new();
static RE_IGNORED: OnceLock<Regex> = OnceLock::new();

fn re_metadata() -> &'static Regex {
    RE_METADATA.get_or_init(|| {
        Regex::new(r"^#\s*Query_time:\s*(\S+)\s+Lock_time:\s*(\S+)\s+Rows_sent:\s*(\S+)\s+Rows_examined:\s*(\S+)").unwrap()
    })
}

fn re_time() -> &'static Regex {
    RE_TIME.get_or_init(|| Regex::new(r"^#\s*Time:\s*(.+)$").unwrap())
}

fn re_ignored() -> &'static Regex {
    RE_IGNORED.get_or_init(|| Regex::new(r"^(?:SET timestamp|use(?:\s|;|$))").unwrap())
}

/// Counters describing what a parser saw, for diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: usize,
    pub records: usize,
    pub malformed: usize,
    pub trailing_dropped: usize,
}

#[derive(Debug)]
enum State {
    Idle,
    InRecord(Query),
}

/// Line-driven state machine that splits a slow log into queries and hands
/// each completed one to an [`Aggregator`].
#[derive(Debug)]
pub struct LogParser {
    state: State,
    trailing: TrailingRecord,
    strict: bool,
    current_time: Option<DateTime<Utc>>,
    line_number: usize,
    stats: ParseStats,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new(TrailingRecord::default(), false)
    }
}

impl LogParser {
    /// Creates a parser. With `strict` set, a malformed metadata value aborts
    /// parsing instead of dropping the record.
    pub fn new(trailing: TrailingRecord, strict: bool) -> Self {
        Self {
            state: State::Idle,
            trailing,
            strict,
            current_time: None,
            line_number: 0,
            stats: ParseStats::default(),
        }
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    pub fn in_record(&self) -> bool {
        matches!(self.state, State::InRecord(_))
    }

    /// Feeds a whole stream through the state machine, then applies the
    /// trailing record policy.
    pub fn parse_reader<R: BufRead>(
        &mut self,
        mut reader: R,
        source: &Path,
        aggregator: &mut Aggregator,
    ) -> Result<()> {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = reader
                .read_until(b'\n', &mut buffer)
                .map_err(|e| AnalyzerError::Read {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            if read == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buffer);
            self.process_line(&line, aggregator)?;
        }
        self.finish(aggregator);
        Ok(())
    }

    /// Classifies a single line and advances the state machine.
    pub fn process_line(&mut self, line: &str, aggregator: &mut Aggregator) -> Result<()> {
        self.line_number += 1;
        self.stats.lines += 1;
        let line = line.trim_end_matches(['\n', '\r']);
        let trimmed = line.trim_start();

        if let Some(caps) = re_metadata().captures(trimmed) {
            self.finalize(aggregator);
            match self.parse_metadata(&caps) {
                Ok(mut query) => {
                    query.timestamp = self.current_time;
                    self.state = State::InRecord(query);
                }
                Err(e) if !self.strict => {
                    warn!("Dropping record: {}", e);
                    self.stats.malformed += 1;
                }
                Err(e) => return Err(e),
            }
        } else if trimmed.starts_with('#') {
            self.finalize(aggregator);
            if let Some(caps) = re_time().captures(trimmed) {
                self.current_time = parse_time(caps[1].trim());
            }
        } else if let State::InRecord(query) = &mut self.state {
            if !re_ignored().is_match(line) {
                query.add_sql(line);
            }
        }
        Ok(())
    }

    /// Ends the current stream. The open record is merged or discarded
    /// according to the trailing record policy.
    pub fn finish(&mut self, aggregator: &mut Aggregator) {
        match self.trailing {
            TrailingRecord::Flush => self.finalize(aggregator),
            TrailingRecord::Drop => {
                if let State::InRecord(query) = mem::replace(&mut self.state, State::Idle) {
                    debug!("Discarding unterminated record: {:?}", query.sql);
                    self.stats.trailing_dropped += 1;
                }
            }
        }
        self.line_number = 0;
        self.current_time = None;
    }

    fn finalize(&mut self, aggregator: &mut Aggregator) {
        if let State::InRecord(query) = mem::replace(&mut self.state, State::Idle) {
            self.stats.records += 1;
            aggregator.merge(query);
        }
    }

    fn parse_metadata(&self, caps: &regex::Captures) -> Result<Query> {
        let query_time = self.parse_seconds(&caps[1], "Query_time")?;
        let lock_time = self.parse_seconds(&caps[2], "Lock_time")?;
        let rows_sent = self.parse_rows(&caps[3], "Rows_sent")?;
        let rows_examined = self.parse_rows(&caps[4], "Rows_examined")?;
        Ok(Query::new(query_time, lock_time, rows_sent, rows_examined))
    }

    fn parse_seconds(&self, value: &str, field: &'static str) -> Result<f64> {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.malformed(field, value))
    }

    fn parse_rows(&self, value: &str, field: &'static str) -> Result<u64> {
        value.parse::<u64>().map_err(|_| self.malformed(field, value))
    }

    fn malformed(&self, field: &'static str, value: &str) -> AnalyzerError {
        AnalyzerError::MalformedMetadata {
            line_number: self.line_number,
            field,
            value: value.to_string(),
        }
    }
}

/// Parses the value of a `# Time:` line, in either the ISO 8601 form or the
/// legacy `YYMMDD HH:MM:SS` form.
fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    match NaiveDateTime::parse_from_str(&collapsed, "%y%m%d %H:%M:%S") {
        Ok(naive) => Some(naive.and_utc()),
        Err(_) => {
            debug!("Unrecognized time value: {}", value);
            None
        }
    }
}
