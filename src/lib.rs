//! slowquery-analyzer - MySQL slow query log summarizer
//!
//! Splits slow query logs into records, merges repeated statements into
//! running-average summaries, and ranks them for reporting.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod parser;
pub mod ranking;
pub mod report;

pub use aggregator::{Aggregator, QuerySummary};
pub use config::{Config, OutputFormat, SortKey, TrailingRecord};
pub use error::{AnalyzerError, Result};
pub use parser::{LogParser, ParseStats, Query};
