//! Read-only analysis settings handed to the core by the command line layer

use crate::aggregator::QuerySummary;

/// Statistic a report can be ranked by.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Calls,
    #[value(name = "query")]
    QueryTime,
    #[value(name = "lock")]
    LockTime,
    #[value(name = "sent")]
    RowsSent,
    #[value(name = "examine")]
    RowsExamined,
    #[value(name = "eff")]
    RowEfficiency,
}

impl SortKey {
    /// Reads the statistic this key names from a summary.
    pub fn value(self, summary: &QuerySummary) -> f64 {
        match self {
            SortKey::Calls => summary.calls as f64,
            SortKey::QueryTime => summary.average_query_time,
            SortKey::LockTime => summary.average_lock_time,
            SortKey::RowsSent => summary.average_rows_sent,
            SortKey::RowsExamined => summary.average_rows_examined,
            SortKey::RowEfficiency => summary.row_efficiency(),
        }
    }
}

/// What happens to a record still open when an input stream ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrailingRecord {
    /// Discard it; only a boundary comment commits a record.
    #[default]
    Drop,
    /// Merge it into the aggregate like any other record.
    Flush,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Fixed-width columns followed by the SQL listing
    #[default]
    Text,
    /// Boxed table with time ranges and query ids
    Grid,
    /// Standalone HTML page
    Html,
}

/// Selection, ranking and report-size settings.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub count: usize,
    pub min_calls: u64,
    pub min_query_time: f64,
    pub min_lock_time: f64,
    pub min_rows_sent: f64,
    pub min_rows_examined: f64,
    /// Fraction, not percent.
    pub max_row_efficiency: f64,
    pub sort_key: SortKey,
    pub ascending: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            count: 10,
            min_calls: 1,
            min_query_time: 0.0,
            min_lock_time: 0.0,
            min_rows_sent: 0.0,
            min_rows_examined: 0.0,
            max_row_efficiency: 1.0,
            sort_key: SortKey::Calls,
            ascending: false,
        }
    }
}

impl Config {
    /// Sets the efficiency ceiling from a percentage as typed by the user.
    pub fn with_max_row_efficiency_percent(mut self, percent: f64) -> Self {
        self.max_row_efficiency = percent / 100.0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.count, 10);
        assert_eq!(config.min_calls, 1);
        assert_eq!(config.max_row_efficiency, 1.0);
        assert_eq!(config.sort_key, SortKey::Calls);
        assert!(!config.ascending);
    }

    #[test]
    fn test_max_row_efficiency_is_stored_as_fraction() {
        let config = Config::default().with_max_row_efficiency_percent(25.0);
        assert_eq!(config.max_row_efficiency, 0.25);
    }

    #[test]
    fn test_sort_key_names() {
        use clap::ValueEnum;
        assert_eq!(SortKey::from_str("calls", false), Ok(SortKey::Calls));
        assert_eq!(SortKey::from_str("query", false), Ok(SortKey::QueryTime));
        assert_eq!(SortKey::from_str("lock", false), Ok(SortKey::LockTime));
        assert_eq!(SortKey::from_str("sent", false), Ok(SortKey::RowsSent));
        assert_eq!(SortKey::from_str("examine", false), Ok(SortKey::RowsExamined));
        assert_eq!(SortKey::from_str("eff", false), Ok(SortKey::RowEfficiency));
        assert!(SortKey::from_str("bogus", false).is_err());
    }
}
