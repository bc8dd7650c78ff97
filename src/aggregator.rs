use crate::parser::Query;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Running-average statistics for every occurrence of one SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySummary {
    pub calls: u64,
    pub average_query_time: f64,
    pub average_lock_time: f64,
    pub average_rows_sent: f64,
    pub average_rows_examined: f64,
    pub sql: String,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl QuerySummary {
    /// Seeds a summary from the first occurrence of a query.
    pub fn new(query: Query) -> Self {
        Self {
            calls: 1,
            average_query_time: query.query_time,
            average_lock_time: query.lock_time,
            average_rows_sent: query.rows_sent as f64,
            average_rows_examined: query.rows_examined as f64,
            first_seen: query.timestamp,
            last_seen: query.timestamp,
            sql: query.sql,
        }
    }

    /// Folds another occurrence into the running averages.
    pub fn add_query(&mut self, query: &Query) {
        self.calls += 1;
        let n = self.calls as f64;
        self.average_query_time = adjust_average(self.average_query_time, n, query.query_time);
        self.average_lock_time = adjust_average(self.average_lock_time, n, query.lock_time);
        self.average_rows_sent = adjust_average(self.average_rows_sent, n, query.rows_sent as f64);
        self.average_rows_examined =
            adjust_average(self.average_rows_examined, n, query.rows_examined as f64);

        if let Some(ts) = query.timestamp {
            if self.first_seen.map_or(true, |first| ts < first) {
                self.first_seen = Some(ts);
            }
            if self.last_seen.map_or(true, |last| ts > last) {
                self.last_seen = Some(ts);
            }
        }
    }

    /// Rows sent per row examined. A query that examined nothing counts as fully efficient.
    pub fn row_efficiency(&self) -> f64 {
        if self.average_rows_examined > 0.0 {
            self.average_rows_sent / self.average_rows_examined
        } else {
            1.0
        }
    }
}

fn adjust_average(mean: f64, n: f64, value: f64) -> f64 {
    mean + (value - mean) / n
}

/// Summaries keyed by exact SQL text, kept in discovery order.
#[derive(Debug, Default)]
pub struct Aggregator {
    index: HashMap<String, usize>,
    summaries: Vec<QuerySummary>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a completed query into the summary sharing its SQL text.
    pub fn merge(&mut self, query: Query) {
        match self.index.get(&query.sql) {
            Some(&slot) => self.summaries[slot].add_query(&query),
            None => {
                self.index.insert(query.sql.clone(), self.summaries.len());
                self.summaries.push(QuerySummary::new(query));
            }
        }
    }

    pub fn get(&self, sql: &str) -> Option<&QuerySummary> {
        self.index.get(sql).map(|&slot| &self.summaries[slot])
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn summaries(&self) -> &[QuerySummary] {
        &self.summaries
    }

    pub fn into_summaries(self) -> Vec<QuerySummary> {
        self.summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn query(sql: &str, query_time: f64, lock_time: f64, sent: u64, examined: u64) -> Query {
        Query {
            query_time,
            lock_time,
            rows_sent: sent,
            rows_examined: examined,
            timestamp: None,
            sql: sql.to_string(),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_first_occurrence_seeds_summary() {
        let mut agg = Aggregator::new();
        agg.merge(query("SELECT 1;", 1.5, 0.25, 3, 30));

        let summary = agg.get("SELECT 1;").unwrap();
        assert_eq!(summary.calls, 1);
        assert_eq!(summary.average_query_time, 1.5);
        assert_eq!(summary.average_lock_time, 0.25);
        assert_eq!(summary.average_rows_sent, 3.0);
        assert_eq!(summary.average_rows_examined, 30.0);
        assert_eq!(summary.sql, "SELECT 1;");
    }

    #[test]
    fn test_running_average_matches_arithmetic_mean() {
        let samples = [
            (0.5, 0.01, 1, 100),
            (2.0, 0.0, 7, 7),
            (1.25, 0.5, 0, 1000),
            (9.0, 0.125, 42, 43),
            (0.001, 0.0, 3, 9),
        ];
        let mut agg = Aggregator::new();
        for &(qt, lt, sent, examined) in &samples {
            agg.merge(query("SELECT * FROM t", qt, lt, sent, examined));
        }

        let n = samples.len() as f64;
        let summary = agg.get("SELECT * FROM t").unwrap();
        assert_eq!(summary.calls, samples.len() as u64);
        assert_close(summary.average_query_time, samples.iter().map(|s| s.0).sum::<f64>() / n);
        assert_close(summary.average_lock_time, samples.iter().map(|s| s.1).sum::<f64>() / n);
        assert_close(summary.average_rows_sent, samples.iter().map(|s| s.2 as f64).sum::<f64>() / n);
        assert_close(
            summary.average_rows_examined,
            samples.iter().map(|s| s.3 as f64).sum::<f64>() / n,
        );
    }

    #[test]
    fn test_merge_order_does_not_change_averages() {
        let times = [3.0, 0.5, 8.25, 1.0];
        let mut forward = Aggregator::new();
        let mut backward = Aggregator::new();
        for &t in &times {
            forward.merge(query("q", t, 0.0, 1, 1));
        }
        for &t in times.iter().rev() {
            backward.merge(query("q", t, 0.0, 1, 1));
        }
        assert_close(
            forward.get("q").unwrap().average_query_time,
            backward.get("q").unwrap().average_query_time,
        );
    }

    #[test]
    fn test_distinct_sql_texts_stay_separate() {
        let mut agg = Aggregator::new();
        agg.merge(query("SELECT 1;", 1.0, 0.0, 1, 1));
        agg.merge(query("SELECT 2;", 1.0, 0.0, 1, 1));
        agg.merge(query("SELECT 1;", 3.0, 0.0, 1, 1));

        assert_eq!(agg.len(), 2);
        let order: Vec<&str> = agg.summaries().iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(order, vec!["SELECT 1;", "SELECT 2;"]);
        assert_eq!(agg.get("SELECT 1;").unwrap().calls, 2);
        assert_eq!(agg.get("SELECT 2;").unwrap().calls, 1);
    }

    #[test]
    fn test_row_efficiency() {
        let mut agg = Aggregator::new();
        agg.merge(query("none examined", 0.1, 0.0, 0, 0));
        agg.merge(query("half", 0.1, 0.0, 5, 10));
        agg.merge(query("more sent", 0.1, 0.0, 20, 10));

        assert_eq!(agg.get("none examined").unwrap().row_efficiency(), 1.0);
        assert_eq!(agg.get("half").unwrap().row_efficiency(), 0.5);
        assert_eq!(agg.get("more sent").unwrap().row_efficiency(), 2.0);
    }

    #[test]
    fn test_seen_range_tracks_extremes() {
        let early = Utc.with_ymd_and_hms(2023, 10, 27, 9, 0, 0).unwrap();
        let middle = Utc.with_ymd_and_hms(2023, 10, 27, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2023, 10, 27, 11, 0, 0).unwrap();

        let mut agg = Aggregator::new();
        for ts in [Some(middle), None, Some(late), Some(early)] {
            let mut q = query("q", 1.0, 0.0, 1, 1);
            q.timestamp = ts;
            agg.merge(q);
        }

        let summary = agg.get("q").unwrap();
        assert_eq!(summary.first_seen, Some(early));
        assert_eq!(summary.last_seen, Some(late));
    }
}
