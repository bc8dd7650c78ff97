//! Threshold filtering and ordering of aggregated summaries

use crate::aggregator::QuerySummary;
use crate::config::Config;
use std::cmp::Ordering;

/// Whether a summary clears every threshold in `config`. All bounds are inclusive.
pub fn is_valid(summary: &QuerySummary, config: &Config) -> bool {
    summary.calls >= config.min_calls
        && summary.average_query_time >= config.min_query_time
        && summary.average_lock_time >= config.min_lock_time
        && summary.average_rows_sent >= config.min_rows_sent
        && summary.average_rows_examined >= config.min_rows_examined
        && summary.row_efficiency() <= config.max_row_efficiency
}

/// Keeps the summaries that pass [`is_valid`], preserving their order.
pub fn select(summaries: Vec<QuerySummary>, config: &Config) -> Vec<QuerySummary> {
    summaries
        .into_iter()
        .filter(|summary| is_valid(summary, config))
        .collect()
}

/// Stable sort by the configured statistic. Ties keep their incoming
/// (discovery) order in both directions.
pub fn rank(summaries: &mut [QuerySummary], config: &Config) {
    summaries.sort_by(|a, b| compare(a, b, config));
}

/// Selects, ranks and truncates to the configured report size.
pub fn top(summaries: Vec<QuerySummary>, config: &Config) -> Vec<QuerySummary> {
    let mut selected = select(summaries, config);
    rank(&mut selected, config);
    selected.truncate(config.count);
    selected
}

/// Compares two summaries on the configured statistic in the configured direction.
pub fn compare(a: &QuerySummary, b: &QuerySummary, config: &Config) -> Ordering {
    let ordering = config.sort_key.value(a).total_cmp(&config.sort_key.value(b));
    if config.ascending {
        ordering
    } else {
        ordering.reverse()
    }
}
