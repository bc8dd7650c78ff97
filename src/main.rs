use anyhow::Context;
use clap::Parser;
use log::info;
use slowquery_analyzer::{
    ranking, report, Aggregator, AnalyzerError, Config, LogParser, OutputFormat, SortKey,
    TrailingRecord,
};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about = "Summarize MySQL slow query logs by recurring statement", long_about = None)]
struct Args {
    /// Slow query log file(s); standard input is read when none are given
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Number of items to report
    #[arg(long, value_name = "NUMBER", default_value_t = 10)]
    count: usize,

    /// Minimum number of calls
    #[arg(long, value_name = "NUMBER", default_value_t = 1)]
    min_calls: u64,

    /// Minimum average query time in seconds; can be a fraction of a second
    #[arg(long = "min-query", value_name = "SECONDS", default_value_t = 0.0)]
    min_query: f64,

    /// Minimum average lock time in seconds; can be a fraction of a second
    #[arg(long = "min-lock", value_name = "SECONDS", default_value_t = 0.0)]
    min_lock: f64,

    /// Minimum average number of rows returned
    #[arg(long, value_name = "NUMBER", default_value_t = 0.0)]
    min_rows_sent: f64,

    /// Minimum average number of rows examined
    #[arg(long, value_name = "NUMBER", default_value_t = 0.0)]
    min_rows_examined: f64,

    /// Maximum row efficiency, expressed as a percentage
    #[arg(long, value_name = "PERCENT", default_value_t = 100.0)]
    max_row_efficiency: f64,

    /// Sort the report ascending by TYPE
    #[arg(short = 'a', long = "sort-ascend", value_name = "TYPE", value_enum, conflicts_with = "sort_descend")]
    sort_ascend: Option<SortKey>,

    /// Sort the report descending by TYPE (default: calls)
    #[arg(short = 'd', long = "sort-descend", value_name = "TYPE", value_enum)]
    sort_descend: Option<SortKey>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Output file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Timezone offset for displayed times (e.g., "+09:00")
    #[arg(long, default_value = "+00:00")]
    timezone: String,

    /// Count a record left open at the end of a file instead of dropping it
    #[arg(long)]
    flush_at_eof: bool,

    /// Abort on malformed metadata values instead of skipping the record
    #[arg(long)]
    strict: bool,
}

impl Args {
    fn config(&self) -> Config {
        let (sort_key, ascending) = match (self.sort_ascend, self.sort_descend) {
            (Some(key), _) => (key, true),
            (None, Some(key)) => (key, false),
            (None, None) => (SortKey::Calls, false),
        };
        Config {
            count: self.count,
            min_calls: self.min_calls,
            min_query_time: self.min_query,
            min_lock_time: self.min_lock,
            min_rows_sent: self.min_rows_sent,
            min_rows_examined: self.min_rows_examined,
            sort_key,
            ascending,
            ..Config::default()
        }
        .with_max_row_efficiency_percent(self.max_row_efficiency)
    }

    fn trailing_record(&self) -> TrailingRecord {
        if self.flush_at_eof {
            TrailingRecord::Flush
        } else {
            TrailingRecord::Drop
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = args.config();
    let mut parser = LogParser::new(args.trailing_record(), args.strict);
    let mut aggregator = Aggregator::new();

    if args.files.is_empty() {
        let stdin = io::stdin();
        parser
            .parse_reader(stdin.lock(), Path::new("<stdin>"), &mut aggregator)
            .context("failed to parse standard input")?;
    } else {
        for path in &args.files {
            let file = File::open(path).map_err(|source| AnalyzerError::Open {
                path: path.clone(),
                source,
            })?;
            parser
                .parse_reader(BufReader::new(file), path, &mut aggregator)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            info!("Processed {}", path.display());
        }
    }

    let stats = parser.stats();
    info!(
        "Parsed {} lines into {} records, {} distinct queries ({} malformed, {} unterminated)",
        stats.lines,
        stats.records,
        aggregator.len(),
        stats.malformed,
        stats.trailing_dropped
    );

    let ranked = ranking::top(aggregator.into_summaries(), &config);
    report::print_report(&ranked, args.format, args.output.as_ref(), &args.timezone)?;

    Ok(())
}
