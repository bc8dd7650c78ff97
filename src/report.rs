use crate::aggregator::QuerySummary;
use crate::config::OutputFormat;
use crate::error::Result;
use chrono::{FixedOffset, Offset, Utc};
use log::warn;
use std::io::Write;
use std::path::PathBuf;
use tabled::{Table, Tabled};

const TEXT_HEADER: &str = "Calls  Query Time  Lock Time  Rows Sent  Rows Examined  Efficiency  SQL";

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Calls")]
    calls: u64,
    #[tabled(rename = "Query Time")]
    query_time: String,
    #[tabled(rename = "Lock Time")]
    lock_time: String,
    #[tabled(rename = "Rows Sent")]
    rows_sent: String,
    #[tabled(rename = "Rows Examined")]
    rows_examined: String,
    #[tabled(rename = "Efficiency")]
    efficiency: String,
    #[tabled(rename = "Query ID")]
    query_id: String,
    #[tabled(rename = "Query")]
    query: String,
}

/// Report-ready view of one ranked summary.
#[derive(Debug)]
struct ReportItem<'a> {
    index: usize,
    query_id: String,
    time_range: String,
    summary: &'a QuerySummary,
}

/// Writes the report to `output_path`, or to stdout when no path is given.
pub fn print_report(
    summaries: &[QuerySummary],
    format: OutputFormat,
    output_path: Option<&PathBuf>,
    timezone_str: &str,
) -> Result<()> {
    let mut writer: Box<dyn Write> = if let Some(path) = output_path {
        Box::new(std::fs::File::create(path)?)
    } else {
        Box::new(std::io::stdout().lock())
    };
    write_report(summaries, format, timezone_str, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Renders already ranked and truncated summaries in the requested format.
pub fn write_report(
    summaries: &[QuerySummary],
    format: OutputFormat,
    timezone_str: &str,
    writer: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print_text_table(summaries, writer)?;
            print_sql_listing(summaries, writer)?;
        }
        OutputFormat::Grid => {
            let items = prepare_report_items(summaries, timezone_str);
            print_grid(&items, writer)?;
            print_detailed_sections(&items, writer)?;
        }
        OutputFormat::Html => {
            let items = prepare_report_items(summaries, timezone_str);
            print_html(&items, writer)?;
        }
    }
    Ok(())
}

/// Display identifier for a SQL text.
pub fn query_id(sql: &str) -> String {
    format!("{:x}", md5::compute(sql))
}

fn print_text_table(summaries: &[QuerySummary], writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "{}", TEXT_HEADER)?;
    for (index, summary) in summaries.iter().enumerate() {
        writeln!(
            writer,
            "{:>5}  {:>10.3}  {:>9.3}  {:>9.2}  {:>13.2}  {:>10.1}  [{}] Below",
            summary.calls,
            summary.average_query_time,
            summary.average_lock_time,
            summary.average_rows_sent,
            summary.average_rows_examined,
            summary.row_efficiency() * 100.0,
            index
        )?;
    }
    Ok(())
}

fn print_sql_listing(summaries: &[QuerySummary], writer: &mut dyn Write) -> Result<()> {
    for (index, summary) in summaries.iter().enumerate() {
        writeln!(writer)?;
        writeln!(writer, "[{}] SQL Statement:", index)?;
        writeln!(writer, "{}", summary.sql)?;
    }
    Ok(())
}

fn prepare_report_items<'a>(summaries: &'a [QuerySummary], timezone_str: &str) -> Vec<ReportItem<'a>> {
    let tz_offset = parse_timezone(timezone_str);
    summaries
        .iter()
        .enumerate()
        .map(|(index, summary)| {
            let time_range = match (summary.first_seen, summary.last_seen) {
                (Some(first), Some(last)) => format!(
                    "{} - {}",
                    first.with_timezone(&tz_offset).format("%Y-%m-%d %H:%M:%S %z"),
                    last.with_timezone(&tz_offset).format("%Y-%m-%d %H:%M:%S %z")
                ),
                _ => "N/A".to_string(),
            };
            ReportItem {
                index,
                query_id: query_id(&summary.sql),
                time_range,
                summary,
            }
        })
        .collect()
}

fn parse_timezone(timezone_str: &str) -> FixedOffset {
    match timezone_str.parse::<FixedOffset>() {
        Ok(offset) => offset,
        Err(_) => {
            warn!("Invalid timezone offset '{}', using UTC.", timezone_str);
            Utc.fix()
        }
    }
}

fn print_grid(items: &[ReportItem], writer: &mut dyn Write) -> Result<()> {
    let rows: Vec<Row> = items
        .iter()
        .map(|item| Row {
            index: item.index,
            calls: item.summary.calls,
            query_time: format!("{:.3}s", item.summary.average_query_time),
            lock_time: format!("{:.3}s", item.summary.average_lock_time),
            rows_sent: format!("{:.2}", item.summary.average_rows_sent),
            rows_examined: format!("{:.2}", item.summary.average_rows_examined),
            efficiency: format!("{:.1}%", item.summary.row_efficiency() * 100.0),
            query_id: item.query_id.clone(),
            query: format_query(&item.summary.sql, 50),
        })
        .collect();

    let table = Table::new(rows).to_string();
    writeln!(writer, "{}", table)?;
    Ok(())
}

fn print_detailed_sections(items: &[ReportItem], writer: &mut dyn Write) -> Result<()> {
    for item in items {
        writeln!(writer)?;
        writeln!(writer, "[{}] SQL Statement:", item.index)?;
        writeln!(writer, "  Query ID:   {}", item.query_id)?;
        writeln!(writer, "  Time Range: {}", item.time_range)?;
        writeln!(writer, "{}", item.summary.sql)?;
    }
    Ok(())
}

fn print_html(items: &[ReportItem], writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "<!DOCTYPE html>")?;
    writeln!(writer, "<html>")?;
    writeln!(writer, "<head>")?;
    writeln!(writer, "<title>Slow Query Analysis Report</title>")?;
    writeln!(writer, "<style>")?;
    writeln!(writer, "body {{ font-family: sans-serif; margin: 20px; }}")?;
    writeln!(writer, "table {{ border-collapse: collapse; width: 100%; margin-bottom: 20px; }}")?;
    writeln!(writer, "th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}")?;
    writeln!(writer, "th {{ background-color: #f2f2f2; }}")?;
    writeln!(writer, "td.num {{ text-align: right; }}")?;
    writeln!(writer, ".query-block {{ border: 1px solid #ccc; padding: 15px; margin-bottom: 20px; border-radius: 5px; }}")?;
    writeln!(writer, ".query-sql {{ background-color: #f8f8f8; padding: 10px; overflow-x: auto; font-family: monospace; }}")?;
    writeln!(writer, ".query-id {{ font-family: monospace; }}")?;
    writeln!(writer, "</style>")?;
    writeln!(writer, "</head>")?;
    writeln!(writer, "<body>")?;

    writeln!(writer, "<h1 id=\"top\">Slow Query Analysis Report</h1>")?;

    writeln!(writer, "<h2>Summary</h2>")?;
    writeln!(writer, "<table>")?;
    writeln!(writer, "<thead><tr><th>#</th><th>Calls</th><th>Query Time</th><th>Lock Time</th><th>Rows Sent</th><th>Rows Examined</th><th>Efficiency</th><th>Query</th></tr></thead>")?;
    writeln!(writer, "<tbody>")?;
    for item in items {
        let summary = item.summary;
        writeln!(writer, "<tr>")?;
        writeln!(writer, "<td><a href=\"#q{}\">{}</a></td>", item.query_id, item.index)?;
        writeln!(writer, "<td class=\"num\">{}</td>", summary.calls)?;
        writeln!(writer, "<td class=\"num\">{:.3}s</td>", summary.average_query_time)?;
        writeln!(writer, "<td class=\"num\">{:.3}s</td>", summary.average_lock_time)?;
        writeln!(writer, "<td class=\"num\">{:.2}</td>", summary.average_rows_sent)?;
        writeln!(writer, "<td class=\"num\">{:.2}</td>", summary.average_rows_examined)?;
        writeln!(writer, "<td class=\"num\">{:.1}%</td>", summary.row_efficiency() * 100.0)?;
        writeln!(writer, "<td>{}</td>", html_escape(&format_query(&summary.sql, 100)))?;
        writeln!(writer, "</tr>")?;
    }
    writeln!(writer, "</tbody>")?;
    writeln!(writer, "</table>")?;

    writeln!(writer, "<h2>SQL Statements</h2>")?;
    for item in items {
        writeln!(writer, "<div id=\"q{}\" class=\"query-block\">", item.query_id)?;
        writeln!(writer, "<h3>[{}] Query ID <span class=\"query-id\">{}</span></h3>", item.index, item.query_id)?;
        writeln!(writer, "<p><strong>Time Range:</strong> {}</p>", item.time_range)?;
        writeln!(writer, "<div class=\"query-sql\"><pre>{}</pre></div>", html_escape(&item.summary.sql))?;
        writeln!(writer, "<p><a href=\"#top\">Back to Top</a></p>")?;
        writeln!(writer, "</div>")?;
    }

    writeln!(writer, "</body>")?;
    writeln!(writer, "</html>")?;
    Ok(())
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Flattens a statement onto one line, cut to `max_chars` characters.
fn format_query(query: &str, max_chars: usize) -> String {
    let flat = query.replace('\n', " ");
    if flat.chars().count() > max_chars {
        let mut cut: String = flat.chars().take(max_chars - 3).collect();
        cut.push_str("...");
        cut
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn summary(sql: &str, calls: u64, query_time: f64, sent: f64, examined: f64) -> QuerySummary {
        QuerySummary {
            calls,
            average_query_time: query_time,
            average_lock_time: 0.25,
            average_rows_sent: sent,
            average_rows_examined: examined,
            sql: sql.to_string(),
            first_seen: None,
            last_seen: None,
        }
    }

    fn render(summaries: &[QuerySummary], format: OutputFormat, timezone: &str) -> String {
        let mut out = Vec::new();
        write_report(summaries, format, timezone, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_text_report_layout() {
        let summaries = vec![
            summary("SELECT 1;", 2, 2.0, 10.0, 10.0),
            summary("SELECT *\nFROM users;", 1, 12.5, 5.0, 200.0),
        ];
        let output = render(&summaries, OutputFormat::Text, "+00:00");

        let expected = "\
Calls  Query Time  Lock Time  Rows Sent  Rows Examined  Efficiency  SQL
    2       2.000      0.250      10.00          10.00       100.0  [0] Below
    1      12.500      0.250       5.00         200.00         2.5  [1] Below

[0] SQL Statement:
SELECT 1;

[1] SQL Statement:
SELECT *
FROM users;
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_empty_text_report_is_header_only() {
        let output = render(&[], OutputFormat::Text, "+00:00");
        assert_eq!(output, format!("{}\n", TEXT_HEADER));
    }

    #[test]
    fn test_grid_report_includes_query_id_and_time_range() {
        let mut s = summary("SELECT 1;", 3, 0.5, 1.0, 4.0);
        s.first_seen = Some(Utc.with_ymd_and_hms(2023, 10, 27, 1, 0, 0).unwrap());
        s.last_seen = Some(Utc.with_ymd_and_hms(2023, 10, 27, 2, 0, 0).unwrap());
        let output = render(&[s], OutputFormat::Grid, "+09:00");

        assert!(output.contains(&query_id("SELECT 1;")));
        assert!(output.contains("25.0%"));
        assert!(output.contains("2023-10-27 10:00:00 +0900 - 2023-10-27 11:00:00 +0900"));
        assert!(output.contains("[0] SQL Statement:"));
    }

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        let mut s = summary("SELECT 1;", 1, 0.5, 1.0, 1.0);
        s.first_seen = Some(Utc.with_ymd_and_hms(2023, 10, 27, 1, 0, 0).unwrap());
        s.last_seen = s.first_seen;
        let output = render(&[s], OutputFormat::Grid, "nowhere");
        assert!(output.contains("2023-10-27 01:00:00 +0000"));
    }

    #[test]
    fn test_html_report_escapes_sql() {
        let summaries = vec![summary("SELECT * FROM t WHERE a < 'x' & b > 2", 1, 1.0, 1.0, 1.0)];
        let output = render(&summaries, OutputFormat::Html, "+00:00");

        assert!(output.starts_with("<!DOCTYPE html>"));
        assert!(output.contains("SELECT * FROM t WHERE a &lt; &#39;x&#39; &amp; b &gt; 2"));
        assert!(!output.contains("a < 'x'"));
        assert!(output.contains(&format!("id=\"q{}\"", query_id(&summaries[0].sql))));
    }

    #[test]
    fn test_query_id_is_md5_hex() {
        assert_eq!(query_id(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(query_id("SELECT 1;").len(), 32);
    }

    #[test]
    fn test_format_query_truncates_on_char_boundaries() {
        let long = "SELECT 'äöü' FROM t WHERE x = 1 AND y = 2 AND z = 3 AND w = 4";
        let formatted = format_query(long, 20);
        assert_eq!(formatted.chars().count(), 20);
        assert!(formatted.ends_with("..."));
        assert_eq!(format_query("a\nb", 20), "a b");
    }
}
