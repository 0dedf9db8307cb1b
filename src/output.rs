//! Result rendering for the command line.

use warehouse_exec::db::Record;

use crate::cli::OutputFormat;

/// Renders a complete result set.
pub fn format_records(records: &[Record], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_table(records),
        OutputFormat::Json => serde_json::to_string_pretty(records)
            .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize: {e}\"}}")),
    }
}

/// Renders one row of a streamed result.
pub fn format_streamed_record(record: &Record, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => record
            .iter()
            .map(|(_, value)| value.to_display_string())
            .collect::<Vec<_>>()
            .join("\t"),
        OutputFormat::Json => serde_json::to_string(record)
            .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize: {e}\"}}")),
    }
}

/// Formats records as an aligned table with a row-count footer.
fn format_table(records: &[Record]) -> String {
    let Some(first) = records.first() else {
        return "(0 rows)".to_string();
    };

    let headers: Vec<String> = first.names().map(str::to_string).collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            record
                .iter()
                .map(|(_, value)| value.to_display_string())
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    output.push_str(header_line.join(" │ ").trim_end());
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    output.push_str(&separator.join("─┼─"));
    output.push('\n');

    for row in &rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(cell.len());
                format!("{:width$}", cell, width = width)
            })
            .collect();
        output.push_str(row_line.join(" │ ").trim_end());
        output.push('\n');
    }

    let count = records.len();
    output.push_str(&format!("({count} row{})", if count == 1 { "" } else { "s" }));
    output
}
