//! Output formatters for query results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use forkql_proto::{ResultSet, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Render a result set.
pub trait Formatter {
    fn format_result(&self, result: &ResultSet) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_result(&self, result: &ResultSet) -> String {
        let mut table = Table::new();
        table.set_header(result.column_names().into_iter().map(Cell::new).collect::<Vec<_>>());
        for row in result.rows() {
            table.add_row(row.into_iter().map(|v| Cell::new(format_value(v))).collect::<Vec<_>>());
        }
        format!("{}\n{} row(s)", table, result.len())
    }
}

/// JSON formatter: one object per row.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_result(&self, result: &ResultSet) -> String {
        let names = result.column_names();
        let rows: Vec<serde_json::Value> = result
            .rows()
            .map(|row| {
                let obj = names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.to_string(), value_to_json(value)))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_result(&self, result: &ResultSet) -> String {
        let mut output = result.column_names().join(",");
        output.push('\n');
        for row in result.rows() {
            let cells: Vec<String> = row.into_iter().map(format_value_csv).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }
        output
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn format_value_csv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => format!("\"{}\"", escape_csv(s)),
        Value::Float32Array(_) => format!("\"{value}\""),
        _ => format_value(value),
    }
}

fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}

fn float_to_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int32(i) => serde_json::Value::Number((*i).into()),
        Value::Int64(i) => serde_json::Value::Number((*i).into()),
        Value::Float32(f) => float_to_json(*f as f64),
        Value::Float64(f) => float_to_json(*f),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Float32Array(arr) => {
            serde_json::Value::Array(arr.iter().map(|f| float_to_json(*f as f64)).collect())
        }
    }
}
