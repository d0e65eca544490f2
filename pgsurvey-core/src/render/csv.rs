//! Flattened `path,value` rows.
//!
//! Nested structure becomes a dotted path: object keys are joined with `.`
//! and array elements are addressed by index, e.g. `tables.0.name`. Empty
//! collections and nulls produce no row.

use super::{Encoder, write_error};
use crate::Result;
use crate::error::PgSurveyError;
use crate::models::Report;
use serde_json::Value;
use std::io::Write;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvEncoder;

impl Encoder for CsvEncoder {
    fn format_name(&self) -> &'static str {
        "csv"
    }

    fn encode(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        let value = serde_json::to_value(report).map_err(|source| PgSurveyError::Serialization {
            context: "failed to encode report as CSV".to_string(),
            source,
        })?;

        let mut rows = Vec::new();
        flatten(String::new(), &value, &mut rows);

        writeln!(out, "path,value").map_err(|e| write_error("CSV", e))?;
        for (path, value) in rows {
            writeln!(out, "{},{}", escape(&path), escape(&value))
                .map_err(|e| write_error("CSV", e))?;
        }
        Ok(())
    }
}

fn flatten(path: String, value: &Value, rows: &mut Vec<(String, String)>) {
    let child = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };
    match value {
        Value::Null => {}
        Value::Bool(b) => rows.push((path, b.to_string())),
        Value::Number(n) => rows.push((path, n.to_string())),
        Value::String(s) => rows.push((path, s.clone())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                flatten(child(&i.to_string()), item, rows);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                flatten(child(key), item, rows);
            }
        }
    }
}

/// Quotes a field when it contains a separator, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::sample_report;

    fn encode(report: &Report) -> String {
        let mut out = Vec::new();
        CsvEncoder.encode(report, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_rows_use_dotted_paths() {
        let text = encode(&sample_report());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "path,value");
        assert!(lines.contains(&"metadata.at,1700000000"));
        assert!(lines.contains(&"server.version,16.2"));
        assert!(lines.contains(&"settings.shared_buffers.unit,8kB"));
        assert!(lines.contains(&"tables.0.name,invoices"));
        assert!(lines.contains(&"tables.0.size,1048576"));
        assert!(lines.contains(&"metadata.collected_dbs.0,app"));
        assert!(lines.contains(&"server.is_in_recovery,false"));
    }

    #[test]
    fn test_fields_quoted_when_needed() {
        let text = encode(&sample_report());
        assert!(text.contains("backends.0.application_name,\"billing, nightly\"\n"));
        assert!(text.contains("backends.0.query,\"SELECT \"\"id\"\" FROM invoices\"\n"));
    }

    #[test]
    fn test_empty_report_has_only_scalars() {
        let text = encode(&Report::new(5));
        assert!(text.contains("metadata.at,5\n"));
        assert!(!text.contains("tables."));
        assert!(!text.contains("collected_dbs"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
