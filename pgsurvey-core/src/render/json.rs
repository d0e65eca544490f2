//! Indented JSON, loadable again with `--input`.

use super::{Encoder, write_error};
use crate::Result;
use crate::error::PgSurveyError;
use crate::models::Report;
use std::io::Write;

/// Writes the report as two-space indented JSON followed by a newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn format_name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        serde_json::to_writer_pretty(&mut *out, report).map_err(|source| {
            PgSurveyError::Serialization {
                context: "failed to encode report as JSON".to_string(),
                source,
            }
        })?;
        writeln!(out).map_err(|e| write_error("JSON", e))
    }
}
