//! Report encoders: human text, JSON and CSV.
//!
//! Exactly one encoder runs per report, chosen by `-f/--format`. The whole
//! report is encoded into memory before anything is delivered, so an
//! encoding failure never leaves partial output behind.

pub mod csv;
pub mod human;
pub mod json;

pub use csv::CsvEncoder;
pub use human::HumanEncoder;
pub use json::JsonEncoder;

use crate::Result;
use crate::config::{OutputFormat, OutputOptions};
use crate::error::PgSurveyError;
use crate::models::Report;
use std::io::Write;

/// Serializes a [`Report`] into a byte stream.
pub trait Encoder {
    /// Format name as accepted by `-f/--format`.
    fn format_name(&self) -> &'static str;

    /// Writes the encoded report to `out`.
    ///
    /// # Errors
    /// Returns an error if the report cannot be encoded or `out` fails.
    fn encode(&self, report: &Report, out: &mut dyn Write) -> Result<()>;
}

/// Returns the encoder for the configured format.
pub fn encoder_for(options: &OutputOptions) -> Box<dyn Encoder> {
    match options.format {
        OutputFormat::Human => Box::new(HumanEncoder::new(options.too_long_secs)),
        OutputFormat::Json => Box::new(JsonEncoder),
        OutputFormat::Csv => Box::new(CsvEncoder),
    }
}

/// Encodes `report` completely in the configured format.
///
/// # Errors
/// Returns the encoder's error; no bytes are returned on failure.
pub fn render(options: &OutputOptions, report: &Report) -> Result<Vec<u8>> {
    let encoder = encoder_for(options);
    tracing::debug!("Encoding report as {}", encoder.format_name());
    let mut buffer = Vec::new();
    encoder.encode(report, &mut buffer)?;
    Ok(buffer)
}

pub(crate) fn write_error(format: &str, source: std::io::Error) -> PgSurveyError {
    PgSurveyError::io(format!("failed to encode report as {format}"), source)
}
