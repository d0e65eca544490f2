//! Logging setup for the pgsurvey binary.
//!
//! Log lines always go to standard error; standard output is reserved for
//! the rendered report.

use crate::Result;
use tracing_subscriber::EnvFilter;

/// Maps the `-q`/`-v` flags onto a maximum log level.
///
/// The default is WARN so that a plain run prints nothing but the report.
pub const fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::INFO,
        (false, 2) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// A `RUST_LOG` directive, when set, takes precedence over the flags.
///
/// # Example
/// ```rust,no_run
/// use pgsurvey_core::logging::init_logging;
///
/// // Initialize at INFO level
/// init_logging(1, false, None).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool, directive: Option<&str>) -> Result<()> {
    let level = level_for(verbose, quiet);
    let filter = directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| {
            crate::error::PgSurveyError::configuration(format!(
                "Failed to initialize logging: {}",
                e
            ))
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    // Logging can only be initialized once per test process, so only the
    // level mapping is exercised here.
    use super::level_for;

    #[test]
    fn test_verbosity_levels() {
        let test_cases = [
            ((true, 0), tracing::Level::ERROR),
            ((true, 5), tracing::Level::ERROR),
            ((false, 0), tracing::Level::WARN),
            ((false, 1), tracing::Level::INFO),
            ((false, 2), tracing::Level::DEBUG),
            ((false, 3), tracing::Level::TRACE),
            ((false, 10), tracing::Level::TRACE),
        ];

        for ((quiet, verbose), expected) in test_cases {
            assert_eq!(
                level_for(verbose, quiet),
                expected,
                "Failed for quiet={}, verbose={}",
                quiet,
                verbose
            );
        }
    }
}
