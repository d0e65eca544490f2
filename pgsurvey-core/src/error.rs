//! Error types and the two-tier exit code taxonomy.
//!
//! Option validation failures are usage errors and exit with status 2.
//! Everything detected after validation (file I/O, collection, pager
//! start-up) is a runtime error and exits with status 1. Passwords never
//! appear in any message produced here.

use thiserror::Error;

/// Exit status for a successful run, `--help` and `--version`.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit status for runtime failures after options were accepted.
pub const EXIT_FAILURE: u8 = 1;
/// Exit status for invalid or contradictory command-line options.
pub const EXIT_USAGE: u8 = 2;

/// A rejected option value, reported before any I/O takes place.
///
/// Each variant corresponds to one validation rule; rules are checked in
/// declaration order and the first failure wins.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `--help` was given a topic other than `short` or `variables`
    #[error("invalid help topic \"{0}\": must be \"short\" or \"variables\"")]
    InvalidHelpTopic(String),

    /// `--format` is not one of the recognized encoders
    #[error("option -f/--format must be \"human\", \"json\" or \"csv\" (got \"{0}\")")]
    InvalidFormat(String),

    /// Port resolved to zero (unset, unparsable `PGPORT`, or explicit 0)
    #[error("port must be between 1 and 65535")]
    InvalidPort,

    /// Per-query timeout of zero seconds
    #[error("timeout must be greater than 0")]
    ZeroTimeout,

    /// Lock timeout of zero milliseconds
    #[error("lock-timeout must be greater than 0")]
    ZeroLockTimeout,

    /// A filter option is not a valid POSIX extended regular expression
    #[error("bad POSIX regular expression for {option}: {reason}")]
    BadRegex { option: &'static str, reason: String },

    /// An `--omit` entry outside the recognized vocabulary
    #[error("unknown item \"{0}\" in --omit option")]
    UnknownOmitItem(String),

    /// `--query-proto` is neither `simple` nor `extended`
    #[error("option --query-proto must be \"simple\" or \"extended\" (got \"{0}\")")]
    InvalidQueryProtocol(String),
}

/// Main error type for pgsurvey operations.
#[derive(Debug, Error)]
pub enum PgSurveyError {
    /// Command-line option rejected during validation
    #[error(transparent)]
    InvalidOption(#[from] ConfigError),

    /// Command-line arguments could not be parsed at all
    #[error("{message}")]
    Usage { message: String },

    /// Configuration that passed validation but cannot be acted upon
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Database connection failed (password never included)
    #[error("Database connection failed: {context}")]
    Connection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A collection query failed
    #[error("Collection failed: {context}")]
    Collection {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O operation failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("{context}: {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The pager could not be started or fed
    #[error("pager {context}: {source}")]
    Pager {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Interactive password entry failed
    #[error("failed to read password: {source}")]
    PasswordPrompt {
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results with `PgSurveyError`
pub type Result<T> = std::result::Result<T, PgSurveyError>;

impl PgSurveyError {
    /// Process exit status for this error.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidOption(_) | Self::Usage { .. } => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }

    /// Whether the error is a usage error that deserves the `--help` hint.
    pub const fn is_usage(&self) -> bool {
        self.exit_code() == EXIT_USAGE
    }

    /// Creates a usage error from an argument parser message
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a connection error with context
    pub fn connection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates a collection error with context
    pub fn collection_failed<E>(context: impl Into<String>, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Collection {
            context: context.into(),
            source: Box::new(error),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a pager error with context
    pub fn pager(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Pager {
            context: context.into(),
            source,
        }
    }

    /// Returns the underlying I/O error kind when there is one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io { source, .. } | Self::Pager { source, .. } => Some(source.kind()),
            Self::Serialization { source, .. } => source.io_error_kind(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_exit_with_usage_status() {
        let error = PgSurveyError::from(ConfigError::InvalidPort);
        assert_eq!(error.exit_code(), EXIT_USAGE);
        assert!(error.is_usage());
        assert_eq!(error.to_string(), "port must be between 1 and 65535");

        let error = PgSurveyError::usage("unexpected argument '--bogus'");
        assert_eq!(error.exit_code(), EXIT_USAGE);
    }

    #[test]
    fn test_runtime_errors_exit_with_failure_status() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error = PgSurveyError::io("report.json", io);
        assert_eq!(error.exit_code(), EXIT_FAILURE);
        assert_eq!(error.io_kind(), Some(std::io::ErrorKind::NotFound));
        assert!(error.to_string().starts_with("report.json: "));

        let error = PgSurveyError::configuration("pgpool collection is not supported");
        assert_eq!(error.exit_code(), EXIT_FAILURE);
        assert!(!error.is_usage());
    }

    #[test]
    fn test_driver_errors_stay_out_of_display() {
        use std::error::Error as _;

        let driver = std::io::Error::other("server said: password=hunter2 rejected");
        let error = PgSurveyError::connection_failed("monitor@db:5432/app", driver);
        assert_eq!(
            error.to_string(),
            "Database connection failed: monitor@db:5432/app"
        );
        assert!(error.source().is_some());

        let driver = std::io::Error::other("relation pg_stat_statements does not exist");
        let error = PgSurveyError::collection_failed("failed to collect statements", driver);
        assert_eq!(
            error.to_string(),
            "Collection failed: failed to collect statements"
        );
        assert_eq!(error.exit_code(), EXIT_FAILURE);
        assert!(
            error
                .source()
                .is_some_and(|e| e.to_string().contains("pg_stat_statements"))
        );
    }

    #[test]
    fn test_bad_regex_names_option() {
        let error = ConfigError::BadRegex {
            option: "-c/--schema",
            reason: "missing closing )".to_string(),
        };
        assert!(
            error
                .to_string()
                .starts_with("bad POSIX regular expression for -c/--schema: ")
        );
    }
}
