//! Collection engine seam.
//!
//! A [`Collector`] turns a validated [`Configuration`] and the databases
//! named on the command line into a [`Report`]. The PostgreSQL
//! implementation lives behind the `postgresql` feature; tests substitute
//! their own collectors.

use crate::Result;
use crate::config::{CollectConfig, Configuration};
use crate::error::PgSurveyError;
use crate::models::Report;
use async_trait::async_trait;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "postgresql")]
pub use postgres::PostgresCollector;

/// Produces a report from a live server.
///
/// # Security Guarantees
/// - All sessions are read-only
/// - The connection password is never logged or copied into the report
#[async_trait]
pub trait Collector: Send + Sync {
    /// Collects one snapshot.
    ///
    /// # Errors
    /// Returns an error when the server cannot be reached or a required
    /// query fails. Optional data that cannot be read becomes a report
    /// warning instead.
    async fn collect(&self, config: &Configuration, databases: &[String]) -> Result<Report>;
}

/// Checks for requested features this engine does not gather.
///
/// Pgpool-only collection is refused outright. Cloud and log-file options
/// are accepted but only produce warnings in the report.
///
/// # Errors
/// Returns [`PgSurveyError::Configuration`] when `--pgpool` was given.
pub fn unsupported_features(collection: &CollectConfig) -> Result<Vec<String>> {
    if collection.pgpool {
        return Err(PgSurveyError::configuration(
            "collecting Pgpool metrics is not supported",
        ));
    }

    let mut warnings = Vec::new();
    if let Some(id) = &collection.rds_db_identifier {
        warnings.push(format!("AWS RDS metrics for \"{id}\" were not collected"));
    }
    if let Some(id) = &collection.azure_resource_id {
        warnings.push(format!("Azure metrics for \"{id}\" were not collected"));
    }
    if collection.log_file.is_some() || collection.log_dir.is_some() {
        warnings.push("server log files were not examined".to_string());
    }
    Ok(warnings)
}

/// Decides which databases get per-database collection.
///
/// `available` is the list of connectable user databases on the server.
/// With `--all-dbs` every one of them is visited; otherwise the databases
/// named on the command line are, falling back to `default_database`.
pub fn plan_databases(
    collection: &CollectConfig,
    default_database: &str,
    listed: &[String],
    available: &[String],
) -> Vec<String> {
    let mut targets: Vec<String> = if collection.all_databases {
        available.to_vec()
    } else if listed.is_empty() {
        vec![default_database.to_string()]
    } else {
        listed.to_vec()
    };
    let mut seen = std::collections::BTreeSet::new();
    targets.retain(|name| seen.insert(name.clone()));
    targets
}

/// Keeps at most `limit` characters of `sql`.
pub fn truncate_sql(sql: &str, limit: u32) -> String {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    match sql.char_indices().nth(limit) {
        Some((end, _)) => sql[..end].to_string(),
        None => sql.to_string(),
    }
}
