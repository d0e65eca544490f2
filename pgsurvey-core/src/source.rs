//! Where a report comes from: a saved JSON file or a live collection.

use crate::Result;
use crate::collector::Collector;
use crate::config::Configuration;
use crate::config::help::user_agent;
use crate::error::PgSurveyError;
use crate::models::Report;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Exactly one way of obtaining the report for a run.
pub enum ReportSource<'a> {
    /// A report previously written by the JSON encoder
    File(&'a Path),
    /// A fresh collection from the configured server
    Collect {
        collector: &'a dyn Collector,
        config: &'a Configuration,
        databases: &'a [String],
    },
}

impl ReportSource<'_> {
    /// Produces the report.
    ///
    /// # Errors
    /// File sources fail on any read or parse error, naming the path.
    /// Collection failures are passed through unchanged.
    pub async fn fetch(self) -> Result<Report> {
        match self {
            Self::File(path) => load_report(path),
            Self::Collect {
                collector,
                config,
                databases,
            } => {
                tracing::info!(
                    "Collecting report from {}:{}",
                    config.connection.host,
                    config.connection.port
                );
                let mut report = collector.collect(config, databases).await?;
                report.metadata.user_agent = user_agent();
                Ok(report)
            }
        }
    }
}

/// Reads a saved report strictly: unknown fields or malformed JSON fail the
/// whole load.
///
/// # Errors
/// Returns an error of the form `<path>: <reason>` when the file cannot be
/// opened or does not contain a valid report.
pub fn load_report(path: &Path) -> Result<Report> {
    let context = path.display().to_string();
    let file = File::open(path).map_err(|e| PgSurveyError::io(context.clone(), e))?;
    let report = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| PgSurveyError::Serialization { context, source })?;
    tracing::info!("Loaded report from {}", path.display());
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::sample_report;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;

    /// Records what it was asked to collect and returns a canned report.
    struct FakeCollector {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Collector for FakeCollector {
        async fn collect(&self, _config: &Configuration, databases: &[String]) -> Result<Report> {
            self.seen.lock().unwrap().extend(databases.iter().cloned());
            let mut report = sample_report();
            report.metadata.user_agent = String::new();
            Ok(report)
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl Collector for FailingCollector {
        async fn collect(&self, _config: &Configuration, _databases: &[String]) -> Result<Report> {
            Err(PgSurveyError::configuration("server unreachable"))
        }
    }

    fn config() -> Configuration {
        use crate::config::{ConfigValidator, Invocation, RawOptions};
        let env = crate::environment::Environment::default();
        match ConfigValidator::new(&env)
            .with_socket_probe(|_| false)
            .validate(RawOptions::default())
            .unwrap()
        {
            Invocation::Run(request) => request.config,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_collected_report_stamped_with_user_agent() {
        let collector = FakeCollector {
            seen: Mutex::new(Vec::new()),
        };
        let config = config();
        let databases = vec!["app".to_string(), "audit".to_string()];

        let report = ReportSource::Collect {
            collector: &collector,
            config: &config,
            databases: &databases,
        }
        .fetch()
        .await
        .unwrap();

        assert_eq!(report.metadata.user_agent, user_agent());
        assert!(report.metadata.user_agent.starts_with("pgsurvey/"));
        assert_eq!(*collector.seen.lock().unwrap(), databases);
    }

    #[tokio::test]
    async fn test_collection_failure_propagates() {
        let config = config();
        let err = ReportSource::Collect {
            collector: &FailingCollector,
            config: &config,
            databases: &[],
        }
        .fetch()
        .await
        .unwrap_err();
        assert!(err.to_string().contains("server unreachable"));
    }

    #[tokio::test]
    async fn test_saved_report_loaded_unchanged() {
        let report = sample_report();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        serde_json::to_writer_pretty(&mut file, &report).unwrap();
        file.flush().unwrap();

        let loaded = ReportSource::File(file.path()).fetch().await.unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load_report(&path).unwrap_err();
        assert!(err.to_string().starts_with(&path.display().to_string()));
        assert_eq!(err.exit_code(), crate::error::EXIT_FAILURE);
    }

    #[test]
    fn test_malformed_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"metadata\": {\"version\": \"1.0\", \"at\": 1}, \"server\": ")
            .unwrap();
        file.flush().unwrap();
        let err = load_report(file.path()).unwrap_err();
        assert!(err.to_string().starts_with(&file.path().display().to_string()));
        assert!(matches!(err, PgSurveyError::Serialization { .. }));
    }

    #[test]
    fn test_unknown_structure_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = r#"{"metadata":{"version":"1.0","at":1},"server":{"version":"16"},"bogus":[]}"#;
        file.write_all(json.as_bytes()).unwrap();
        file.flush().unwrap();
        assert!(load_report(file.path()).is_err());
    }
}
