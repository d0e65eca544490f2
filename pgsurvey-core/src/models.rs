//! Report data model.
//!
//! A [`Report`] is one point-in-time snapshot of a PostgreSQL server. It is
//! produced by a [`Collector`](crate::collector::Collector) or loaded from a
//! file written by the JSON encoder, and is otherwise treated as read-only.
//!
//! Timestamps are Unix seconds; `0` means "never" or "not applicable".
//! Every struct rejects unknown fields so that a saved report is either read
//! completely or not at all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the report layout written into `metadata.version`.
pub const FORMAT_VERSION: &str = "1.0";

/// A complete collected snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Report {
    pub metadata: Metadata,
    pub server: ServerInfo,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, Setting>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub databases: Vec<Database>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backends: Vec<Backend>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<Sequence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_functions: Vec<UserFunction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<Statement>,
    /// Non-fatal problems met during collection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Facts about the collection run itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    /// Report layout version
    pub version: String,
    /// When collection happened
    pub at: i64,
    /// Databases that were visited
    #[serde(default)]
    pub collected_dbs: Vec<String>,
    /// Connected through a Unix socket
    #[serde(default)]
    pub local: bool,
    /// `pgsurvey/<version>` of the tool that collected the report
    #[serde(default)]
    pub user_agent: String,
    /// Role used for collection
    #[serde(default)]
    pub username: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            at: 0,
            collected_dbs: Vec::new(),
            local: false,
            user_agent: String::new(),
            username: String::new(),
        }
    }
}

/// Server identity and state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerInfo {
    /// `server_version` as reported by the server
    pub version: String,
    /// `server_version_num`, e.g. 160002
    #[serde(default)]
    pub version_num: i64,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub is_in_recovery: bool,
}

/// One row of `pg_settings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Setting {
    pub setting: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub num_backends: i64,
    #[serde(default)]
    pub xact_commit: i64,
    #[serde(default)]
    pub xact_rollback: i64,
    #[serde(default)]
    pub blks_read: i64,
    #[serde(default)]
    pub blks_hit: i64,
    #[serde(default)]
    pub deadlocks: i64,
    /// Bytes on disk; absent when sizes were not collected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

/// One row of `pg_stat_activity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Backend {
    pub pid: i64,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub role_name: String,
    #[serde(default)]
    pub application_name: String,
    #[serde(default)]
    pub client_addr: String,
    #[serde(default)]
    pub backend_start: i64,
    /// Start of the open transaction, 0 when idle
    #[serde(default)]
    pub xact_start: i64,
    #[serde(default)]
    pub query_start: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub wait_event_type: String,
    #[serde(default)]
    pub wait_event: String,
    /// Current or last query, truncated to the configured SQL length
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Table {
    pub db_name: String,
    pub schema_name: String,
    pub name: String,
    #[serde(default)]
    pub seq_scan: i64,
    #[serde(default)]
    pub idx_scan: i64,
    #[serde(default)]
    pub n_live_tup: i64,
    #[serde(default)]
    pub n_dead_tup: i64,
    #[serde(default)]
    pub last_vacuum: i64,
    #[serde(default)]
    pub last_autovacuum: i64,
    #[serde(default)]
    pub last_analyze: i64,
    #[serde(default)]
    pub last_autoanalyze: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Index {
    pub db_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub name: String,
    #[serde(default)]
    pub idx_scan: i64,
    #[serde(default)]
    pub idx_tup_read: i64,
    #[serde(default)]
    pub idx_tup_fetch: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// `CREATE INDEX` statement, absent when `indexdefs` was omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sequence {
    pub db_name: String,
    pub schema_name: String,
    pub name: String,
    #[serde(default)]
    pub blks_read: i64,
    #[serde(default)]
    pub blks_hit: i64,
}

/// One row of `pg_stat_user_functions`. Times are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserFunction {
    pub db_name: String,
    pub schema_name: String,
    pub name: String,
    #[serde(default)]
    pub calls: i64,
    #[serde(default)]
    pub total_time_ms: i64,
    #[serde(default)]
    pub self_time_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Extension {
    pub db_name: String,
    pub name: String,
    #[serde(default)]
    pub schema_name: String,
    #[serde(default)]
    pub installed_version: String,
    #[serde(default)]
    pub default_version: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trigger {
    pub db_name: String,
    pub schema_name: String,
    pub table_name: String,
    pub name: String,
    #[serde(default)]
    pub proc_name: String,
}

/// One row of `pg_stat_statements`. Times are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Statement {
    #[serde(default)]
    pub role_name: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub query_id: i64,
    pub query: String,
    #[serde(default)]
    pub calls: i64,
    #[serde(default)]
    pub total_time_ms: i64,
    #[serde(default)]
    pub rows: i64,
}

impl Report {
    /// Creates an empty report stamped with the collection time.
    pub fn new(at: i64) -> Self {
        Self {
            metadata: Metadata {
                at,
                ..Metadata::default()
            },
            ..Self::default()
        }
    }

    /// Records a non-fatal collection problem.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Total number of per-database objects.
    pub fn object_count(&self) -> usize {
        [
            self.tables.len(),
            self.indexes.len(),
            self.sequences.len(),
            self.user_functions.len(),
            self.extensions.len(),
            self.triggers.len(),
        ]
        .into_iter()
        .fold(0, usize::saturating_add)
    }
}

#[cfg(test)]
pub(crate) fn sample_report() -> Report {
    let mut report = Report::new(1_700_000_000);
    report.metadata.collected_dbs = vec!["app".to_string()];
    report.metadata.user_agent = "pgsurvey/0.1.0".to_string();
    report.metadata.username = "monitor".to_string();
    report.server = ServerInfo {
        version: "16.2".to_string(),
        version_num: 160_002,
        start_time: 1_699_900_000,
        is_in_recovery: false,
    };
    report.settings.insert(
        "max_connections".to_string(),
        Setting {
            setting: "100".to_string(),
            unit: None,
            source: "configuration file".to_string(),
        },
    );
    report.settings.insert(
        "shared_buffers".to_string(),
        Setting {
            setting: "16384".to_string(),
            unit: Some("8kB".to_string()),
            source: "configuration file".to_string(),
        },
    );
    report.databases.push(Database {
        name: "app".to_string(),
        num_backends: 2,
        xact_commit: 1200,
        xact_rollback: 3,
        blks_read: 50,
        blks_hit: 950,
        deadlocks: 0,
        size: Some(8_400_000),
    });
    report.backends.push(Backend {
        pid: 4242,
        db_name: "app".to_string(),
        role_name: "app_rw".to_string(),
        application_name: "billing, nightly".to_string(),
        client_addr: "10.0.0.7".to_string(),
        backend_start: 1_699_990_000,
        xact_start: 1_699_999_000,
        query_start: 1_699_999_900,
        state: "idle in transaction".to_string(),
        query: "SELECT \"id\" FROM invoices".to_string(),
        ..Backend::default()
    });
    report.tables.push(Table {
        db_name: "app".to_string(),
        schema_name: "public".to_string(),
        name: "invoices".to_string(),
        seq_scan: 4,
        idx_scan: 900,
        n_live_tup: 10_000,
        n_dead_tup: 12,
        last_autovacuum: 1_699_950_000,
        size: Some(1_048_576),
        ..Table::default()
    });
    report.indexes.push(Index {
        db_name: "app".to_string(),
        schema_name: "public".to_string(),
        table_name: "invoices".to_string(),
        name: "invoices_pkey".to_string(),
        idx_scan: 900,
        definition: Some(
            "CREATE UNIQUE INDEX invoices_pkey ON public.invoices USING btree (id)".to_string(),
        ),
        ..Index::default()
    });
    report.add_warning("pg_stat_statements is not installed in app");
    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_roundtrip() {
        let report = sample_report();
        let json = serde_json::to_string_pretty(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_empty_collections_omitted() {
        let report = Report::new(10);
        let value = serde_json::to_value(&report).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("metadata"));
        assert!(object.contains_key("server"));
        assert!(!object.contains_key("tables"));
        assert!(!object.contains_key("warnings"));
        assert_eq!(value["metadata"]["version"], FORMAT_VERSION);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let json = r#"{"metadata":{"version":"1.0","at":1},"server":{"version":"16"},"extra":1}"#;
        assert!(serde_json::from_str::<Report>(json).is_err());

        let json =
            r#"{"metadata":{"version":"1.0","at":1,"color":"red"},"server":{"version":"16"}}"#;
        assert!(serde_json::from_str::<Report>(json).is_err());
    }

    #[test]
    fn test_minimal_report_loads() {
        let json = r#"{"metadata":{"version":"1.0","at":1},"server":{"version":"16.2"}}"#;
        let report: Report = serde_json::from_str(json).unwrap();
        assert_eq!(report.server.version, "16.2");
        assert_eq!(report.object_count(), 0);
    }

    #[test]
    fn test_object_count_and_warnings() {
        let report = sample_report();
        assert_eq!(report.object_count(), 2);
        assert_eq!(report.warnings.len(), 1);
    }
}
