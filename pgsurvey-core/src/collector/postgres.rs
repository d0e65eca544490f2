//! PostgreSQL collector built on sqlx.
//!
//! # Security Features
//! - Every session runs with `default_transaction_read_only = on`
//! - `statement_timeout` and `lock_timeout` come from the configuration
//! - Connection errors name the user, host, port and database, never the
//!   password
//!
//! Every selected column is cast to `bigint`, `text` or `boolean` in SQL so
//! that rows decode identically under the simple and the extended query
//! protocol.

use super::{Collector, plan_databases, truncate_sql, unsupported_features};
use crate::Result;
use crate::config::{CollectConfig, Configuration, ConnectionOptions, OmitItem};
use crate::error::PgSurveyError;
use crate::models::{
    Backend, Database, Extension, Index, Report, Sequence, ServerInfo, Setting, Statement, Table,
    Trigger, UserFunction,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::{Postgres, Row};
use std::str::FromStr;
use std::time::Duration;

/// Connection timeout used when `PGCONNECT_TIMEOUT` is not set.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// `application_name` used when `PGAPPNAME` is not set.
const DEFAULT_APPLICATION_NAME: &str = "pgsurvey";

/// Collects reports from a PostgreSQL server.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCollector;

impl PostgresCollector {
    /// Creates a collector.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Collector for PostgresCollector {
    async fn collect(&self, config: &Configuration, databases: &[String]) -> Result<Report> {
        let warnings = unsupported_features(&config.collection)?;
        let connection = &config.connection;

        let primary_db = databases
            .first()
            .map_or(connection.default_database.as_str(), String::as_str);
        let primary = Session::open(config, primary_db).await?;

        let mut report = primary.collect_cluster().await?;
        report.metadata.local = connection.is_local();
        for warning in warnings {
            tracing::warn!("{}", warning);
            report.add_warning(warning);
        }

        let available: Vec<String> = report.databases.iter().map(|d| d.name.clone()).collect();
        let targets = plan_databases(
            &config.collection,
            &connection.default_database,
            databases,
            &available,
        );
        if config.collection.only_listed {
            report.databases.retain(|d| targets.contains(&d.name));
        }

        for db_name in &targets {
            if db_name == primary_db {
                primary.collect_database(db_name, &mut report).await?;
                continue;
            }
            let session = Session::open(config, db_name).await?;
            let outcome = session.collect_database(db_name, &mut report).await;
            session.close().await;
            outcome?;
        }
        report.metadata.collected_dbs = targets;

        if !config.collection.omits(OmitItem::Statements) {
            primary.collect_statements(&mut report).await;
        }
        primary.close().await;

        tracing::info!(
            "Collected {} databases, {} objects, {} warnings",
            report.metadata.collected_dbs.len(),
            report.object_count(),
            report.warnings.len()
        );
        Ok(report)
    }
}

/// Typed column access with error context.
trait RowExt {
    fn field<'r, T>(&'r self, name: &str) -> Result<T>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>;
}

impl RowExt for PgRow {
    fn field<'r, T>(&'r self, name: &str) -> Result<T>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        self.try_get(name).map_err(|e| {
            PgSurveyError::collection_failed(format!("failed to read column {name}"), e)
        })
    }
}

/// A single-connection pool bound to one database.
struct Session<'a> {
    pool: PgPool,
    db_name: String,
    collection: &'a CollectConfig,
}

impl<'a> Session<'a> {
    async fn open(config: &'a Configuration, db_name: &str) -> Result<Self> {
        let connection = &config.connection;
        let options = connect_options(connection, db_name)?;
        let session_sql = session_settings(&config.collection, connection.role.as_deref());
        let connect_timeout = connection
            .connect_timeout_secs
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        tracing::debug!(
            "Connecting to {}@{}:{}/{}",
            connection.user,
            connection.host,
            connection.port,
            db_name
        );

        let pool = pool_options(session_sql, connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                PgSurveyError::connection_failed(
                    format!(
                        "{}@{}:{}/{}",
                        connection.user, connection.host, connection.port, db_name
                    ),
                    e,
                )
            })?;

        Ok(Self {
            pool,
            db_name: db_name.to_string(),
            collection: &config.collection,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_all(&self, what: &str, sql: &str) -> Result<Vec<PgRow>> {
        tracing::trace!("Running {} query in {}", what, self.db_name);
        let rows = if self.collection.use_extended_protocol {
            sqlx::query(sql).fetch_all(&self.pool).await
        } else {
            sqlx::raw_sql(sql).fetch_all(&self.pool).await
        };
        rows.map_err(|e| {
            PgSurveyError::collection_failed(
                format!("failed to collect {what} from database \"{}\"", self.db_name),
                e,
            )
        })
    }

    /// Server identity, settings, databases and backends.
    async fn collect_cluster(&self) -> Result<Report> {
        let rows = self.fetch_all("server information", SERVER_SQL).await?;
        let row = rows.first().ok_or_else(|| {
            PgSurveyError::configuration("server information query returned no rows")
        })?;

        let mut report = Report::new(row.field("at")?);
        report.metadata.username = row.field("username")?;
        report.server = ServerInfo {
            version: row.field("version")?,
            version_num: row.field("version_num")?,
            start_time: row.field("start_time")?,
            is_in_recovery: row.field("is_in_recovery")?,
        };

        for row in self.fetch_all("settings", SETTINGS_SQL).await? {
            let unit: String = row.field("unit")?;
            report.settings.insert(
                row.field("name")?,
                Setting {
                    setting: row.field("setting")?,
                    unit: Some(unit).filter(|u| !u.is_empty()),
                    source: row.field("source")?,
                },
            );
        }

        let sql = databases_sql(self.collection.no_sizes);
        for row in self.fetch_all("databases", &sql).await? {
            report.databases.push(Database {
                name: row.field("name")?,
                num_backends: row.field("num_backends")?,
                xact_commit: row.field("xact_commit")?,
                xact_rollback: row.field("xact_rollback")?,
                blks_read: row.field("blks_read")?,
                blks_hit: row.field("blks_hit")?,
                deadlocks: row.field("deadlocks")?,
                size: row.field("size")?,
            });
        }

        let sql = backends_sql(self.collection.sql_length);
        for row in self.fetch_all("backends", &sql).await? {
            let query: String = row.field("query")?;
            report.backends.push(Backend {
                pid: row.field("pid")?,
                db_name: row.field("db_name")?,
                role_name: row.field("role_name")?,
                application_name: row.field("application_name")?,
                client_addr: row.field("client_addr")?,
                backend_start: row.field("backend_start")?,
                xact_start: row.field("xact_start")?,
                query_start: row.field("query_start")?,
                state: row.field("state")?,
                wait_event_type: row.field("wait_event_type")?,
                wait_event: row.field("wait_event")?,
                query: truncate_sql(&query, self.collection.sql_length),
            });
        }

        Ok(report)
    }

    /// Per-database objects, each skipped when omitted.
    async fn collect_database(&self, db_name: &str, report: &mut Report) -> Result<()> {
        let collection = self.collection;
        tracing::info!("Collecting objects from database {}", db_name);

        if !collection.omits(OmitItem::Tables) {
            for row in self.fetch_all("tables", &tables_sql(collection.no_sizes)).await? {
                let table = Table {
                    db_name: db_name.to_string(),
                    schema_name: row.field("schema_name")?,
                    name: row.field("name")?,
                    seq_scan: row.field("seq_scan")?,
                    idx_scan: row.field("idx_scan")?,
                    n_live_tup: row.field("n_live_tup")?,
                    n_dead_tup: row.field("n_dead_tup")?,
                    last_vacuum: row.field("last_vacuum")?,
                    last_autovacuum: row.field("last_autovacuum")?,
                    last_analyze: row.field("last_analyze")?,
                    last_autoanalyze: row.field("last_autoanalyze")?,
                    size: row.field("size")?,
                };
                if collection.includes_table(&table.schema_name, &table.name) {
                    report.tables.push(table);
                }
            }
        }

        if !collection.omits(OmitItem::Indexes) {
            let sql = indexes_sql(collection.no_sizes, !collection.omits(OmitItem::IndexDefs));
            for row in self.fetch_all("indexes", &sql).await? {
                let index = Index {
                    db_name: db_name.to_string(),
                    schema_name: row.field("schema_name")?,
                    table_name: row.field("table_name")?,
                    name: row.field("name")?,
                    idx_scan: row.field("idx_scan")?,
                    idx_tup_read: row.field("idx_tup_read")?,
                    idx_tup_fetch: row.field("idx_tup_fetch")?,
                    size: row.field("size")?,
                    definition: row.field("definition")?,
                };
                if collection.includes_table(&index.schema_name, &index.table_name) {
                    report.indexes.push(index);
                }
            }
        }

        if !collection.omits(OmitItem::Sequences) {
            for row in self.fetch_all("sequences", SEQUENCES_SQL).await? {
                let sequence = Sequence {
                    db_name: db_name.to_string(),
                    schema_name: row.field("schema_name")?,
                    name: row.field("name")?,
                    blks_read: row.field("blks_read")?,
                    blks_hit: row.field("blks_hit")?,
                };
                if collection.includes_schema(&sequence.schema_name) {
                    report.sequences.push(sequence);
                }
            }
        }

        if !collection.omits(OmitItem::Functions) {
            for row in self.fetch_all("functions", FUNCTIONS_SQL).await? {
                let function = UserFunction {
                    db_name: db_name.to_string(),
                    schema_name: row.field("schema_name")?,
                    name: row.field("name")?,
                    calls: row.field("calls")?,
                    total_time_ms: row.field("total_time_ms")?,
                    self_time_ms: row.field("self_time_ms")?,
                };
                if collection.includes_schema(&function.schema_name) {
                    report.user_functions.push(function);
                }
            }
        }

        if !collection.omits(OmitItem::Extensions) {
            for row in self.fetch_all("extensions", EXTENSIONS_SQL).await? {
                report.extensions.push(Extension {
                    db_name: db_name.to_string(),
                    name: row.field("name")?,
                    schema_name: row.field("schema_name")?,
                    installed_version: row.field("installed_version")?,
                    default_version: row.field("default_version")?,
                    comment: row.field("comment")?,
                });
            }
        }

        if !collection.omits(OmitItem::Triggers) {
            for row in self.fetch_all("triggers", TRIGGERS_SQL).await? {
                let trigger = Trigger {
                    db_name: db_name.to_string(),
                    schema_name: row.field("schema_name")?,
                    table_name: row.field("table_name")?,
                    name: row.field("name")?,
                    proc_name: row.field("proc_name")?,
                };
                if collection.includes_table(&trigger.schema_name, &trigger.table_name) {
                    report.triggers.push(trigger);
                }
            }
        }

        Ok(())
    }

    /// Reads `pg_stat_statements`; any failure becomes a warning.
    async fn collect_statements(&self, report: &mut Report) {
        let sql = statements_sql(
            report.server.version_num,
            self.collection.sql_length,
            self.collection.statements_limit,
        );
        let rows = match self.fetch_all("statements", &sql).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("pg_stat_statements not available: {}", e);
                report.add_warning(format!(
                    "pg_stat_statements could not be read in database \"{}\"",
                    self.db_name
                ));
                return;
            }
        };

        for row in rows {
            match statement_from_row(&row, self.collection.sql_length) {
                Ok(statement) => report.statements.push(statement),
                Err(e) => {
                    tracing::warn!("Skipping pg_stat_statements row: {}", e);
                }
            }
        }
    }
}

fn statement_from_row(row: &PgRow, sql_length: u32) -> Result<Statement> {
    let query: String = row.field("query")?;
    Ok(Statement {
        role_name: row.field("role_name")?,
        db_name: row.field("db_name")?,
        query_id: row.field("query_id")?,
        query: truncate_sql(&query, sql_length),
        calls: row.field("calls")?,
        total_time_ms: row.field("total_time_ms")?,
        rows: row.field("rows")?,
    })
}

/// One connection per session; every new connection runs `session_sql`
/// before it is handed out.
fn pool_options(session_sql: String, connect_timeout_secs: u64) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(connect_timeout_secs))
        .after_connect(move |conn, _meta| {
            let session_sql = session_sql.clone();
            Box::pin(async move {
                sqlx::Executor::execute(&mut *conn, session_sql.as_str()).await?;
                Ok(())
            })
        })
}

fn connect_options(connection: &ConnectionOptions, db_name: &str) -> Result<PgConnectOptions> {
    let mut options = PgConnectOptions::new()
        .host(&connection.host)
        .port(connection.port)
        .username(&connection.user)
        .database(db_name)
        .application_name(
            connection
                .application_name
                .as_deref()
                .unwrap_or(DEFAULT_APPLICATION_NAME),
        );

    if connection.password.is_set() {
        options = options.password(connection.password.expose());
    }
    if let Some(mode) = &connection.ssl_mode {
        let mode = PgSslMode::from_str(mode).map_err(|_| {
            PgSurveyError::configuration(format!("invalid PGSSLMODE value \"{mode}\""))
        })?;
        options = options.ssl_mode(mode);
    }
    if let Some(path) = &connection.ssl_root_cert {
        options = options.ssl_root_cert(path);
    }
    if let Some(path) = &connection.ssl_cert {
        options = options.ssl_client_cert(path);
    }
    if let Some(path) = &connection.ssl_key {
        options = options.ssl_client_key(path);
    }
    Ok(options)
}

/// Statements run on every new connection.
fn session_settings(collection: &CollectConfig, role: Option<&str>) -> String {
    let mut sql = format!(
        "SET statement_timeout = '{}s'; SET lock_timeout = '{}ms'; \
         SET default_transaction_read_only = on; SET timezone = 'UTC';",
        collection.timeout_secs, collection.lock_timeout_millis
    );
    if let Some(role) = role {
        sql.push_str(&format!(" SET ROLE {};", quote_ident(role)));
    }
    sql
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

const SERVER_SQL: &str = "SELECT \
    current_setting('server_version')::text AS version, \
    current_setting('server_version_num')::bigint AS version_num, \
    COALESCE(EXTRACT(EPOCH FROM pg_postmaster_start_time())::bigint, 0) AS start_time, \
    pg_is_in_recovery() AS is_in_recovery, \
    EXTRACT(EPOCH FROM now())::bigint AS at, \
    current_user::text AS username";

const SETTINGS_SQL: &str = "SELECT name::text AS name, COALESCE(setting, '')::text AS setting, \
    COALESCE(unit, '')::text AS unit, COALESCE(source, '')::text AS source \
    FROM pg_settings ORDER BY name";

fn databases_sql(no_sizes: bool) -> String {
    let size = if no_sizes {
        "NULL::bigint"
    } else {
        "CASE WHEN has_database_privilege(d.oid, 'CONNECT') \
         THEN pg_database_size(d.oid)::bigint END"
    };
    format!(
        "SELECT d.datname::text AS name, \
         COALESCE(s.numbackends, 0)::bigint AS num_backends, \
         COALESCE(s.xact_commit, 0)::bigint AS xact_commit, \
         COALESCE(s.xact_rollback, 0)::bigint AS xact_rollback, \
         COALESCE(s.blks_read, 0)::bigint AS blks_read, \
         COALESCE(s.blks_hit, 0)::bigint AS blks_hit, \
         COALESCE(s.deadlocks, 0)::bigint AS deadlocks, \
         {size} AS size \
         FROM pg_database d LEFT JOIN pg_stat_database s ON s.datid = d.oid \
         WHERE NOT d.datistemplate AND d.datallowconn \
         ORDER BY d.datname"
    )
}

fn epoch(column: &str) -> String {
    format!("COALESCE(EXTRACT(EPOCH FROM {column})::bigint, 0) AS {column}")
}

fn backends_sql(sql_length: u32) -> String {
    format!(
        "SELECT pid::bigint AS pid, \
         COALESCE(datname, '')::text AS db_name, \
         COALESCE(usename, '')::text AS role_name, \
         COALESCE(application_name, '')::text AS application_name, \
         COALESCE(client_addr::text, '') AS client_addr, \
         {}, {}, {}, \
         COALESCE(state, '')::text AS state, \
         COALESCE(wait_event_type, '')::text AS wait_event_type, \
         COALESCE(wait_event, '')::text AS wait_event, \
         LEFT(COALESCE(query, ''), {sql_length})::text AS query \
         FROM pg_stat_activity WHERE pid <> pg_backend_pid() ORDER BY pid",
        epoch("backend_start"),
        epoch("xact_start"),
        epoch("query_start"),
    )
}

fn tables_sql(no_sizes: bool) -> String {
    let size = if no_sizes {
        "NULL::bigint"
    } else {
        "pg_total_relation_size(relid)::bigint"
    };
    format!(
        "SELECT schemaname::text AS schema_name, relname::text AS name, \
         COALESCE(seq_scan, 0)::bigint AS seq_scan, \
         COALESCE(idx_scan, 0)::bigint AS idx_scan, \
         COALESCE(n_live_tup, 0)::bigint AS n_live_tup, \
         COALESCE(n_dead_tup, 0)::bigint AS n_dead_tup, \
         {}, {}, {}, {}, \
         {size} AS size \
         FROM pg_stat_user_tables ORDER BY schemaname, relname",
        epoch("last_vacuum"),
        epoch("last_autovacuum"),
        epoch("last_analyze"),
        epoch("last_autoanalyze"),
    )
}

fn indexes_sql(no_sizes: bool, with_definitions: bool) -> String {
    let size = if no_sizes {
        "NULL::bigint"
    } else {
        "pg_relation_size(indexrelid)::bigint"
    };
    let definition = if with_definitions {
        "pg_get_indexdef(indexrelid)::text"
    } else {
        "NULL::text"
    };
    format!(
        "SELECT schemaname::text AS schema_name, relname::text AS table_name, \
         indexrelname::text AS name, \
         COALESCE(idx_scan, 0)::bigint AS idx_scan, \
         COALESCE(idx_tup_read, 0)::bigint AS idx_tup_read, \
         COALESCE(idx_tup_fetch, 0)::bigint AS idx_tup_fetch, \
         {size} AS size, {definition} AS definition \
         FROM pg_stat_user_indexes ORDER BY schemaname, relname, indexrelname"
    )
}

const SEQUENCES_SQL: &str = "SELECT schemaname::text AS schema_name, relname::text AS name, \
    COALESCE(blks_read, 0)::bigint AS blks_read, COALESCE(blks_hit, 0)::bigint AS blks_hit \
    FROM pg_statio_user_sequences ORDER BY schemaname, relname";

const FUNCTIONS_SQL: &str = "SELECT schemaname::text AS schema_name, funcname::text AS name, \
    calls::bigint AS calls, total_time::bigint AS total_time_ms, self_time::bigint AS self_time_ms \
    FROM pg_stat_user_functions ORDER BY schemaname, funcname";

const EXTENSIONS_SQL: &str = "SELECT e.extname::text AS name, n.nspname::text AS schema_name, \
    e.extversion::text AS installed_version, \
    COALESCE(a.default_version, '')::text AS default_version, \
    COALESCE(a.comment, '')::text AS comment \
    FROM pg_extension e \
    JOIN pg_namespace n ON n.oid = e.extnamespace \
    LEFT JOIN pg_available_extensions a ON a.name = e.extname \
    ORDER BY e.extname";

const TRIGGERS_SQL: &str = "SELECT n.nspname::text AS schema_name, c.relname::text AS table_name, \
    t.tgname::text AS name, p.proname::text AS proc_name \
    FROM pg_trigger t \
    JOIN pg_class c ON c.oid = t.tgrelid \
    JOIN pg_namespace n ON n.oid = c.relnamespace \
    JOIN pg_proc p ON p.oid = t.tgfoid \
    WHERE NOT t.tgisinternal \
    ORDER BY n.nspname, c.relname, t.tgname";

fn statements_sql(version_num: i64, sql_length: u32, limit: u32) -> String {
    // Renamed in PostgreSQL 13.
    let total = if version_num >= 130_000 {
        "total_exec_time"
    } else {
        "total_time"
    };
    format!(
        "SELECT COALESCE(r.rolname, '')::text AS role_name, \
         COALESCE(d.datname, '')::text AS db_name, \
         COALESCE(s.queryid, 0)::bigint AS query_id, \
         LEFT(COALESCE(s.query, ''), {sql_length})::text AS query, \
         s.calls::bigint AS calls, \
         s.{total}::bigint AS total_time_ms, \
         s.rows::bigint AS rows \
         FROM pg_stat_statements s \
         LEFT JOIN pg_roles r ON r.oid = s.userid \
         LEFT JOIN pg_database d ON d.oid = s.dbid \
         ORDER BY s.{total} DESC LIMIT {limit}"
    )
}
