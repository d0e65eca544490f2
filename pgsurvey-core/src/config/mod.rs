//! Option validation.
//!
//! [`RawOptions`] holds option values exactly as the command line supplied
//! them. [`ConfigValidator`] turns them into a [`Configuration`], filling
//! defaults from the sanitized [`Environment`] and rejecting bad values with
//! a [`ConfigError`] that names the offending option.
//!
//! Rules are checked in a fixed order and the first failure wins:
//! help topic, format, port, timeout, lock timeout, the four filters,
//! `--omit`, query protocol.

mod filter;
pub mod help;
mod omit;


pub use filter::Filter;
pub use omit::{OmitItem, parse_omit_list};

use crate::environment::Environment;
use crate::error::ConfigError;
use crate::security::Password;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default per-query timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u32 = 5;
/// Default lock timeout in milliseconds.
pub const DEFAULT_LOCK_TIMEOUT_MILLIS: u32 = 50;
/// Default number of SQL characters kept per query text.
pub const DEFAULT_SQL_LENGTH: u32 = 500;
/// Default number of `pg_stat_statements` rows collected.
pub const DEFAULT_STATEMENTS_LIMIT: u32 = 100;
/// Default log window in minutes.
pub const DEFAULT_LOG_SPAN_MINS: u32 = 5;
/// Default "transaction running too long" threshold in seconds.
pub const DEFAULT_TOO_LONG_SECS: u32 = 60;
/// Default server port.
pub const DEFAULT_PORT: u16 = 5432;
/// Unix socket directory probed when `PGHOST` is unset.
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/postgresql";

/// Report encoder selected with `-f/--format`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Narrative text for people
    #[default]
    Human,
    /// Indented JSON, loadable again with `--input`
    Json,
    /// Flattened `key,value` rows
    Csv,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(ConfigError::InvalidFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Human => "human",
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

/// Wire protocol used for collection queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryProtocol {
    #[default]
    Simple,
    Extended,
}

impl FromStr for QueryProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(Self::Simple),
            "extended" => Ok(Self::Extended),
            other => Err(ConfigError::InvalidQueryProtocol(other.to_string())),
        }
    }
}

/// What `--help` should print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    /// Option summary
    Short,
    /// Environment variables
    Variables,
}

impl HelpTopic {
    /// Interprets the optional `--help` value; a bare `--help` is `short`.
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "" | "short" => Ok(Self::Short),
            "variables" => Ok(Self::Variables),
            other => Err(ConfigError::InvalidHelpTopic(other.to_string())),
        }
    }
}

/// Options that control what the collector gathers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectConfig {
    /// Per-query timeout (seconds, > 0)
    pub timeout_secs: u32,
    /// Lock timeout (milliseconds, > 0)
    pub lock_timeout_millis: u32,
    /// Skip tablespace and relation sizes
    pub no_sizes: bool,
    /// Collect only from schemas matching this filter
    pub schema: Option<Filter>,
    /// Skip schemas matching this filter
    pub exclude_schema: Option<Filter>,
    /// Collect only from tables matching this filter
    pub table: Option<Filter>,
    /// Skip tables matching this filter
    pub exclude_table: Option<Filter>,
    /// Item categories not to collect
    pub omit: Vec<OmitItem>,
    /// Characters of SQL text kept per query
    pub sql_length: u32,
    /// Maximum `pg_stat_statements` rows
    pub statements_limit: u32,
    /// Use the extended query protocol instead of the simple one
    pub use_extended_protocol: bool,
    /// Collect only from databases named on the command line
    pub only_listed: bool,
    /// Collect from every connectable user database
    pub all_databases: bool,
    /// Server log file to inspect
    pub log_file: Option<PathBuf>,
    /// Directory of server log files to inspect
    pub log_dir: Option<PathBuf>,
    /// Minutes of log history to inspect
    pub log_span_mins: u32,
    /// AWS RDS/Aurora instance identifier
    pub rds_db_identifier: Option<String>,
    /// Azure resource ID
    pub azure_resource_id: Option<String>,
    /// Collect only Pgpool metrics
    pub pgpool: bool,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            lock_timeout_millis: DEFAULT_LOCK_TIMEOUT_MILLIS,
            no_sizes: false,
            schema: None,
            exclude_schema: None,
            table: None,
            exclude_table: None,
            omit: Vec::new(),
            sql_length: DEFAULT_SQL_LENGTH,
            statements_limit: DEFAULT_STATEMENTS_LIMIT,
            use_extended_protocol: false,
            only_listed: false,
            all_databases: false,
            log_file: None,
            log_dir: None,
            log_span_mins: DEFAULT_LOG_SPAN_MINS,
            rds_db_identifier: None,
            azure_resource_id: None,
            pgpool: false,
        }
    }
}

impl CollectConfig {
    /// Whether `item` was excluded with `--omit`.
    pub fn omits(&self, item: OmitItem) -> bool {
        self.omit.contains(&item)
    }

    /// Applies the schema include/exclude filters.
    pub fn includes_schema(&self, schema: &str) -> bool {
        self.schema.as_ref().is_none_or(|f| f.is_match(schema))
            && !self.exclude_schema.as_ref().is_some_and(|f| f.is_match(schema))
    }

    /// Applies the schema and table include/exclude filters.
    pub fn includes_table(&self, schema: &str, table: &str) -> bool {
        self.includes_schema(schema)
            && self.table.as_ref().is_none_or(|f| f.is_match(table))
            && !self.exclude_table.as_ref().is_some_and(|f| f.is_match(table))
    }
}

/// Options that control how the report is rendered and delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputOptions {
    /// Selected encoder
    pub format: OutputFormat,
    /// Explicit output file; `-` is normalized to `None`
    pub path: Option<PathBuf>,
    /// Transactions open longer than this are flagged in human output
    pub too_long_secs: u32,
    /// Never start a pager
    pub no_pager: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Human,
            path: None,
            too_long_secs: DEFAULT_TOO_LONG_SECS,
            no_pager: false,
        }
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Host name or Unix socket directory
    pub host: String,
    /// Server port (1..=65535)
    pub port: u16,
    /// Login role
    pub user: String,
    /// Database used when none is named on the command line
    pub default_database: String,
    /// Never prompt for a password
    pub no_password: bool,
    /// Role to `SET ROLE` to before collecting
    pub role: Option<String>,
    /// `application_name` override from `PGAPPNAME`
    pub application_name: Option<String>,
    /// `PGSSLMODE`
    pub ssl_mode: Option<String>,
    /// `PGSSLROOTCERT`
    pub ssl_root_cert: Option<PathBuf>,
    /// `PGSSLCERT`
    pub ssl_cert: Option<PathBuf>,
    /// `PGSSLKEY`
    pub ssl_key: Option<PathBuf>,
    /// `PGCONNECT_TIMEOUT` in seconds
    pub connect_timeout_secs: Option<u64>,
    /// Password; never serialized
    #[serde(skip)]
    pub password: Password,
}

impl ConnectionOptions {
    /// Whether the host names a Unix socket directory.
    pub fn is_local(&self) -> bool {
        self.host.starts_with('/')
    }
}

impl PartialEq for ConnectionOptions {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.user == other.user
            && self.default_database == other.default_database
            && self.no_password == other.no_password
            && self.role == other.role
            && self.application_name == other.application_name
            && self.ssl_mode == other.ssl_mode
            && self.ssl_root_cert == other.ssl_root_cert
            && self.ssl_cert == other.ssl_cert
            && self.ssl_key == other.ssl_key
            && self.connect_timeout_secs == other.connect_timeout_secs
    }
}

/// The validated, immutable run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub collection: CollectConfig,
    pub output: OutputOptions,
    pub connection: ConnectionOptions,
}

impl Configuration {
    /// Returns the configuration with `password` as the connection password.
    #[must_use]
    pub fn with_password(mut self, password: Password) -> Self {
        self.connection.password = password;
        self
    }
}

/// Option values exactly as given on the command line, before defaults.
#[derive(Debug, Clone, Default)]
pub struct RawOptions {
    /// `Some("")` for a bare `--help`
    pub help: Option<String>,
    pub version: bool,
    pub input: Option<PathBuf>,
    pub timeout: Option<u32>,
    pub lock_timeout: Option<u32>,
    pub no_sizes: bool,
    pub schema: Option<String>,
    pub exclude_schema: Option<String>,
    pub table: Option<String>,
    pub exclude_table: Option<String>,
    pub omit: Vec<String>,
    pub sql_length: Option<u32>,
    pub statements_limit: Option<u32>,
    pub query_proto: Option<String>,
    pub only_listed: bool,
    pub all_dbs: bool,
    pub log_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub log_span: Option<u32>,
    pub aws_rds_dbid: Option<String>,
    pub az_resource: Option<String>,
    pub pgpool: bool,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
    pub toolong: Option<u32>,
    pub no_pager: bool,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub no_password: bool,
    pub role: Option<String>,
    /// Positional database names
    pub databases: Vec<String>,
}

/// A run that passed validation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub config: Configuration,
    /// Previously saved report to load instead of collecting
    pub input: Option<PathBuf>,
    /// Databases named on the command line
    pub databases: Vec<String>,
}

impl RunRequest {
    /// Whether the password must be read interactively: no saved input, no
    /// `-w`, and no password from the environment.
    pub fn needs_password_prompt(&self) -> bool {
        self.input.is_none()
            && !self.config.connection.no_password
            && !self.config.connection.password.is_set()
    }
}

/// Result of validation.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// Print help and exit 0. The configuration supplies the defaults
    /// shown in the usage text.
    Help {
        topic: HelpTopic,
        connection: ConnectionOptions,
    },
    /// Print the version and exit 0
    Version,
    /// Produce and render a report
    Run(RunRequest),
}

/// Validates [`RawOptions`] against an injected environment.
pub struct ConfigValidator<'a> {
    env: &'a Environment,
    socket_probe: fn(&Path) -> bool,
}

impl<'a> ConfigValidator<'a> {
    /// Creates a validator reading defaults from `env`.
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            socket_probe: |path| path.exists(),
        }
    }

    /// Replaces the check for the default Unix socket.
    #[must_use]
    pub fn with_socket_probe(mut self, probe: fn(&Path) -> bool) -> Self {
        self.socket_probe = probe;
        self
    }

    /// Default host: `PGHOST`, then the local socket directory if a server
    /// socket exists there, then `localhost`.
    pub fn default_host(&self) -> String {
        if let Some(host) = self.env.var("PGHOST") {
            return host.to_string();
        }
        let socket = Path::new(DEFAULT_SOCKET_DIR).join(format!(".s.PGSQL.{}", DEFAULT_PORT));
        if (self.socket_probe)(&socket) {
            DEFAULT_SOCKET_DIR.to_string()
        } else {
            "localhost".to_string()
        }
    }

    /// Default port: `PGPORT` if set (0 when it is not a valid port), else 5432.
    pub fn default_port(&self) -> u16 {
        match self.env.var("PGPORT") {
            Some(value) => value.trim().parse::<u16>().unwrap_or(0),
            None => DEFAULT_PORT,
        }
    }

    /// Default user: `PGUSER`, then the login name, then `postgres`.
    pub fn default_user(&self) -> String {
        ["PGUSER", "USER", "LOGNAME"]
            .iter()
            .find_map(|name| self.env.var(name))
            .unwrap_or("postgres")
            .to_string()
    }

    /// Checks `raw` and builds the invocation it describes.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] in rule order.
    pub fn validate(&self, raw: RawOptions) -> Result<Invocation, ConfigError> {
        let help = raw.help.as_deref().map(HelpTopic::parse).transpose()?;

        let format = raw
            .format
            .as_deref()
            .map_or(Ok(OutputFormat::default()), str::parse::<OutputFormat>)?;

        let port = raw.port.unwrap_or_else(|| self.default_port());
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        let timeout_secs = raw.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let lock_timeout_millis = raw.lock_timeout.unwrap_or(DEFAULT_LOCK_TIMEOUT_MILLIS);
        if lock_timeout_millis == 0 {
            return Err(ConfigError::ZeroLockTimeout);
        }

        let schema = compile_filter("-c/--schema", raw.schema.as_deref())?;
        let exclude_schema = compile_filter("-C/--exclude-schema", raw.exclude_schema.as_deref())?;
        let table = compile_filter("-a/--table", raw.table.as_deref())?;
        let exclude_table = compile_filter("-A/--exclude-table", raw.exclude_table.as_deref())?;

        let omit = parse_omit_list(&raw.omit)?;

        let protocol = raw
            .query_proto
            .as_deref()
            .map_or(Ok(QueryProtocol::default()), str::parse::<QueryProtocol>)?;

        let user = raw.username.unwrap_or_else(|| self.default_user());
        let connection = ConnectionOptions {
            host: raw.host.unwrap_or_else(|| self.default_host()),
            port,
            default_database: self.env.var("PGDATABASE").unwrap_or(&user).to_string(),
            user,
            no_password: raw.no_password,
            role: raw.role.filter(|r| !r.is_empty()),
            application_name: self.env.var("PGAPPNAME").map(str::to_string),
            ssl_mode: self.env.var("PGSSLMODE").map(str::to_string),
            ssl_root_cert: self.env.var("PGSSLROOTCERT").map(PathBuf::from),
            ssl_cert: self.env.var("PGSSLCERT").map(PathBuf::from),
            ssl_key: self.env.var("PGSSLKEY").map(PathBuf::from),
            connect_timeout_secs: self
                .env
                .var("PGCONNECT_TIMEOUT")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0),
            password: self
                .env
                .var("PGPASSWORD")
                .map(|p| Password::new(p.to_string()))
                .unwrap_or_default(),
        };

        if let Some(topic) = help {
            return Ok(Invocation::Help { topic, connection });
        }
        if raw.version {
            return Ok(Invocation::Version);
        }

        let collection = CollectConfig {
            timeout_secs,
            lock_timeout_millis,
            no_sizes: raw.no_sizes,
            schema,
            exclude_schema,
            table,
            exclude_table,
            omit,
            sql_length: raw.sql_length.unwrap_or(DEFAULT_SQL_LENGTH),
            statements_limit: raw.statements_limit.unwrap_or(DEFAULT_STATEMENTS_LIMIT),
            use_extended_protocol: protocol == QueryProtocol::Extended,
            only_listed: raw.only_listed,
            all_databases: raw.all_dbs,
            log_file: raw.log_file,
            log_dir: raw.log_dir,
            log_span_mins: raw.log_span.unwrap_or(DEFAULT_LOG_SPAN_MINS),
            rds_db_identifier: raw.aws_rds_dbid.filter(|s| !s.is_empty()),
            azure_resource_id: raw.az_resource.filter(|s| !s.is_empty()),
            pgpool: raw.pgpool,
        };

        let output = OutputOptions {
            format,
            path: normalize_output_path(raw.output),
            too_long_secs: raw.toolong.unwrap_or(DEFAULT_TOO_LONG_SECS),
            no_pager: raw.no_pager,
        };

        Ok(Invocation::Run(RunRequest {
            config: Configuration {
                collection,
                output,
                connection,
            },
            input: raw.input.filter(|p| !p.as_os_str().is_empty()),
            databases: raw.databases,
        }))
    }
}

fn compile_filter(
    option: &'static str,
    value: Option<&str>,
) -> Result<Option<Filter>, ConfigError> {
    value.map_or(Ok(None), |pattern| Filter::compile(option, pattern))
}

/// `-o -` and `-o ''` mean the same as no `-o` at all.
pub fn normalize_output_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty() && p.as_os_str() != "-")
}
