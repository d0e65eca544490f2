//! Command line definition.
//!
//! `-h` is the host, as with the PostgreSQL client tools, so clap's own help
//! and version flags are disabled and `-?/--help` and `-V/--version` are
//! declared here and handled by the validator.

use clap::{ArgAction, Args, Parser};
use pgsurvey_core::RawOptions;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pgsurvey")]
#[command(about = "Collect PostgreSQL information and metrics")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub general: GeneralArgs,

    #[command(flatten)]
    pub collection: CollectionArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Databases to collect from
    #[arg(value_name = "DBNAME")]
    pub databases: Vec<String>,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    #[arg(short, long, help = "Suppress all output except errors")]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct GeneralArgs {
    #[arg(
        short = '?',
        long,
        value_name = "TOPIC",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        help = "Show help (TOPIC: short or variables)"
    )]
    pub help: Option<String>,

    #[arg(short = 'V', long, help = "Print the version and exit")]
    pub version: bool,

    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Read a saved JSON report instead of collecting"
    )]
    pub input: Option<PathBuf>,

    #[arg(short, long, value_name = "SECS", help = "Statement timeout in seconds")]
    pub timeout: Option<u32>,

    #[arg(long, value_name = "MILLIS", help = "Lock timeout in milliseconds")]
    pub lock_timeout: Option<u32>,
}

#[derive(Args, Debug)]
pub struct CollectionArgs {
    #[arg(short = 'S', long, help = "Do not collect relation sizes")]
    pub no_sizes: bool,

    #[arg(short = 'c', long, value_name = "REGEX", help = "Only collect from matching schemas")]
    pub schema: Option<String>,

    #[arg(short = 'C', long, value_name = "REGEX", help = "Skip matching schemas")]
    pub exclude_schema: Option<String>,

    #[arg(short = 'a', long, value_name = "REGEX", help = "Only collect matching tables")]
    pub table: Option<String>,

    #[arg(short = 'A', long, value_name = "REGEX", help = "Skip matching tables")]
    pub exclude_table: Option<String>,

    #[arg(
        long,
        value_name = "WHAT",
        value_delimiter = ',',
        help = "Comma-separated list of items to skip"
    )]
    pub omit: Vec<String>,

    #[arg(long, value_name = "LIMIT", help = "Truncate collected SQL to this many characters")]
    pub sql_length: Option<u32>,

    #[arg(long, value_name = "LIMIT", help = "Collect at most this many statements")]
    pub statements_limit: Option<u32>,

    #[arg(long, value_name = "PROTO", help = "Query protocol: simple or extended")]
    pub query_proto: Option<String>,

    #[arg(long, help = "Collect only from the listed databases")]
    pub only_listed: bool,

    #[arg(long, help = "Collect from all connectable databases")]
    pub all_dbs: bool,

    #[arg(long, value_name = "FILE", help = "PostgreSQL log file to parse")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory of PostgreSQL log files to parse")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, value_name = "MINS", help = "Parse only the last MINS minutes of logs")]
    pub log_span: Option<u32>,

    #[arg(long, value_name = "ID", help = "AWS RDS database instance identifier")]
    pub aws_rds_dbid: Option<String>,

    #[arg(long, value_name = "ID", help = "Azure resource identifier")]
    pub az_resource: Option<String>,

    #[arg(long, help = "Collect from a Pgpool-II instance")]
    pub pgpool: bool,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    #[arg(short, long, value_name = "FORMAT", help = "Output format: human, json or csv")]
    pub format: Option<String>,

    #[arg(short, long, value_name = "FILE", help = "Write the report to FILE (\"-\" for stdout)")]
    pub output: Option<PathBuf>,

    #[arg(
        short = 'l',
        long,
        value_name = "SECS",
        help = "Flag transactions open longer than SECS seconds"
    )]
    pub toolong: Option<u32>,

    #[arg(long, help = "Do not pipe human output through a pager")]
    pub no_pager: bool,
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    #[arg(short, long, value_name = "HOSTNAME", help = "Database server host or socket directory")]
    pub host: Option<String>,

    #[arg(short, long, value_name = "PORT", help = "Database server port")]
    pub port: Option<u16>,

    #[arg(short = 'U', long, value_name = "USERNAME", help = "Database user name")]
    pub username: Option<String>,

    #[arg(short = 'w', long, help = "Never prompt for a password")]
    pub no_password: bool,

    #[arg(long, value_name = "ROLE", help = "Do SET ROLE before collecting")]
    pub role: Option<String>,
}

impl From<Cli> for RawOptions {
    fn from(cli: Cli) -> Self {
        let Cli {
            global: _,
            general,
            collection,
            output,
            connection,
            databases,
        } = cli;

        Self {
            help: general.help,
            version: general.version,
            input: general.input,
            timeout: general.timeout,
            lock_timeout: general.lock_timeout,
            no_sizes: collection.no_sizes,
            schema: collection.schema,
            exclude_schema: collection.exclude_schema,
            table: collection.table,
            exclude_table: collection.exclude_table,
            omit: collection.omit,
            sql_length: collection.sql_length,
            statements_limit: collection.statements_limit,
            query_proto: collection.query_proto,
            only_listed: collection.only_listed,
            all_dbs: collection.all_dbs,
            log_file: collection.log_file,
            log_dir: collection.log_dir,
            log_span: collection.log_span,
            aws_rds_dbid: collection.aws_rds_dbid,
            az_resource: collection.az_resource,
            pgpool: collection.pgpool,
            format: output.format,
            output: output.output,
            toolong: output.toolong,
            no_pager: output.no_pager,
            host: connection.host,
            port: connection.port,
            username: connection.username,
            no_password: connection.no_password,
            role: connection.role,
            databases,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> RawOptions {
        let argv = std::iter::once("pgsurvey").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().into()
    }

    #[test]
    fn test_command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_h_is_host() {
        let raw = parse(&["-h", "db.example.com", "-p", "6432", "-U", "monitor"]);
        assert_eq!(raw.host.as_deref(), Some("db.example.com"));
        assert_eq!(raw.port, Some(6432));
        assert_eq!(raw.username.as_deref(), Some("monitor"));
        assert!(raw.help.is_none());
    }

    #[test]
    fn test_help_flag_forms() {
        assert_eq!(parse(&["--help"]).help.as_deref(), Some(""));
        assert_eq!(parse(&["-?"]).help.as_deref(), Some(""));
        assert_eq!(
            parse(&["--help=variables"]).help.as_deref(),
            Some("variables")
        );
        assert!(parse(&["-V"]).version);
    }

    #[test]
    fn test_omit_accepts_commas_and_repeats() {
        let raw = parse(&["--omit", "tables,indexes", "--omit=sequences"]);
        assert_eq!(raw.omit, vec!["tables", "indexes", "sequences"]);
    }

    #[test]
    fn test_positional_databases_and_flags() {
        let raw = parse(&["--only-listed", "-S", "-f", "json", "-o", "-", "app", "billing"]);
        assert!(raw.only_listed);
        assert!(raw.no_sizes);
        assert_eq!(raw.format.as_deref(), Some("json"));
        assert_eq!(raw.output, Some(PathBuf::from("-")));
        assert_eq!(raw.databases, vec!["app", "billing"]);
    }

    #[test]
    fn test_filter_short_flags() {
        let raw = parse(&["-c", "^app", "-C", "tmp", "-a", "orders", "-A", "_old$"]);
        assert_eq!(raw.schema.as_deref(), Some("^app"));
        assert_eq!(raw.exclude_schema.as_deref(), Some("tmp"));
        assert_eq!(raw.table.as_deref(), Some("orders"));
        assert_eq!(raw.exclude_table.as_deref(), Some("_old$"));
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["pgsurvey", "-vvv", "-q"]).unwrap();
        assert_eq!(cli.global.verbose, 3);
        assert!(cli.global.quiet);
    }

    #[test]
    fn test_out_of_range_port_rejected_by_parser() {
        assert!(Cli::try_parse_from(["pgsurvey", "-p", "70000"]).is_err());
        assert!(Cli::try_parse_from(["pgsurvey", "--no-such-flag"]).is_err());
    }
}
