//! Help and version text.

use super::ConnectionOptions;
use crate::environment::IGNORED_VARIABLES;

/// Program name used in help, hints and log prefixes.
pub const PROGRAM: &str = "pgsurvey";

/// One-line hint printed after every usage error.
pub fn try_hint() -> String {
    format!("Try \"{PROGRAM} --help\" for more information.")
}

/// `pgsurvey <version>`
pub fn version_text() -> String {
    format!("{} {}", PROGRAM, env!("CARGO_PKG_VERSION"))
}

/// Value stamped into `metadata.user_agent` of collected reports.
pub fn user_agent() -> String {
    format!("{}/{}", PROGRAM, env!("CARGO_PKG_VERSION"))
}

/// Option summary. The connection defaults shown are the ones the run
/// would actually use.
pub fn usage_text(connection: &ConnectionOptions) -> String {
    format!(
        r#"{PROGRAM} collects PostgreSQL information and metrics.

Usage:
  {PROGRAM} [OPTION]... [DBNAME]...

General options:
  -t, --timeout=SECS           individual query timeout in seconds (default: 5)
      --lock-timeout=MILLIS    lock timeout in milliseconds (default: 50)
  -i, --input=FILE             don't connect to db, instead read and display
                                   this previously saved JSON file
  -V, --version                output version information, then exit
  -?, --help[=options]         show this help, then exit
      --help=variables         list environment variables, then exit
  -v, --verbose                log progress to stderr (repeat for more detail)
  -q, --quiet                  log only errors

Collection options:
  -S, --no-sizes               don't collect tablespace and relation sizes
  -c, --schema=REGEXP          collect only from schema(s) matching POSIX regexp
  -C, --exclude-schema=REGEXP  do NOT collect from schema(s) matching POSIX regexp
  -a, --table=REGEXP           collect only from table(s) matching POSIX regexp
  -A, --exclude-table=REGEXP   do NOT collect from table(s) matching POSIX regexp
      --omit=WHAT              do NOT collect the items specified as a comma-separated
                                   list of: "tables", "indexes", "sequences",
                                   "functions", "extensions", "triggers",
                                   "statements", "log", "citus", "indexdefs",
                                   "bloat"
      --sql-length=LIMIT       collect only first LIMIT characters of all SQL
                                   queries (default: 500)
      --statements-limit=LIMIT collect only utmost LIMIT number of row from
                                   pg_stat_statements (default: 100)
      --query-proto=PROTO      which query wire protocol to use; "simple" or
                                   "extended" (default: "simple")
      --only-listed            collect info only from the databases listed as
                                   command-line args
      --all-dbs                collect info from all user databases
      --log-file=FILE          location of PostgreSQL log file
      --log-dir=DIR            read all the PostgreSQL log files in this directory
      --log-span=MINS          examine the last MINS minutes of logs (default: 5)
      --aws-rds-dbid=ID        AWS RDS/Aurora database instance identifier
      --az-resource=ID         Azure resource ID
      --pgpool                 collect only Pgpool metrics

Output options:
  -f, --format=FORMAT          output format; "human", "json" or "csv" (default: "human")
  -l, --toolong=SECS           for human output, transactions running longer than
                                   this are considered too long (default: 60)
  -o, --output=FILE            write output to the specified file
      --no-pager               do not invoke the pager for tty output

Connection options:
  -h, --host=HOSTNAME          database server host or socket directory
                                   (default: "{host}")
  -p, --port=PORT              database server port (default: {port})
  -U, --username=USERNAME      database user name (default: "{user}")
  -w, --no-password            never prompt for password
      --role=ROLE              do SET ROLE before collection
"#,
        host = connection.host,
        port = connection.port,
        user = connection.user,
    )
}

/// Environment variable reference for `--help=variables`.
pub fn variables_text() -> String {
    let ignored = IGNORED_VARIABLES
        .chunks(5)
        .map(|row| row.join(", "))
        .collect::<Vec<_>>()
        .join(",\n  ");
    format!(
        r#"Environment variables:
Usage:
  NAME=VALUE [NAME=VALUE] {PROGRAM} ...

  PAGER              name of external pager program
  PGAPPNAME          the application_name connection parameter
  PGDATABASE         the dbname connection parameter
  PGHOST             the host connection parameter
  PGPORT             the port connection parameter
  PGUSER             the user connection parameter
  PGPASSWORD         connection password (not recommended)
  PGSSLMODE          "disable", "prefer", "require", "verify-ca", "verify-full"
  PGSSLCERT          path to client SSL certificate
  PGSSLKEY           path to secret key for client SSL certificate
  PGSSLROOTCERT      path to SSL root CA
  PGCONNECT_TIMEOUT  connection timeout in seconds
  RUST_LOG           log filter directive, overrides -v/-q

The following libpq-related environment variables are not
required/used by {PROGRAM} and are IGNORED:

  {ignored}
"#
    )
}
