//! pgsurvey - collect PostgreSQL information and metrics.
//!
//! Run `pgsurvey --help` for the option summary and
//! `pgsurvey --help=variables` for the environment it reads.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    ExitCode::from(pgsurvey::run(std::env::args_os()).await)
}
