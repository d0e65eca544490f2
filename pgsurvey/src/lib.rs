//! The `pgsurvey` command: parse arguments, validate them, obtain a report,
//! render it and deliver it.
//!
//! [`run`] returns the process exit status instead of exiting so that the
//! whole flow stays testable: 0 on success (including help and version), 2
//! for invalid usage, 1 for everything that fails at run time.

pub mod cli;

use clap::Parser;
use cli::Cli;
use pgsurvey_core::config::HelpTopic;
use pgsurvey_core::config::help::{try_hint, usage_text, variables_text, version_text};
use pgsurvey_core::error::EXIT_SUCCESS;
use pgsurvey_core::logging::init_logging;
use pgsurvey_core::security::Password;
use pgsurvey_core::{
    ConfigValidator, Destination, Environment, Invocation, PgSurveyError, ReportSource, Result,
    RunRequest, render,
};
use std::ffi::OsString;
use std::io::Write;

/// Runs the command with the given arguments (program name first) and
/// returns the exit status.
pub async fn run<I, T>(args: I) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match try_run(args).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            report_error(&e);
            e.exit_code()
        }
    }
}

async fn try_run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| PgSurveyError::usage(parser_message(&e)))?;

    let env = Environment::from_process();
    init_logging(cli.global.verbose, cli.global.quiet, env.var("RUST_LOG"))?;
    let env = env.sanitized();

    match ConfigValidator::new(&env).validate(cli.into())? {
        Invocation::Help { topic, connection } => {
            let text = match topic {
                HelpTopic::Short => usage_text(&connection),
                HelpTopic::Variables => variables_text(),
            };
            print_text(&text)
        }
        Invocation::Version => print_text(&format!("{}\n", version_text())),
        Invocation::Run(request) => execute(request, &env).await,
    }
}

async fn execute(request: RunRequest, env: &Environment) -> Result<()> {
    let request = if request.needs_password_prompt() {
        // Refuse unsupported modes before asking for anything
        pgsurvey_core::collector::unsupported_features(&request.config.collection)?;
        let password = prompt_password(&request.config.connection.user)?;
        RunRequest {
            config: request.config.with_password(password),
            ..request
        }
    } else {
        request
    };

    let RunRequest {
        config,
        input,
        databases,
    } = request;

    let report = match input.as_deref() {
        Some(path) => ReportSource::File(path).fetch().await?,
        None => collect(&config, &databases).await?,
    };
    tracing::debug!(
        "Report holds {} objects and {} warnings",
        report.object_count(),
        report.warnings.len()
    );

    let bytes = render::render(&config.output, &report)?;
    Destination::for_run(&config.output, env).deliver(&bytes)
}

#[cfg(feature = "postgresql")]
async fn collect(
    config: &pgsurvey_core::Configuration,
    databases: &[String],
) -> Result<pgsurvey_core::Report> {
    let collector = pgsurvey_core::PostgresCollector::new();
    ReportSource::Collect {
        collector: &collector,
        config,
        databases,
    }
    .fetch()
    .await
}

#[cfg(not(feature = "postgresql"))]
async fn collect(
    _config: &pgsurvey_core::Configuration,
    _databases: &[String],
) -> Result<pgsurvey_core::Report> {
    Err(PgSurveyError::configuration(
        "this build has no PostgreSQL support; use --input to render a saved report",
    ))
}

fn prompt_password(user: &str) -> Result<Password> {
    let typed = rpassword::prompt_password(format!("Password for user {user}: "))
        .map_err(|source| PgSurveyError::PasswordPrompt { source })?;
    Ok(Password::new(typed))
}

fn print_text(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| PgSurveyError::io("standard output", e))
}

/// First line of a clap error without its `error: ` prefix.
fn parser_message(error: &clap::Error) -> String {
    let rendered = error.to_string();
    let line = rendered.lines().next().unwrap_or_default().trim();
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

fn report_error(error: &PgSurveyError) {
    tracing::debug!("Exiting after error: {:?}", error);
    eprintln!("pgsurvey: {error}");
    if error.is_usage() {
        eprintln!("{}", try_hint());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pgsurvey_core::error::EXIT_USAGE;

    #[test]
    fn test_parser_message_is_single_line() {
        let err = Cli::try_parse_from(["pgsurvey", "--bogus"]).unwrap_err();
        let message = parser_message(&err);
        assert!(!message.contains('\n'));
        assert!(!message.starts_with("error:"));
        assert!(message.contains("--bogus"));
    }

    #[tokio::test]
    async fn test_parse_failure_is_usage_error() {
        assert_eq!(run(["pgsurvey", "--port", "not-a-port"]).await, EXIT_USAGE);
    }
}
