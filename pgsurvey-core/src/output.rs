//! Delivery of the encoded report.
//!
//! The destination is resolved once per run by [`Destination::resolve`], a
//! pure function of the output options, the environment, whether standard
//! output is a terminal, and which pager binaries exist. Delivery then
//! writes the bytes to exactly that destination.
//!
//! A reader that stops early (a pager quit before the end, `| head`) shows
//! up as a broken pipe; that is not treated as an error.

use crate::Result;
use crate::config::OutputOptions;
use crate::environment::Environment;
use crate::error::PgSurveyError;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Pagers probed on the search path when `PAGER` is not set, in order.
pub const KNOWN_PAGERS: [&str; 2] = ["less", "more"];

/// An external pager program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl PagerCommand {
    /// Splits a `PAGER` value on whitespace. Blank values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut words = value.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

/// Where the encoded report goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    File(PathBuf),
    Pager(PagerCommand),
}

impl Destination {
    /// Picks the destination.
    ///
    /// A pager is used only when no output path was given, paging was not
    /// disabled, standard output is a terminal, and a pager is available:
    /// `PAGER` first, otherwise the first of [`KNOWN_PAGERS`] that `lookup`
    /// finds. Otherwise the output path wins over standard output. A path of
    /// `-` counts as no path.
    pub fn resolve(
        path: Option<&Path>,
        no_pager: bool,
        env: &Environment,
        stdout_is_tty: bool,
        lookup: impl Fn(&str) -> bool,
    ) -> Self {
        let path = path.filter(|p| !p.as_os_str().is_empty() && p.as_os_str() != "-");

        if path.is_none()
            && !no_pager
            && stdout_is_tty
            && let Some(pager) = find_pager(env, lookup)
        {
            return Self::Pager(pager);
        }

        match path {
            Some(path) => Self::File(path.to_path_buf()),
            None => Self::Stdout,
        }
    }

    /// Resolves against the real terminal and search path.
    pub fn for_run(options: &OutputOptions, env: &Environment) -> Self {
        let destination = Self::resolve(
            options.path.as_deref(),
            options.no_pager,
            env,
            io::stdout().is_terminal(),
            |name| which::which(name).is_ok(),
        );
        tracing::debug!("Output destination: {:?}", destination);
        destination
    }

    /// Writes `bytes` to the destination.
    ///
    /// # Errors
    /// Fails when the file cannot be created or written, when the pager
    /// cannot be started, or when standard output fails. A broken pipe and
    /// the pager's own exit status are ignored.
    pub fn deliver(&self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Stdout => {
                let mut stdout = io::stdout().lock();
                let written = stdout.write_all(bytes).and_then(|()| stdout.flush());
                tolerate_broken_pipe(written).map_err(|e| PgSurveyError::io("standard output", e))
            }
            Self::File(path) => write_file(path, bytes),
            Self::Pager(pager) => run_pager(pager, bytes),
        }
    }
}

fn find_pager(env: &Environment, lookup: impl Fn(&str) -> bool) -> Option<PagerCommand> {
    if let Some(value) = env.var("PAGER") {
        return PagerCommand::parse(value);
    }
    KNOWN_PAGERS
        .into_iter()
        .find(|name| lookup(name))
        .and_then(PagerCommand::parse)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let context = path.display().to_string();
    let file = File::create(path).map_err(|e| PgSurveyError::io(context.clone(), e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .and_then(|()| writer.flush())
        .map_err(|e| PgSurveyError::io(context, e))?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

/// Starts the pager, feeds it through its standard input, closes the pipe
/// and waits for it to exit.
fn run_pager(pager: &PagerCommand, bytes: &[u8]) -> Result<()> {
    let mut child = Command::new(&pager.program)
        .args(&pager.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            PgSurveyError::pager(format!("\"{}\" could not be started", pager.program), e)
        })?;
    tracing::debug!("Started pager {} (pid {})", pager.program, child.id());

    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(bytes).and_then(|()| stdin.flush()),
        None => Err(io::Error::other("standard input was not captured")),
    };
    // stdin was dropped above, so the pager sees end of input

    match child.wait() {
        Ok(status) if !status.success() => {
            tracing::debug!("Pager {} exited with {}", pager.program, status);
        }
        Ok(_) => {}
        Err(e) => tracing::debug!("Waiting for pager {} failed: {}", pager.program, e),
    }

    tolerate_broken_pipe(written).map_err(|e| {
        PgSurveyError::pager(format!("\"{}\" could not be written to", pager.program), e)
    })
}

fn tolerate_broken_pipe(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!("Reader closed the output early");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn none(_: &str) -> bool {
        false
    }

    fn all(_: &str) -> bool {
        true
    }

    fn only_more(name: &str) -> bool {
        name == "more"
    }

    fn less() -> Destination {
        Destination::Pager(PagerCommand {
            program: "less".to_string(),
            args: Vec::new(),
        })
    }

    #[test]
    fn test_pager_used_only_for_terminal_without_path() {
        let env = Environment::default();
        assert_eq!(Destination::resolve(None, false, &env, true, all), less());
        assert_eq!(
            Destination::resolve(None, false, &env, false, all),
            Destination::Stdout
        );
        assert_eq!(
            Destination::resolve(None, true, &env, true, all),
            Destination::Stdout
        );
        assert_eq!(
            Destination::resolve(Some(Path::new("out.txt")), false, &env, true, all),
            Destination::File(PathBuf::from("out.txt"))
        );
        assert_eq!(
            Destination::resolve(None, false, &env, true, none),
            Destination::Stdout
        );
    }

    #[test]
    fn test_dash_path_routes_like_no_path() {
        let env = Environment::default();
        for tty in [true, false] {
            for no_pager in [true, false] {
                assert_eq!(
                    Destination::resolve(Some(Path::new("-")), no_pager, &env, tty, all),
                    Destination::resolve(None, no_pager, &env, tty, all),
                );
            }
        }
    }

    #[test]
    fn test_pager_override_takes_priority() {
        let env = Environment::from_pairs([("PAGER", "most -s")]);
        assert_eq!(
            Destination::resolve(None, false, &env, true, none),
            Destination::Pager(PagerCommand {
                program: "most".to_string(),
                args: vec!["-s".to_string()],
            })
        );
        assert_eq!(
            Destination::resolve(None, false, &env, false, all),
            Destination::Stdout
        );
    }

    #[test]
    fn test_known_pagers_probed_in_order() {
        let env = Environment::default();
        assert_eq!(
            Destination::resolve(None, false, &env, true, only_more),
            Destination::Pager(PagerCommand {
                program: "more".to_string(),
                args: Vec::new(),
            })
        );
        let blank = Environment::from_pairs([("PAGER", "  ")]);
        assert_eq!(
            Destination::resolve(None, false, &blank, true, all),
            Destination::Stdout
        );
    }

    #[test]
    fn test_file_destination_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "old contents that are longer").unwrap();

        Destination::File(path.clone()).deliver(b"new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_file_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.txt");
        let err = Destination::File(path.clone()).deliver(b"x").unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_FAILURE);
        assert!(err.to_string().starts_with(&path.display().to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_pager_receives_all_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paged.txt");
        let pager = PagerCommand {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "cat > \"$0\"".to_string(),
                path.display().to_string(),
            ],
        };
        let bytes = "line\n".repeat(10_000);

        Destination::Pager(pager).deliver(bytes.as_bytes()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), bytes);
    }

    #[cfg(unix)]
    #[test]
    fn test_pager_exit_status_ignored() {
        let pager = PagerCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "cat >/dev/null; exit 3".to_string()],
        };
        Destination::Pager(pager).deliver(b"report\n").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_pager_quitting_early_is_not_an_error() {
        let pager = PagerCommand::parse("true").unwrap();
        let bytes = vec![b'x'; 4 * 1024 * 1024];
        Destination::Pager(pager).deliver(&bytes).unwrap();
    }

    #[test]
    fn test_missing_pager_fails() {
        let pager = PagerCommand::parse("pgsurvey-no-such-pager-binary").unwrap();
        let err = Destination::Pager(pager).deliver(b"report").unwrap_err();
        assert!(matches!(err, PgSurveyError::Pager { .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_FAILURE);
        assert!(err.to_string().contains("pgsurvey-no-such-pager-binary"));
    }
}
