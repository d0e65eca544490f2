//! Snapshot of the process environment.
//!
//! Every component reads environment variables through an [`Environment`]
//! value instead of `std::env`, so defaults and pager selection can be
//! tested with an explicit map. The snapshot is taken and sanitized once at
//! start-up; the real process environment is never modified.

use std::collections::BTreeMap;

/// libpq variables that pgsurvey does not use. They are dropped from the
/// snapshot so that connection behavior never depends on them.
pub const IGNORED_VARIABLES: &[&str] = &[
    "PGHOSTADDR",
    "PGSERVICE",
    "PGSERVICEFILE",
    "PGREALM",
    "PGREQUIRESSL",
    "PGSSLCRL",
    "PGREQUIREPEER",
    "PGKRBSRVNAME",
    "PGGSSLIB",
    "PGSYSCONFDIR",
    "PGLOCALEDIR",
];

/// An immutable name → value map of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Captures the current process environment. Variables whose name or
    /// value is not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        Self::from_pairs(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Builds an environment from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the environment with every [`IGNORED_VARIABLES`] entry removed.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        for name in IGNORED_VARIABLES {
            if self.vars.remove(*name).is_some() {
                tracing::debug!("Ignoring environment variable {}", name);
            }
        }
        self
    }

    /// Value of `name`, treating an empty value the same as an unset one.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether `name` is present at all, even with an empty value.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }
}
