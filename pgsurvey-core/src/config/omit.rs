//! The closed set of collectible item categories accepted by `--omit`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An item category that can be excluded from collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OmitItem {
    Tables,
    Indexes,
    Sequences,
    Functions,
    Extensions,
    Triggers,
    Statements,
    Log,
    Citus,
    IndexDefs,
    Bloat,
}

impl OmitItem {
    /// Every recognized item, in the order the help text lists them.
    pub const ALL: [Self; 11] = [
        Self::Tables,
        Self::Indexes,
        Self::Sequences,
        Self::Functions,
        Self::Extensions,
        Self::Triggers,
        Self::Statements,
        Self::Log,
        Self::Citus,
        Self::IndexDefs,
        Self::Bloat,
    ];

    /// The name used on the command line.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tables => "tables",
            Self::Indexes => "indexes",
            Self::Sequences => "sequences",
            Self::Functions => "functions",
            Self::Extensions => "extensions",
            Self::Triggers => "triggers",
            Self::Statements => "statements",
            Self::Log => "log",
            Self::Citus => "citus",
            Self::IndexDefs => "indexdefs",
            Self::Bloat => "bloat",
        }
    }
}

impl std::fmt::Display for OmitItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OmitItem {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|item| item.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownOmitItem(s.to_string()))
    }
}

/// Parses every `--omit` entry, reporting the first unrecognized one.
///
/// Empty entries (from `--omit=` or `a,,b`) are skipped; duplicates are
/// kept only once.
pub fn parse_omit_list<S: AsRef<str>>(entries: &[S]) -> Result<Vec<OmitItem>, ConfigError> {
    let mut items = Vec::new();
    for entry in entries.iter().map(AsRef::as_ref).filter(|e| !e.is_empty()) {
        let item = entry.parse::<OmitItem>()?;
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_every_vocabulary_entry_parses() {
        for item in OmitItem::ALL {
            assert_eq!(item.as_str().parse::<OmitItem>().unwrap(), item);
            assert_eq!(
                serde_json::to_string(&item).unwrap(),
                format!("\"{}\"", item.as_str())
            );
        }
    }

    #[test]
    fn test_whole_vocabulary_and_empty_list_accepted() {
        let names: Vec<&str> = OmitItem::ALL.iter().map(|i| i.as_str()).collect();
        assert_eq!(parse_omit_list(&names).unwrap(), OmitItem::ALL.to_vec());
        assert!(parse_omit_list::<&str>(&[]).unwrap().is_empty());
        assert!(parse_omit_list(&[""]).unwrap().is_empty());
    }

    #[test]
    fn test_first_unknown_entry_reported() {
        let err = parse_omit_list(&["tables", "Tables", "views"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOmitItem(ref name) if name == "Tables"));
        assert_eq!(err.to_string(), "unknown item \"Tables\" in --omit option");
    }

    #[test]
    fn test_duplicates_collapse() {
        let items = parse_omit_list(&["log", "bloat", "log"]).unwrap();
        assert_eq!(items, vec![OmitItem::Log, OmitItem::Bloat]);
    }
}
