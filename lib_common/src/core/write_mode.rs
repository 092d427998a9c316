use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// # Write Mode
///
/// Selects how an upload treats an object that already exists at the target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Read the existing table, concatenate the new rows after it, rewrite.
    #[default]
    Append,
    /// Replace whatever is stored with the new rows.
    Overwrite,
}

/// Returned when a string is neither `append` nor `overwrite`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown write mode '{0}' (expected 'append' or 'overwrite')")]
pub struct ParseWriteModeError(pub String);

impl FromStr for WriteMode {
    type Err = ParseWriteModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(WriteMode::Append),
            "overwrite" => Ok(WriteMode::Overwrite),
            _ => Err(ParseWriteModeError(s.to_string())),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMode::Append => write!(f, "append"),
            WriteMode::Overwrite => write!(f, "overwrite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!(" OVERWRITE ".parse::<WriteMode>().unwrap(), WriteMode::Overwrite);
    }

    #[test]
    fn rejects_unknown_modes() {
        let err = "upsert".parse::<WriteMode>().unwrap_err();
        assert_eq!(err, ParseWriteModeError("upsert".to_string()));
    }
}
