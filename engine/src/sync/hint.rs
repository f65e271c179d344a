//! Sync hint parsing.
//!
//! A hint names the strategy a view is synchronized with:
//!
//! ```text
//! TimeStamp: orders, modified_at
//! Full: countries
//! ```

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A parsed sync hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "camelCase")]
pub enum SyncHint {
    /// Incremental by a timestamp-like column
    TimeStamp { view: String, column: String },
    /// Whole view, versioned as a unit
    Full { view: String },
}

impl SyncHint {
    pub fn view(&self) -> &str {
        match self {
            SyncHint::TimeStamp { view, .. } | SyncHint::Full { view } => view,
        }
    }
}

fn argument<'a>(raw: &'a str, what: &str, hint: &str) -> Result<&'a str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Format(format!("missing {} in '{}'", what, hint)));
    }
    Ok(raw)
}

impl FromStr for SyncHint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, arguments) = s
            .split_once(':')
            .ok_or_else(|| Error::Format(format!("expected '<algorithm>: <arguments>', got '{}'", s)))?;

        match algorithm.trim().to_ascii_lowercase().as_str() {
            "timestamp" => {
                let mut parts = arguments.split(',');
                let view = argument(parts.next().unwrap_or_default(), "view", s)?;
                let column = argument(parts.next().unwrap_or_default(), "column", s)?;
                if let Some(extra) = parts.next() {
                    return Err(Error::Format(format!("unexpected argument '{}'", extra.trim())));
                }
                Ok(SyncHint::TimeStamp {
                    view: view.to_string(),
                    column: column.to_string(),
                })
            }
            "full" => {
                let view = argument(arguments, "view", s)?;
                if view.contains(',') {
                    return Err(Error::Format(format!("unexpected arguments '{}'", view)));
                }
                Ok(SyncHint::Full {
                    view: view.to_string(),
                })
            }
            _ => Err(Error::Format(format!(
                "unknown sync algorithm '{}'",
                algorithm.trim()
            ))),
        }
    }
}

impl std::fmt::Display for SyncHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncHint::TimeStamp { view, column } => write!(f, "TimeStamp: {},{}", view, column),
            SyncHint::Full { view } => write!(f, "Full: {}", view),
        }
    }
}
