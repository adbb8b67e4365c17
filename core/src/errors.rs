//! Error taxonomy for the command pipeline and configuration loading.
//!
//! `RecacheError` covers the four outcomes of validating a parsed
//! `recache_message_array` invocation that are surfaced back to the model as
//! a synthetic tool result (§7). A fifth outcome, malformed or unrecognized
//! invocations, is not a variant here — the command parser silently drops
//! those and never calls into validation at all.
//!
//! `ConfigurationError` is fatal: a missing config key or unreadable prompt
//! file aborts process startup rather than degrading silently.

use std::ops::RangeInclusive;

use thiserror::Error;

/// The literal prefix every surfaced command error is wrapped in before it
/// replaces the content of the latest user message (§7).
pub const SYNTHETIC_TOOL_RESULT_PREFIX: &str = "[use_mcp_tool] Result: ERROR: ";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecacheError {
    /// `messages` field was present but blank after trimming.
    #[error("the messages argument was empty")]
    EmptyArguments,

    /// Every token in the position list was unparseable garbage.
    #[error("no valid positions were found in the messages argument")]
    NoValidPositions,

    /// At least one requested position lies outside `1..=register_count`.
    #[error(
        "position(s) {} are outside the valid range 1-{}; current registers: {}",
        format_positions(.requested),
        .valid_range.end(),
        .sample.join("; ")
    )]
    InvalidPositions {
        requested: Vec<u32>,
        valid_range: RangeInclusive<u32>,
        /// First ten in-window registers as `id role "preview"` strings
        /// (§4.3), so the model can see what positions actually exist.
        sample: Vec<String>,
    },

    /// One or more individually selected (not range-expanded) positions
    /// pointed at a placeholder register.
    #[error(
        "position(s) {} are placeholder messages and cannot be selected individually; \
         try one of: {}",
        format_positions(.positions),
        format_positions(.alternatives)
    )]
    PlaceholderSelected {
        positions: Vec<u32>,
        alternatives: Vec<u32>,
    },
}

fn format_positions(positions: &[u32]) -> String {
    positions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl RecacheError {
    /// Wraps this error's message in the synthetic tool-result envelope
    /// that replaces the content of the latest user message.
    #[must_use]
    pub fn to_tool_result(&self) -> String {
        format!("{SYNTHETIC_TOOL_RESULT_PREFIX}{self}")
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("config file {path} is missing required key {key}")]
    MissingKey { path: String, key: String },

    #[error("config file {path} could not be parsed: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file {path} could not be read: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt file {path} could not be read: {source}")]
    PromptUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::{RecacheError, SYNTHETIC_TOOL_RESULT_PREFIX};

    #[test]
    fn invalid_positions_lists_offenders_and_range() {
        let err = RecacheError::InvalidPositions {
            requested: vec![12, 99],
            valid_range: 1..=10,
            sample: vec!["RegisterId(0) User \"hi\"".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("12, 99"));
        assert!(msg.contains("1-10"));
        assert!(msg.contains("RegisterId(0) User"));
    }

    #[test]
    fn placeholder_selected_lists_alternatives() {
        let err = RecacheError::PlaceholderSelected {
            positions: vec![4],
            alternatives: vec![3, 5],
        };
        let msg = err.to_string();
        assert!(msg.contains('4'));
        assert!(msg.contains("3, 5"));
    }

    #[test]
    fn to_tool_result_prefixes_synthetic_marker() {
        let wrapped = RecacheError::EmptyArguments.to_tool_result();
        assert!(wrapped.starts_with(SYNTHETIC_TOOL_RESULT_PREFIX));
        assert!(wrapped.ends_with("empty"));
    }
}
