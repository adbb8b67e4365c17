//! Neuralyzer (§4.4): strips a command invocation and all residual command
//! vocabulary or numeric position hints from assistant text, so the model
//! can never re-learn the mechanism by re-reading its own transcript.
//!
//! Invoked on the assistant text that carried a command (success or
//! error), and again on every message from `jit_injection_index` onward
//! whenever a fresh JIT injection happens (§4.7 step 1).

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static SURFACE_FORM_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"recache_message_array\s*\([^)]*\)").unwrap());

static COMMAND_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(restore|new\s?chat|cache_read|cache_write|foundation|append)\b").unwrap()
});

static SLASH_RESTORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/restore\s+\d+").unwrap());
static SLASH_NEWCHAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/newchat\s+\d+").unwrap());

static RECACHE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<recache_message_array>.*?</recache_message_array>").unwrap());
static MESSAGE_INDICES_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<message_indices>.*?</message_indices>").unwrap());

// Numeric-reference patterns that could let the model infer position indices.
static BRACKETED_NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\s*\d+(\s*,\s*\d+)*\s*\]").unwrap());
static BRACED_NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\s*\d+(\s*,\s*\d+)*\s*\}").unwrap());
static PARENTHESIZED_RANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*\d+(-\d+)?\s*\)").unwrap());
static NUMBER_LIST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+(\s*,\s*\d+){1,}\b").unwrap());
static MESSAGE_N_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmessages?\s+\d+(-\d+)?\s*:").unwrap());
static N_M_ENTRIES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+-\d+\s+entries\b").unwrap());
static NUMBERED_LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s+").unwrap());
static BARE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)\d+(?:[.,;:]|\s|$)").unwrap());

static CONTEXT_WINDOW_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[^.]*context window[^.]*\.").unwrap());

static LEADING_PUNCTUATION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[\s,.;:!?\-]+$\n?").unwrap());
static EXCESS_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static EXCESS_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Removes the raw invocation text (XML block or JSON-RPC envelope) found
/// by the command parser at `span`, then runs the full scrub over the
/// remainder.
#[must_use]
pub fn scrub(text: &str, invocation_span: Option<Range<usize>>) -> String {
    let with_invocation_removed = match invocation_span {
        Some(span) if span.end <= text.len() => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..span.start]);
            out.push_str(&text[span.end..]);
            out
        }
        _ => text.to_string(),
    };
    scrub_vocabulary(&with_invocation_removed)
}

/// Runs the vocabulary/numeric-reference scrub without removing an
/// invocation span — used for messages that never carried the raw
/// invocation but may still echo command vocabulary (e.g. prior JIT
/// instructions, or assistant replies after `jit_injection_index`).
#[must_use]
pub fn scrub_vocabulary(text: &str) -> String {
    let mut result = text.to_string();

    result = RECACHE_TAG.replace_all(&result, "").into_owned();
    result = MESSAGE_INDICES_TAG.replace_all(&result, "").into_owned();
    result = SURFACE_FORM_CALL.replace_all(&result, "").into_owned();
    result = COMMAND_VOCABULARY.replace_all(&result, "").into_owned();
    result = SLASH_RESTORE.replace_all(&result, "").into_owned();
    result = SLASH_NEWCHAT.replace_all(&result, "").into_owned();

    result = MESSAGE_N_PREFIX.replace_all(&result, "").into_owned();
    result = N_M_ENTRIES.replace_all(&result, "").into_owned();
    result = BRACKETED_NUMBERS.replace_all(&result, "").into_owned();
    result = BRACED_NUMBERS.replace_all(&result, "").into_owned();
    result = PARENTHESIZED_RANGE.replace_all(&result, "").into_owned();
    result = NUMBER_LIST.replace_all(&result, "").into_owned();
    result = NUMBERED_LIST_ITEM.replace_all(&result, "").into_owned();
    result = BARE_NUMBER.replace_all(&result, " ").into_owned();

    result = CONTEXT_WINDOW_SENTENCE.replace_all(&result, "").into_owned();

    result = LEADING_PUNCTUATION_LINE.replace_all(&result, "").into_owned();
    result = EXCESS_WHITESPACE.replace_all(&result, " ").into_owned();
    result = EXCESS_BLANK_LINES.replace_all(&result, "\n\n").into_owned();

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{scrub, scrub_vocabulary};

    #[test]
    fn removes_invocation_span_and_surface_form() {
        let text = "before <use_mcp_tool>stuff</use_mcp_tool> after recache_message_array(\"1-2\")";
        let span = text.find("<use_mcp_tool>").map(|start| start..text.find("</use_mcp_tool>").unwrap() + "</use_mcp_tool>".len());
        let scrubbed = scrub(text, span);
        assert!(!scrubbed.contains("use_mcp_tool"));
        assert!(!scrubbed.contains("recache_message_array"));
    }

    #[test]
    fn removes_command_vocabulary_case_insensitively() {
        let scrubbed = scrub_vocabulary("Let me RESTORE the new chat state via cache_write.");
        assert!(!scrubbed.to_lowercase().contains("restore"));
        assert!(!scrubbed.to_lowercase().contains("cache_write"));
    }

    #[test]
    fn removes_slash_forms() {
        let scrubbed = scrub_vocabulary("Try /restore 3 or /newchat 12 now.");
        assert!(!scrubbed.contains("/restore"));
        assert!(!scrubbed.contains("/newchat"));
    }

    #[test]
    fn removes_numeric_reference_patterns() {
        let scrubbed = scrub_vocabulary("Keeping [1, 2, 3] and (5-8) and Messages 4-9: done, 10-20 entries remain.");
        assert!(!scrubbed.contains('['));
        assert!(!scrubbed.contains("Messages 4"));
        assert!(!scrubbed.contains("entries"));
    }

    #[test]
    fn removes_context_window_sentence() {
        let scrubbed = scrub_vocabulary("Hello there. Your context window is getting full. Thanks.");
        assert!(!scrubbed.to_lowercase().contains("context window"));
        assert!(scrubbed.contains("Hello there"));
        assert!(scrubbed.contains("Thanks"));
    }

    #[test]
    fn collapses_blank_lines_and_punctuation_only_lines() {
        let scrubbed = scrub_vocabulary("para one\n\n\n\n---\n\n\npara two");
        assert!(!scrubbed.contains("\n\n\n"));
        assert!(!scrubbed.contains("---"));
    }
}
