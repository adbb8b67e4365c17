//! Command Parser (§4.2): finds a `recache_message_array` invocation in the
//! latest assistant text and parses its position-list argument.
//!
//! Two wrapper shapes are recognized, matching §4.2's examples verbatim:
//! an XML-framed MCP tool call and a JSON-RPC 2.0 `tools/call` envelope.
//! Argument parsing is deliberately lax — garbage tokens are dropped rather
//! than rejected outright (§9: "silent ignore on parse failure is safer
//! than guessing intent").

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// A single parsed position, tagged with whether it came from expanding a
/// `N-M` range (permitting it to reference a placeholder register) or was
/// selected individually (which placeholders may not be).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPosition {
    pub position: u32,
    pub from_range: bool,
}

/// Why argument parsing failed to produce a usable position list.
///
/// `ParseError` is never surfaced to the model (§7); the other two are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    ParseError,
    EmptyArguments,
    NoValidPositions,
}

/// A `recache_message_array` invocation found in assistant text.
#[derive(Debug, Clone)]
pub struct DetectedCommand {
    /// The full matched invocation text (XML block or JSON-RPC envelope),
    /// used by the Neuralyzer to scrub it out.
    pub raw_match: String,
    /// Byte range of `raw_match` within the scanned text.
    pub span: Range<usize>,
    pub outcome: Result<Vec<ParsedPosition>, ParseOutcome>,
}

static USE_MCP_TOOL_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<use_mcp_tool>.*?</use_mcp_tool>").unwrap());
static TOOL_NAME_RECACHE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<tool_name>\s*recache_message_array\s*</tool_name>").unwrap());
static ARGUMENTS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<arguments>(.*?)</arguments>").unwrap());
static RANGE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").unwrap());
static SINGLE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

const JSON_RPC_NEEDLE: &str = "tokenwindow-local__recache_message_array";

/// Scans `text` for a `recache_message_array` invocation. Returns `None` if
/// no recognizable invocation is present at all — that is not a
/// `ParseError`, it simply means no command was sent this turn.
#[must_use]
pub fn detect_command(text: &str) -> Option<DetectedCommand> {
    find_xml_wrapped(text)
        .or_else(|| find_json_rpc_wrapped(text))
        .map(|(raw_match, span, args_json)| {
            let outcome = match args_json {
                Some(args_json) => parse_arguments(&args_json),
                None => Err(ParseOutcome::ParseError),
            };
            DetectedCommand {
                raw_match,
                span,
                outcome,
            }
        })
}

fn find_xml_wrapped(text: &str) -> Option<(String, Range<usize>, Option<String>)> {
    for candidate in USE_MCP_TOOL_BLOCK.find_iter(text) {
        let block = candidate.as_str();
        if TOOL_NAME_RECACHE.is_match(block) {
            let args = ARGUMENTS_BLOCK
                .captures(block)
                .map(|caps| caps[1].trim().to_string());
            return Some((block.to_string(), candidate.range(), args));
        }
    }
    None
}

fn find_json_rpc_wrapped(text: &str) -> Option<(String, Range<usize>, Option<String>)> {
    let needle_at = text.find(JSON_RPC_NEEDLE)?;
    let (start, end) = enclosing_top_level_object(text, needle_at)?;
    let raw = &text[start..end];
    let args = serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|envelope| envelope.pointer("/params/arguments").cloned())
        .map(|value| value.to_string());
    Some((raw.to_string(), start..end, args))
}

/// Finds the smallest top-level (stack-depth-zero) balanced `{...}` span
/// enclosing byte offset `needle_at`. Does not account for braces inside
/// JSON string literals — acceptable for a deliberately lax scanner (§9).
fn enclosing_top_level_object(text: &str, needle_at: usize) -> Option<(usize, usize)> {
    let mut stack: Vec<usize> = Vec::new();
    for (i, byte) in text.bytes().enumerate() {
        match byte {
            b'{' => stack.push(i),
            b'}' => {
                if let Some(start) = stack.pop()
                    && stack.is_empty()
                    && start <= needle_at
                    && needle_at < i + 1
                {
                    return Some((start, i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_arguments(args_json: &str) -> Result<Vec<ParsedPosition>, ParseOutcome> {
    let value: serde_json::Value =
        serde_json::from_str(args_json).map_err(|_| ParseOutcome::ParseError)?;
    let messages = value
        .get("messages")
        .and_then(serde_json::Value::as_str)
        .ok_or(ParseOutcome::ParseError)?;

    if messages.trim().is_empty() {
        return Err(ParseOutcome::EmptyArguments);
    }

    let positions = parse_position_list(messages);
    if positions.is_empty() {
        return Err(ParseOutcome::NoValidPositions);
    }
    Ok(positions)
}

/// Parses the `LIST := POSITION ("," POSITION)*` grammar from §6, tolerant
/// of garbage tokens, collapsing duplicates (keeping the first occurrence's
/// `from_range` tag) and sorting the result ascending.
#[must_use]
pub fn parse_position_list(list: &str) -> Vec<ParsedPosition> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();

    for raw_token in list.split(',') {
        let token = raw_token.trim();
        if token.is_empty() {
            continue;
        }

        if let Some(caps) = RANGE_TOKEN.captures(token) {
            let (Ok(start), Ok(end)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
                continue;
            };
            if start > end {
                continue;
            }
            for position in start..=end {
                if seen.insert(position) {
                    result.push(ParsedPosition {
                        position,
                        from_range: true,
                    });
                }
            }
        } else if SINGLE_TOKEN.is_match(token)
            && let Ok(position) = token.parse::<u32>()
            && seen.insert(position)
        {
            result.push(ParsedPosition {
                position,
                from_range: false,
            });
        }
    }

    result.sort_by_key(|p| p.position);
    result
}

#[cfg(test)]
mod tests {
    use super::{ParseOutcome, detect_command, parse_position_list};

    #[test]
    fn parses_ranges_and_singles_sorted_and_deduped() {
        let positions = parse_position_list(" 7 , 1-4, 2, garbage, 1-4 ");
        let rendered: Vec<(u32, bool)> = positions.iter().map(|p| (p.position, p.from_range)).collect();
        assert_eq!(
            rendered,
            vec![(1, true), (2, true), (3, true), (4, true), (7, false)]
        );
    }

    #[test]
    fn detects_xml_wrapped_invocation() {
        let text = r#"Sure, here's the plan.
<use_mcp_tool><server_name>tokenwindow-local</server_name><tool_name>recache_message_array</tool_name><arguments>{"messages": "1-4,25,30"}</arguments></use_mcp_tool>
Done."#;
        let cmd = detect_command(text).expect("command detected");
        let positions = cmd.outcome.expect("valid positions");
        assert_eq!(positions.len(), 6);
        assert_eq!(positions.last().unwrap().position, 30);
    }

    #[test]
    fn detects_json_rpc_wrapped_invocation() {
        let text = r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"tokenwindow-local__recache_message_array","arguments":{"messages":"1-2,7"}},"id":4}"#;
        let cmd = detect_command(text).expect("command detected");
        let positions = cmd.outcome.expect("valid positions");
        assert_eq!(positions.iter().map(|p| p.position).collect::<Vec<_>>(), vec![1, 2, 7]);
    }

    #[test]
    fn empty_messages_argument_is_surfaced_not_silently_dropped() {
        let text = r#"<use_mcp_tool><tool_name>recache_message_array</tool_name><arguments>{"messages": "   "}</arguments></use_mcp_tool>"#;
        let cmd = detect_command(text).expect("command detected");
        assert_eq!(cmd.outcome.unwrap_err(), ParseOutcome::EmptyArguments);
    }

    #[test]
    fn all_garbage_positions_is_no_valid_positions() {
        let text = r#"<use_mcp_tool><tool_name>recache_message_array</tool_name><arguments>{"messages": "abc, def"}</arguments></use_mcp_tool>"#;
        let cmd = detect_command(text).expect("command detected");
        assert_eq!(cmd.outcome.unwrap_err(), ParseOutcome::NoValidPositions);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let text = r#"<use_mcp_tool><tool_name>recache_message_array</tool_name><arguments>not json</arguments></use_mcp_tool>"#;
        let cmd = detect_command(text).expect("command detected");
        assert_eq!(cmd.outcome.unwrap_err(), ParseOutcome::ParseError);
    }

    #[test]
    fn no_invocation_present_returns_none() {
        assert!(detect_command("just plain assistant prose").is_none());
    }
}
