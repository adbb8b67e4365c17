//! JIT Prompt Injector (§4.7): computes window usage, cleans a prior JIT
//! block once it has served its purpose, injects a fresh one when usage
//! crosses the configured threshold, and otherwise truncates an oversize
//! user message or substitutes the usage-percentage display.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use twm_config::{JitInstructionConfig, TokenWindowConfig};
use twm_types::Role;

use crate::message::OutboundMessage;
use crate::neuralyzer;
use crate::state::ConversationState;
use crate::token_counter::TokenCounter;

/// Matches the synthetic tool-result wrapper this pipeline itself writes
/// on validation failure (§7), distinct from a genuine MCP tool result.
const XML_TOOL_RESULT_MARKER: &str = "use_mcp_tool for";
const JSON_RPC_TOOL_RESULT_MARKER: &str = "tokenwindow-local__recache_message_array";

static TOOL_RESULT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[[^\]]*recache_message_array[^\]]*\]\s*Result:").unwrap());

/// MCP tool-result detection & swap (§4.7, orchestrator step 3). Scans
/// user messages for a `recache_message_array` tool-result wrapper; if one
/// is found and `preserved_user` is set, the original (preserved) user
/// text is spliced back in, clearing `preserved_user`, `error_streak`, and
/// `error_stack`. This is how the model's original question returns to
/// the conversation after a successful context reshape.
pub fn detect_and_swap_tool_result(messages: &mut [OutboundMessage], state: &mut ConversationState) {
    let Some(preserved) = state.preserved_user.clone() else {
        return;
    };

    let matched = messages.iter_mut().find(|m| {
        m.role == Role::User
            && (TOOL_RESULT_LINE.is_match(&m.content)
                || (m.content.contains(XML_TOOL_RESULT_MARKER) && m.content.contains("recache_message_array"))
                || m.content.contains(JSON_RPC_TOOL_RESULT_MARKER))
    });

    if let Some(message) = matched {
        message.content = preserved;
        state.preserved_user = None;
        state.error_streak = 0;
        state.error_stack.clear();
    }
}

/// Cleans a previously injected JIT block out of the current message list
/// using the configured search/replace rules, and neuralyzes every message
/// from `jit_injection_index` onward (§4.7 step 1).
pub fn clean_prior_jit(
    messages: &mut [OutboundMessage],
    config: &JitInstructionConfig,
    state: &mut ConversationState,
) {
    if !state.jit_active {
        return;
    }

    for message in messages.iter_mut() {
        for rule in &config.assistant_cleaning {
            let Ok(pattern) = RegexBuilder::new(&rule.search)
                .case_insensitive(!rule.case_sensitive)
                .build()
            else {
                continue;
            };
            message.content = pattern.replace_all(&message.content, rule.replace.as_str()).into_owned();
        }
    }

    if let Some(from) = state.jit_injection_index {
        for message in messages.iter_mut().filter(|m| m.position.as_u32() >= from.as_u32()) {
            message.content = neuralyzer::scrub_vocabulary(&message.content);
        }
    }

    state.jit_active = false;
}

/// `round(100 * total_tokens / max_window_size)`, clamped so a window with
/// zero budget never divides by zero.
#[must_use]
pub fn compute_percentage(total_tokens: u32, max_window_size: u32) -> u32 {
    if max_window_size == 0 {
        return 100;
    }
    ((f64::from(total_tokens) * 100.0) / f64::from(max_window_size)).round() as u32
}

fn register_map(messages: &[OutboundMessage], counter: &dyn TokenCounter, model_family: &str) -> String {
    let mut lines = vec!["Register map:".to_string()];
    for message in messages {
        let tokens = counter.count_tokens(&message.content, model_family);
        let preview: String = message.content.split_whitespace().take(25).collect::<Vec<_>>().join(" ");
        lines.push(format!(
            "[{}] {} ({tokens} tokens): {preview}",
            message.position.as_u32(),
            message.role,
        ));
    }
    lines.join("\n")
}

/// Attempts a fresh JIT injection if `percentage >= threshold`. Returns
/// `true` if it injected. On injection, the current last user message is
/// preserved and its content replaced with the JIT prompt plus an MCP
/// error preamble (if any) plus the register map.
pub fn inject_if_threshold_crossed(
    messages: &mut [OutboundMessage],
    percentage: u32,
    config: &JitInstructionConfig,
    jit_prompt_text: &str,
    state: &mut ConversationState,
    counter: &dyn TokenCounter,
    model_family: &str,
) -> bool {
    if f64::from(percentage) < config.threshold {
        return false;
    }

    let Some(last_user_index) = messages.iter().rposition(|m| m.role == Role::User) else {
        return false;
    };

    let register_map_text = register_map(messages, counter, model_family);
    let mut injected = String::new();
    if let Some(error) = &state.current_mcp_error {
        injected.push_str(&format!("PREVIOUS MCP ERROR: {error}\n\n"));
    }
    injected.push_str(jit_prompt_text);
    injected.push('\n');
    injected.push_str(&register_map_text);

    let target = &mut messages[last_user_index];
    state.preserved_user = Some(target.content.clone());
    let injection_position = target.position;
    target.content = injected;

    state.jit_active = true;
    state.jit_injection_index = Some(injection_position);
    true
}

/// Finds the smallest prefix (in `unicode-scalar` word-boundary units) of
/// `content` whose token count is `<= budget`, via binary search over
/// word-boundary split points (§4.7 step 5).
fn binary_search_truncation(
    content: &str,
    budget: u32,
    preserve_from_start: bool,
    counter: &dyn TokenCounter,
    model_family: &str,
) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return content.to_string();
    }

    let mut lo = 0usize;
    let mut hi = words.len();
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let candidate = if preserve_from_start {
            words[..mid].join(" ")
        } else {
            words[words.len() - mid..].join(" ")
        };
        if counter.count_tokens(&candidate, model_family) <= budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    if preserve_from_start {
        words[..lo].join(" ")
    } else {
        words[words.len() - lo..].join(" ")
    }
}

/// Truncates the latest user message if it exceeds its per-message budget
/// `(max_window_size - system_prompt_tokens - token_buffer) - other_messages_tokens`
/// (§4.7 step 5). Only runs when no JIT injection happened this turn.
pub fn truncate_oversize_user_message(
    messages: &mut [OutboundMessage],
    system_prompt: &str,
    config: &TokenWindowConfig,
    counter: &dyn TokenCounter,
    model_family: &str,
) -> bool {
    if !config.user_message_truncation.enabled {
        return false;
    }

    let Some(last_user_index) = messages.iter().rposition(|m| m.role == Role::User) else {
        return false;
    };

    let system_tokens = counter.count_tokens(system_prompt, model_family);
    let other_tokens: u32 = messages
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != last_user_index)
        .map(|(_, m)| counter.count_message(m.role.as_str(), &m.content, model_family))
        .sum();

    let budget = config
        .max_window_size
        .saturating_sub(system_tokens)
        .saturating_sub(config.user_message_truncation.token_buffer)
        .saturating_sub(other_tokens);

    let current = counter.count_tokens(&messages[last_user_index].content, model_family);
    if current <= budget {
        return false;
    }

    let truncated = binary_search_truncation(
        &messages[last_user_index].content,
        budget,
        config.user_message_truncation.preserve_from_start,
        counter,
        model_family,
    );
    messages[last_user_index].content = format!(
        "{truncated}{}",
        config.user_message_truncation.truncation_indicator
    );
    true
}

/// Substitutes the computed usage percentage into the latest user message
/// if it still carries the configured detection marker (§4.7 step 6, §6).
/// Never invents the display if the marker is absent.
pub fn substitute_window_usage_display(
    messages: &mut [OutboundMessage],
    percentage: u32,
    pattern: &twm_config::WindowUsagePatternConfig,
) {
    let Some(last_user) = messages.iter_mut().rfind(|m| m.role == Role::User) else {
        return;
    };
    if !last_user.content.contains(&pattern.detection_text) {
        return;
    }
    let Ok(search) = Regex::new(&pattern.search_regex) else {
        return;
    };
    let replacement = pattern.replace_template.replace("{percentage}", &percentage.to_string());
    last_user.content = search.replace_all(&last_user.content, replacement.as_str()).into_owned();
}
