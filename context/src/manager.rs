//! The Orchestrator (§4.9): the per-turn pipeline that ties the Register
//! Store, Command Parser, Neuralyzer, Window Reconstructor, Oversize
//! Handler, JIT Injector, and Cache Accountant together behind the public
//! `process_request` / `get_cache_stats` / `reset` / `get_window_state` API
//! (§6).
//!
//! Conversations are independent: each gets its own `Mutex<ConversationState>`
//! behind a process-wide map, so turns on different ids run fully in
//! parallel while a single id's turns serialize (§5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use twm_config::{PromptCache, TokenWindowConfig};
use twm_core::{DataPaths, DiagnosticKind, DiagnosticLog, RecacheError};
use twm_types::{ClientMessage, ConversationId, Role};

use crate::cache_accountant;
use crate::command_parser::{self, ParseOutcome};
use crate::jit;
use crate::message::OutboundMessage;
use crate::neuralyzer;
use crate::oversize;
use crate::reconstructor;
use crate::register::{RegisterRole, RegisterStore};
use crate::state::{CacheStats, ConversationState};
use crate::token_counter::TokenCounter;
use crate::validator;

/// A message as rendered for the outbound API call: just role and content,
/// no internal bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub role: Role,
    pub content: String,
}

/// One block of the (possibly two-block) outbound system prompt (§4.9
/// step 13).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPromptBlock {
    pub content: String,
    pub cache_tag: bool,
}

/// The per-turn result returned to the caller (§6: `{messages,
/// system_prompt}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub messages: Vec<RenderedMessage>,
    pub system_prompt: Vec<SystemPromptBlock>,
}

/// A diagnostic snapshot of one conversation's register window (§6
/// `get_window_state`).
#[derive(Debug, Clone)]
pub struct RegisterSnapshot {
    pub position: u32,
    pub role: Role,
    pub content: String,
    pub placeholder: bool,
    pub offloaded: bool,
}

#[derive(Debug, Clone)]
pub struct WindowStateSnapshot {
    pub registers: Vec<RegisterSnapshot>,
    pub cache_breakpoint: u32,
    pub error_streak: u32,
    pub jit_active: bool,
    pub preserved_user: Option<String>,
}

fn sibling_variant_path(path: &Path, is_api: bool) -> PathBuf {
    if is_api {
        return path.to_path_buf();
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("prompt");
    let ext = path.extension().and_then(|s| s.to_str());
    let file_name = match ext {
        Some(ext) => format!("{stem}_bak.{ext}"),
        None => format!("{stem}_bak"),
    };
    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

/// Largest `R` such that `selections` begins with the contiguous run of
/// original positions `1, 2, ..., R` in order. Used to detect a recache
/// that retained an unbroken prefix of the prior window (§4.8, §9).
fn contiguous_prefix_len(selections: &[validator::Selection]) -> Option<u32> {
    let mut expected = 1u32;
    let mut count = 0u32;
    for selection in selections {
        if selection.position.as_u32() == expected {
            count += 1;
            expected += 1;
        } else {
            break;
        }
    }
    (count > 0).then_some(count)
}

/// Builds the transient per-turn message view the MCP-swap check, Oversize
/// Handler output, and JIT Injector operate on.
fn to_outbound(store: &RegisterStore) -> Vec<OutboundMessage> {
    store
        .get_in_window()
        .into_iter()
        .map(|r| OutboundMessage::new(r.position, r.role.as_wire_role(), r.content.clone(), r.placeholder))
        .collect()
}

/// Scans incoming (non-system) client messages for a `recache_message_array`
/// tool-result wrapper and, if `preserved_user` is set, splices the
/// preserved text back in (§4.7, orchestrator step 3).
fn apply_mcp_swap(messages: &mut [ClientMessage], state: &mut ConversationState) {
    if state.preserved_user.is_none() {
        return;
    }

    let mut temp = Vec::new();
    let mut original_indices = Vec::new();
    for (index, message) in messages.iter().enumerate() {
        if message.role == Role::System {
            continue;
        }
        temp.push(OutboundMessage::new(
            twm_types::RegisterPosition::new(u32::try_from(index + 1).unwrap_or(u32::MAX)),
            message.role,
            message.content.clone(),
            false,
        ));
        original_indices.push(index);
    }

    jit::detect_and_swap_tool_result(&mut temp, state);

    for (rendered, original_index) in temp.into_iter().zip(original_indices) {
        messages[original_index].content = rendered.content;
    }
}

/// The Token Window Manager's public facade: one instance serves every
/// conversation, each id's state mutated under its own lock (§5).
pub struct ContextManager {
    conversations: Mutex<HashMap<ConversationId, Arc<Mutex<ConversationState>>>>,
    config: TokenWindowConfig,
    paths: DataPaths,
    prompts: PromptCache,
    counter: Box<dyn TokenCounter>,
    diagnostics: DiagnosticLog,
    model_family: String,
}

impl ContextManager {
    #[must_use]
    pub fn new(paths: DataPaths, config: TokenWindowConfig, counter: Box<dyn TokenCounter>) -> Self {
        let diagnostics = DiagnosticLog::new(paths.diagnostic_log_file());
        Self {
            conversations: Mutex::new(HashMap::new()),
            config,
            paths,
            prompts: PromptCache::new(),
            counter,
            diagnostics,
            model_family: "claude".to_string(),
        }
    }

    /// Loads `data/config/token-window.json` from the process's current
    /// working directory and builds a manager with the default tiktoken
    /// counter (§6: config loaded at process start per §9).
    ///
    /// # Errors
    /// Returns the [`twm_core::ConfigurationError`] from loading the config
    /// file; callers should treat this as fatal (§7).
    pub fn from_cwd() -> anyhow::Result<Self> {
        let paths = DataPaths::from_cwd()?;
        let config = twm_config::load_config(&paths.config_file())?;
        Ok(Self::new(
            paths,
            config,
            Box::new(crate::token_counter::TiktokenCounter::new()),
        ))
    }

    #[must_use]
    pub fn with_model_family(mut self, model_family: impl Into<String>) -> Self {
        self.model_family = model_family.into();
        self
    }

    fn state_for(&self, conversation_id: &ConversationId) -> Arc<Mutex<ConversationState>> {
        let mut conversations = self
            .conversations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        conversations
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new())))
            .clone()
    }

    /// Drops all state for `conversation_id`, as if it had never received a
    /// turn (§3 Lifecycle).
    pub fn reset(&self, conversation_id: &ConversationId) {
        let mut conversations = self
            .conversations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        conversations.remove(conversation_id);
    }

    /// Sets or clears the conversation's secondary cacheable system prompt
    /// block (§9 Open Questions). An embedding host calls this directly —
    /// no pipeline step derives `system2_content` from turn input.
    pub fn set_system2_content(&self, conversation_id: &ConversationId, content: Option<String>) {
        let state = self.state_for(conversation_id);
        let mut guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.set_system2_content(content);
    }

    /// The cache-accounting figures from the most recently completed turn
    /// (§6). Returns `{0, 0}` for an id that has never had a turn.
    #[must_use]
    pub fn get_cache_stats(&self, conversation_id: &ConversationId) -> CacheStats {
        let state = self.state_for(conversation_id);
        let guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.last_cache_stats
    }

    /// A diagnostic snapshot of the conversation's current window (§6).
    #[must_use]
    pub fn get_window_state(&self, conversation_id: &ConversationId) -> WindowStateSnapshot {
        let state = self.state_for(conversation_id);
        let guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        WindowStateSnapshot {
            registers: guard
                .registers
                .get_in_window()
                .into_iter()
                .map(|r| RegisterSnapshot {
                    position: r.position.as_u32(),
                    role: r.role.as_wire_role(),
                    content: r.content.clone(),
                    placeholder: r.placeholder,
                    offloaded: r.offload.is_some(),
                })
                .collect(),
            cache_breakpoint: guard.cache_breakpoint,
            error_streak: guard.error_streak,
            jit_active: guard.jit_active,
            preserved_user: guard.preserved_user.clone(),
        }
    }

    /// The per-turn entry point (§4.9, §6).
    pub fn process_request(
        &self,
        conversation_id: impl Into<ConversationId>,
        mut messages: Vec<ClientMessage>,
        bot_id: Option<&str>,
    ) -> ProcessResult {
        let conversation_id = conversation_id.into();
        let is_api = messages.iter().any(ClientMessage::is_from_api);

        // Step 1: load the appropriate live system prompt.
        let system_prompt_path = sibling_variant_path(&self.paths.jit_prompt_file(), is_api);
        let system_prompt = self
            .prompts
            .load(&system_prompt_path)
            .unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to load system prompt; using empty prompt");
                String::new()
            });

        let state_handle = self.state_for(&conversation_id);
        let mut state = state_handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Step 2: snapshot the breakpoint as of the end of the previous turn.
        let old_breakpoint = state.cache_breakpoint;

        // Step 3: MCP tool-result swap.
        apply_mcp_swap(&mut messages, &mut state);

        // Step 4: detect (without validating) a command in the latest
        // assistant text, and neuralyze it out regardless of outcome.
        let mut cleaned_assistant_tail: Option<String> = None;
        let mut detected_outcome: Option<Result<Vec<command_parser::ParsedPosition>, ParseOutcome>> = None;
        if let Some(last_assistant_index) = messages.iter().rposition(|m| m.role == Role::Assistant) {
            let original_text = messages[last_assistant_index].content.clone();
            if let Some(detected) = command_parser::detect_command(&original_text) {
                let scrubbed = neuralyzer::scrub(&original_text, Some(detected.span.clone()));
                messages[last_assistant_index].content = scrubbed.clone();
                cleaned_assistant_tail = Some(scrubbed);
                detected_outcome = Some(detected.outcome);
            }
        }

        // Step 5: append new client messages to the Register Store.
        state.registers.append_from_client(&messages);

        let latest_client_user_content = state
            .registers
            .get_in_window()
            .into_iter()
            .rev()
            .find(|r| r.role == RegisterRole::User)
            .map(|r| r.content.clone())
            .unwrap_or_default();

        // Steps 6-8: validate and apply, or record a synthetic tool error.
        let mut retained_prefix_end: Option<u32> = None;
        match detected_outcome {
            None | Some(Err(ParseOutcome::ParseError)) => {
                // No recognizable invocation, or malformed JSON: silently
                // ignored (§7), no recache attempted.
            }
            Some(Err(ParseOutcome::EmptyArguments)) => {
                self.apply_recache_error(&mut state, &conversation_id, &RecacheError::EmptyArguments);
            }
            Some(Err(ParseOutcome::NoValidPositions)) => {
                self.apply_recache_error(&mut state, &conversation_id, &RecacheError::NoValidPositions);
            }
            Some(Ok(positions)) => match validator::validate(&positions, &state.registers) {
                Err(err) => self.apply_recache_error(&mut state, &conversation_id, &err),
                Ok(selections) => {
                    retained_prefix_end = contiguous_prefix_len(&selections);
                    let anchoring_user = state
                        .preserved_user
                        .clone()
                        .unwrap_or_else(|| latest_client_user_content.clone());
                    let preserved_was_used = state.preserved_user.is_some();
                    let tail = cleaned_assistant_tail.clone().unwrap_or_default();
                    let template = self.config.placeholder_messages.template.clone();

                    let store = &mut state.registers;
                    let new_registers = reconstructor::reconstruct(
                        &selections,
                        &tail,
                        &anchoring_user,
                        &template,
                        || store.next_register_id(),
                        &conversation_id,
                        &self.diagnostics,
                    );
                    state.registers.replace_all(new_registers);

                    if preserved_was_used {
                        state.preserved_user = None;
                    }
                    state.current_mcp_error = None;
                    state.error_streak = 0;
                    state.error_stack.clear();

                    self.diagnostics.record(
                        DiagnosticKind::Event,
                        conversation_id.as_str(),
                        &format!("applied recache selecting {} register(s)", positions.len()),
                    );
                }
            },
        }

        // Step 9: update cache breakpoint and compute cache stats.
        let window = state.registers.get_in_window();
        let new_cache_stats = cache_accountant::compute(
            &window,
            old_breakpoint,
            retained_prefix_end,
            self.counter.as_ref(),
            &self.model_family,
            &conversation_id,
            &self.diagnostics,
        );
        let new_breakpoint = cache_accountant::new_breakpoint(&window);
        drop(window);
        state.cache_breakpoint = new_breakpoint;
        state.last_cache_stats = new_cache_stats;

        // Step 10: run the Oversize Handler directly on the store, then
        // build the outbound view from the (possibly stubbed) registers.
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
        oversize::apply_to_store(
            &mut state.registers,
            &conversation_id,
            &timestamp,
            &self.paths,
            &self.config,
            self.counter.as_ref(),
            &self.model_family,
            &self.diagnostics,
        );
        let mut outbound = to_outbound(&state.registers);

        // Step 11: JIT Injector.
        jit::clean_prior_jit(&mut outbound, &self.config.jit_instruction, &mut state);

        let total_tokens: u32 = self.counter.count_tokens(&system_prompt, &self.model_family)
            + outbound
                .iter()
                .map(|m| self.counter.count_message(m.role.as_str(), &m.content, &self.model_family))
                .sum::<u32>();
        let percentage = jit::compute_percentage(total_tokens, self.config.max_window_size);

        let jit_prompt_path = sibling_variant_path(
            &PathBuf::from(&self.config.jit_instruction.prompt_file),
            is_api,
        );
        let jit_prompt_text = self.prompts.load(&jit_prompt_path).unwrap_or_default();

        let injected = jit::inject_if_threshold_crossed(
            &mut outbound,
            percentage,
            &self.config.jit_instruction,
            &jit_prompt_text,
            &mut state,
            self.counter.as_ref(),
            &self.model_family,
        );

        if !injected {
            let truncated = jit::truncate_oversize_user_message(
                &mut outbound,
                &system_prompt,
                &self.config,
                self.counter.as_ref(),
                &self.model_family,
            );
            if !truncated {
                jit::substitute_window_usage_display(
                    &mut outbound,
                    percentage,
                    &self.config.jit_instruction.window_usage_pattern,
                );
            }
        }

        // Step 12: bot-role substitution in the system prompt.
        let mut final_system_prompt = system_prompt;
        if let Some(bot_id) = bot_id {
            final_system_prompt = substitute_role_line(&final_system_prompt, bot_id);
        }

        // Step 13: emit one or two cache-tagged system blocks.
        let mut system_blocks = vec![SystemPromptBlock {
            content: final_system_prompt,
            cache_tag: true,
        }];
        if let Some(system2) = state.system2_content() {
            system_blocks.push(SystemPromptBlock {
                content: system2.to_string(),
                cache_tag: true,
            });
        }

        // Step 14: render and return.
        let rendered = outbound
            .into_iter()
            .map(|m| RenderedMessage { role: m.role, content: m.content })
            .collect();

        ProcessResult {
            messages: rendered,
            system_prompt: system_blocks,
        }
    }

    fn apply_recache_error(
        &self,
        state: &mut ConversationState,
        conversation_id: &ConversationId,
        error: &RecacheError,
    ) {
        if let Some(register) = state.registers.last_in_window_mut(RegisterRole::User) {
            register.content = error.to_tool_result();
        }
        state.error_streak += 1;
        if let Some(preserved) = &state.preserved_user {
            state.error_stack.push(preserved.clone());
        }
        state.current_mcp_error = Some(error.to_string());

        self.diagnostics.record(
            DiagnosticKind::Event,
            conversation_id.as_str(),
            &format!("recache validation failed: {error}"),
        );
    }
}

static ROLE_LINE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"(?m)^#Role:.*$").unwrap());

/// Substitutes `bot_id` into the system prompt's fixed `#Role:` line
/// (§4.9 step 12), used for shared/multi-agent chats.
fn substitute_role_line(system_prompt: &str, bot_id: &str) -> String {
    if !ROLE_LINE.is_match(system_prompt) {
        return system_prompt.to_string();
    }
    ROLE_LINE
        .replace(system_prompt, format!("#Role: {bot_id}"))
        .into_owned()
}
