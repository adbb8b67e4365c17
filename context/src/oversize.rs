//! Oversize Handler (§4.6): detects registers whose content alone exceeds
//! the configured share of the window budget, offloads the original bytes
//! to disk, and replaces the in-memory content with a preview plus a stub
//! that actively discourages the model from re-reading the offload file
//! the way it produced the bloat in the first place. Every knob here —
//! whether the handler runs at all, the threshold percentage, the preview
//! size, the offload directory, and the stub wording — comes from
//! `oversizedMessageHandling` in the config file (§6).

use twm_config::{OversizedMessageHandlingConfig, TokenWindowConfig};
use twm_core::{DataPaths, DiagnosticKind, DiagnosticLog};
use twm_types::ConversationId;

use crate::register::{OffloadRef, RegisterStore};
use crate::token_counter::TokenCounter;

/// Builds the stub appended after the preview, substituting `{path}` in the
/// configured template. Wording matters: it must discourage
/// `read_file`-style re-reads of the offload path (§4.6).
fn stub_text(template: &str, path: &std::path::Path) -> String {
    template.replace("{path}", &path.display().to_string())
}

fn word_boundary_preview(
    content: &str,
    truncate_to_tokens: u32,
    counter: &dyn TokenCounter,
    model_family: &str,
) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    let mut preview = String::new();
    for word in &words {
        let candidate = if preview.is_empty() {
            (*word).to_string()
        } else {
            format!("{preview} {word}")
        };
        if counter.count_tokens(&candidate, model_family) > truncate_to_tokens {
            break;
        }
        preview = candidate;
    }
    if preview.is_empty() && !words.is_empty() {
        preview = (*words.first().unwrap()).to_string();
    }
    preview
}

/// Outcome of offloading one register's content.
pub struct Offloaded {
    pub new_content: String,
    pub original_token_count: u32,
    pub path: std::path::PathBuf,
}

/// Offloads `content` to disk under the configured `temp_directory` and
/// returns the replacement content to store on the register. `timestamp`
/// must already be filesystem-safe (no colons); callers format it once per
/// turn.
///
/// # Errors
/// Propagates the underlying atomic-write failure; callers should treat
/// this as non-fatal to the turn and log it, since oversize offload is a
/// best-effort space optimization rather than a correctness requirement.
pub fn offload(
    content: &str,
    conversation_id: &ConversationId,
    register_position: u32,
    timestamp: &str,
    paths: &DataPaths,
    config: &OversizedMessageHandlingConfig,
    counter: &dyn TokenCounter,
    model_family: &str,
) -> std::io::Result<Offloaded> {
    let original_token_count = counter.count_tokens(content, model_family);
    let path = paths.oversize_offload_path(
        &config.temp_directory,
        conversation_id.as_str(),
        register_position,
        timestamp,
    );
    twm_utils::atomic_write(&path, content.as_bytes())?;

    let preview = word_boundary_preview(content, config.truncate_to_tokens, counter, model_family);
    let new_content = format!("{preview}...\n{}", stub_text(&config.instruction_template, &path));

    Ok(Offloaded {
        new_content,
        original_token_count,
        path,
    })
}

/// Whether a register's token count crosses the configured oversize
/// threshold. Strict `>`, not `≥` — exactly the threshold percentage does
/// not trigger offload (§8).
#[must_use]
pub fn exceeds_threshold(token_count: u32, max_window_size: u32, threshold_percent: f64) -> bool {
    if max_window_size == 0 {
        return false;
    }
    let percent = f64::from(token_count) / f64::from(max_window_size) * 100.0;
    percent > threshold_percent
}

/// Scans every in-window register and offloads any whose content exceeds
/// the threshold, mutating the register's content and `offload` field
/// directly (§4.6: "Record `offload` on the register"). Registers already
/// offloaded this unbroken sequence are skipped, since their content is
/// already the stub, not the original bloat. A no-op entirely when
/// `oversized_message_handling.enabled` is `false` (§6).
///
/// Returns the number of registers offloaded this call. IO failures are
/// logged as consistency violations and otherwise swallowed — offload is a
/// best-effort space optimization, not a correctness requirement of the
/// turn.
pub fn apply_to_store(
    store: &mut RegisterStore,
    conversation_id: &ConversationId,
    timestamp: &str,
    paths: &DataPaths,
    config: &TokenWindowConfig,
    counter: &dyn TokenCounter,
    model_family: &str,
    diagnostics: &DiagnosticLog,
) -> usize {
    let oversize_config = &config.oversized_message_handling;
    if !oversize_config.enabled {
        return 0;
    }

    let mut offloaded = 0;
    for register in store.get_in_window_mut() {
        if register.offload.is_some() {
            continue;
        }
        let token_count = counter.count_tokens(&register.content, model_family);
        if !exceeds_threshold(token_count, config.max_window_size, oversize_config.threshold_percent) {
            continue;
        }

        match offload(
            &register.content,
            conversation_id,
            register.position.as_u32(),
            timestamp,
            paths,
            oversize_config,
            counter,
            model_family,
        ) {
            Ok(result) => {
                register.offload = Some(OffloadRef {
                    path: result.path.clone(),
                    original_token_count: result.original_token_count,
                });
                register.content = result.new_content;
                offloaded += 1;
                diagnostics.record(
                    DiagnosticKind::Event,
                    conversation_id.as_str(),
                    &format!(
                        "offloaded oversize register at position {} ({} tokens) to {}",
                        register.position,
                        result.original_token_count,
                        result.path.display()
                    ),
                );
            }
            Err(err) => {
                diagnostics.record(
                    DiagnosticKind::ConsistencyViolation,
                    conversation_id.as_str(),
                    &format!("failed to offload oversize register at position {}: {err}", register.position),
                );
            }
        }
    }
    offloaded
}
