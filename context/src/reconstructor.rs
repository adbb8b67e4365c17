//! Window Reconstructor (§4.5): builds a fresh, densely numbered register
//! sequence from a list of selections plus a cleaned assistant tail and an
//! anchoring user message.
//!
//! The four invariants it targets (§3): non-empty, odd length, user-first
//! and user-last, and no two consecutive placeholders. Rule 4 (no adjacent
//! placeholders) always wins over strict alternation and over the odd-length
//! target — see the design note in §9 this mirrors.

use twm_core::{DiagnosticKind, DiagnosticLog};
use twm_types::{ConversationId, RegisterId, RegisterPosition};

use crate::register::{Register, RegisterRole};
use crate::validator::Selection;

/// The literal placeholder fallback recognized by future validations when a
/// custom template isn't configured, per §4.5.
pub const PLACEHOLDER_FALLBACK: &str = "DISTILLED";

/// Default placeholder template, substituting `{position}`.
pub const DEFAULT_PLACEHOLDER_TEMPLATE: &str = "Message {position}";

fn render_placeholder(template: &str, position: u32) -> String {
    template.replace("{position}", &position.to_string())
}

/// Produces the content matching a register's eventual (post-renumber)
/// placeholder template. Renumbering happens after the whole sequence is
/// built, so placeholder content here is a provisional marker; the final
/// pass in [`reconstruct`] rewrites it with the true final position.
fn is_placeholder_content(content: &str, template: &str) -> bool {
    content == PLACEHOLDER_FALLBACK || {
        let prefix = template.split("{position}").next().unwrap_or(template);
        !prefix.is_empty() && content.starts_with(prefix)
    }
}

struct Working {
    role: RegisterRole,
    content: String,
    is_placeholder: bool,
    id: Option<RegisterId>,
    origin_position: Option<RegisterPosition>,
}

/// Rebuilds the register sequence. `next_id` allocates ids for freshly
/// synthesized placeholder and tail/anchor registers; selections carry
/// their content forward but are given fresh ids too, since ids do not
/// need to survive rebuilds (§3 Lifecycle).
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn reconstruct(
    selections: &[Selection],
    cleaned_assistant_tail: &str,
    anchoring_user: &str,
    placeholder_template: &str,
    mut next_id: impl FnMut() -> RegisterId,
    conversation_id: &ConversationId,
    diagnostics: &DiagnosticLog,
) -> Vec<Register> {
    let mut working: Vec<Working> = Vec::new();

    for selection in selections {
        let expected_role = if working.len() % 2 == 0 {
            RegisterRole::User
        } else {
            RegisterRole::Assistant
        };

        if selection.role == expected_role {
            working.push(Working {
                role: selection.role,
                content: selection.content.clone(),
                is_placeholder: selection.is_placeholder,
                id: None,
                origin_position: Some(selection.position),
            });
        } else if working.last().is_some_and(|w| w.is_placeholder) {
            working.push(Working {
                role: selection.role,
                content: selection.content.clone(),
                is_placeholder: selection.is_placeholder,
                id: None,
                origin_position: Some(selection.position),
            });
        } else {
            working.push(Working {
                role: expected_role,
                content: render_placeholder(placeholder_template, 0),
                is_placeholder: true,
                id: None,
                origin_position: None,
            });
            working.push(Working {
                role: selection.role,
                content: selection.content.clone(),
                is_placeholder: selection.is_placeholder,
                id: None,
                origin_position: Some(selection.position),
            });
        }
    }

    working.push(Working {
        role: RegisterRole::Assistant,
        content: cleaned_assistant_tail.to_string(),
        is_placeholder: false,
        id: None,
        origin_position: None,
    });

    working.push(Working {
        role: RegisterRole::User,
        content: anchoring_user.to_string(),
        is_placeholder: false,
        id: None,
        origin_position: None,
    });

    if working.len() % 2 == 0 && !working.last().is_some_and(|w| w.is_placeholder) {
        working.push(Working {
            role: RegisterRole::User,
            content: render_placeholder(placeholder_template, 0),
            is_placeholder: true,
            id: None,
            origin_position: None,
        });
    }

    let mut registers: Vec<Register> = Vec::with_capacity(working.len());
    for (index, item) in working.into_iter().enumerate() {
        let position = RegisterPosition::new(u32::try_from(index + 1).unwrap_or(u32::MAX));
        let content = if item.is_placeholder {
            render_placeholder(placeholder_template, position.as_u32())
        } else {
            item.content
        };
        let id = item.id.unwrap_or_else(&mut next_id);
        let mut register = Register::new(id, position, item.role, content);
        register.placeholder = item.is_placeholder;
        register.origin_position = item.origin_position;
        registers.push(register);
    }

    for pair in registers.windows(2) {
        if pair[0].placeholder && pair[1].placeholder {
            diagnostics.record(
                DiagnosticKind::ConsistencyViolation,
                conversation_id.as_str(),
                &format!(
                    "consecutive placeholders at positions {} and {}",
                    pair[0].position, pair[1].position
                ),
            );
        }
    }

    if registers.len() % 2 == 0 {
        diagnostics.record(
            DiagnosticKind::ConsistencyViolation,
            conversation_id.as_str(),
            &format!("reconstructed sequence has even length {}", registers.len()),
        );
    }

    registers
}

/// True iff `content` would be classified as a placeholder register by a
/// future validation pass, given the currently configured template.
#[must_use]
pub fn looks_like_placeholder(content: &str, template: &str) -> bool {
    is_placeholder_content(content, template)
}
