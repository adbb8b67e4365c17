//! Cache Accountant (§4.8): derives `cache_creation`/`cache_read` token
//! deltas from where the upstream provider's prefix-cache breakpoint sits.
//!
//! The breakpoint is the 1-based position of the final user register. It
//! can move backward across turns (a recache can drop tail registers), so
//! a naive "creation = new tail bytes" computation would understate
//! creation on the turn after that — the retained-prefix branch below
//! exists specifically to avoid that (§9 design note).

use twm_core::{DiagnosticKind, DiagnosticLog};
use twm_types::ConversationId;

use crate::register::{Register, RegisterRole};
use crate::state::CacheStats;
use crate::token_counter::TokenCounter;

fn sum_tokens(
    registers: &[&Register],
    range: std::ops::Range<usize>,
    counter: &dyn TokenCounter,
    model_family: &str,
) -> u32 {
    registers
        .get(range)
        .into_iter()
        .flatten()
        .map(|r| counter.count_message(r.role.as_wire_role().as_str(), &r.content, model_family))
        .sum()
}

/// Finds the 1-based position of the last `User` register, i.e. the new
/// cache breakpoint.
#[must_use]
pub fn new_breakpoint(registers: &[&Register]) -> u32 {
    registers
        .iter()
        .rev()
        .find(|r| r.role == RegisterRole::User)
        .map_or(0, |r| r.position.as_u32())
}

/// Computes this turn's cache stats. `retained_prefix_end` is `Some(R)`
/// when the turn applied a recache with a non-empty retained prefix
/// ending at position `R`; `None` otherwise (ordinary incremental turn, or
/// the first turn when `old_breakpoint == 0`).
#[must_use]
pub fn compute(
    registers: &[&Register],
    old_breakpoint: u32,
    retained_prefix_end: Option<u32>,
    counter: &dyn TokenCounter,
    model_family: &str,
    conversation_id: &ConversationId,
    diagnostics: &DiagnosticLog,
) -> CacheStats {
    let new_bp = new_breakpoint(registers);

    let (creation, read) = if old_breakpoint == 0 {
        (sum_tokens(registers, 0..new_bp as usize, counter, model_family), 0)
    } else if let Some(retained) = retained_prefix_end {
        (
            sum_tokens(registers, retained as usize..new_bp as usize, counter, model_family),
            sum_tokens(registers, 0..retained as usize, counter, model_family),
        )
    } else {
        (
            sum_tokens(registers, old_breakpoint as usize..new_bp as usize, counter, model_family),
            sum_tokens(registers, 0..old_breakpoint as usize, counter, model_family),
        )
    };

    if new_bp < old_breakpoint && retained_prefix_end.is_none() {
        diagnostics.record(
            DiagnosticKind::ConsistencyViolation,
            conversation_id.as_str(),
            &format!(
                "cache breakpoint moved backward from {old_breakpoint} to {new_bp} without a \
                 recorded retained-prefix recache"
            ),
        );
    }

    CacheStats { creation, read }
}

#[cfg(test)]
mod tests {
    use super::compute;
    use crate::register::{Register, RegisterRole};
    use crate::token_counter::TokenCounter;
    use twm_core::DiagnosticLog;
    use twm_types::{ConversationId, RegisterId, RegisterPosition};

    struct CharCounter;
    impl TokenCounter for CharCounter {
        fn count_tokens(&self, text: &str, _model_family: &str) -> u32 {
            u32::try_from(text.chars().count()).unwrap_or(u32::MAX)
        }
        fn count_message(&self, _role: &str, content: &str, model_family: &str) -> u32 {
            self.count_tokens(content, model_family)
        }
    }

    fn register(position: u32, role: RegisterRole, content: &str) -> Register {
        Register::new(RegisterId::new(u64::from(position)), RegisterPosition::new(position), role, content.to_string())
    }

    #[test]
    fn first_turn_all_creation_no_read() {
        let regs = vec![register(1, RegisterRole::User, "hi")];
        let refs: Vec<&Register> = regs.iter().collect();
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = DiagnosticLog::new(dir.path().join("twp.txt"));
        let conv = ConversationId::new("c1");
        let stats = compute(&refs, 0, None, &CharCounter, "gpt", &conv, &diagnostics);
        assert_eq!(stats.creation, 2);
        assert_eq!(stats.read, 0);
    }

    #[test]
    fn ordinary_incremental_turn_splits_at_old_breakpoint() {
        let regs = vec![
            register(1, RegisterRole::User, "hi"),
            register(2, RegisterRole::Assistant, "hello"),
            register(3, RegisterRole::User, "more"),
        ];
        let refs: Vec<&Register> = regs.iter().collect();
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = DiagnosticLog::new(dir.path().join("twp.txt"));
        let conv = ConversationId::new("c1");
        let stats = compute(&refs, 1, None, &CharCounter, "gpt", &conv, &diagnostics);
        assert_eq!(stats.read, 2);
        assert_eq!(stats.creation, "hello".len() as u32 + "more".len() as u32);
    }

    #[test]
    fn retained_prefix_recache_splits_at_retained_end() {
        let regs = vec![
            register(1, RegisterRole::User, "aa"),
            register(2, RegisterRole::Assistant, "bb"),
            register(3, RegisterRole::User, "cc"),
        ];
        let refs: Vec<&Register> = regs.iter().collect();
        let dir = tempfile::tempdir().unwrap();
        let diagnostics = DiagnosticLog::new(dir.path().join("twp.txt"));
        let conv = ConversationId::new("c1");
        let stats = compute(&refs, 5, Some(1), &CharCounter, "gpt", &conv, &diagnostics);
        assert_eq!(stats.read, 2);
        assert_eq!(stats.creation, 4);
    }
}
