//! `ConversationState` (§3): everything the Orchestrator tracks for one
//! `ConversationId` across turns, beyond the register sequence itself.

use twm_types::RegisterPosition;

use crate::register::RegisterStore;

/// Cache-accounting figures reported for the previous turn (§4.8).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub creation: u32,
    pub read: u32,
}

/// Per-conversation state, created lazily on first turn and torn down on
/// an explicit `reset` (§3 Lifecycle).
#[derive(Debug, Default)]
pub struct ConversationState {
    pub registers: RegisterStore,

    /// Original user text clobbered by a JIT injection, awaiting either a
    /// successful recache or an MCP tool-result swap to restore it.
    pub preserved_user: Option<String>,

    /// 1-based position of the last user register as of the previous
    /// turn's return. Zero means "no turn has completed yet."
    pub cache_breakpoint: u32,

    pub last_cache_stats: CacheStats,

    pub error_streak: u32,
    pub error_stack: Vec<String>,
    pub current_mcp_error: Option<String>,

    pub jit_active: bool,
    pub jit_injection_index: Option<RegisterPosition>,

    /// Optional secondary cacheable system prompt, emitted as a second
    /// system block alongside the primary one (§4.9 step 13). Not derived
    /// from any turn input — an embedding host sets it explicitly through
    /// [`Self::set_system2_content`], e.g. to pin a tool catalog that should
    /// cache independently of the primary prompt's edit cadence.
    system2_content: Option<String>,
}

impl ConversationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all state as if the conversation had never received input.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn system2_content(&self) -> Option<&str> {
        self.system2_content.as_deref()
    }

    /// Sets (or clears, via `None`) the secondary system prompt block.
    pub fn set_system2_content(&mut self, content: Option<String>) {
        self.system2_content = content;
    }
}

#[cfg(test)]
mod tests {
    use super::ConversationState;

    #[test]
    fn new_state_has_zero_breakpoint_and_no_preserved_user() {
        let state = ConversationState::new();
        assert_eq!(state.cache_breakpoint, 0);
        assert!(state.preserved_user.is_none());
        assert_eq!(state.error_streak, 0);
    }

    #[test]
    fn reset_restores_fresh_state() {
        let mut state = ConversationState::new();
        state.cache_breakpoint = 5;
        state.error_streak = 3;
        state.preserved_user = Some("clobbered".to_string());
        state.reset();
        assert_eq!(state.cache_breakpoint, 0);
        assert_eq!(state.error_streak, 0);
        assert!(state.preserved_user.is_none());
    }

    #[test]
    fn system2_content_round_trips_through_setter() {
        let mut state = ConversationState::new();
        assert!(state.system2_content().is_none());
        state.set_system2_content(Some("catalog".to_string()));
        assert_eq!(state.system2_content(), Some("catalog"));
        state.set_system2_content(None);
        assert!(state.system2_content().is_none());
    }
}
