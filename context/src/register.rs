//! Register Store (§4.1): the append-only per-conversation log of message
//! registers.
//!
//! A register's `id` is a [`RegisterId`] — stable, monotonic, never reused —
//! while its `position` is a [`RegisterPosition`] that is densely
//! renumbered every time the Reconstructor produces a fresh window (§3
//! Lifecycle: "ids do not need to survive rebuilds — only the next unused
//! id counter... must never reuse a position within a single unbroken
//! register sequence").

use std::sync::LazyLock;

use regex::Regex;
use twm_types::{ClientMessage, RegisterId, RegisterPosition, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRole {
    User,
    Assistant,
}

impl RegisterRole {
    #[must_use]
    pub const fn as_wire_role(self) -> Role {
        match self {
            Self::User => Role::User,
            Self::Assistant => Role::Assistant,
        }
    }
}

/// A pointer to an oversize register's original content, offloaded to disk
/// by the Oversize Handler (§4.6).
#[derive(Debug, Clone)]
pub struct OffloadRef {
    pub path: std::path::PathBuf,
    pub original_token_count: u32,
}

/// A single turn-sized unit tracked by the Manager (§3).
#[derive(Debug, Clone)]
pub struct Register {
    pub id: RegisterId,
    pub position: RegisterPosition,
    pub role: RegisterRole,
    pub content: String,
    pub in_window: bool,
    pub placeholder: bool,
    pub offload: Option<OffloadRef>,
    pub origin_position: Option<RegisterPosition>,
}

impl Register {
    #[must_use]
    pub fn new(id: RegisterId, position: RegisterPosition, role: RegisterRole, content: String) -> Self {
        Self {
            id,
            position,
            role,
            content,
            in_window: true,
            placeholder: false,
            offload: None,
            origin_position: None,
        }
    }
}

/// The context-window-usage stripping patterns applied to every inbound
/// message (§6), so the model's own prior rendering of its usage
/// percentage never breaks prefix caching.
static STRIP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?m)^# Context Window Usage\n[^\n]*\n*").unwrap(),
        Regex::new(r"(?i)\d+\s*/\s*\d+K?\s*tokens\s*used\s*\(\d+%\)\s*\n*").unwrap(),
        Regex::new(r"(?m)^# Context Window Usage\s*\n*").unwrap(),
        Regex::new(r"(?im)^.*tokens used.*$\n?").unwrap(),
        Regex::new(r"(?m)^.*\(\d+%\).*$\n?").unwrap(),
    ]
});

static TRIPLE_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strips the "Context Window Usage" section and any stray usage-percentage
/// lines from inbound text, then collapses the resulting run of blank
/// lines to at most two.
#[must_use]
pub fn strip_context_window_usage(text: &str) -> String {
    let mut result = text.to_string();
    for pattern in STRIP_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").into_owned();
    }
    TRIPLE_BLANK_LINES.replace_all(&result, "\n\n").into_owned()
}

/// Append-only log of registers for one conversation (§4.1).
#[derive(Debug, Default)]
pub struct RegisterStore {
    registers: Vec<Register>,
    next_id: u64,
}

impl RegisterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> RegisterId {
        let id = RegisterId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Allocates a fresh id for a register built outside the store (e.g. by
    /// the Window Reconstructor), without appending it.
    pub fn next_register_id(&mut self) -> RegisterId {
        self.allocate_id()
    }

    /// Appends the client's new messages as registers. Drops system-role
    /// entries (system content lives outside the register stream, §3) and
    /// strips the context-window-usage section from each message before
    /// storing it. Does not deduplicate against existing registers — that
    /// is the Orchestrator's responsibility via `replace_all`.
    pub fn append_from_client(&mut self, messages: &[ClientMessage]) -> Vec<RegisterId> {
        let mut appended = Vec::new();
        for message in messages {
            let role = match message.role {
                Role::System => continue,
                Role::User => RegisterRole::User,
                Role::Assistant => RegisterRole::Assistant,
            };

            let content = strip_context_window_usage(&message.content);
            let id = self.allocate_id();
            let position = RegisterPosition::new(u32::try_from(self.registers.len() + 1).unwrap_or(u32::MAX));
            self.registers.push(Register::new(id, position, role, content));
            appended.push(id);
        }
        appended
    }

    /// Registers currently in the visible window, in position order.
    #[must_use]
    pub fn get_in_window(&self) -> Vec<&Register> {
        self.registers.iter().filter(|r| r.in_window).collect()
    }

    /// Mutable access to in-window registers, for the Oversize Handler to
    /// record offloads directly on the store (§4.6: "Record `offload` on
    /// the register").
    pub fn get_in_window_mut(&mut self) -> impl Iterator<Item = &mut Register> {
        self.registers.iter_mut().filter(|r| r.in_window)
    }

    #[must_use]
    pub fn get(&self, position: RegisterPosition) -> Option<&Register> {
        self.registers
            .iter()
            .find(|r| r.in_window && r.position == position)
    }

    /// The most recent in-window register of the given role, mutably.
    /// Used by the Orchestrator to write a synthetic tool-result error into
    /// the latest user register (§4.3) without a full reconstruction pass.
    pub fn last_in_window_mut(&mut self, role: RegisterRole) -> Option<&mut Register> {
        self.registers
            .iter_mut()
            .filter(|r| r.in_window && r.role == role)
            .next_back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.get_in_window().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the entire window with a freshly reconstructed, densely
    /// renumbered sequence. The previous sequence is discarded in full
    /// (§3 Lifecycle) — only the id counter survives.
    pub fn replace_all(&mut self, registers: Vec<Register>) {
        self.registers = registers;
    }

    /// Drops all state, as if the conversation had never received input.
    pub fn reset(&mut self) {
        self.registers.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{RegisterRole, RegisterStore, strip_context_window_usage};
    use twm_types::{ClientMessage, Role};

    #[test]
    fn append_from_client_drops_system_messages() {
        let mut store = RegisterStore::new();
        let appended = store.append_from_client(&[
            ClientMessage::new(Role::System, "be nice"),
            ClientMessage::new(Role::User, "hi"),
        ]);
        assert_eq!(appended.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_from_client_assigns_dense_positions() {
        let mut store = RegisterStore::new();
        store.append_from_client(&[
            ClientMessage::new(Role::User, "hi"),
            ClientMessage::new(Role::Assistant, "hello"),
        ]);
        let window = store.get_in_window();
        assert_eq!(window[0].position.as_u32(), 1);
        assert_eq!(window[1].position.as_u32(), 2);
        assert_eq!(window[1].role, RegisterRole::Assistant);
    }

    #[test]
    fn append_from_client_strips_usage_section() {
        let mut store = RegisterStore::new();
        store.append_from_client(&[ClientMessage::new(
            Role::User,
            "hello\n# Context Window Usage\n5000/10000 tokens used (50%)\nworld",
        )]);
        let window = store.get_in_window();
        assert!(!window[0].content.contains("tokens used"));
        assert!(window[0].content.contains("hello"));
        assert!(window[0].content.contains("world"));
    }

    #[test]
    fn strip_context_window_usage_collapses_blank_lines() {
        let stripped = strip_context_window_usage("a\n\n\n\n\nb");
        assert!(!stripped.contains("\n\n\n"));
    }

    #[test]
    fn reset_clears_registers_and_id_counter() {
        let mut store = RegisterStore::new();
        store.append_from_client(&[ClientMessage::new(Role::User, "hi")]);
        store.reset();
        assert!(store.is_empty());
        let ids = store.append_from_client(&[ClientMessage::new(Role::User, "hi again")]);
        assert_eq!(ids[0].as_u64(), 0);
    }

    #[test]
    fn last_in_window_mut_finds_most_recent_role() {
        let mut store = RegisterStore::new();
        store.append_from_client(&[
            ClientMessage::new(Role::User, "u1"),
            ClientMessage::new(Role::Assistant, "a1"),
            ClientMessage::new(Role::User, "u2"),
        ]);
        let reg = store.last_in_window_mut(RegisterRole::User).unwrap();
        assert_eq!(reg.content, "u2");
        reg.content = "rewritten".to_string();
        assert_eq!(store.get_in_window()[2].content, "rewritten");
    }

    #[test]
    fn replace_all_discards_previous_sequence() {
        let mut store = RegisterStore::new();
        store.append_from_client(&[ClientMessage::new(Role::User, "one")]);
        store.append_from_client(&[ClientMessage::new(Role::User, "two")]);
        assert_eq!(store.len(), 2);
        store.replace_all(Vec::new());
        assert!(store.is_empty());
    }
}
