//! Configuration loading for the Token Window Manager.
//!
//! Loads `data/config/token-window.json` into a typed [`TokenWindowConfig`]
//! at process start, and serves the two JIT prompt files (`twp.txt`,
//! `twp_bak.txt`) through an mtime-invalidated [`PromptCache`] so edits take
//! effect on the next turn.

mod loader;
mod prompt_cache;
mod schema;

pub use loader::load_config;
pub use prompt_cache::PromptCache;
pub use schema::{
    AssistantCleaningRule, JitInstructionConfig, OversizedMessageHandlingConfig,
    PlaceholderMessagesConfig, TokenWindowConfig, UserMessageTruncationConfig,
    WindowUsagePatternConfig, DEFAULT_MAX_WINDOW_SIZE,
};
