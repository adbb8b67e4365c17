//! Register store, command pipeline, reconstruction, and cache accounting
//! for the Token Window Manager.
//!
//! # Architecture
//!
//! ```text
//! ContextManager (one per process)
//! └── per ConversationId: ConversationState
//!     ├── registers: RegisterStore      (append-only message log)
//!     ├── preserved_user / error_stack   (recache bookkeeping)
//!     └── jit_active / jit_injection_index
//!
//! process_request pipeline:
//!   MCP swap -> command detect+neuralyze -> append -> validate -> reconstruct
//!   -> cache accounting -> oversize offload -> JIT inject/truncate -> render
//! ```

mod cache_accountant;
mod command_parser;
mod jit;
mod manager;
mod message;
mod neuralyzer;
mod oversize;
mod reconstructor;
mod register;
mod state;
mod token_counter;
mod validator;

pub use command_parser::{DetectedCommand, ParseOutcome, ParsedPosition, detect_command, parse_position_list};
pub use manager::{
    ContextManager, ProcessResult, RegisterSnapshot, RenderedMessage, SystemPromptBlock,
    WindowStateSnapshot,
};
pub use message::OutboundMessage;
pub use neuralyzer::{scrub, scrub_vocabulary};
pub use oversize::{exceeds_threshold, offload};
pub use reconstructor::{DEFAULT_PLACEHOLDER_TEMPLATE, PLACEHOLDER_FALLBACK, looks_like_placeholder, reconstruct};
pub use register::{OffloadRef, Register, RegisterRole, RegisterStore, strip_context_window_usage};
pub use state::{CacheStats, ConversationState};
pub use token_counter::{MESSAGE_OVERHEAD, TiktokenCounter, TokenCounter};
pub use validator::{Selection, validate};
