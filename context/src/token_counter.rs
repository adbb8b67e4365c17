//! Token counting.
//!
//! §1 names `count_tokens(text, model_family) -> u32` an external
//! collaborator, so it is expressed here as a trait rather than a hard
//! dependency on one tokenizer. [`TiktokenCounter`] is the default
//! implementation the workspace ships so it is runnable out of the box; a
//! host embedding TWM with access to a provider's native token-counting
//! endpoint can supply its own `TokenCounter` instead.

use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, o200k_base};

/// Per-message overhead added on top of raw content tokens, approximating
/// role markers and message-structure delimiters.
pub const MESSAGE_OVERHEAD: u32 = 4;

/// Counts tokens for a piece of text, optionally informed by a model
/// family string (e.g. `"claude"`, `"gpt"`, `"gemini"`). Implementations
/// that only have one tokenizer available are free to ignore the hint.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str, model_family: &str) -> u32;

    /// Convenience wrapper adding the fixed per-message overhead (§4.9's
    /// total-token accounting always counts messages, never bare strings,
    /// except for the system prompt itself).
    fn count_message(&self, role: &str, content: &str, model_family: &str) -> u32 {
        self.count_tokens(content, model_family) + self.count_tokens(role, model_family) + MESSAGE_OVERHEAD
    }
}

static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn get_encoder() -> Option<&'static CoreBPE> {
    ENCODER.get_or_init(|| o200k_base().ok()).as_ref()
}

/// Thread-safe approximate token counter using tiktoken's `o200k_base`
/// encoding as a single approximation across model families.
///
/// Falls back to a byte-length estimate if the encoder fails to
/// initialize, logging the failure once.
#[derive(Clone, Copy)]
pub struct TiktokenCounter {
    encoder: Option<&'static CoreBPE>,
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoder", &self.encoder.as_ref().map(|_| "<CoreBPE>"))
            .finish()
    }
}

impl TiktokenCounter {
    #[must_use]
    pub fn new() -> Self {
        let encoder = get_encoder();
        if encoder.is_none() {
            tracing::error!(
                "Failed to initialize tiktoken o200k_base encoder. Falling back to byte-length estimates."
            );
        }
        Self { encoder }
    }
}

impl Default for TiktokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str, _model_family: &str) -> u32 {
        let len = match self.encoder {
            Some(encoder) => encoder.encode_ordinary(text).len(),
            None => text.len(),
        };
        u32::try_from(len).unwrap_or(u32::MAX)
    }
}
