//! The typed shape of `data/config/token-window.json` (§6).
//!
//! `maxWindowSize` is the only top-level key with a documented default
//! (128000) and so is the only one allowed to be absent; the remaining four
//! top-level keys are required — their absence is a
//! [`ConfigurationError::MissingKey`](twm_core::ConfigurationError::MissingKey).

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_WINDOW_SIZE: u32 = 128_000;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenWindowConfig {
    #[serde(rename = "maxWindowSize", default = "default_max_window_size")]
    pub max_window_size: u32,
    #[serde(rename = "JITinstruction")]
    pub jit_instruction: JitInstructionConfig,
    #[serde(rename = "userMessageTruncation")]
    pub user_message_truncation: UserMessageTruncationConfig,
    #[serde(rename = "oversizedMessageHandling")]
    pub oversized_message_handling: OversizedMessageHandlingConfig,
    #[serde(rename = "placeholderMessages")]
    pub placeholder_messages: PlaceholderMessagesConfig,
}

const fn default_max_window_size() -> u32 {
    DEFAULT_MAX_WINDOW_SIZE
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JitInstructionConfig {
    /// Window-usage percentage (0-100) at which the JIT block is injected.
    pub threshold: f64,
    #[serde(rename = "promptFile")]
    pub prompt_file: String,
    #[serde(rename = "windowUsagePattern")]
    pub window_usage_pattern: WindowUsagePatternConfig,
    #[serde(rename = "assistantCleaning")]
    pub assistant_cleaning: Vec<AssistantCleaningRule>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WindowUsagePatternConfig {
    #[serde(rename = "detectionText")]
    pub detection_text: String,
    #[serde(rename = "searchRegex")]
    pub search_regex: String,
    #[serde(rename = "replaceTemplate")]
    pub replace_template: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AssistantCleaningRule {
    pub search: String,
    pub replace: String,
    #[serde(rename = "caseSensitive")]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserMessageTruncationConfig {
    pub enabled: bool,
    #[serde(rename = "tokenBuffer")]
    pub token_buffer: u32,
    #[serde(rename = "truncationIndicator")]
    pub truncation_indicator: String,
    #[serde(rename = "preserveFromStart")]
    pub preserve_from_start: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OversizedMessageHandlingConfig {
    pub enabled: bool,
    #[serde(rename = "thresholdPercent")]
    pub threshold_percent: f64,
    /// Tokens of preview text kept ahead of the stub before the offloaded
    /// content is elided (§4.6).
    #[serde(rename = "truncateToTokens")]
    pub truncate_to_tokens: u32,
    #[serde(rename = "tempDirectory")]
    pub temp_directory: String,
    /// Stub appended after the preview. `{path}` is substituted with the
    /// offload file's path.
    #[serde(rename = "instructionTemplate")]
    pub instruction_template: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlaceholderMessagesConfig {
    pub enabled: bool,
    pub template: String,
}

impl TokenWindowConfig {
    /// A configuration matching the documented defaults, useful for tests
    /// and for the CLI harness when no config file is supplied.
    #[must_use]
    pub fn with_documented_defaults() -> Self {
        Self {
            max_window_size: DEFAULT_MAX_WINDOW_SIZE,
            jit_instruction: JitInstructionConfig {
                threshold: 80.0,
                prompt_file: "data/config/prompts/twp.txt".to_string(),
                window_usage_pattern: WindowUsagePatternConfig {
                    detection_text: "tokens used".to_string(),
                    search_regex: r"\d+\s*/\s*\d+K?\s*tokens\s*used\s*\(\d+%\)".to_string(),
                    replace_template: "{percentage}% of context window used".to_string(),
                },
                assistant_cleaning: Vec::new(),
            },
            user_message_truncation: UserMessageTruncationConfig {
                enabled: false,
                token_buffer: 0,
                truncation_indicator: "... [truncated]".to_string(),
                preserve_from_start: true,
            },
            oversized_message_handling: OversizedMessageHandlingConfig {
                enabled: true,
                threshold_percent: 25.0,
                truncate_to_tokens: 100,
                temp_directory: "data/temp".to_string(),
                instruction_template: "[TRUNCATED - Full content saved to disk. Use grep, tail, \
                    head, wc, sed, awk or any other tool to access: {path} without crushing your \
                    window. Do not use read_file on it because I will only truncate it again. As \
                    a last resort read the large file in smaller chunks.]"
                    .to_string(),
            },
            placeholder_messages: PlaceholderMessagesConfig {
                enabled: true,
                template: "Message {position}".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TokenWindowConfig;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = TokenWindowConfig::with_documented_defaults();
        let json = serde_json::to_string(&config).unwrap();
        let back: TokenWindowConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn max_window_size_defaults_when_absent() {
        let json = serde_json::json!({
            "JITinstruction": {
                "threshold": 80.0,
                "promptFile": "data/config/prompts/twp.txt",
                "windowUsagePattern": {
                    "detectionText": "tokens used",
                    "searchRegex": "x",
                    "replaceTemplate": "y"
                },
                "assistantCleaning": []
            },
            "userMessageTruncation": {
                "enabled": false, "tokenBuffer": 0,
                "truncationIndicator": "...", "preserveFromStart": true
            },
            "oversizedMessageHandling": {
                "enabled": true, "thresholdPercent": 25.0, "truncateToTokens": 0,
                "tempDirectory": "data/temp", "instructionTemplate": "offloaded"
            },
            "placeholderMessages": { "enabled": true, "template": "Message {position}" }
        });
        let config: TokenWindowConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.max_window_size, super::DEFAULT_MAX_WINDOW_SIZE);
    }
}
