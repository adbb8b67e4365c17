//! Loads and validates `data/config/token-window.json` (§6, §7).
//!
//! Required top-level keys are checked explicitly before the typed
//! deserialization runs, so a missing key is reported as
//! [`ConfigurationError::MissingKey`] rather than the less actionable serde
//! "missing field" message — matching the teacher's pattern of validating
//! shape before trusting derive-generated errors (`FullHistorySerde`).

use std::path::Path;

use serde_json::Value;
use twm_core::ConfigurationError;

use crate::schema::TokenWindowConfig;

const REQUIRED_TOP_LEVEL_KEYS: &[&str] = &[
    "JITinstruction",
    "userMessageTruncation",
    "oversizedMessageHandling",
    "placeholderMessages",
];

/// Reads and validates the config file at `path`. Any failure here is
/// fatal per §7: the caller should abort startup rather than continue with
/// a degraded configuration.
pub fn load_config(path: &Path) -> Result<TokenWindowConfig, ConfigurationError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;

    let value: Value =
        serde_json::from_str(&raw).map_err(|source| ConfigurationError::Malformed {
            path: path.display().to_string(),
            source,
        })?;

    for key in REQUIRED_TOP_LEVEL_KEYS {
        if value.get(key).is_none() {
            return Err(ConfigurationError::MissingKey {
                path: path.display().to_string(),
                key: (*key).to_string(),
            });
        }
    }

    serde_json::from_value(value).map_err(|source| ConfigurationError::Malformed {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::load_config;
    use twm_core::ConfigurationError;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigurationError::Unreadable { .. }));
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "token-window.json", "{not json");
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigurationError::Malformed { .. }));
    }

    #[test]
    fn missing_required_key_is_reported_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "token-window.json", "{}");
        let err = load_config(&path).unwrap_err();
        match err {
            ConfigurationError::MissingKey { key, .. } => assert_eq!(key, "JITinstruction"),
            other => panic!("expected MissingKey, got {other:?}"),
        }
    }

    #[test]
    fn complete_config_loads_successfully() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "token-window.json",
            r#"{
                "maxWindowSize": 64000,
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
            }"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.max_window_size, 64000);
        assert!((config.jit_instruction.threshold - 80.0).abs() < f64::EPSILON);
    }
}
