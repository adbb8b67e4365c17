//! The message shape a calling host sends across the public API boundary.
//!
//! `ClientMessage` is deliberately looser than the internal `Register`
//! model in `twm-context`: it is what arrives from outside, before the
//! Orchestrator has had a chance to validate and shape it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three roles a caller is permitted to send. Anything else is
/// rejected at the boundary (§6: "roles outside {system, user, assistant}
/// are rejected").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unsupported message role {0:?}; expected one of system, user, assistant")]
pub struct InvalidRoleError(pub String);

impl std::str::FromStr for Role {
    type Err = InvalidRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(InvalidRoleError(other.to_string())),
        }
    }
}

/// A single message as the client believes the conversation to contain,
/// prior to any TWM rewriting.
///
/// `source` is host-supplied metadata (e.g. `"api"`) used to select which
/// JIT prompt variant applies (§4.7); TWM never interprets it beyond that
/// one comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ClientMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn is_from_api(&self) -> bool {
        self.source.as_deref() == Some("api")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrips_through_serde() {
        for role in [Role::System, Role::User, Role::Assistant] {
            let json = serde_json::to_string(&role).unwrap();
            let back: Role = serde_json::from_str(&json).unwrap();
            assert_eq!(back, role);
        }
    }

    #[test]
    fn role_from_str_rejects_unknown() {
        assert!("tool".parse::<Role>().is_err());
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
    }

    #[test]
    fn is_from_api_checks_source() {
        let msg = ClientMessage::new(Role::User, "hi").with_source("api");
        assert!(msg.is_from_api());
        let msg = ClientMessage::new(Role::User, "hi");
        assert!(!msg.is_from_api());
    }
}
