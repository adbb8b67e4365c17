//! Core domain types for the Token Window Manager.
//!
//! This crate contains pure value types with no IO and no async — the
//! vocabulary shared by `twm-config` and `twm-context`.

mod ids;
mod proofs;
mod wire;

pub use ids::{ConversationId, RegisterId, RegisterPosition};
pub use proofs::{EmptyStringError, NonEmptyString};
pub use wire::{ClientMessage, InvalidRoleError, Role};
