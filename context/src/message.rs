//! The outbound message shape: what the Orchestrator builds from the
//! register window and hands to the Oversize Handler and JIT Injector
//! before it becomes the final `{role, content}` list returned to the
//! caller (§4.9 steps 10-11).

use twm_types::{RegisterPosition, Role};

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub position: RegisterPosition,
    pub role: Role,
    pub content: String,
    pub placeholder: bool,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(position: RegisterPosition, role: Role, content: String, placeholder: bool) -> Self {
        Self {
            position,
            role,
            content,
            placeholder,
        }
    }
}
