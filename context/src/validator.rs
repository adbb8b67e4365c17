//! Validator (§4.3): checks a parsed position list against the current
//! register window before any command is applied.
//!
//! Runs after new client messages have already been appended to the store,
//! so it sees exactly the register count the model itself will see.

use twm_core::errors::RecacheError;
use twm_types::RegisterPosition;

use crate::command_parser::ParsedPosition;
use crate::register::RegisterStore;

/// One validated selection, carrying everything the Reconstructor needs
/// without re-querying the store.
#[derive(Debug, Clone)]
pub struct Selection {
    pub position: RegisterPosition,
    pub content: String,
    pub role: crate::register::RegisterRole,
    pub is_placeholder: bool,
}

const SAMPLE_SIZE: usize = 10;
const PREVIEW_CHARS: usize = 30;

/// Validates `positions` against `store`'s current in-window registers.
///
/// # Errors
/// Returns [`RecacheError::InvalidPositions`] if any position falls outside
/// `1..=len`, or [`RecacheError::PlaceholderSelected`] if an individually
/// selected (non-range) position names a placeholder register.
pub fn validate(
    positions: &[ParsedPosition],
    store: &RegisterStore,
) -> Result<Vec<Selection>, RecacheError> {
    let window = store.get_in_window();
    let len = u32::try_from(window.len()).unwrap_or(u32::MAX);

    let out_of_range: Vec<u32> = positions
        .iter()
        .map(|p| p.position)
        .filter(|&p| p < 1 || p > len)
        .collect();
    if !out_of_range.is_empty() {
        let sample: Vec<String> = window
            .iter()
            .take(SAMPLE_SIZE)
            .map(|r| {
                let preview: String = r.content.chars().take(PREVIEW_CHARS).collect();
                format!("{:?} {:?} {preview:?}", r.id, r.role)
            })
            .collect();
        return Err(RecacheError::InvalidPositions {
            requested: out_of_range,
            valid_range: 1..=len.max(1),
            sample,
        });
    }

    let placeholder_positions: Vec<u32> = positions
        .iter()
        .filter(|p| !p.from_range)
        .filter_map(|p| {
            let register = window
                .iter()
                .find(|r| r.position.as_u32() == p.position)?;
            register.placeholder.then_some(p.position)
        })
        .collect();

    if !placeholder_positions.is_empty() {
        let alternatives: Vec<u32> = window
            .iter()
            .filter(|r| !r.placeholder)
            .map(|r| r.position.as_u32())
            .collect();
        return Err(RecacheError::PlaceholderSelected {
            positions: placeholder_positions,
            alternatives,
        });
    }

    Ok(positions
        .iter()
        .filter_map(|p| {
            window
                .iter()
                .find(|r| r.position.as_u32() == p.position)
                .map(|r| Selection {
                    position: r.position,
                    content: r.content.clone(),
                    role: r.role,
                    is_placeholder: r.placeholder,
                })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::validate;
    use crate::command_parser::ParsedPosition;
    use crate::register::RegisterStore;
    use twm_core::errors::RecacheError;
    use twm_types::{ClientMessage, Role};

    fn filled_store(n: usize) -> RegisterStore {
        let mut store = RegisterStore::new();
        let mut messages = Vec::new();
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            messages.push(ClientMessage::new(role, format!("msg {i}")));
        }
        store.append_from_client(&messages);
        store
    }

    fn pos(position: u32, from_range: bool) -> ParsedPosition {
        ParsedPosition { position, from_range }
    }

    #[test]
    fn rejects_out_of_range_positions() {
        let store = filled_store(5);
        let err = validate(&[pos(1, false), pos(25, false)], &store).unwrap_err();
        match err {
            RecacheError::InvalidPositions { requested, valid_range, sample } => {
                assert_eq!(requested, vec![25]);
                assert_eq!(valid_range, 1..=5);
                assert_eq!(sample.len(), 5);
                assert!(sample[0].contains("msg 0"));
            }
            other => panic!("expected InvalidPositions, got {other:?}"),
        }
    }

    #[test]
    fn accepts_placeholder_inside_range_but_rejects_individual_selection() {
        let mut store = RegisterStore::new();
        let mut regs = store.get_in_window().into_iter().cloned().collect::<Vec<_>>();
        drop(regs);
        // Build a store with a placeholder at position 2 directly via replace_all.
        let id0 = store.next_register_id();
        let id1 = store.next_register_id();
        let id2 = store.next_register_id();
        regs = vec![
            crate::register::Register::new(id0, twm_types::RegisterPosition::new(1), crate::register::RegisterRole::User, "real one".into()),
            {
                let mut r = crate::register::Register::new(id1, twm_types::RegisterPosition::new(2), crate::register::RegisterRole::Assistant, "Message 2".into());
                r.placeholder = true;
                r
            },
            crate::register::Register::new(id2, twm_types::RegisterPosition::new(3), crate::register::RegisterRole::User, "real two".into()),
        ];
        store.replace_all(regs);

        // Inside a range: accepted.
        assert!(validate(&[pos(1, true), pos(2, true), pos(3, true)], &store).is_ok());

        // Individually selected: rejected.
        let err = validate(&[pos(2, false)], &store).unwrap_err();
        match err {
            RecacheError::PlaceholderSelected { positions, alternatives } => {
                assert_eq!(positions, vec![2]);
                assert_eq!(alternatives, vec![1, 3]);
            }
            other => panic!("expected PlaceholderSelected, got {other:?}"),
        }
    }

    #[test]
    fn valid_selection_preserves_content() {
        let store = filled_store(3);
        let selections = validate(&[pos(1, false), pos(3, false)], &store).unwrap();
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[0].content, "msg 0");
        assert_eq!(selections[1].content, "msg 2");
    }
}
