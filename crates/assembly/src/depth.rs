//! Depth assignment.
//!
//! Depth is a distance from the end of the conversation measured in
//! **anchors** — user/assistant turns that did not come from a relative
//! preset fragment. The most recent anchor has depth 1; anything after it
//! has depth 0; depth grows monotonically moving backward. With zero
//! anchors, every message has depth 0.
//!
//! Depth scopes both in-chat injection ("insert this 2 turns from the end")
//! and regex rule applicability ("only touch the last 4 turns").

use loreloom_core::message::{Message, Role, SourceKind};

/// Compute the depth of every message in the list.
pub fn assign_depths(messages: &[Message]) -> Vec<usize> {
    let anchors: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| {
            m.source.kind != SourceKind::PresetRelative
                && matches!(m.role, Role::User | Role::Assistant)
        })
        .map(|(i, _)| i)
        .collect();

    // anchors is ascending; depth(i) = count of anchors at index >= i.
    messages
        .iter()
        .enumerate()
        .map(|(i, _)| anchors.len() - anchors.partition_point(|&a| a < i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreloom_core::message::Source;

    fn history(role: Role, i: usize) -> Message {
        Message::history(role, format!("m{i}"), i)
    }

    #[test]
    fn last_anchor_has_depth_one() {
        let msgs = vec![
            history(Role::User, 0),
            history(Role::Assistant, 1),
            history(Role::User, 2),
        ];
        assert_eq!(assign_depths(&msgs), vec![3, 2, 1]);
    }

    #[test]
    fn message_after_last_anchor_has_depth_zero() {
        let mut msgs = vec![history(Role::User, 0), history(Role::Assistant, 1)];
        msgs.push(Message::new(
            Role::System,
            "note",
            Source::history(Role::System, 2),
        ));
        assert_eq!(assign_depths(&msgs), vec![2, 1, 0]);
    }

    #[test]
    fn depth_is_monotonically_non_increasing() {
        let msgs = vec![
            history(Role::User, 0),
            Message::new(Role::System, "sys", Source::history(Role::System, 1)),
            history(Role::Assistant, 2),
            history(Role::User, 3),
            history(Role::Assistant, 4),
        ];
        let depths = assign_depths(&msgs);
        for pair in depths.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert_eq!(*depths.last().unwrap(), 1);
    }

    #[test]
    fn relative_preset_messages_are_not_anchors() {
        let mut fields = serde_json::Map::new();
        fields.insert("id".into(), serde_json::Value::String("frame".into()));
        let msgs = vec![
            Message::new(
                Role::User,
                "framing",
                Source::preset(SourceKind::PresetRelative, fields),
            ),
            history(Role::User, 0),
        ];
        // Only the second message is an anchor.
        assert_eq!(assign_depths(&msgs), vec![1, 1]);
    }

    #[test]
    fn zero_anchors_means_all_depth_zero() {
        let msgs = vec![
            Message::new(Role::System, "a", Source::history(Role::System, 0)),
            Message::new(Role::Thinking, "b", Source::history(Role::Thinking, 1)),
        ];
        assert_eq!(assign_depths(&msgs), vec![0, 0]);
    }

    #[test]
    fn empty_history() {
        assert!(assign_depths(&[]).is_empty());
    }
}
