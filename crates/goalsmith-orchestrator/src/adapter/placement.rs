//! Where agent instructions go in the outgoing message list.

use goalsmith_abstraction::{ChatMessage, MessageRole};

/// Instruction placement, chosen once from `supports_system_prompt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionPlacement {
    /// A leading system message.
    Dedicated,
    /// Prefixed to the first user message, separated by a blank line.
    FoldedIntoFirstUser,
}

impl InstructionPlacement {
    /// Placement for a model with or without a system slot.
    pub const fn for_capability(supports_system_prompt: bool) -> Self {
        if supports_system_prompt { Self::Dedicated } else { Self::FoldedIntoFirstUser }
    }

    /// Combines instructions and turns into the messages sent to the model.
    ///
    /// With `FoldedIntoFirstUser` the result never contains a system message.
    pub fn render(self, instructions: &str, turns: Vec<ChatMessage>) -> Vec<ChatMessage> {
        match self {
            Self::Dedicated => {
                let mut messages = Vec::with_capacity(turns.len() + 1);
                if !instructions.is_empty() {
                    messages.push(ChatMessage::system(instructions));
                }
                messages.extend(turns);
                messages
            }
            Self::FoldedIntoFirstUser => {
                let mut messages: Vec<ChatMessage> = turns
                    .into_iter()
                    .map(|turn| {
                        if turn.role == MessageRole::System { ChatMessage::user(turn.content) } else { turn }
                    })
                    .collect();
                if instructions.is_empty() {
                    return messages;
                }
                match messages.iter_mut().find(|m| m.role == MessageRole::User) {
                    Some(first) => first.content = format!("{instructions}\n\n{}", first.content),
                    None => messages.insert(0, ChatMessage::user(instructions)),
                }
                messages
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedicated_leads_with_system() {
        let messages = InstructionPlacement::Dedicated.render("Be brief.", vec![ChatMessage::user("Hi")]);
        assert_eq!(messages[0], ChatMessage::system("Be brief."));
        assert_eq!(messages[1], ChatMessage::user("Hi"));
    }

    #[test]
    fn test_folded_prefixes_first_user_turn() {
        let turns = vec![ChatMessage::user("Note text"), ChatMessage::assistant("ok"), ChatMessage::user("more")];
        let messages = InstructionPlacement::FoldedIntoFirstUser.render("Be brief.", turns);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "Be brief.\n\nNote text");
        assert_eq!(messages[2].content, "more");
        assert!(messages.iter().all(|m| m.role != MessageRole::System));
    }

    #[test]
    fn test_folded_without_user_turn_inserts_one() {
        let messages = InstructionPlacement::FoldedIntoFirstUser.render("Be brief.", Vec::new());
        assert_eq!(messages, vec![ChatMessage::user("Be brief.")]);
    }
}
