//! Small request-building conveniences.

use bchat::{ChatMode, ChatTurnRequest};
use bprovider::{Message, Role};

pub fn system_message(content: impl Into<String>) -> Message {
    Message::new(Role::System, content)
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message::new(Role::User, content)
}

pub fn assistant_message(content: impl Into<String>) -> Message {
    Message::new(Role::Assistant, content)
}

/// Turn request addressed to a session, with the mode given by its wire name.
pub fn turn(
    prompt: impl Into<String>,
    session_name: impl Into<String>,
    topic: impl Into<String>,
    mode: &str,
) -> ChatTurnRequest {
    ChatTurnRequest::new(prompt)
        .with_session_name(session_name)
        .with_topic(topic)
        .with_mode(ChatMode::parse(mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_helpers_assign_roles() {
        assert_eq!(system_message("s").role, Role::System);
        assert_eq!(user_message("u").role, Role::User);
        assert_eq!(assistant_message("a").role, Role::Assistant);
    }

    #[test]
    fn turn_helper_parses_the_mode() {
        let request = turn("How many vacation days?", "leave-plan", "HR", "think");
        assert_eq!(request.mode, ChatMode::Think);
        assert_eq!(request.session_name, "leave-plan");
        assert_eq!(request.topic, "HR");
    }
}
