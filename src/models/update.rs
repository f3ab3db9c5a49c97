//! Inbound events and the command vocabulary.

use regex::Regex;

/// An inbound event from the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    /// Monotonic event identifier
    pub id: i64,
    /// Conversation the event came from; replies go here
    pub chat_id: i64,
    /// Message text, if the event carried any
    pub text: Option<String>,
    /// Display name of the sender
    pub sender: Option<String>,
}

impl Update {
    /// The command this event carries, if any.
    pub fn command(&self) -> Option<Command> {
        self.text.as_deref().and_then(Command::parse)
    }
}

/// Recognized bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Welcome message followed by today's verdict
    Start,
    Today,
    Tomorrow,
    /// Cached status for the rest of the week
    Week,
    /// Today's verdict, bypassing the cache
    Refresh,
    Help,
    /// Free-text feedback forwarded to the admin
    Feedback(String),
}

impl Command {
    /// Parse a message like `/today` or `/feedback@menu_bot the soup had ham`.
    ///
    /// Returns `None` for plain text and unknown commands.
    pub fn parse(text: &str) -> Option<Self> {
        let pattern = Regex::new(r"(?s)^/([A-Za-z_]+)(?:@\S+)?(?:\s+(.*))?$").ok()?;
        let caps = pattern.captures(text.trim())?;
        let name = caps.get(1)?.as_str().to_lowercase();
        let args = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        match name.as_str() {
            "start" => Some(Command::Start),
            "today" => Some(Command::Today),
            "tomorrow" => Some(Command::Tomorrow),
            "week" => Some(Command::Week),
            "refresh" => Some(Command::Refresh),
            "help" => Some(Command::Help),
            "feedback" => Some(Command::Feedback(args)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /TODAY "), Some(Command::Today));
        assert_eq!(Command::parse("/tomorrow@kumoh_menu_bot"), Some(Command::Tomorrow));
        assert_eq!(Command::parse("/week"), Some(Command::Week));
        assert_eq!(Command::parse("/refresh"), Some(Command::Refresh));
        assert_eq!(Command::parse("/help"), Some(Command::Help));
    }

    #[test]
    fn feedback_keeps_multiline_argument() {
        assert_eq!(
            Command::parse("/feedback the curry\nhad pork"),
            Some(Command::Feedback("the curry\nhad pork".to_string()))
        );
        assert_eq!(
            Command::parse("/feedback"),
            Some(Command::Feedback(String::new()))
        );
    }

    #[test]
    fn ignores_plain_text_and_unknown_commands() {
        assert_eq!(Command::parse("what's for lunch?"), None);
        assert_eq!(Command::parse("/dance"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn update_without_text_has_no_command() {
        let update = Update {
            id: 7,
            chat_id: 1,
            text: None,
            sender: None,
        };
        assert_eq!(update.command(), None);
    }
}
