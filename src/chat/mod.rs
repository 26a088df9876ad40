use anyhow::Result;
use async_trait::async_trait;

pub mod telegram;

pub use telegram::TelegramClient;

pub type ChatId = i64;
pub type MessageId = i64;

/// Bot commands understood by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Snapshot,
    Clip,
    Other(String),
}

impl Command {
    /// Parse `/name`, `/name@botname` or `/name args`
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let name = token.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or_default();
        if name.is_empty() {
            return None;
        }

        let command = match name.to_ascii_lowercase().as_str() {
            "snapshot" => Command::Snapshot,
            "clip" => Command::Clip,
            other => Command::Other(other.to_string()),
        };
        Some(command)
    }
}

/// A message received from the chat
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    /// Username (or numeric id) of the sender, for logging
    pub from: Option<String>,
    pub text: Option<String>,
    pub reply_to_message_id: Option<MessageId>,
}

impl IncomingMessage {
    pub fn is_command(&self) -> bool {
        self.command().is_some()
    }

    pub fn command(&self) -> Option<Command> {
        self.text.as_deref().and_then(Command::parse)
    }
}

/// Outbound and inbound chat operations
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message, returning its message id
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    /// Send a JPEG photo with an optional caption
    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Vec<u8>,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    /// Send an MP4 video
    async fn send_video(
        &self,
        chat_id: ChatId,
        video: Vec<u8>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    /// Wait for the next batch of incoming messages
    async fn next_updates(&self) -> Result<Vec<IncomingMessage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_arguments() {
        assert_eq!(Command::parse("/snapshot"), Some(Command::Snapshot));
        assert_eq!(Command::parse("/clip@frigate_bot"), Some(Command::Clip));
        assert_eq!(Command::parse("/CLIP now please"), Some(Command::Clip));
        assert_eq!(
            Command::parse("/help"),
            Some(Command::Other("help".to_string()))
        );
    }

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(Command::parse("snapshot"), None);
        assert_eq!(Command::parse("/"), None);
        assert_eq!(Command::parse(""), None);

        let msg = IncomingMessage {
            text: Some("hello /clip".to_string()),
            ..Default::default()
        };
        assert!(!msg.is_command());
    }
}
