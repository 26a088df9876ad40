use super::{ChatId, ChatTransport, IncomingMessage, MessageId};
use crate::config::TelegramConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

/// Extra time granted to a long-poll request beyond the server-side timeout
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram Bot API client
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
    /// Next update id to request
    offset: Mutex<i64>,
}

/// Envelope wrapping every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    from: Option<User>,
    text: Option<String>,
    reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

impl From<Message> for IncomingMessage {
    fn from(msg: Message) -> Self {
        Self {
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            from: msg
                .from
                .map(|user| user.username.unwrap_or_else(|| user.id.to_string())),
            text: msg.text,
            reply_to_message_id: msg.reply_to_message.map(|reply| reply.message_id),
        }
    }
}

impl TelegramClient {
    /// Create a new client without contacting the API
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.send_timeout_secs))
            .build()
            .map_err(|e| Error::Chat(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/bot{}",
                config.api_url.trim_end_matches('/'),
                config.token
            ),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            offset: Mutex::new(0),
        })
    }

    /// Create a client and verify the token by asking who we are
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        let client = Self::new(config)?;
        let me: User = client
            .call(client.client.get(client.method_url("getMe")))
            .await?;

        info!(
            "Telegram authorized on account {}",
            me.username.unwrap_or_else(|| me.id.to_string())
        );

        Ok(client)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Send a request and unwrap the API envelope
    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let resp = request
            .send()
            .await
            .map_err(|e| Error::Chat(format!("Request to Telegram failed: {}", e)))?;

        let status = resp.status();
        let envelope: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| Error::Chat(format!("Invalid Telegram response ({}): {}", status, e)))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(Error::Chat(format!(
                "Telegram API error ({}): {}",
                status,
                description.unwrap_or_else(|| "no description".to_string())
            ))
            .into()),
        }
    }

    async fn send_media(
        &self,
        method: &str,
        field: &str,
        part: Part,
        chat_id: ChatId,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field.to_string(), part);

        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        if let Some(reply_to) = reply_to {
            form = form.text("reply_to_message_id", reply_to.to_string());
        }

        let sent: Message = self
            .call(self.client.post(self.method_url(method)).multipart(form))
            .await?;

        Ok(sent.message_id)
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(reply_to) = reply_to {
            body["reply_to_message_id"] = reply_to.into();
        }

        let sent: Message = self
            .call(self.client.post(self.method_url("sendMessage")).json(&body))
            .await?;

        Ok(sent.message_id)
    }

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: Vec<u8>,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let part = Part::bytes(photo)
            .file_name("snapshot.jpg")
            .mime_str("image/jpeg")?;

        self.send_media("sendPhoto", "photo", part, chat_id, caption, reply_to)
            .await
    }

    async fn send_video(
        &self,
        chat_id: ChatId,
        video: Vec<u8>,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let part = Part::bytes(video)
            .file_name("clip.mp4")
            .mime_str("video/mp4")?;

        self.send_media("sendVideo", "video", part, chat_id, None, reply_to)
            .await
    }

    async fn next_updates(&self) -> Result<Vec<IncomingMessage>> {
        let mut offset = self.offset.lock().await;

        let request = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", (*offset).to_string()),
                ("timeout", self.poll_timeout.as_secs().to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .timeout(self.poll_timeout + POLL_GRACE);

        let updates: Vec<Update> = self.call(request).await?;
        debug!("Received {} updates", updates.len());

        if let Some(last) = updates.iter().map(|update| update.update_id).max() {
            *offset = last + 1;
        }

        Ok(updates
            .into_iter()
            .filter_map(|update| update.message)
            .map(IncomingMessage::from)
            .collect())
    }
}
