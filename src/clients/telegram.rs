// Telegram channel listener

use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::{BotError, BotResult};

/// Text delivered from the configured channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: String,
}

/// Forwards posts from one chat onto an mpsc channel. Everything else is
/// dropped here, so the engine only ever sees the trusted source.
pub struct TelegramListener {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramListener {
    /// Connect and resolve the configured channel to a chat id
    pub async fn connect(config: &ChannelConfig) -> BotResult<Self> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BotError::ChannelConfig("bot_token is not set".to_string()))?;
        let channel = config
            .channel_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| BotError::ChannelConfig("channel_id is not set".to_string()))?;

        let bot = Bot::new(token);
        let chat_id = match parse_chat_id(channel) {
            Some(id) => id,
            None => {
                let username = if channel.starts_with('@') {
                    channel.to_string()
                } else {
                    format!("@{}", channel)
                };
                bot.get_chat(Recipient::ChannelUsername(username.clone()))
                    .await
                    .map_err(|e| BotError::ChannelConnection(format!("resolve {}: {}", username, e)))?
                    .id
            }
        };

        info!("✅ Telegram connected, listening to chat {}", chat_id);
        Ok(Self { bot, chat_id })
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    /// Dispatch updates until the process stops
    pub async fn run(self, tx: mpsc::Sender<InboundMessage>) {
        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(forward))
            .branch(Update::filter_channel_post().endpoint(forward));

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![self.chat_id, tx])
            .default_handler(|_| async {})
            .build()
            .dispatch()
            .await;

        warn!("📴 Telegram listener stopped");
    }
}

async fn forward(
    msg: Message,
    target: ChatId,
    tx: mpsc::Sender<InboundMessage>,
) -> ResponseResult<()> {
    if msg.chat.id != target {
        debug!("Ignoring message from chat {}", msg.chat.id);
        return Ok(());
    }
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };

    let preview: String = text.chars().take(100).collect();
    info!("📩 New message received: {}", preview);

    if tx
        .send(InboundMessage {
            chat_id: msg.chat.id.0,
            text: text.to_string(),
        })
        .await
        .is_err()
    {
        warn!("📪 Inbound channel closed, message dropped");
    }
    Ok(())
}

/// Numeric chat ids such as `-1001234567890`
pub fn parse_chat_id(channel: &str) -> Option<ChatId> {
    channel.trim().parse::<i64>().ok().map(ChatId)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_id() {
        assert_eq!(parse_chat_id("-1001234567890"), Some(ChatId(-1001234567890)));
        assert_eq!(parse_chat_id("@annasignals"), None);
    }

    #[tokio::test]
    async fn test_connect_requires_token() {
        let config = ChannelConfig {
            bot_token: None,
            channel_id: Some("-100".into()),
        };
        let err = TelegramListener::connect(&config).await.err().unwrap();
        assert!(matches!(err, BotError::ChannelConfig(_)));
    }

    #[tokio::test]
    async fn test_connect_with_numeric_id_skips_lookup() {
        let config = ChannelConfig {
            bot_token: Some("123:abc".into()),
            channel_id: Some("-1001".into()),
        };
        let listener = TelegramListener::connect(&config).await.unwrap();
        assert_eq!(listener.chat_id(), ChatId(-1001));
    }
}
