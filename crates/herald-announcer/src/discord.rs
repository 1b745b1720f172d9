//! Discord REST notifier.
//!
//! Posts announcement text to a channel with the bot token. Only the REST
//! API is used: the announcer never needs gateway events, so "connecting"
//! means verifying the token against `/users/@me` once at startup.

use std::time::Duration;

use herald_core::config::DiscordConfig;
use herald_core::{DispatchError, Notifier};
use herald_types::ChannelId;
use serde::Deserialize;
use tracing::info;

use crate::error::AnnouncerError;

/// Per-request timeout for Discord API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Discord rejects message content longer than this many characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

/// The bot account behind the token.
#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    /// Snowflake id of the bot user.
    pub id: String,
    /// Account username.
    pub username: String,
}

/// A [`Notifier`] backed by the Discord REST API.
pub struct DiscordNotifier {
    client: reqwest::Client,
    api_base: String,
    authorization: String,
    bot: BotUser,
}

impl DiscordNotifier {
    /// Verify `token` against the API and return a ready notifier.
    ///
    /// # Errors
    ///
    /// Returns [`AnnouncerError::Http`] if the client cannot be built or the
    /// request fails, and [`AnnouncerError::Discord`] if the token is
    /// rejected or the response cannot be read.
    pub async fn connect(config: &DiscordConfig, token: &str) -> Result<Self, AnnouncerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(
                "DiscordBot (herald-announcer, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| AnnouncerError::Http {
                message: format!("failed to build Discord client: {e}"),
            })?;

        let api_base = config.api_base.trim_end_matches('/').to_owned();
        let authorization = format!("Bot {token}");

        let response = client
            .get(format!("{api_base}/users/@me"))
            .header("Authorization", &authorization)
            .send()
            .await
            .map_err(|e| AnnouncerError::Http {
                message: format!("Discord login request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(AnnouncerError::Discord {
                message: format!("token rejected ({status}): {body}"),
            });
        }

        let bot: BotUser = response.json().await.map_err(|e| AnnouncerError::Discord {
            message: format!("unreadable /users/@me response: {e}"),
        })?;
        info!(bot_id = %bot.id, bot_username = %bot.username, "Discord connection established");

        Ok(Self {
            client,
            api_base,
            authorization,
            bot,
        })
    }

    /// The bot account the notifier posts as.
    pub const fn bot(&self) -> &BotUser {
        &self.bot
    }

    fn messages_url(&self, channel_id: &ChannelId) -> String {
        format!("{}/channels/{channel_id}/messages", self.api_base)
    }
}

impl Notifier for DiscordNotifier {
    async fn send(&self, channel_id: &ChannelId, text: &str) -> Result<(), DispatchError> {
        let body = serde_json::json!({ "content": clamp_content(text) });

        let response = self
            .client
            .post(self.messages_url(channel_id))
            .header("Authorization", &self.authorization)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport {
                message: format!("Discord request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(DispatchError::Rejected {
                channel_id: channel_id.clone(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Cut `text` to Discord's content limit, marking the cut with `…`.
fn clamp_content(text: &str) -> String {
    if text.chars().count() <= MAX_CONTENT_CHARS {
        return text.to_owned();
    }
    let mut clamped: String = text
        .chars()
        .take(MAX_CONTENT_CHARS.saturating_sub(1))
        .collect();
    clamped.push('…');
    clamped
}
