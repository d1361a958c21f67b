use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{StockResult, StockStatus};
use crate::notifiers::{Change, Delivery, DeliveryError, Notification, Notifier};

const GUILD_TEXT_CHANNEL: u8 = 0;

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    position: i64,
}

/// Bot-token notifier speaking the Discord REST API.
pub struct DiscordNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl DiscordNotifier {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(DiscordNotifier {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        })
    }

    fn get_status_style(&self, result: &StockResult) -> (&'static str, u32, &'static str) {
        match result.status {
            StockStatus::InStock if result.available => {
                ("✅ Set is Now In Stock!", 0x00ff00, "is now available!")
            }
            StockStatus::OutOfStock => ("❌ Set is Out of Stock", 0xff0000, "is now out of stock."),
            StockStatus::PreOrder => (
                "⏰ Set Available for Pre-Order",
                0xffaa00,
                "is now available for pre-order!",
            ),
            _ => ("📦 Stock Status Changed", 0x0099ff, "status changed."),
        }
    }

    fn get_button_emoji(&self, button: &str) -> &'static str {
        let lower = button.to_lowercase();
        if lower.contains("pre-order") || lower.contains("preorder") {
            "⏰"
        } else if lower.contains("add to bag") || lower.contains("add to cart") {
            "🛒"
        } else if lower.contains("notify") {
            "🔔"
        } else if lower.contains("out of stock") || lower.contains("sold out") {
            "❌"
        } else {
            "🔘"
        }
    }

    pub fn create_embed(&self, notification: &Notification) -> serde_json::Value {
        let result = &notification.result;
        let set = format!("**{}** (Set {})", result.product_name, notification.target_code);
        let mut fields = Vec::new();

        let (title, color, description) = match &notification.change {
            Change::StatusChanged { previous } => {
                let (title, color, phrase) = self.get_status_style(result);

                fields.push(json!({
                    "name": "Previous Status",
                    "value": previous.label(),
                    "inline": true
                }));
                fields.push(json!({
                    "name": "Current Status",
                    "value": result.status.label(),
                    "inline": true
                }));
                if let Some(price) = &result.price {
                    fields.push(json!({ "name": "Price", "value": price, "inline": false }));
                }
                if let Some(button) = &result.button_detected {
                    fields.push(json!({
                        "name": format!("{} Button Detected", self.get_button_emoji(button)),
                        "value": format!("```\n{}\n```", button),
                        "inline": false
                    }));
                }

                (title, color, format!("{} {}", set, phrase))
            }
            Change::ButtonChanged { previous } => {
                let (title, description) = match previous {
                    None => ("🔘 Button Detected!", format!("{} now has a button available!", set)),
                    Some(_) => ("🔘 Button Changed", format!("{} button has changed.", set)),
                };

                fields.push(json!({
                    "name": "Previous Button",
                    "value": previous.as_deref().unwrap_or("None"),
                    "inline": true
                }));
                match &result.button_detected {
                    Some(button) => fields.push(json!({
                        "name": format!("{} Current Button", self.get_button_emoji(button)),
                        "value": format!("```\n{}\n```", button),
                        "inline": false
                    })),
                    None => fields.push(json!({
                        "name": "Current Button",
                        "value": "None",
                        "inline": true
                    })),
                }
                fields.push(json!({
                    "name": "Status",
                    "value": result.status.label(),
                    "inline": true
                }));
                if let Some(price) = &result.price {
                    fields.push(json!({ "name": "Price", "value": price, "inline": false }));
                }

                (title, 0x0099ff, description)
            }
        };

        json!({
            "title": title,
            "description": description,
            "url": result.source_url,
            "color": color,
            "fields": fields,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "footer": { "text": "LEGO.com" }
        })
    }

    /// Channel posts mention the subscriber; direct messages do not.
    pub fn create_message_payload(&self, notification: &Notification, mention: bool) -> serde_json::Value {
        let mut payload = json!({
            "embeds": [self.create_embed(notification)]
        });

        if mention {
            payload["content"] = json!(format!("<@{}>", notification.subscriber_id));
        }

        payload
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String, DeliveryError> {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.bot_token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        if status == StatusCode::FORBIDDEN {
            return Err(DeliveryError::Forbidden(path.to_string()));
        }
        if !status.is_success() {
            return Err(DeliveryError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }

    async fn ensure_user_exists(&self, user_id: i64) -> Result<(), DeliveryError> {
        match self.request(Method::GET, &format!("/users/{}", user_id), None).await {
            Err(DeliveryError::Api { status: 404, .. }) => Err(DeliveryError::NotFound(user_id)),
            other => other.map(|_| ()),
        }
    }

    async fn post_message(&self, channel_id: &str, payload: &serde_json::Value) -> Result<(), DeliveryError> {
        self.request(
            Method::POST,
            &format!("/channels/{}/messages", channel_id),
            Some(payload),
        )
        .await
        .map(|_| ())
    }

    async fn open_direct_channel(&self, user_id: i64) -> Result<String, DeliveryError> {
        let body = self
            .request(
                Method::POST,
                "/users/@me/channels",
                Some(&json!({ "recipient_id": user_id.to_string() })),
            )
            .await?;

        let channel: DiscordChannel = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::Transport(format!("invalid channel payload: {}", e)))?;
        Ok(channel.id)
    }

    /// Text channels of a context in display order.
    async fn context_text_channels(&self, context_id: i64) -> Result<Vec<String>, DeliveryError> {
        let body = self
            .request(Method::GET, &format!("/guilds/{}/channels", context_id), None)
            .await?;

        let mut channels: Vec<DiscordChannel> = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::Transport(format!("invalid channel list: {}", e)))?;
        channels.retain(|c| c.kind == GUILD_TEXT_CHANNEL);
        channels.sort_by_key(|c| c.position);

        Ok(channels.into_iter().map(|c| c.id).collect())
    }

    async fn deliver_to_context(
        &self,
        notification: &Notification,
        context_id: i64,
    ) -> Result<Delivery, DeliveryError> {
        let payload = self.create_message_payload(notification, true);

        for channel_id in self.context_text_channels(context_id).await? {
            match self.post_message(&channel_id, &payload).await {
                Ok(()) => {
                    let id = channel_id.parse().unwrap_or_default();
                    return Ok(Delivery::ContextChannel(id));
                }
                Err(e) => debug!("Cannot post to channel {}: {}", channel_id, e),
            }
        }

        warn!(
            subscriber_id = notification.subscriber_id,
            "Could not notify subscriber, no accessible channels"
        );
        Err(DeliveryError::NoRoute(notification.subscriber_id))
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(
        &self,
        notification: &Notification,
        override_channel: Option<i64>,
    ) -> Result<Delivery, DeliveryError> {
        let subscriber_id = notification.subscriber_id;
        self.ensure_user_exists(subscriber_id).await?;

        if let Some(channel_id) = override_channel {
            let payload = self.create_message_payload(notification, true);
            match self.post_message(&channel_id.to_string(), &payload).await {
                Ok(()) => {
                    info!(subscriber_id, channel_id, "Sent notification to notification channel");
                    return Ok(Delivery::OverrideChannel(channel_id));
                }
                Err(e) => warn!(
                    "Notification channel {} not accessible, falling back to DM: {}",
                    channel_id, e
                ),
            }
        }

        let dm = self.create_message_payload(notification, false);
        let dm_result = match self.open_direct_channel(subscriber_id).await {
            Ok(channel_id) => self.post_message(&channel_id, &dm).await,
            Err(e) => Err(e),
        };

        match dm_result {
            Ok(()) => {
                info!(subscriber_id, "Sent notification via DM");
                Ok(Delivery::DirectMessage)
            }
            Err(DeliveryError::Forbidden(_)) => match notification.context_id {
                Some(context_id) => self.deliver_to_context(notification, context_id).await,
                None => {
                    warn!(subscriber_id, "DMs disabled and no context to fall back to");
                    Err(DeliveryError::NoRoute(subscriber_id))
                }
            },
            Err(e) => Err(e),
        }
    }
}
