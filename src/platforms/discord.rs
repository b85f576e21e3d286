use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::platforms::ChatTransport;
use crate::types::{
    FetchedMessage, GatewayEvent, MessageEvent, MessageRef, ReactionEvent, ReactionSummary,
    UserRef,
};

const API_BASE: &str = "https://discord.com/api/v10";
const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

// GUILDS | GUILD_MESSAGES | GUILD_MESSAGE_REACTIONS | DIRECT_MESSAGES |
// DIRECT_MESSAGE_REACTIONS | MESSAGE_CONTENT
const INTENTS: u64 = 1 | (1 << 9) | (1 << 10) | (1 << 12) | (1 << 13) | (1 << 15);

type WsWriter = Arc<RwLock<SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>>>;
type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, Clone, Default)]
struct ChannelInfo {
    name: Option<String>,
    kind: u64,
}

/// Discord implementation of the chat transport: a gateway websocket for
/// inbound events, the REST API for everything outbound.
pub struct DiscordTransport {
    token: String,
    watching_status: String,
    http: Client,
    event_sender: Option<broadcast::Sender<GatewayEvent>>,
    bot_user_id: String,
    channels: Arc<RwLock<HashMap<String, ChannelInfo>>>,
    is_connected: Arc<RwLock<bool>>,
}

impl DiscordTransport {
    pub fn new(token: &str, watching_status: &str) -> Self {
        Self {
            token: token.to_string(),
            watching_status: watching_status.to_string(),
            http: Client::new(),
            event_sender: None,
            bot_user_id: String::new(),
            channels: Arc::new(RwLock::new(HashMap::new())),
            is_connected: Arc::new(RwLock::new(false)),
        }
    }

    async fn send_payload(writer: &WsWriter, payload: Value) -> Result<()> {
        writer
            .write()
            .await
            .send(Message::Text(payload.to_string()))
            .await
            .context("failed to send gateway payload")
    }

    /// Read gateway frames until a dispatch with the wanted type arrives.
    async fn wait_for_dispatch(
        read: &mut WsReader,
        seq: &Arc<RwLock<Option<u64>>>,
        wanted: &str,
    ) -> Result<Value> {
        while let Some(frame) = read.next().await {
            let frame = frame.context("gateway stream error")?;
            let Message::Text(text) = frame else { continue };
            let payload: Value = match serde_json::from_str(&text) {
                Ok(payload) => payload,
                Err(_) => continue,
            };
            if let Some(s) = payload["s"].as_u64() {
                *seq.write().await = Some(s);
            }
            if payload["op"] == 0 && payload["t"] == wanted {
                return Ok(payload["d"].clone());
            }
        }
        Err(anyhow::anyhow!("gateway closed before {} dispatch", wanted))
    }

    fn identify_payload(&self) -> Value {
        json!({
            "op": 2,
            "d": {
                "token": self.token,
                "intents": INTENTS,
                "properties": { "os": std::env::consts::OS, "browser": "mottobot", "device": "mottobot" },
                "presence": {
                    "activities": [{ "name": self.watching_status, "type": 3 }],
                    "status": "online",
                    "afk": false,
                },
            },
        })
    }

    async fn rest(&self, request: RequestBuilder) -> Result<(StatusCode, Value)> {
        let response = request
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .context("transport request failed")?;
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    async fn rest_expect(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let (status, body) = self.rest(request).await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "{} failed with {}: {}",
                what,
                status,
                body["message"].as_str().unwrap_or_default()
            ));
        }
        Ok(body)
    }

    async fn channel_info(&self, channel_id: &str) -> Option<ChannelInfo> {
        if let Some(info) = self.channels.read().await.get(channel_id) {
            return Some(info.clone());
        }
        let request = self.http.get(format!("{}/channels/{}", API_BASE, channel_id));
        let (status, body) = self.rest(request).await.ok()?;
        if !status.is_success() {
            debug!("Channel {} lookup failed with {}", channel_id, status);
            return None;
        }
        let info = ChannelInfo {
            name: body["name"].as_str().map(String::from),
            kind: body["type"].as_u64().unwrap_or(0),
        };
        self.channels
            .write()
            .await
            .insert(channel_id.to_string(), info.clone());
        Some(info)
    }
}

/// Percent-encode an emoji for a reaction endpoint path.
fn encode_emoji(emoji: &str) -> String {
    emoji.bytes().map(|b| format!("%{:02X}", b)).collect()
}

fn parse_timestamp(value: &Value) -> DateTime<Utc> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn parse_user(value: &Value, nickname: Option<&str>) -> Option<UserRef> {
    Some(UserRef {
        id: value["id"].as_str()?.to_string(),
        username: value["username"].as_str().unwrap_or_default().to_string(),
        nickname: nickname.map(String::from),
        is_bot: value["bot"].as_bool().unwrap_or(false),
    })
}

fn parse_message_event(d: &Value, is_dm: bool) -> Option<MessageEvent> {
    let channel_id = d["channel_id"].as_str()?.to_string();
    let author = parse_user(&d["author"], d["member"]["nick"].as_str())?;
    let reference = d["message_reference"]["message_id"].as_str().map(|mid| MessageRef {
        channel_id: d["message_reference"]["channel_id"]
            .as_str()
            .unwrap_or(&channel_id)
            .to_string(),
        message_id: mid.to_string(),
    });
    Some(MessageEvent {
        message_id: d["id"].as_str()?.to_string(),
        channel_id,
        guild_id: d["guild_id"].as_str().map(String::from),
        author,
        content: d["content"].as_str().unwrap_or_default().to_string(),
        timestamp: parse_timestamp(&d["timestamp"]),
        reference,
        is_dm,
    })
}

fn parse_reaction_event(d: &Value) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        emoji: d["emoji"]["name"].as_str()?.to_string(),
        user_id: d["user_id"].as_str()?.to_string(),
        member: parse_user(&d["member"]["user"], d["member"]["nick"].as_str()),
        channel_id: d["channel_id"].as_str()?.to_string(),
        message_id: d["message_id"].as_str()?.to_string(),
        guild_id: d["guild_id"].as_str().map(String::from),
    })
}

async fn cache_guild_channels(channels: &Arc<RwLock<HashMap<String, ChannelInfo>>>, d: &Value) {
    let Some(list) = d["channels"].as_array() else { return };
    let mut cache = channels.write().await;
    for channel in list {
        if let Some(id) = channel["id"].as_str() {
            cache.insert(
                id.to_string(),
                ChannelInfo {
                    name: channel["name"].as_str().map(String::from),
                    kind: channel["type"].as_u64().unwrap_or(0),
                },
            );
        }
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    async fn connect(&mut self) -> Result<()> {
        info!("Connecting to gateway...");

        let url = Url::parse(GATEWAY_URL).context("failed to parse gateway URL")?;
        let (ws_stream, _) = connect_async(url)
            .await
            .context("failed to connect to gateway")?;
        let (write, mut read) = ws_stream.split();
        let writer: WsWriter = Arc::new(RwLock::new(write));
        let seq: Arc<RwLock<Option<u64>>> = Arc::new(RwLock::new(None));

        // The gateway opens with HELLO carrying the heartbeat interval.
        let heartbeat_interval = loop {
            let frame = read
                .next()
                .await
                .context("gateway closed before HELLO")?
                .context("gateway stream error")?;
            if let Message::Text(text) = frame {
                let payload: Value = serde_json::from_str(&text).context("invalid HELLO")?;
                if payload["op"] == 10 {
                    break payload["d"]["heartbeat_interval"]
                        .as_u64()
                        .context("HELLO without heartbeat interval")?;
                }
            }
        };

        {
            let writer = Arc::clone(&writer);
            let seq = Arc::clone(&seq);
            tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(std::time::Duration::from_millis(heartbeat_interval));
                loop {
                    interval.tick().await;
                    let d = *seq.read().await;
                    let payload = json!({ "op": 1, "d": d });
                    if let Err(e) = Self::send_payload(&writer, payload).await {
                        warn!("Heartbeat failed: {}", e);
                        break;
                    }
                }
            });
        }

        Self::send_payload(&writer, self.identify_payload()).await?;

        let ready = Self::wait_for_dispatch(&mut read, &seq, "READY").await?;
        self.bot_user_id = ready["user"]["id"]
            .as_str()
            .context("READY without user id")?
            .to_string();
        info!("Logged in as user {}", self.bot_user_id);

        let (tx, _) = broadcast::channel(1000);
        self.event_sender = Some(tx.clone());
        *self.is_connected.write().await = true;

        let channels = Arc::clone(&self.channels);
        let is_connected = Arc::clone(&self.is_connected);
        let writer_for_pings = Arc::clone(&writer);
        let seq_for_reader = Arc::clone(&seq);

        tokio::spawn(async move {
            info!("Gateway event reader started");
            let mut read = read;
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let payload: Value = match serde_json::from_str(&text) {
                            Ok(payload) => payload,
                            Err(e) => {
                                debug!("Undecodable gateway frame: {}", e);
                                continue;
                            }
                        };
                        if let Some(s) = payload["s"].as_u64() {
                            *seq_for_reader.write().await = Some(s);
                        }
                        match payload["op"].as_u64() {
                            Some(0) => {
                                let d = &payload["d"];
                                match payload["t"].as_str() {
                                    Some("MESSAGE_CREATE") => {
                                        let is_dm = d["guild_id"].is_null();
                                        if let Some(event) = parse_message_event(d, is_dm) {
                                            let _ = tx.send(GatewayEvent::Message(event));
                                        }
                                    }
                                    Some("MESSAGE_REACTION_ADD") => {
                                        if let Some(event) = parse_reaction_event(d) {
                                            let _ = tx.send(GatewayEvent::ReactionAdded(event));
                                        }
                                    }
                                    Some("GUILD_CREATE") => {
                                        cache_guild_channels(&channels, d).await;
                                    }
                                    Some("CHANNEL_CREATE") | Some("CHANNEL_UPDATE") => {
                                        if let Some(id) = d["id"].as_str() {
                                            channels.write().await.insert(
                                                id.to_string(),
                                                ChannelInfo {
                                                    name: d["name"].as_str().map(String::from),
                                                    kind: d["type"].as_u64().unwrap_or(0),
                                                },
                                            );
                                        }
                                    }
                                    _ => {}
                                }
                            }
                            // The gateway may request an immediate heartbeat.
                            Some(1) => {
                                let d = *seq_for_reader.read().await;
                                let payload = json!({ "op": 1, "d": d });
                                if let Err(e) =
                                    Self::send_payload(&writer_for_pings, payload).await
                                {
                                    error!("Requested heartbeat failed: {}", e);
                                }
                            }
                            Some(7) | Some(9) => {
                                warn!("Gateway asked for a reconnect; stopping reader");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let mut writer = writer_for_pings.write().await;
                        if let Err(e) = writer.send(Message::Pong(payload)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Gateway connection closed: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Gateway error: {}", e);
                        break;
                    }
                    None => {
                        warn!("Gateway stream ended");
                        break;
                    }
                }
            }
            *is_connected.write().await = false;
            warn!("Gateway event reader exited");
        });

        info!("Connected to gateway");
        Ok(())
    }

    fn bot_user_id(&self) -> String {
        self.bot_user_id.clone()
    }

    fn event_receiver(&self) -> Option<broadcast::Receiver<GatewayEvent>> {
        self.event_sender.as_ref().map(|sender| sender.subscribe())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<()> {
        let request = self
            .http
            .post(format!("{}/channels/{}/messages", API_BASE, channel_id))
            .json(&json!({ "content": content }));
        self.rest_expect(request, "send message").await?;
        Ok(())
    }

    async fn reply(&self, channel_id: &str, message_id: &str, content: &str) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/channels/{}/messages", API_BASE, channel_id))
            .json(&json!({
                "content": content,
                "message_reference": { "message_id": message_id },
            }));
        let body = self.rest_expect(request, "send reply").await?;
        body["id"]
            .as_str()
            .map(String::from)
            .context("reply response without id")
    }

    async fn create_dm(&self, user_id: &str) -> Result<String> {
        let request = self
            .http
            .post(format!("{}/users/@me/channels", API_BASE))
            .json(&json!({ "recipient_id": user_id }));
        let body = self.rest_expect(request, "create DM channel").await?;
        body["id"]
            .as_str()
            .map(String::from)
            .context("DM channel response without id")
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        let request = self.http.put(format!(
            "{}/channels/{}/messages/{}/reactions/{}/@me",
            API_BASE,
            channel_id,
            message_id,
            encode_emoji(emoji)
        ));
        self.rest_expect(request, "add reaction").await?;
        Ok(())
    }

    async fn remove_own_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let request = self.http.delete(format!(
            "{}/channels/{}/messages/{}/reactions/{}/@me",
            API_BASE,
            channel_id,
            message_id,
            encode_emoji(emoji)
        ));
        self.rest_expect(request, "remove reaction").await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<FetchedMessage>> {
        let request = self.http.get(format!(
            "{}/channels/{}/messages/{}",
            API_BASE, channel_id, message_id
        ));
        let (status, body) = self.rest(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "fetch message failed with {}: {}",
                status,
                body["message"].as_str().unwrap_or_default()
            ));
        }
        // REST message objects carry no guild id; the channel kind says
        // whether this is a DM.
        let is_dm = self
            .channel_info(channel_id)
            .await
            .map(|info| info.kind == 1)
            .unwrap_or(false);
        let Some(message) = parse_message_event(&body, is_dm) else {
            return Ok(None);
        };
        let reactions = body["reactions"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|r| {
                        Some(ReactionSummary {
                            emoji: r["emoji"]["name"].as_str()?.to_string(),
                            me: r["me"].as_bool().unwrap_or(false),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(FetchedMessage { message, reactions }))
    }

    async fn channel_name(&self, channel_id: &str) -> Option<String> {
        self.channel_info(channel_id).await.and_then(|info| info.name)
    }

    async fn trigger_typing(&self, channel_id: &str) -> Result<()> {
        let request = self
            .http
            .post(format!("{}/channels/{}/typing", API_BASE, channel_id))
            .header("Content-Length", "0");
        self.rest_expect(request, "trigger typing").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emoji_path_encoding() {
        assert_eq!(encode_emoji("👍"), "%F0%9F%91%8D");
        assert_eq!(encode_emoji("⏳"), "%E2%8F%B3");
    }

    #[test]
    fn test_parse_message_event_with_reference() {
        let d = json!({
            "id": "111",
            "channel_id": "222",
            "guild_id": "333",
            "author": { "id": "444", "username": "ada", "bot": false },
            "member": { "nick": "The Countess" },
            "content": "!motto",
            "timestamp": "2024-03-01T12:00:00+00:00",
            "message_reference": { "message_id": "555", "channel_id": "222" },
        });
        let event = parse_message_event(&d, false).unwrap();
        assert_eq!(event.message_id, "111");
        assert_eq!(event.author.nickname.as_deref(), Some("The Countess"));
        assert_eq!(event.reference.as_ref().unwrap().message_id, "555");
        assert!(!event.is_dm);
    }

    #[test]
    fn test_parse_message_event_without_reference() {
        let d = json!({
            "id": "111",
            "channel_id": "222",
            "author": { "id": "444", "username": "ada" },
            "content": "hello",
            "timestamp": "2024-03-01T12:00:00+00:00",
        });
        let event = parse_message_event(&d, true).unwrap();
        assert!(event.reference.is_none());
        assert!(event.is_dm);
        assert!(event.guild_id.is_none());
    }

    #[test]
    fn test_parse_reaction_event() {
        let d = json!({
            "emoji": { "name": "👍" },
            "user_id": "444",
            "channel_id": "222",
            "message_id": "111",
            "member": { "user": { "id": "444", "username": "ada" } },
        });
        let event = parse_reaction_event(&d).unwrap();
        assert_eq!(event.emoji, "👍");
        assert_eq!(event.member.as_ref().unwrap().username, "ada");
    }
}
