use std::sync::Once;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::domain::TradeEvent;
use crate::provider::{ProviderError, ProviderFuture, TradeBatchStream, TradeFeed};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

static CRYPTO_PROVIDER: Once = Once::new();

fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Fails only when another provider was installed first, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Polygon real-time WebSocket feed.
#[derive(Clone)]
pub struct PolygonStream {
    url: String,
    api_key: String,
}

impl PolygonStream {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            url: config.stream_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for PolygonStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonStream").field("url", &self.url).finish()
    }
}

impl TradeFeed for PolygonStream {
    fn subscribe<'a>(&'a self, pattern: &'a str) -> ProviderFuture<'a, TradeBatchStream<'a>> {
        Box::pin(async move {
            install_crypto_provider();

            let (mut socket, _) = connect_async(self.url.as_str()).await.map_err(|error| {
                ProviderError::unavailable(format!("failed to connect to {}: {error}", self.url))
            })?;
            debug!(url = %self.url, "trade feed connected");

            send_control(&mut socket, "auth", &self.api_key).await?;
            await_auth(&mut socket).await?;
            send_control(&mut socket, "subscribe", pattern).await?;
            info!(pattern, "subscribed to trade feed");

            Ok(batches(socket))
        })
    }
}

#[derive(Serialize)]
struct ControlMessage<'a> {
    action: &'a str,
    params: &'a str,
}

/// One element of a feed frame. Frames are JSON arrays of these.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "ev")]
pub(crate) enum FeedMessage {
    #[serde(rename = "T")]
    Trade(TradeEvent),
    #[serde(rename = "status")]
    Status {
        status: String,
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

pub(crate) fn parse_frame(text: &str) -> Result<Vec<FeedMessage>, ProviderError> {
    serde_json::from_str(text).map_err(|error| {
        ProviderError::invalid_response(format!("malformed trade feed frame: {error}"))
    })
}

async fn send_control(socket: &mut Socket, action: &str, params: &str) -> Result<(), ProviderError> {
    let payload = serde_json::to_string(&ControlMessage { action, params })
        .map_err(|error| ProviderError::internal(format!("failed to encode {action}: {error}")))?;
    socket
        .send(Message::text(payload))
        .await
        .map_err(|error| ProviderError::unavailable(format!("failed to send {action}: {error}")))
}

async fn await_auth(socket: &mut Socket) -> Result<(), ProviderError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                for message in parse_frame(text.as_str())? {
                    if let FeedMessage::Status { status, message } = message {
                        match status.as_str() {
                            "auth_success" => {
                                debug!(message = %message, "trade feed authenticated");
                                return Ok(());
                            }
                            "auth_failed" => {
                                return Err(ProviderError::unauthorized(format!(
                                    "trade feed rejected credentials: {message}"
                                )))
                            }
                            _ => debug!(status = %status, message = %message, "trade feed status"),
                        }
                    }
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                socket.send(Message::Pong(payload)).await.map_err(|error| {
                    ProviderError::unavailable(format!("failed to answer ping: {error}"))
                })?;
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(ProviderError::unavailable(
                    "trade feed closed before authentication completed",
                ))
            }
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                return Err(ProviderError::unavailable(format!(
                    "trade feed error during authentication: {error}"
                )))
            }
        }
    }
}

/// Turns an authenticated socket into a stream of trade batches.
fn batches(socket: Socket) -> TradeBatchStream<'static> {
    futures_util::stream::unfold(Some(socket), |state| async move {
        let mut socket = state?;
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => match parse_frame(text.as_str()) {
                    Ok(messages) => {
                        let batch = collect_trades(messages);
                        if !batch.is_empty() {
                            return Some((Ok(batch), Some(socket)));
                        }
                    }
                    Err(error) => warn!(%error, "skipping trade feed frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(error) = socket.send(Message::Pong(payload)).await {
                        let error =
                            ProviderError::unavailable(format!("failed to answer ping: {error}"));
                        return Some((Err(error), None));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "trade feed closed by server");
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    let error = ProviderError::unavailable(format!("trade feed error: {error}"));
                    return Some((Err(error), None));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

fn collect_trades(messages: Vec<FeedMessage>) -> Vec<TradeEvent> {
    messages
        .into_iter()
        .filter_map(|message| match message {
            FeedMessage::Trade(trade) => Some(trade),
            FeedMessage::Status { status, message } => {
                debug!(status = %status, message = %message, "trade feed status");
                None
            }
            FeedMessage::Other => None,
        })
        .collect()
}
