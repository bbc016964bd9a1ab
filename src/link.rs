//! WebSocket transport task.
//!
//! One task owns the socket for the whole session. It forwards inbound text
//! upward and writes outbound text on command; it never parses payloads.
//! When the transport dies it reports [`LinkEvent::Closed`] once and exits.
//! There is no reconnect here: the session that owned this link is over.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use url::Url;

#[derive(Debug)]
pub enum LinkEvent {
    /// Inbound text frame, still raw JSON.
    Message(String),
    /// The transport is gone. Sent exactly once, only for unexpected loss.
    Closed { reason: String },
}

#[derive(Debug)]
pub enum LinkCommand {
    Send(String),
    Close,
}

pub struct Link {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    tx_event: mpsc::UnboundedSender<LinkEvent>,
    rx_cmd: mpsc::UnboundedReceiver<LinkCommand>,
}

impl Link {
    /// Dial the agent endpoint. Handshake failures surface here so the
    /// caller can treat them as fatal before any session state exists.
    pub async fn connect(
        ws_url: &str,
        tx_event: mpsc::UnboundedSender<LinkEvent>,
        rx_cmd: mpsc::UnboundedReceiver<LinkCommand>,
    ) -> Result<Self> {
        // 根据配置构建WebSocket请求
        let url = Url::parse(ws_url).context("invalid websocket url")?;
        let host = url.host_str().context("websocket url has no host")?;

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(ws_url)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .context("failed to build websocket request")?;

        let (stream, _) = connect_async(request)
            .await
            .with_context(|| format!("failed to connect to {}", ws_url))?;
        log::info!("transport open: {}", ws_url);

        Ok(Self { stream, tx_event, rx_cmd })
    }

    /// 主循环，处理读取和写入
    pub async fn run(self) {
        let Link { stream, tx_event, mut rx_cmd } = self;
        let (mut write, mut read) = stream.split();
        let mut reason: Option<String> = None;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if tx_event.send(LinkEvent::Message(text.to_string())).is_err() {
                                // consumer is gone, the session already ended
                                return;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            reason = Some(format!("server closed connection: {:?}", frame));
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            reason = Some(format!("transport error: {}", e));
                            break;
                        }
                        None => {
                            reason = Some("connection closed".to_string());
                            break;
                        }
                    }
                }
                cmd = rx_cmd.recv() => {
                    match cmd {
                        Some(LinkCommand::Send(text)) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                reason = Some(format!("send failed: {}", e));
                                break;
                            }
                        }
                        // 主动关闭：尽力发送Close帧后直接退出，不上报Closed事件
                        Some(LinkCommand::Close) | None => {
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    }
                }
            }
        }

        if let Some(reason) = reason {
            log::info!("link closed: {}", reason);
            let _ = tx_event.send(LinkEvent::Closed { reason });
        }
    }
}
