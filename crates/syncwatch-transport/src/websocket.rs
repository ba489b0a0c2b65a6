//! WebSocket transport implementation
//!
//! A host opens a listening endpoint and hands out its `ws://` address as the
//! party id; guests open a dial-only endpoint and connect to that address.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    tungstenite::{
        client::IntoClientRequest,
        handshake::server::{ErrorResponse, Request as HsRequest, Response as HsResponse},
        http::HeaderValue,
        protocol::{Message as WsMessage, WebSocketConfig as TungsteniteConfig},
    },
    WebSocketStream,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::traits::{
    Connection, EndpointEvent, PeerAddr, PeerEndpoint, PeerNetwork, TransportEvent,
    TransportReceiver, TransportSender,
};

use syncwatch_core::WS_SUBPROTOCOL;

/// WebSocket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Subprotocol to use
    pub subprotocol: String,
    /// Maximum message size
    pub max_message_size: usize,
    /// Bind address used when `open` is called without an identity.
    /// `None` opens a dial-only endpoint.
    pub listen: Option<String>,
    /// Host name placed in the local address when bound to a wildcard IP
    pub advertise_host: Option<String>,
    /// Capacity of per-channel queues
    pub channel_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            subprotocol: WS_SUBPROTOCOL.to_string(),
            max_message_size: 64 * 1024, // 64KB
            listen: None,
            advertise_host: None,
            channel_buffer: 100,
        }
    }
}

impl WebSocketConfig {
    fn tungstenite(&self) -> TungsteniteConfig {
        TungsteniteConfig {
            max_message_size: Some(self.max_message_size),
            ..Default::default()
        }
    }

    fn advertised_addr(&self, bound: SocketAddr) -> String {
        let host = match &self.advertise_host {
            Some(host) => host.clone(),
            None if bound.ip().is_unspecified() => "localhost".to_string(),
            None => bound.ip().to_string(),
        };
        format!("ws://{}:{}", host, bound.port())
    }
}

/// WebSocket peer network
#[derive(Debug, Clone, Default)]
pub struct WebSocketNetwork {
    config: WebSocketConfig,
}

impl WebSocketNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PeerNetwork for WebSocketNetwork {
    async fn open(&self, identity: Option<&str>) -> Result<Arc<dyn PeerEndpoint>> {
        let bind = identity
            .map(str::to_string)
            .or_else(|| self.config.listen.clone());

        let endpoint = match bind {
            Some(bind) => WebSocketEndpoint::listen(&bind, self.config.clone()).await?,
            None => WebSocketEndpoint::dial_only(self.config.clone()),
        };
        Ok(Arc::new(endpoint))
    }
}

type ChannelList = Arc<Mutex<Vec<Arc<WebSocketSender>>>>;

/// A WebSocket peer identity
pub struct WebSocketEndpoint {
    local_addr: PeerAddr,
    config: WebSocketConfig,
    events: AsyncMutex<mpsc::UnboundedReceiver<EndpointEvent>>,
    /// Keeps the event stream pending until the endpoint is destroyed
    events_tx: Mutex<Option<mpsc::UnboundedSender<EndpointEvent>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    channels: ChannelList,
    destroyed: AtomicBool,
}

impl WebSocketEndpoint {
    async fn listen(bind: &str, config: WebSocketConfig) -> Result<Self> {
        let listener = TcpListener::bind(bind).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                TransportError::AddressInUse(bind.to_string())
            } else {
                TransportError::Io(e)
            }
        })?;

        let bound = listener.local_addr()?;
        let local_addr = config.advertised_addr(bound);
        info!("WebSocket endpoint listening on {} ({})", bound, local_addr);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let channels: ChannelList = Arc::new(Mutex::new(Vec::new()));

        let accept_task = tokio::spawn(accept_loop(
            listener,
            config.clone(),
            events_tx.clone(),
            channels.clone(),
        ));

        Ok(Self {
            local_addr,
            config,
            events: AsyncMutex::new(events_rx),
            events_tx: Mutex::new(Some(events_tx)),
            accept_task: Mutex::new(Some(accept_task)),
            channels,
            destroyed: AtomicBool::new(false),
        })
    }

    fn dial_only(config: WebSocketConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            local_addr: format!("ws-guest:{}", Uuid::new_v4()),
            config,
            events: AsyncMutex::new(events_rx),
            events_tx: Mutex::new(Some(events_tx)),
            accept_task: Mutex::new(None),
            channels: Arc::new(Mutex::new(Vec::new())),
            destroyed: AtomicBool::new(false),
        }
    }

    fn track(&self, sender: Arc<WebSocketSender>) {
        let mut channels = self.channels.lock();
        channels.retain(|s| s.is_connected());
        channels.push(sender);
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: WebSocketConfig,
    events_tx: mpsc::UnboundedSender<EndpointEvent>,
    channels: ChannelList,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Accept error: {}", e);
                continue;
            }
        };

        debug!("Accepted TCP connection from {}", addr);

        let config = config.clone();
        let events_tx = events_tx.clone();
        let channels = channels.clone();
        tokio::spawn(async move {
            match upgrade(stream, &config).await {
                Ok(ws_stream) => {
                    info!("WebSocket peer connected from {}", addr);
                    let (sender, receiver) = spawn_pumps(ws_stream, config.channel_buffer);
                    let sender = Arc::new(sender);
                    {
                        let mut channels = channels.lock();
                        channels.retain(|s| s.is_connected());
                        channels.push(sender.clone());
                    }
                    let _ = events_tx.send(EndpointEvent::Incoming(Connection {
                        peer: addr.to_string(),
                        sender,
                        receiver: Box::new(receiver),
                    }));
                }
                Err(e) => warn!("WebSocket handshake with {} failed: {}", addr, e),
            }
        });
    }
}

/// Upgrade to WebSocket with subprotocol negotiation
async fn upgrade(stream: TcpStream, config: &WebSocketConfig) -> Result<WebSocketStream<TcpStream>> {
    let subprotocol = config.subprotocol.clone();
    let callback = move |req: &HsRequest,
                         mut response: HsResponse|
          -> std::result::Result<HsResponse, ErrorResponse> {
        // Client may request multiple protocols, comma-separated
        let requested = req
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|p| p.to_str().ok())
            .map(|p| p.split(',').any(|s| s.trim() == subprotocol))
            .unwrap_or(false);
        if requested {
            if let Ok(value) = HeaderValue::from_str(&subprotocol) {
                response
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", value);
            }
        }
        Ok(response)
    };

    tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(config.tungstenite()))
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
}

/// Split a WebSocket stream into a sender and an event receiver backed by
/// writer/reader tasks
fn spawn_pumps<S>(ws_stream: WebSocketStream<S>, buffer: usize) -> (WebSocketSender, WebSocketReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut write, mut read) = ws_stream.split();

    let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(buffer);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(buffer);

    let connected = Arc::new(AtomicBool::new(true));
    let connected_write = connected.clone();
    let connected_read = connected.clone();

    // Writer task
    tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            let closing = matches!(msg, WsMessage::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        connected_write.store(false, Ordering::SeqCst);
    });

    // Reader task
    tokio::spawn(async move {
        let _ = event_tx.send(TransportEvent::Connected).await;

        let mut reason = None;
        while let Some(result) = read.next().await {
            match result {
                Ok(WsMessage::Text(text)) => {
                    let _ = event_tx.send(TransportEvent::Data(Bytes::from(text))).await;
                }
                Ok(WsMessage::Binary(data)) => {
                    let _ = event_tx.send(TransportEvent::Data(Bytes::from(data))).await;
                }
                Ok(WsMessage::Close(frame)) => {
                    reason = frame.map(|f| f.reason.to_string());
                    info!("WebSocket closed: {:?}", reason);
                    break;
                }
                Ok(_) => {
                    // Ping/pong are answered by tungstenite
                }
                Err(e) => {
                    error!("WebSocket read error: {}", e);
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    reason = Some(e.to_string());
                    break;
                }
            }
        }

        connected_read.store(false, Ordering::SeqCst);
        let _ = event_tx.send(TransportEvent::Disconnected { reason }).await;
    });

    (
        WebSocketSender {
            tx: send_tx,
            connected,
        },
        WebSocketReceiver { rx: event_rx },
    )
}

#[async_trait]
impl PeerEndpoint for WebSocketEndpoint {
    fn local_addr(&self) -> PeerAddr {
        self.local_addr.clone()
    }

    async fn connect(&self, remote: &str) -> Result<Connection> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(TransportError::Destroyed);
        }

        info!("Connecting to WebSocket: {}", remote);

        let mut request = remote
            .into_client_request()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let protocol = HeaderValue::from_str(&self.config.subprotocol)
            .map_err(|e| TransportError::Other(e.to_string()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", protocol);

        let (ws_stream, response) = tokio_tungstenite::connect_async_with_config(
            request,
            Some(self.config.tungstenite()),
            false,
        )
        .await
        .map_err(|e| TransportError::PeerUnavailable(format!("{}: {}", remote, e)))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        let (sender, receiver) = spawn_pumps(ws_stream, self.config.channel_buffer);
        let sender = Arc::new(sender);
        self.track(sender.clone());

        Ok(Connection {
            peer: remote.to_string(),
            sender,
            receiver: Box::new(receiver),
        })
    }

    async fn next_event(&self) -> Option<EndpointEvent> {
        if self.destroyed.load(Ordering::SeqCst) {
            return None;
        }
        self.events.lock().await.recv().await
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        // Ends the event stream once in-flight accepts finish
        self.events_tx.lock().take();

        let channels = std::mem::take(&mut *self.channels.lock());
        for channel in channels {
            let _ = channel.close().await;
        }

        info!("WebSocket endpoint {} destroyed", self.local_addr);
        Ok(())
    }
}

impl Drop for WebSocketEndpoint {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
    }
}

/// WebSocket sender
pub struct WebSocketSender {
    tx: mpsc::Sender<WsMessage>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        // Protocol payloads are JSON, so browsers get text frames
        let msg = match std::str::from_utf8(&data) {
            Ok(text) => WsMessage::Text(text.to_owned()),
            Err(_) => WsMessage::Binary(data.to_vec()),
        };

        self.tx
            .send(msg)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.tx.send(WsMessage::Close(None)).await;
        }
        Ok(())
    }
}

/// WebSocket receiver
pub struct WebSocketReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
