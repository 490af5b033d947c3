use crate::config::Credential;
use crate::error::Error;
use crate::manager::{CloseCode, CloseInfo, Event};
use crate::metrics::Metrics;
use crate::session::SessionId;
use futures_util::{SinkExt, StreamExt};
use http::{header::AUTHORIZATION, HeaderValue};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{
    client_async_tls_with_config, tungstenite::client::IntoClientRequest, tungstenite::Message,
    Connector as TlsConnector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};
use url::Url;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Commands the driver sends to a live transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Send a text frame
    Send(String),
    /// Close with the given code
    Close(CloseCode),
}

/// Everything needed to open one transport
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub session_id: SessionId,
    pub url: String,
    pub credential: Option<Credential>,
    pub connect_timeout: Duration,
}

/// Opens transports on behalf of the client.
///
/// An implementation must report exactly one [`Event::Closed`] per request,
/// preceded by [`Event::Opened`] if the handshake succeeded. A failed connect
/// is reported as a close without a code.
pub trait Connector: Send + Sync + 'static {
    fn open(
        &self,
        request: ConnectRequest,
        events: mpsc::Sender<Event>,
    ) -> mpsc::Sender<ConnectionCommand>;
}

/// WebSocket transport over `tokio-tungstenite`
pub struct WebSocketConnector {
    metrics: Arc<Metrics>,
}

impl WebSocketConnector {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl Connector for WebSocketConnector {
    fn open(
        &self,
        request: ConnectRequest,
        events: mpsc::Sender<Event>,
    ) -> mpsc::Sender<ConnectionCommand> {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let connection = Connection {
            request,
            events,
            commands: command_rx,
            metrics: self.metrics.clone(),
        };
        tokio::spawn(connection.run());
        command_tx
    }
}

/// Strip credentials and query parameters from a URL for logging.
fn sanitize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if !url.username().is_empty() || url.password().is_some() {
                let _ = url.set_username("***");
                let _ = url.set_password(Some("***"));
            }
            url.set_query(None);
            url.to_string()
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}

/// A single transport session; lives until the socket closes
struct Connection {
    request: ConnectRequest,
    events: mpsc::Sender<Event>,
    commands: mpsc::Receiver<ConnectionCommand>,
    metrics: Arc<Metrics>,
}

impl Connection {
    async fn run(mut self) {
        let id = self.request.session_id;
        let info = self.connect_and_run().await;
        debug!("[SESSION-{}] Transport finished: {:?}", id, info);
        let _ = self.events.send(Event::Closed(id, info)).await;
    }

    /// Returns `false` if the driver is gone
    async fn emit(&self, event: Event) -> bool {
        self.events.send(event).await.is_ok()
    }

    async fn connect_and_run(&mut self) -> CloseInfo {
        let id = self.request.session_id;
        debug!(
            "[SESSION-{}] Connecting to {} (auth={})",
            id,
            sanitize_url(&self.request.url),
            self.request.credential.is_some()
        );

        // The driver may close the session before the handshake finishes
        let ws_stream = {
            let connect = timeout(
                self.request.connect_timeout,
                connect_websocket(&self.request.url, self.request.credential.as_ref()),
            );
            tokio::pin!(connect);

            loop {
                tokio::select! {
                    result = &mut connect => match result {
                        Ok(Ok(stream)) => break stream,
                        Ok(Err(e)) => {
                            self.metrics.record_error();
                            warn!("[SESSION-{}] Connect failed: {}", id, e);
                            return CloseInfo::failed(e.to_string());
                        }
                        Err(_) => {
                            self.metrics.record_error();
                            warn!("[SESSION-{}] Connect timed out", id);
                            return CloseInfo::failed("Connection timeout");
                        }
                    },
                    cmd = self.commands.recv() => match cmd {
                        Some(ConnectionCommand::Send(_)) => {
                            warn!("[SESSION-{}] Dropping send issued before open", id);
                        }
                        Some(ConnectionCommand::Close(code)) => {
                            return CloseInfo::new(code.as_u16(), "closed before open");
                        }
                        None => return CloseInfo::new(CloseCode::Normal.as_u16(), "client dropped"),
                    },
                }
            }
        };

        self.metrics.record_connection();
        self.metrics.update_session(|s| {
            s.session_id = id.0;
            s.is_connected = true;
            s.last_connected_at = Some(Instant::now());
        });
        info!("[SESSION-{}] Transport open", id);

        let info = if self.emit(Event::Opened(id)).await {
            self.message_loop(ws_stream).await
        } else {
            CloseInfo::new(CloseCode::Normal.as_u16(), "client dropped")
        };

        self.metrics.update_session(|s| {
            s.is_connected = false;
            if let Some(connected_at) = s.last_connected_at {
                s.total_uptime += connected_at.elapsed();
            }
        });
        info
    }

    async fn message_loop(&mut self, ws_stream: WsStream) -> CloseInfo {
        let id = self.request.session_id;
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.metrics.record_message_received();
                            self.metrics.update_session(|s| s.last_message_at = Some(Instant::now()));
                            trace!("[SESSION-{}] <- {}", id, text);
                            if !self.emit(Event::Message(id, text)).await {
                                let _ = write.send(close_frame(CloseCode::Normal)).await;
                                return CloseInfo::new(CloseCode::Normal.as_u16(), "client dropped");
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            trace!("[SESSION-{}] Transport ping", id);
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                return CloseInfo::failed(e.to_string());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("[SESSION-{}] Received close frame: {:?}", id, frame);
                            return match frame {
                                Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.to_string()),
                                None => CloseInfo::failed("close frame without status"),
                            };
                        }
                        Some(Ok(other)) => {
                            debug!("[SESSION-{}] Ignoring non-text frame ({} bytes)", id, other.len());
                        }
                        Some(Err(e)) => {
                            self.metrics.record_error();
                            warn!("[SESSION-{}] WebSocket error: {}", id, e);
                            return CloseInfo::failed(e.to_string());
                        }
                        None => {
                            info!("[SESSION-{}] WebSocket stream ended", id);
                            return CloseInfo::failed("stream ended");
                        }
                    }
                }

                cmd = self.commands.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Send(text)) => {
                            trace!("[SESSION-{}] -> {}", id, text);
                            if let Err(e) = write.send(Message::Text(text)).await {
                                warn!("[SESSION-{}] Failed to send message: {}", id, e);
                                return CloseInfo::failed(e.to_string());
                            }
                            self.metrics.record_message_sent();
                        }
                        Some(ConnectionCommand::Close(code)) => {
                            info!("[SESSION-{}] Closing with code {}", id, code.as_u16());
                            let _ = write.send(close_frame(code)).await;
                            return CloseInfo::new(code.as_u16(), "closed by client");
                        }
                        None => {
                            debug!("[SESSION-{}] Command channel closed", id);
                            let _ = write.send(close_frame(CloseCode::Normal)).await;
                            return CloseInfo::new(CloseCode::Normal.as_u16(), "client dropped");
                        }
                    }
                }
            }
        }
    }
}

fn close_frame(code: CloseCode) -> Message {
    Message::Close(Some(CloseFrame {
        code: WsCloseCode::from(code.as_u16()),
        reason: "".into(),
    }))
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Open a WebSocket with the credential in the `Authorization` header.
async fn connect_websocket(url: &str, credential: Option<&Credential>) -> Result<WsStream, Error> {
    let parsed_url =
        Url::parse(url).map_err(|e| Error::ConnectionFailed(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| Error::ConnectionFailed("No host in URL".to_string()))?;

    let is_tls = parsed_url.scheme() == "wss";
    let port = parsed_url.port().unwrap_or(if is_tls { 443 } else { 80 });

    let mut request = url
        .into_client_request()
        .map_err(|e| Error::ConnectionFailed(format!("Invalid WebSocket request: {}", e)))?;

    if let Some(credential) = credential {
        let value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|_| Error::ConnectionFailed("Credential is not a valid header".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let tcp_stream = connect_direct(host, port).await?;
    set_tcp_options(&tcp_stream);

    let connector = if is_tls {
        let tls = native_tls::TlsConnector::new()
            .map_err(|e| Error::ConnectionFailed(format!("TLS error: {}", e)))?;
        Some(TlsConnector::NativeTls(tls))
    } else {
        None
    };

    let (ws_stream, _response) =
        client_async_tls_with_config(request, tcp_stream, None, connector).await?;

    Ok(ws_stream)
}

async fn connect_direct(host: &str, port: u16) -> Result<tokio::net::TcpStream, Error> {
    let dest_str = format!("{}:{}", host, port);
    let dest_addr: SocketAddr = tokio::net::lookup_host(&dest_str)
        .await
        .map_err(|e| Error::ConnectionFailed(format!("DNS lookup failed: {}", e)))?
        .next()
        .ok_or_else(|| Error::ConnectionFailed(format!("No addresses found for {}", host)))?;

    let socket = if dest_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Error::ConnectionFailed(format!("Failed to create socket: {}", e)))?;

    socket
        .connect(dest_addr)
        .await
        .map_err(|e| Error::ConnectionFailed(format!("TCP connect to {} failed: {}", dest_addr, e)))
}

/// Nagle off; keepalive so a dead peer is noticed below the heartbeat layer
fn set_tcp_options(stream: &tokio::net::TcpStream) {
    let sock2 = socket2::SockRef::from(stream);
    let _ = sock2.set_nodelay(true);

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    let _ = sock2.set_tcp_keepalive(&keepalive);
}
