//! KumaSession: the long-lived, authenticated Socket.IO link to Uptime Kuma
//!
//! One background driver task owns the WebSocket. It answers Engine.IO pings,
//! routes command acknowledgements back to their callers, and forwards
//! server pushes into a FIFO event queue. Everything else talks to it through
//! channels, so the session itself holds no locks.

use crate::error::{CommandError, ConnectError};
use crate::protocol::{websocket_url, EnginePacket, SocketPacket};
use crate::types::{AckResponse, CommandKind, Heartbeat, Inventory, MonitorId, SessionEvent};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default bound on connect + handshake + login
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long `disconnect()` waits for the driver to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Login credentials for the Kuma account
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound for establishing the transport and completing login
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Requests handed to the driver task
enum Outbound {
    Emit {
        name: String,
        args: Vec<Value>,
        ack: Option<oneshot::Sender<Vec<Value>>>,
    },
    Close,
}

/// Handles to a live connection
struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
    authenticated: Arc<AtomicBool>,
    driver: JoinHandle<()>,
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    session_id: String,
}

impl Link {
    /// Emit an event and wait for the server's acknowledgement
    async fn request(&self, name: &str, args: Vec<Value>) -> Result<Vec<Value>, ConnectError> {
        let (tx, rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Emit {
                name: name.to_string(),
                args,
                ack: Some(tx),
            })
            .map_err(|_| ConnectError::NotConnected)?;

        rx.await.map_err(|_| {
            ConnectError::Closed(format!("connection lost while awaiting {} ack", name))
        })
    }
}

/// Ordered stream of server pushes for one connection
///
/// Ends after yielding [`SessionEvent::Disconnected`].
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Next event in arrival order, or `None` once the connection is gone
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }
}

/// Client session with an Uptime Kuma server
///
/// # Example
///
/// ```rust,no_run
/// use kuma_connect::{CommandKind, Credentials, KumaSession, SessionEvent, SessionOptions};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let endpoint = Url::parse("http://localhost:3001")?;
/// let credentials = Credentials::new("admin", "changeme");
/// let mut session = KumaSession::new(endpoint, credentials, SessionOptions::default())?;
///
/// session.connect().await?;
/// let mut events = session.subscribe()?;
///
/// while let Some(event) = events.next().await {
///     if let SessionEvent::Heartbeat(hb) = event {
///         println!("monitor {} is {}", hb.monitor_id, hb.status);
///     }
/// }
/// session.issue_command(CommandKind::Resume, 42).await.ok();
/// session.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct KumaSession {
    endpoint: Url,
    ws_url: Url,
    credentials: Credentials,
    options: SessionOptions,
    link: Option<Link>,
}

impl KumaSession {
    /// Create a disconnected session for the given Kuma base URL
    pub fn new(
        endpoint: Url,
        credentials: Credentials,
        options: SessionOptions,
    ) -> Result<Self, ConnectError> {
        let ws_url = websocket_url(&endpoint)?;
        Ok(Self {
            endpoint,
            ws_url,
            credentials,
            options,
            link: None,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// True while the transport is up and login has been acknowledged
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .map(|link| link.authenticated.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Engine.IO session id of the current connection
    pub fn session_id(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.session_id.as_str())
    }

    /// Open the transport and log in
    ///
    /// Resolves only once the server has acknowledged the login. Any previous
    /// connection held by this session is torn down first.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Timeout`] if the whole sequence exceeds the connect timeout
    /// - [`ConnectError::Authentication`] if the server rejects the credentials
    /// - transport, handshake or protocol errors otherwise
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        self.disconnect().await;

        info!("Connecting to {}", self.endpoint);
        let limit = self.options.connect_timeout;

        let outcome = tokio::time::timeout(limit, self.establish()).await;
        match outcome {
            Ok(Ok(link)) => {
                self.link = Some(link);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectError::Timeout(limit)),
        }
    }

    async fn establish(&self) -> Result<Link, ConnectError> {
        let (mut ws, _response) = connect_async(self.ws_url.as_str()).await?;
        debug!("WebSocket open at {}, awaiting Engine.IO handshake", self.ws_url);

        let handshake = match EnginePacket::decode(&next_text(&mut ws).await?)? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(ConnectError::Handshake(format!(
                    "expected Engine.IO open packet, got {:?}",
                    other
                )))
            }
        };

        send_text(&mut ws, SocketPacket::Connect(None).to_frame()).await?;
        loop {
            match EnginePacket::decode(&next_text(&mut ws).await?)? {
                EnginePacket::Ping(data) => {
                    send_text(&mut ws, EnginePacket::Pong(data).encode()).await?
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect(_) => break,
                    SocketPacket::ConnectError(data) => {
                        return Err(ConnectError::Handshake(
                            SocketPacket::connect_error_message(&data),
                        ))
                    }
                    other => debug!("Ignoring {:?} before namespace connect", other),
                },
                EnginePacket::Close => {
                    return Err(ConnectError::Closed(
                        "server closed the connection during handshake".to_string(),
                    ))
                }
                _ => {}
            }
        }

        info!("Socket connected (sid={}), attempting login", handshake.sid);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let authenticated = Arc::new(AtomicBool::new(false));

        let driver = tokio::spawn(drive(
            ws,
            outbound_rx,
            event_tx,
            authenticated.clone(),
            handshake.liveness_window(),
        ));

        let link = Link {
            outbound: outbound_tx,
            authenticated,
            driver,
            events: Some(event_rx),
            session_id: handshake.sid,
        };

        let reply = link
            .request(
                "login",
                vec![json!({
                    "username": self.credentials.username,
                    "password": self.credentials.password.expose_secret(),
                })],
            )
            .await?;

        let ack = AckResponse::from_args(&reply);
        if ack.token_required {
            error!("Login failed: account requires a two-factor token");
            return Err(ConnectError::Authentication(
                "two-factor token required".to_string(),
            ));
        }
        if !ack.ok {
            let msg = ack.message_or("Login failed");
            error!("Login failed: {}", msg);
            return Err(ConnectError::Authentication(msg));
        }

        link.authenticated.store(true, Ordering::SeqCst);
        info!("Login successful as {}", self.credentials.username);

        Ok(link)
    }

    /// Take the ordered event queue for the current connection
    ///
    /// Events pushed between login and this call are buffered, not lost.
    pub fn subscribe(&mut self) -> Result<EventStream, ConnectError> {
        let link = self.link.as_mut().ok_or(ConnectError::NotConnected)?;
        let rx = link.events.take().ok_or(ConnectError::AlreadySubscribed)?;
        Ok(EventStream { rx })
    }

    /// Send a pause/resume command and wait for the server's verdict
    pub async fn issue_command(
        &self,
        kind: CommandKind,
        monitor_id: MonitorId,
    ) -> Result<(), CommandError> {
        let link = match &self.link {
            Some(link) if link.authenticated.load(Ordering::SeqCst) => link,
            _ => return Err(CommandError::not_connected(kind, monitor_id)),
        };

        debug!("Sending {} for monitor {}", kind.event_name(), monitor_id);

        let reply = link
            .request(kind.event_name(), vec![json!(monitor_id)])
            .await
            .map_err(|e| CommandError::new(kind, monitor_id, e.to_string()))?;

        let ack = AckResponse::from_args(&reply);
        if ack.ok {
            Ok(())
        } else {
            Err(CommandError::new(
                kind,
                monitor_id,
                ack.message_or(&format!("Failed to {}", kind.event_name())),
            ))
        }
    }

    pub async fn pause_monitor(&self, monitor_id: MonitorId) -> Result<(), CommandError> {
        self.issue_command(CommandKind::Pause, monitor_id).await
    }

    pub async fn resume_monitor(&self, monitor_id: MonitorId) -> Result<(), CommandError> {
        self.issue_command(CommandKind::Resume, monitor_id).await
    }

    /// Tear down the connection. No-op when already disconnected.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        info!("Disconnecting from {}", self.endpoint);
        link.authenticated.store(false, Ordering::SeqCst);
        let _ = link.outbound.send(Outbound::Close);

        let mut driver = link.driver;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut driver).await.is_err() {
            warn!("Socket driver did not stop within {:?}, aborting", SHUTDOWN_GRACE);
            driver.abort();
        }
    }
}

/// Why the driver loop ended
enum Exit {
    Requested,
    Lost(String),
}

/// Own the WebSocket until either side hangs up
async fn drive(
    mut ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SessionEvent>,
    authenticated: Arc<AtomicBool>,
    liveness: Duration,
) {
    let mut pending: HashMap<u64, oneshot::Sender<Vec<Value>>> = HashMap::new();
    let mut next_id: u64 = 0;

    let silence = tokio::time::sleep(liveness);
    tokio::pin!(silence);

    let exit = loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    silence.as_mut().reset(Instant::now() + liveness);
                    match handle_frame(text.as_str(), &mut ws, &mut pending, &events).await {
                        Ok(None) => {}
                        Ok(Some(reason)) => break Exit::Lost(reason),
                        Err(e) => break Exit::Lost(e.to_string()),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let detail = frame.map(|f| format!(" ({})", f.reason)).unwrap_or_default();
                    break Exit::Lost(format!("server closed the connection{}", detail));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Exit::Lost(format!("transport error: {}", e)),
                None => break Exit::Lost("transport closed".to_string()),
            },
            request = outbound.recv() => match request {
                Some(Outbound::Emit { name, args, ack }) => {
                    let id = ack.map(|tx| {
                        let id = next_id;
                        next_id += 1;
                        pending.insert(id, tx);
                        id
                    });
                    let frame = SocketPacket::event(name, args, id).to_frame();
                    if let Err(e) = send_text(&mut ws, frame).await {
                        break Exit::Lost(format!("send failed: {}", e));
                    }
                }
                Some(Outbound::Close) => {
                    let _ = send_text(&mut ws, SocketPacket::Disconnect.to_frame()).await;
                    break Exit::Requested;
                }
                None => break Exit::Requested,
            },
            _ = &mut silence => break Exit::Lost(format!("no ping from server within {:?}", liveness)),
        }
    };

    authenticated.store(false, Ordering::SeqCst);
    // Dropping the senders fails every in-flight request
    pending.clear();
    let _ = ws.close(None).await;

    let reason = match exit {
        Exit::Requested => {
            debug!("Socket closed by client");
            "closed by client".to_string()
        }
        Exit::Lost(reason) => {
            warn!("Socket disconnected: {}", reason);
            reason
        }
    };
    let _ = events.send(SessionEvent::Disconnected { reason });
}

/// Process one inbound text frame. `Ok(Some(reason))` ends the connection.
async fn handle_frame(
    frame: &str,
    ws: &mut WsStream,
    pending: &mut HashMap<u64, oneshot::Sender<Vec<Value>>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> Result<Option<String>, ConnectError> {
    let packet = match EnginePacket::decode(frame) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Skipping malformed frame: {}", e);
            return Ok(None);
        }
    };

    match packet {
        EnginePacket::Ping(data) => send_text(ws, EnginePacket::Pong(data).encode()).await?,
        EnginePacket::Close => return Ok(Some("server sent Engine.IO close".to_string())),
        EnginePacket::Message(body) => match SocketPacket::decode(&body) {
            Ok(SocketPacket::Event { name, args, .. }) => dispatch_event(&name, args, events),
            Ok(SocketPacket::Ack { id, args }) => match pending.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(args);
                }
                None => debug!("Ack for unknown request id {}", id),
            },
            Ok(SocketPacket::Disconnect) => {
                return Ok(Some("server disconnected the socket".to_string()))
            }
            Ok(other) => debug!("Ignoring packet {:?}", other),
            Err(e) => debug!("Skipping undecodable packet: {}", e),
        },
        EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
    }

    Ok(None)
}

/// Turn a server push into a session event
fn dispatch_event(name: &str, mut args: Vec<Value>, events: &mpsc::UnboundedSender<SessionEvent>) {
    let payload = if args.is_empty() {
        Value::Null
    } else {
        args.swap_remove(0)
    };

    let event = match name {
        "monitorList" => match Inventory::from_payload(&payload) {
            Ok(inventory) => {
                info!("Received monitor list ({} monitors)", inventory.len());
                SessionEvent::MonitorList(inventory)
            }
            Err(e) => {
                warn!("Ignoring monitor list: {}", e);
                return;
            }
        },
        "heartbeat" => match serde_json::from_value::<Heartbeat>(payload) {
            Ok(heartbeat) => SessionEvent::Heartbeat(heartbeat),
            Err(e) => {
                warn!("Ignoring malformed heartbeat: {}", e);
                return;
            }
        },
        other => {
            trace!("Ignoring server event {}", other);
            return;
        }
    };

    let _ = events.send(event);
}

async fn next_text(ws: &mut WsStream) -> Result<String, ConnectError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ConnectError::Closed(
                    "server closed the connection during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn send_text(ws: &mut WsStream, text: String) -> Result<(), ConnectError> {
    ws.send(Message::Text(text.into())).await?;
    Ok(())
}
