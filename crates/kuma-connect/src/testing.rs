//! Testing utilities: an in-process fake Uptime Kuma server
//!
//! `FakeKumaServer` speaks just enough Socket.IO to exercise a real
//! [`KumaSession`](crate::KumaSession) end to end: it checks credentials,
//! pushes the monitor list after login, records pause/resume commands and
//! lets a test push heartbeats or drop connections, either at once or in
//! the middle of a sweep.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kuma_connect::testing::FakeKumaServer;
//! use kuma_connect::{Credentials, Inventory, KumaSession, Monitor, SessionOptions};
//!
//! # async fn example() -> std::io::Result<()> {
//! let inventory: Inventory = vec![Monitor::new(1, "INTERNET-SENTINEL", "ping")].into_iter().collect();
//! let server = FakeKumaServer::start("admin", "changeme", inventory).await?;
//!
//! let mut session = KumaSession::new(
//!     server.url(),
//!     Credentials::new("admin", "changeme"),
//!     SessionOptions::default(),
//! ).unwrap();
//! session.connect().await.unwrap();
//! assert_eq!(server.logins(), 1);
//! # Ok(())
//! # }
//! ```

use crate::protocol::{EnginePacket, OpenHandshake, SocketPacket};
use crate::types::{CommandKind, Heartbeat, Inventory, MonitorId};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use url::Url;

/// A command the fake server received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedCommand {
    pub kind: CommandKind,
    pub monitor_id: MonitorId,
}

#[derive(Debug, Clone)]
enum Push {
    Heartbeat(Heartbeat),
    Drop,
}

struct ServerState {
    username: String,
    password: String,
    inventory: Mutex<Inventory>,
    commands: Mutex<Vec<RecordedCommand>>,
    failing: Mutex<HashSet<MonitorId>>,
    /// Total command count at which the carrying connection is dropped
    drop_at_command: Mutex<Option<usize>>,
    connections: AtomicUsize,
    login_attempts: AtomicUsize,
    logins: AtomicUsize,
    pongs: AtomicUsize,
}

impl ServerState {
    /// Build the ack body for a client event, `None` for events without a reply
    fn handle_event(&self, name: &str, args: &[Value], authenticated: &mut bool) -> Option<Value> {
        match name {
            "login" => {
                self.login_attempts.fetch_add(1, Ordering::SeqCst);
                let creds = args.first().cloned().unwrap_or(Value::Null);
                let ok = creds["username"] == self.username.as_str()
                    && creds["password"] == self.password.as_str();
                if ok {
                    *authenticated = true;
                    self.logins.fetch_add(1, Ordering::SeqCst);
                    Some(json!({"ok": true, "token": "fake-jwt"}))
                } else {
                    Some(json!({"ok": false, "msg": "Incorrect username or password.", "msgi18n": false}))
                }
            }
            "pauseMonitor" | "resumeMonitor" => {
                if !*authenticated {
                    return Some(json!({"ok": false, "msg": "You are not logged in."}));
                }
                let kind = if name == "pauseMonitor" {
                    CommandKind::Pause
                } else {
                    CommandKind::Resume
                };
                let monitor_id = args.first().and_then(Value::as_u64).unwrap_or_default();
                self.commands
                    .lock()
                    .unwrap()
                    .push(RecordedCommand { kind, monitor_id });

                if self.failing.lock().unwrap().contains(&monitor_id) {
                    Some(json!({"ok": false, "msg": "Monitor not found"}))
                } else if kind == CommandKind::Pause {
                    Some(json!({"ok": true, "msg": "Paused Successfully."}))
                } else {
                    Some(json!({"ok": true, "msg": "Resumed Successfully."}))
                }
            }
            _ => None,
        }
    }

    /// True once for the command that reaches the armed drop point
    fn take_drop_trigger(&self) -> bool {
        let mut trigger = self.drop_at_command.lock().unwrap();
        match *trigger {
            Some(at) if self.commands.lock().unwrap().len() >= at => {
                *trigger = None;
                true
            }
            _ => false,
        }
    }
}

/// In-process stand-in for an Uptime Kuma server
pub struct FakeKumaServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    pushes: broadcast::Sender<Push>,
    accept_task: JoinHandle<()>,
}

impl FakeKumaServer {
    /// Bind on an ephemeral localhost port and start accepting connections
    pub async fn start(
        username: impl Into<String>,
        password: impl Into<String>,
        inventory: Inventory,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(ServerState {
            username: username.into(),
            password: password.into(),
            inventory: Mutex::new(inventory),
            commands: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            drop_at_command: Mutex::new(None),
            connections: AtomicUsize::new(0),
            login_attempts: AtomicUsize::new(0),
            logins: AtomicUsize::new(0),
            pongs: AtomicUsize::new(0),
        });
        let (pushes, _) = broadcast::channel(64);

        let accept_state = state.clone();
        let accept_pushes = pushes.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                let pushes = accept_pushes.subscribe();
                tokio::spawn(serve_connection(stream, state, pushes));
            }
        });

        Ok(Self {
            addr,
            state,
            pushes,
            accept_task,
        })
    }

    /// Base URL a client should be configured with
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("socket address forms a valid URL")
    }

    /// Push a heartbeat to every authenticated connection
    pub fn push_heartbeat(&self, heartbeat: Heartbeat) {
        let _ = self.pushes.send(Push::Heartbeat(heartbeat));
    }

    /// Abruptly drop every open connection
    pub fn drop_connections(&self) {
        let _ = self.pushes.send(Push::Drop);
    }

    /// Reject future pause/resume commands for this monitor
    pub fn fail_commands_for(&self, monitor_id: MonitorId) {
        self.state.failing.lock().unwrap().insert(monitor_id);
    }

    /// Drop the connection that delivers the `n`th command from now
    ///
    /// That command is recorded but never acknowledged. Fires once.
    pub fn drop_on_command(&self, n: usize) {
        let at = self.state.commands.lock().unwrap().len() + n;
        *self.state.drop_at_command.lock().unwrap() = Some(at);
    }

    /// Replace the inventory sent to the next login
    pub fn set_inventory(&self, inventory: Inventory) {
        *self.state.inventory.lock().unwrap() = inventory;
    }

    /// Every command received, in order
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Monitor ids received for one command kind, in order
    pub fn commands_of(&self, kind: CommandKind) -> Vec<MonitorId> {
        self.commands()
            .into_iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.monitor_id)
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn login_attempts(&self) -> usize {
        self.state.login_attempts.load(Ordering::SeqCst)
    }

    /// Successful logins
    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    /// Pong replies received for server pings
    pub fn pongs(&self) -> usize {
        self.state.pongs.load(Ordering::SeqCst)
    }
}

impl Drop for FakeKumaServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

/// Poll `condition` every 10ms until it holds or `limit` elapses
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn serve_connection(
    stream: TcpStream,
    state: Arc<ServerState>,
    mut pushes: broadcast::Receiver<Push>,
) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let n = state.connections.fetch_add(1, Ordering::SeqCst) + 1;
    let sid = format!("fake-sid-{}", n);

    let open = OpenHandshake {
        sid: sid.clone(),
        upgrades: Vec::new(),
        ping_interval: 25_000,
        ping_timeout: 20_000,
        max_payload: Some(1_000_000),
    };
    if send(&mut ws, EnginePacket::Open(open).encode()).await.is_err() {
        return;
    }

    let mut authenticated = false;
    loop {
        tokio::select! {
            frame = ws.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                let body = match EnginePacket::decode(&text) {
                    Ok(EnginePacket::Message(body)) => body,
                    Ok(EnginePacket::Pong(_)) => {
                        state.pongs.fetch_add(1, Ordering::SeqCst);
                        continue;
                    }
                    Ok(EnginePacket::Close) => break,
                    _ => continue,
                };
                match SocketPacket::decode(&body) {
                    Ok(SocketPacket::Connect(_)) => {
                        let ack = SocketPacket::Connect(Some(json!({"sid": sid})));
                        if send(&mut ws, ack.to_frame()).await.is_err() {
                            break;
                        }
                    }
                    Ok(SocketPacket::Event { id, name, args }) => {
                        let was_authenticated = authenticated;
                        let reply = state.handle_event(&name, &args, &mut authenticated);
                        if state.take_drop_trigger() {
                            break;
                        }
                        if let (Some(id), Some(reply)) = (id, reply) {
                            let ack = SocketPacket::Ack { id, args: vec![reply] };
                            if send(&mut ws, ack.to_frame()).await.is_err() {
                                break;
                            }
                        }
                        if authenticated && !was_authenticated {
                            let payload = state.inventory.lock().unwrap().to_payload();
                            let list = SocketPacket::event("monitorList", vec![payload], None);
                            let ping = EnginePacket::Ping(String::new()).encode();
                            if send(&mut ws, list.to_frame()).await.is_err()
                                || send(&mut ws, ping).await.is_err()
                            {
                                break;
                            }
                        }
                    }
                    Ok(SocketPacket::Disconnect) => break,
                    _ => {}
                }
            }
            push = pushes.recv() => match push {
                Ok(Push::Heartbeat(heartbeat)) => {
                    if !authenticated {
                        continue;
                    }
                    let payload = serde_json::to_value(&heartbeat).unwrap_or(Value::Null);
                    let event = SocketPacket::event("heartbeat", vec![payload], None);
                    if send(&mut ws, event.to_frame()).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Drop) | Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => {}
            },
        }
    }
}

async fn send(
    ws: &mut WebSocketStream<TcpStream>,
    text: String,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    ws.send(Message::Text(text.into())).await
}
