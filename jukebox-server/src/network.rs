//! Network handling for the jukebox server
//!
//! Every socket gets its own task that only parses and serializes. All
//! decoded events go through one channel to the task that owns the
//! `Jukebox`, which handles them one at a time.

use crate::metrics::{LogLevel, Metrics, ServerStatus};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use jukebox_core::{
    ClientEvent, ConnectionId, EventSink, FileStore, Jukebox, JukeboxConfig, ServerEvent, SystemClock,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Events a socket may fall behind by before it is dropped
const OUTBOUND_BUFFER: usize = 256;

/// Server settings resolved from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub jukebox: JukeboxConfig,
}

/// Work for the jukebox task
#[derive(Debug)]
enum Command {
    Connected {
        connection: ConnectionId,
        outbound: mpsc::Sender<ServerEvent>,
    },
    Event {
        connection: ConnectionId,
        event: ClientEvent,
    },
    Disconnected {
        connection: ConnectionId,
    },
}

/// Outbound channels of all open sockets.
///
/// Sends never wait. A socket whose buffer is full is cut off: its sender is
/// dropped, the socket task sees the channel close and disconnects.
#[derive(Default)]
pub struct Connections {
    outbound: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
}

impl Connections {
    fn insert(&self, connection: ConnectionId, outbound: mpsc::Sender<ServerEvent>) {
        self.outbound.write().insert(connection, outbound);
    }

    fn remove(&self, connection: ConnectionId) {
        self.outbound.write().remove(&connection);
    }

    fn drop_lagging(&self, lagging: Vec<ConnectionId>) {
        if lagging.is_empty() {
            return;
        }
        let mut outbound = self.outbound.write();
        for connection in lagging {
            warn!("Dropping {}: too slow to keep up", connection);
            outbound.remove(&connection);
        }
    }
}

impl EventSink for Connections {
    fn send(&self, connection: ConnectionId, event: ServerEvent) {
        let full = match self.outbound.read().get(&connection) {
            Some(outbound) => matches!(outbound.try_send(event), Err(TrySendError::Full(_))),
            None => false,
        };
        if full {
            self.drop_lagging(vec![connection]);
        }
    }

    fn broadcast(&self, event: ServerEvent) {
        let lagging: Vec<_> = self
            .outbound
            .read()
            .iter()
            .filter(|(_, outbound)| matches!(outbound.try_send(event.clone()), Err(TrySendError::Full(_))))
            .map(|(connection, _)| *connection)
            .collect();
        self.drop_lagging(lagging);
    }
}

#[derive(Clone)]
struct AppState {
    commands: mpsc::UnboundedSender<Command>,
    next_connection: Arc<AtomicU64>,
}

/// Run the server until the listener fails
pub async fn run_server(config: ServerConfig, metrics: Arc<RwLock<Metrics>>) -> Result<(), Box<dyn Error>> {
    let store = FileStore::open(&config.data_dir)?;
    info!("Data directory: {}", config.data_dir.display());

    let connections = Arc::new(Connections::default());
    let jukebox = Jukebox::new(
        config.jukebox.clone(),
        Arc::new(store),
        Arc::new(SystemClock),
        Arc::clone(&connections),
    );

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_jukebox(
        jukebox,
        connections,
        command_rx,
        config.tick_interval,
        Arc::clone(&metrics),
    ));

    let state = AppState {
        commands: command_tx,
        next_connection: Arc::new(AtomicU64::new(1)),
    };
    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(e) => {
            let mut m = metrics.write();
            m.status = ServerStatus::Error;
            m.log(LogLevel::Error, format!("Cannot listen on {}: {}", address, e));
            return Err(e.into());
        }
    };

    info!("Listening on ws://{}/ws", address);
    {
        let mut m = metrics.write();
        m.status = ServerStatus::Running;
        m.log(LogLevel::Info, format!("Listening on ws://{}/ws", address));
        if let Some(timeout) = config.jukebox.stall_timeout {
            m.log(LogLevel::Info, format!("Stall guard: {}s", timeout.as_secs()));
        }
    }

    axum::serve(listener, app).await?;
    Ok(())
}

/// Owns the jukebox and handles every command to completion
async fn run_jukebox(
    mut jukebox: Jukebox<Arc<Connections>>,
    connections: Arc<Connections>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    tick_interval: Duration,
    metrics: Arc<RwLock<Metrics>>,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                jukebox.tick();
            }

            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };

                match command {
                    Command::Connected { connection, outbound } => {
                        info!("Connected: {}", connection);
                        connections.insert(connection, outbound);
                        metrics.write().connection_opened(connection);
                    }

                    Command::Event { connection, event } => {
                        jukebox.handle(connection, event);
                    }

                    Command::Disconnected { connection } => {
                        info!("Disconnected: {}", connection);
                        connections.remove(connection);
                        jukebox.disconnect(connection);
                        metrics.write().connection_closed(connection);
                    }
                }
            }
        }

        let snapshot = jukebox.snapshot();
        let host_attached = jukebox.registry().has_host();
        metrics
            .write()
            .observe(snapshot, jukebox.stats().clone(), host_attached);
    }

    warn!("Command channel closed, jukebox stopped");
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let connection = ConnectionId(state.next_connection.fetch_add(1, Ordering::Relaxed));
    ws.on_upgrade(move |socket| handle_socket(socket, state, connection))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, connection: ConnectionId) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let connected = Command::Connected {
        connection,
        outbound: outbound_tx,
    };
    if state.commands.send(connected).is_err() {
        warn!("Jukebox is not running, dropping {}", connection);
        return;
    }

    loop {
        tokio::select! {
            event = outbound_rx.recv() => {
                let Some(event) = event else {
                    warn!("Outbound channel closed: {}", connection);
                    break;
                };
                if let Err(e) = send_event(&mut socket, &event).await {
                    warn!("Socket send error: {} err={}", connection, e);
                    break;
                }
            }

            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {} err={}", connection, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => {
                            if state.commands.send(Command::Event { connection, event }).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("Malformed message from {}: {}", connection, e);
                            let rejected = ServerEvent::Rejected {
                                reason: format!("malformed message: {}", e),
                            };
                            if send_event(&mut socket, &rejected).await.is_err() {
                                break;
                            }
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    let _ = state.commands.send(Command::Disconnected { connection });
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string(event)?;
    socket.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Run with plain logging (no dashboard)
pub async fn run_with_logging(config: ServerConfig, metrics: Arc<RwLock<Metrics>>) -> Result<(), Box<dyn Error>> {
    // Initialize tracing for logging mode
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=info".parse()?)
                .add_directive("jukebox_core=info".parse()?),
        )
        .init();

    run_server(config, metrics).await
}
