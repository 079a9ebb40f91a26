//! Server network layer: reliable lobby connections, the shared datagram
//! socket and the simulation driver

use crate::action_queue::{ActionEvent, ActionQueue};
use crate::config::ServerConfig;
use crate::session::Session;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::framing::{read_packet, write_packet, FrameError};
use shared::protocol::{Channel, MAX_DATAGRAM_LEN};
use shared::{Packet, PlayerId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// How long `run` waits for connection tasks to flush after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// State shared between the connection tasks, the datagram reader and the
/// game loop.
///
/// Lock order: never hold `session` while waiting on `actions` or on a
/// socket. The two locks are taken one at a time.
pub struct ServerState {
    pub session: Mutex<Session>,
    pub actions: ActionQueue,
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(Session::new()),
            actions: ActionQueue::new(),
        }
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable trigger for the server-wide stop flag.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    pub fn trigger(&self) {
        self.0.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.0.subscribe()
    }
}

/// Resolves once the stop flag is set, including when it was set before
/// the receiver was created.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let triggered = *shutdown.borrow_and_update();
        if triggered || shutdown.changed().await.is_err() {
            return;
        }
    }
}

pub struct Server {
    listener: TcpListener,
    socket: Arc<UdpSocket>,
    state: Arc<ServerState>,
    config: ServerConfig,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Binds the stream listener and the datagram socket to the same address
    /// and port.
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        // Port 0 resolves on the listener first; the datagram socket follows it.
        let socket = Arc::new(UdpSocket::bind(local_addr).await?);
        info!("Server listening on {} (tcp and udp)", local_addr);

        Ok(Server {
            listener,
            socket,
            state: Arc::new(ServerState::new()),
            config,
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serves one session until the match ends or shutdown is triggered.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let datagram_task = tokio::spawn(run_datagram_reader(
            Arc::clone(&self.socket),
            Arc::clone(&self.state),
            self.shutdown.subscribe(),
        ));
        let game_task = tokio::spawn(run_game_loop(
            Arc::clone(&self.socket),
            Arc::clone(&self.state),
            self.config.clone(),
            self.shutdown.clone(),
        ));

        let mut connections = JoinSet::new();
        let mut shutdown = self.shutdown.subscribe();

        info!("Server started successfully");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        connections.spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&self.state),
                            self.shutdown.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                _ = stopped(&mut shutdown) => break,
            }
        }

        info!("Server shutting down");

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("Connections did not close in time, aborting them");
            connections.abort_all();
        }

        for (name, task) in [("datagram reader", datagram_task), ("game loop", game_task)] {
            if let Err(e) = task.await {
                error!("{} task failed: {}", name, e);
            }
        }

        Ok(())
    }
}

/// Serves one reliable connection from handshake to close.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = stream.into_split();

    let handshake = tokio::select! {
        result = read_packet(&mut reader) => result,
        _ = stopped(&mut shutdown) => return,
    };
    let nick = match handshake {
        Ok(Packet::JoinLobby { nick }) => nick,
        Ok(other) => {
            warn!(
                "Expected JoinLobby from {}, got {:?}",
                addr,
                other.packet_type()
            );
            return;
        }
        Err(e) => {
            warn!("Join handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (outbox, outbox_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(run_writer(writer, outbox_rx, addr));

    let joined = state.session.lock().await.join(&nick, addr, outbox);
    let player_id = match joined {
        Ok(player_id) => player_id,
        Err(e) => {
            info!("Refused '{}' from {}: {}", nick, addr, e);
            if let Err(e) = writer_task.await {
                error!("Writer task for refused {} failed: {}", addr, e);
            }
            return;
        }
    };

    read_lobby_messages(&mut reader, player_id, &state, &mut shutdown).await;

    if let Err(e) = writer_task.await {
        error!("Writer task for player {} failed: {}", player_id, e);
    }
}

async fn read_lobby_messages(
    reader: &mut OwnedReadHalf,
    player_id: PlayerId,
    state: &ServerState,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        let result = tokio::select! {
            result = read_packet(reader) => result,
            _ = stopped(shutdown) => {
                state.session.lock().await.release(player_id);
                return;
            }
        };

        match result {
            Ok(Packet::PlayerReady) => {
                state.session.lock().await.mark_ready(player_id);
            }
            Ok(Packet::PlayerLeave) => {
                state.session.lock().await.leave(player_id);
                return;
            }
            Ok(packet) if packet.channel() == Channel::Unreliable => {
                debug!(
                    "Dropping {:?} from player {}: not a reliable message",
                    packet.packet_type(),
                    player_id
                );
            }
            Ok(packet) => {
                debug!(
                    "Ignoring unexpected {:?} from player {}",
                    packet.packet_type(),
                    player_id
                );
            }
            Err(e) if e.is_recoverable() => {
                warn!("Dropping malformed message from player {}: {}", player_id, e);
            }
            Err(FrameError::Closed) => {
                info!("Player {} closed the connection", player_id);
                state.session.lock().await.leave(player_id);
                return;
            }
            Err(e) => {
                warn!("Connection to player {} failed: {}", player_id, e);
                state.session.lock().await.leave(player_id);
                return;
            }
        }
    }
}

/// Drains an outbox onto the stream. Ends when every sender is dropped.
async fn run_writer(
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<Packet>,
    addr: SocketAddr,
) {
    while let Some(packet) = outbox.recv().await {
        if let Err(e) = write_packet(&mut writer, &packet).await {
            warn!("Failed to send {:?} to {}: {}", packet.packet_type(), addr, e);
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of stream to {} failed: {}", addr, e);
    }
}

async fn run_datagram_reader(
    socket: Arc<UdpSocket>,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Oversized datagrams are truncated to this and then fail to decode.
    let mut buffer = [0u8; MAX_DATAGRAM_LEN + 1];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, addr)) => {
                    handle_datagram(&socket, &state, &buffer[..len], addr).await;
                }
                Err(e) => {
                    warn!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
            _ = stopped(&mut shutdown) => break,
        }
    }
}

/// Queues a player's action and echoes it to the other players.
///
/// Datagrams that fail to decode, are not `PlayerAction`, or come from an
/// address with no connected player are dropped without touching state.
pub async fn handle_datagram(
    socket: &UdpSocket,
    state: &ServerState,
    bytes: &[u8],
    addr: SocketAddr,
) -> Option<ActionEvent> {
    let action = match Packet::decode(bytes) {
        Ok(Packet::PlayerAction { action }) => action,
        Ok(other) => {
            debug!("Ignoring {:?} datagram from {}", other.packet_type(), addr);
            return None;
        }
        Err(e) => {
            debug!("Dropping malformed datagram from {}: {}", addr, e);
            return None;
        }
    };

    let (player_id, targets) = {
        let session = state.session.lock().await;
        let Some(player_id) = session.player_by_addr(addr) else {
            debug!("Datagram from unknown sender {}", addr);
            return None;
        };
        (player_id, session.unreliable_targets(Some(player_id)))
    };

    let event = ActionEvent::new(player_id, action);
    state.actions.push(event).await;
    send_datagrams(socket, &Packet::ActionPropagation { action, player_id }, &targets).await;
    Some(event)
}

async fn send_datagrams(socket: &UdpSocket, packet: &Packet, targets: &[SocketAddr]) {
    let bytes = match packet.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to encode {:?}: {}", packet.packet_type(), e);
            return;
        }
    };

    for &addr in targets {
        if let Err(e) = socket.send_to(&bytes, addr).await {
            warn!("Failed to send {:?} to {}: {}", packet.packet_type(), addr, e);
        }
    }
}

/// Fixed-rate simulation driver. Also emits `GameSync` every sync interval
/// while the match runs, and stops the server once the match is over.
async fn run_game_loop(
    socket: Arc<UdpSocket>,
    state: Arc<ServerState>,
    config: ServerConfig,
    shutdown: ShutdownHandle,
) {
    let mut stop = shutdown.subscribe();
    let mut ticker = interval(config.tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut rng = StdRng::from_entropy();
    let max_delta = config.max_delta.as_secs_f32();
    let mut last_tick = Instant::now();
    let mut last_sync = last_tick;
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut stop) => break,
        }

        let now = Instant::now();
        let mut dt = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;

        if dt > max_delta {
            warn!(
                "Large tick delta ({:.3}s), capping to {:.3}s",
                dt, max_delta
            );
            dt = max_delta;
        }

        let events = state.actions.drain().await;

        let (report, sync) = {
            let mut session = state.session.lock().await;
            session.apply_actions(&events);
            let report = session.advance(dt, &mut rng);

            let sync = if now.duration_since(last_sync) >= config.sync_interval {
                last_sync = now;
                session
                    .sync_packet()
                    .map(|packet| (packet, session.unreliable_targets(None)))
            } else {
                None
            };
            (report, sync)
        };

        if let Some((packet, targets)) = sync {
            send_datagrams(&socket, &packet, &targets).await;
        }

        ticks += 1;
        if ticks % 600 == 0 {
            debug!("Tick {}: {:.1}Hz", ticks, 1.0 / dt.max(f32::EPSILON));
        }

        if report.match_over {
            info!("Match over, stopping server");
            shutdown.trigger();
            break;
        }
    }
}
