use crate::game::ClientGameState;
use log::{debug, info, warn};
use shared::framing::{read_packet, write_packet, FrameError};
use shared::protocol::{Channel, MAX_DATAGRAM_LEN};
use shared::{Action, Packet, PlayerId};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A joined player: the lobby connection, the datagram socket and the
/// mirrored state kept current by a background network task.
pub struct Client {
    writer: OwnedWriteHalf,
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    player_id: PlayerId,
    state: Arc<Mutex<ClientGameState>>,
    network_task: JoinHandle<()>,
}

impl Client {
    /// Connects, joins the lobby and starts the network task.
    ///
    /// Fails when the server cannot be reached or closes the connection
    /// instead of assigning a slot.
    pub async fn connect(server: &str, nick: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server).await?;
        let server_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;

        // The server attributes datagrams to the TCP peer address, so the
        // datagram socket must share it.
        let socket = Arc::new(UdpSocket::bind(local_addr).await?);
        info!("Connected to {} from {}", server_addr, local_addr);

        let (mut reader, mut writer) = stream.into_split();
        write_packet(
            &mut writer,
            &Packet::JoinLobby {
                nick: nick.to_string(),
            },
        )
        .await?;

        // The first reply is always the joiner's own seat.
        let (player_id, nick) = match read_packet(&mut reader).await {
            Ok(Packet::PlayerJoined { player_id, nick }) => (player_id, nick),
            Ok(other) => {
                return Err(format!("unexpected {:?} while joining", other.packet_type()).into())
            }
            Err(FrameError::Closed) => return Err("server refused to seat this player".into()),
            Err(e) => return Err(e.into()),
        };

        let mut mirror = ClientGameState::new(player_id);
        mirror.handle_packet(&Packet::PlayerJoined { player_id, nick });
        let state = Arc::new(Mutex::new(mirror));

        let network_task = tokio::spawn(run_network(
            reader,
            Arc::clone(&socket),
            server_addr,
            Arc::clone(&state),
        ));

        Ok(Client {
            writer,
            socket,
            server_addr,
            player_id,
            state,
            network_task,
        })
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn state(&self) -> Arc<Mutex<ClientGameState>> {
        Arc::clone(&self.state)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn ready(&mut self) -> Result<(), FrameError> {
        write_packet(&mut self.writer, &Packet::PlayerReady).await
    }

    /// Predicts the action locally, then sends it. There is no
    /// acknowledgement; the next sync corrects any divergence.
    ///
    /// Returns `Ok(false)` without sending while no match is running.
    pub async fn send_action(&self, action: Action) -> Result<bool, Box<dyn std::error::Error>> {
        if !self.state.lock().await.apply_local_action(action) {
            debug!("Not sending {:?} outside a running match", action);
            return Ok(false);
        }

        let bytes = Packet::PlayerAction { action }.encode()?;
        self.socket.send_to(&bytes, self.server_addr).await?;
        Ok(true)
    }

    /// Announces the leave and closes the connection.
    pub async fn leave(mut self) {
        if let Err(e) = write_packet(&mut self.writer, &Packet::PlayerLeave).await {
            debug!("Could not announce leave: {}", e);
        }
        if let Err(e) = self.writer.shutdown().await {
            debug!("Stream shutdown failed: {}", e);
        }
        if tokio::time::timeout(Duration::from_secs(1), &mut self.network_task)
            .await
            .is_err()
        {
            debug!("Network task still running after leave, aborting it");
        }
        info!("Left the game");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.network_task.abort();
    }
}

async fn next_reliable(mut reader: OwnedReadHalf) -> (OwnedReadHalf, Result<Packet, FrameError>) {
    let result = read_packet(&mut reader).await;
    (reader, result)
}

/// Feeds both inbound channels into the mirror until the server closes the
/// lobby connection.
async fn run_network(
    reader: OwnedReadHalf,
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    state: Arc<Mutex<ClientGameState>>,
) {
    let mut buffer = [0u8; MAX_DATAGRAM_LEN + 1];
    // Kept alive across datagram wake-ups so a partly read message is
    // never dropped.
    let mut reliable = Box::pin(next_reliable(reader));

    loop {
        tokio::select! {
            (reader, result) = &mut reliable => {
                match result {
                    Ok(packet) if packet.channel() == Channel::Reliable => {
                        state.lock().await.handle_packet(&packet);
                    }
                    Ok(packet) => {
                        debug!("Dropping {:?} received on the stream", packet.packet_type());
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!("Dropping malformed message from server: {}", e);
                    }
                    Err(e) => {
                        info!("Connection to server closed: {}", e);
                        state.lock().await.disconnected();
                        break;
                    }
                }
                reliable = Box::pin(next_reliable(reader));
            }
            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, from)) if from == server_addr => match Packet::decode(&buffer[..len]) {
                    Ok(packet) if packet.channel() == Channel::Unreliable => {
                        state.lock().await.handle_packet(&packet);
                    }
                    Ok(packet) => {
                        debug!("Dropping {:?} received as datagram", packet.packet_type());
                    }
                    Err(e) => debug!("Dropping malformed datagram: {}", e),
                },
                Ok((_, from)) => debug!("Ignoring datagram from {}", from),
                Err(e) => {
                    warn!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            },
        }
    }
}
