//! Lobby and match state for the single session a server hosts
//!
//! The session owns the four player slots and the authoritative [`GameState`].
//! It moves through `Empty -> Filling -> AllReady -> Running -> Ended` and
//! never goes back. Every reliable message a player receives is produced
//! here and pushed into that player's outbox; a per-connection writer task
//! drains the outbox onto the stream.

use crate::action_queue::ActionEvent;
use log::{debug, info};
use rand::Rng;
use shared::protocol::truncate_nick;
use shared::{Action, GameState, Packet, PlayerId, TickReport, Wall, MAX_PLAYERS};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;

/// Queue of reliable messages for one connection.
pub type Outbox = mpsc::UnboundedSender<Packet>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Empty,
    Filling,
    AllReady,
    Running,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unallocated,
    Connected,
    /// The player left. The slot stays taken until the server restarts.
    Disconnected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("all player slots are taken")]
    LobbyFull,
    #[error("the match has already started")]
    MatchStarted,
}

/// One of the four seats at the table
#[derive(Debug)]
pub struct PlayerSlot {
    pub id: PlayerId,
    pub wall: Wall,
    pub state: SlotState,
    pub nick: String,
    pub ready: bool,
    /// Peer address of the reliable connection. Datagrams from this exact
    /// address are attributed to the slot.
    pub addr: Option<SocketAddr>,
    outbox: Option<Outbox>,
}

impl PlayerSlot {
    fn new(id: PlayerId) -> Self {
        Self {
            id,
            wall: Wall::for_player(id),
            state: SlotState::Unallocated,
            nick: String::new(),
            ready: false,
            addr: None,
            outbox: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SlotState::Connected
    }

    /// Queues a reliable message. A closed outbox is not an error: the
    /// reader side of that connection will notice and leave.
    fn send(&self, packet: Packet) {
        if let Some(outbox) = &self.outbox {
            if outbox.send(packet).is_err() {
                debug!("Outbox of player {} is closed", self.id);
            }
        }
    }
}

pub struct Session {
    slots: [PlayerSlot; MAX_PLAYERS],
    game: GameState,
    phase: SessionPhase,
}

impl Session {
    pub fn new() -> Self {
        Self {
            slots: [
                PlayerSlot::new(0),
                PlayerSlot::new(1),
                PlayerSlot::new(2),
                PlayerSlot::new(3),
            ],
            game: GameState::new(),
            phase: SessionPhase::Empty,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Direct access to the simulation, for scripted scenarios.
    pub fn game_mut(&mut self) -> &mut GameState {
        &mut self.game
    }

    pub fn slot(&self, player_id: PlayerId) -> Option<&PlayerSlot> {
        self.slots.get(player_id)
    }

    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_connected()).count()
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Seats a new player in the lowest unallocated slot.
    ///
    /// The joiner first hears its own `PlayerJoined`, then one `PlayerJoined`
    /// for every other connected player (plus `ReadyPropagation` for those
    /// already ready). Everyone else hears the joiner's `PlayerJoined`.
    /// On error the outbox is dropped, which closes the connection.
    pub fn join(
        &mut self,
        nick: &str,
        addr: SocketAddr,
        outbox: Outbox,
    ) -> Result<PlayerId, JoinError> {
        if matches!(self.phase, SessionPhase::Running | SessionPhase::Ended) {
            return Err(JoinError::MatchStarted);
        }

        let player_id = self
            .slots
            .iter()
            .position(|slot| slot.state == SlotState::Unallocated)
            .ok_or(JoinError::LobbyFull)?;

        let nick = truncate_nick(nick).to_string();
        {
            let slot = &mut self.slots[player_id];
            slot.state = SlotState::Connected;
            slot.nick = nick.clone();
            slot.ready = false;
            slot.addr = Some(addr);
            slot.outbox = Some(outbox);
        }
        self.phase = SessionPhase::Filling;

        let joined = Packet::PlayerJoined {
            player_id,
            nick: nick.clone(),
        };
        self.slots[player_id].send(joined.clone());
        for other in self.slots.iter().filter(|s| s.id != player_id && s.is_connected()) {
            self.slots[player_id].send(Packet::PlayerJoined {
                player_id: other.id,
                nick: other.nick.clone(),
            });
            if other.ready {
                self.slots[player_id].send(Packet::ReadyPropagation {
                    player_id: other.id,
                });
            }
        }
        self.broadcast(&joined, Some(player_id));

        info!(
            "Player {} '{}' joined from {} ({:?} wall)",
            player_id, nick, addr, self.slots[player_id].wall
        );
        Ok(player_id)
    }

    /// Marks a player ready and starts the match once all four connected
    /// players are ready. Returns true only on the call that started it.
    pub fn mark_ready(&mut self, player_id: PlayerId) -> bool {
        if self.phase != SessionPhase::Filling {
            debug!("Ignoring ready from player {} in {:?}", player_id, self.phase);
            return false;
        }

        let Some(slot) = self.slots.get_mut(player_id) else {
            return false;
        };
        if !slot.is_connected() || slot.ready {
            return false;
        }
        slot.ready = true;
        info!("Player {} is ready", player_id);

        self.broadcast(&Packet::ReadyPropagation { player_id }, Some(player_id));

        if self.slots.iter().all(|slot| slot.is_connected() && slot.ready) {
            self.phase = SessionPhase::AllReady;
            self.start_match();
            return true;
        }
        false
    }

    fn start_match(&mut self) {
        self.phase = SessionPhase::Running;
        self.game.running = true;
        self.broadcast(&Packet::GameStart, None);
        info!("All players ready, match started");
    }

    /// Handles an explicit leave or a lost reliable connection.
    ///
    /// The slot keeps its id; the paddle stops where it is.
    pub fn leave(&mut self, player_id: PlayerId) -> bool {
        let Some(slot) = self.slots.get_mut(player_id) else {
            return false;
        };
        if !slot.is_connected() {
            return false;
        }
        slot.state = SlotState::Disconnected;
        slot.ready = false;
        slot.outbox = None;
        self.game.set_action(player_id, Action::Stop);

        self.broadcast(&Packet::PlayerLeft { player_id }, Some(player_id));
        info!("Player {} left", player_id);
        true
    }

    /// Drops the outbox so the writer task can flush and exit.
    pub fn release(&mut self, player_id: PlayerId) {
        if let Some(slot) = self.slots.get_mut(player_id) {
            slot.outbox = None;
        }
    }

    pub fn player_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.slots
            .iter()
            .find(|slot| slot.is_connected() && slot.addr == Some(addr))
            .map(|slot| slot.id)
    }

    /// Datagram destinations of every connected player except `exclude`.
    pub fn unreliable_targets(&self, exclude: Option<PlayerId>) -> Vec<SocketAddr> {
        self.slots
            .iter()
            .filter(|slot| slot.is_connected() && Some(slot.id) != exclude)
            .filter_map(|slot| slot.addr)
            .collect()
    }

    /// Applies queued actions in order, so the last one per player wins.
    pub fn apply_actions(&mut self, events: &[ActionEvent]) {
        if !self.is_running() {
            return;
        }
        for event in events {
            self.game.set_action(event.player_id, event.action);
        }
    }

    /// Runs one simulation step and ends the session when the match is over.
    pub fn advance<R: Rng + ?Sized>(&mut self, dt: f32, rng: &mut R) -> TickReport {
        let report = self.game.tick(dt, rng);
        if let Some(player_id) = report.scored_against {
            info!(
                "Player {} conceded, scores now {:?}",
                player_id, self.game.scores
            );
        }
        if report.match_over {
            self.finish();
        }
        report
    }

    pub fn sync_packet(&self) -> Option<Packet> {
        self.is_running()
            .then(|| Packet::GameSync(self.game.snapshot()))
    }

    /// Sends the final scores to every connected player and closes all
    /// outboxes.
    pub fn finish(&mut self) {
        if self.phase == SessionPhase::Ended {
            return;
        }
        self.phase = SessionPhase::Ended;
        self.game.running = false;

        let scores = self.game.final_scores();
        info!("Match ended with scores {:?}", self.game.scores);
        self.broadcast(&Packet::GameEnd { scores }, None);
        for slot in self.slots.iter_mut() {
            slot.outbox = None;
        }
    }

    fn broadcast(&self, packet: &Packet, exclude: Option<PlayerId>) {
        for slot in self
            .slots
            .iter()
            .filter(|slot| slot.is_connected() && Some(slot.id) != exclude)
        {
            slot.send(packet.clone());
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
