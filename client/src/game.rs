use log::{debug, info};
use shared::{Action, GameState, Packet, PlayerId, PlayerScore, SyncSnapshot, MAX_PLAYERS};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Lobby,
    Playing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyPlayer {
    pub nick: String,
    pub ready: bool,
    pub connected: bool,
}

/// The client's mirror of the match.
///
/// Only the local paddle is predicted. Other paddles follow propagated
/// actions, and every `GameSync` overwrites ball, paddles and scores with no
/// smoothing. The ball is never simulated locally.
#[derive(Debug, Clone)]
pub struct ClientGameState {
    my_player_id: PlayerId,
    players: [Option<LobbyPlayer>; MAX_PLAYERS],
    game: GameState,
    phase: ClientPhase,
    connected: bool,
    final_scores: Option<Vec<PlayerScore>>,
    last_sync: Option<Instant>,
    syncs_received: u64,
}

impl ClientGameState {
    pub fn new(my_player_id: PlayerId) -> Self {
        Self {
            my_player_id,
            players: Default::default(),
            game: GameState::new(),
            phase: ClientPhase::Lobby,
            connected: true,
            final_scores: None,
            last_sync: None,
            syncs_received: 0,
        }
    }

    pub fn my_player_id(&self) -> PlayerId {
        self.my_player_id
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&LobbyPlayer> {
        self.players.get(player_id).and_then(|p| p.as_ref())
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn final_scores(&self) -> Option<&[PlayerScore]> {
        self.final_scores.as_deref()
    }

    pub fn syncs_received(&self) -> u64 {
        self.syncs_received
    }

    pub fn last_sync(&self) -> Option<Instant> {
        self.last_sync
    }

    /// Routes one server message into the mirror.
    pub fn handle_packet(&mut self, packet: &Packet) {
        match packet {
            Packet::PlayerJoined { player_id, nick } => self.on_player_joined(*player_id, nick),
            Packet::ReadyPropagation { player_id } => {
                if let Some(Some(player)) = self.players.get_mut(*player_id) {
                    player.ready = true;
                }
                info!("Player {} is ready", player_id);
            }
            Packet::GameStart => {
                info!("Match started");
                self.phase = ClientPhase::Playing;
                self.game.running = true;
            }
            Packet::ActionPropagation { action, player_id } => {
                self.apply_propagation(*player_id, *action)
            }
            Packet::GameSync(snapshot) => self.apply_sync(snapshot),
            Packet::GameEnd { scores } => self.on_game_end(scores),
            Packet::PlayerLeft { player_id } => {
                if let Some(Some(player)) = self.players.get_mut(*player_id) {
                    player.connected = false;
                    player.ready = false;
                }
                self.game.set_action(*player_id, Action::Stop);
                info!("Player {} left", player_id);
            }
            other => debug!("Ignoring {:?} from server", other.packet_type()),
        }
    }

    fn on_player_joined(&mut self, player_id: PlayerId, nick: &str) {
        let Some(slot) = self.players.get_mut(player_id) else {
            return;
        };
        *slot = Some(LobbyPlayer {
            nick: nick.to_string(),
            ready: false,
            connected: true,
        });
        if player_id == self.my_player_id {
            info!("Joined as player {} '{}'", player_id, nick);
        } else {
            info!("Player {} '{}' joined", player_id, nick);
        }
    }

    fn on_game_end(&mut self, scores: &[PlayerScore]) {
        for entry in scores {
            if let Some(score) = self.game.scores.get_mut(entry.player_id) {
                *score = entry.score;
            }
        }
        self.phase = ClientPhase::Finished;
        self.game.running = false;
        self.final_scores = Some(scores.to_vec());
        info!("Match over, final scores {:?}", self.game.scores);
    }

    /// Predicts the local paddle. Never rolled back; the next sync corrects it.
    ///
    /// Returns `false` and changes nothing outside a running match, since the
    /// server discards actions it receives before the start.
    pub fn apply_local_action(&mut self, action: Action) -> bool {
        if self.phase != ClientPhase::Playing {
            return false;
        }
        self.game.set_action(self.my_player_id, action);
        true
    }

    /// Echoes of the local player's own action are ignored; its paddle is
    /// already predicted.
    pub fn apply_propagation(&mut self, player_id: PlayerId, action: Action) {
        if player_id == self.my_player_id {
            return;
        }
        self.game.set_action(player_id, action);
    }

    pub fn apply_sync(&mut self, snapshot: &SyncSnapshot) {
        self.game.apply_snapshot(snapshot);
        self.last_sync = Some(Instant::now());
        self.syncs_received += 1;
    }

    /// Moves paddles by their intents between syncs. The ball stays where
    /// the last sync put it.
    pub fn integrate(&mut self, dt: f32) {
        if self.phase != ClientPhase::Playing {
            return;
        }
        for paddle in self.game.paddles.iter_mut() {
            paddle.update(dt);
        }
    }

    pub fn disconnected(&mut self) {
        self.connected = false;
    }
}
