//! Wire protocol shared by both transports.
//!
//! Every message is a one-byte tag followed by a fixed-size payload. Payloads
//! are plain structs serialized by bincode with fixed-width integers in
//! little-endian order, so their size depends only on the tag:
//!
//! | Tag | Packet              | Payload bytes | Channel    |
//! |-----|---------------------|---------------|------------|
//! | 3   | `JoinLobby`         | 25            | reliable   |
//! | 4   | `PlayerJoined`      | 29            | reliable   |
//! | 5   | `PlayerReady`       | 0             | reliable   |
//! | 6   | `ReadyPropagation`  | 4             | reliable   |
//! | 7   | `GameStart`         | 0             | reliable   |
//! | 8   | `PlayerAction`      | 4             | unreliable |
//! | 9   | `ActionPropagation` | 8             | unreliable |
//! | 10  | `GameEnd`           | 36            | reliable   |
//! | 11  | `PlayerLeave`       | 0             | reliable   |
//! | 12  | `PlayerLeft`        | 4             | reliable   |
//! | 13  | `GameSync`          | 48            | unreliable |

use crate::{PlayerId, MAX_PLAYERS};
use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

pub const MAX_NICK_LEN: usize = 20;
/// Nickname buffer on the wire: 20 visible bytes plus a NUL terminator.
pub const NICK_BUFFER_LEN: usize = MAX_NICK_LEN + 1;

/// Largest datagram either side ever sends.
pub const MAX_DATAGRAM_LEN: usize = 1 + 48;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown packet tag {0}")]
    UnknownTag(u8),
    #[error("{tag:?} payload needs {expected} bytes, got {actual}")]
    Truncated {
        tag: PacketType,
        expected: usize,
        actual: usize,
    },
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: i32 },
    #[error("payload encoding failed: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Which transport a packet type is allowed to travel on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Reliable,
    Unreliable,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    JoinLobby = 3,
    PlayerJoined = 4,
    PlayerReady = 5,
    ReadyPropagation = 6,
    GameStart = 7,
    PlayerAction = 8,
    ActionPropagation = 9,
    GameEnd = 10,
    PlayerLeave = 11,
    PlayerLeft = 12,
    GameSync = 13,
}

impl PacketType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        let packet_type = match tag {
            3 => PacketType::JoinLobby,
            4 => PacketType::PlayerJoined,
            5 => PacketType::PlayerReady,
            6 => PacketType::ReadyPropagation,
            7 => PacketType::GameStart,
            8 => PacketType::PlayerAction,
            9 => PacketType::ActionPropagation,
            10 => PacketType::GameEnd,
            11 => PacketType::PlayerLeave,
            12 => PacketType::PlayerLeft,
            13 => PacketType::GameSync,
            _ => return None,
        };
        Some(packet_type)
    }

    /// Fixed payload size that follows the tag byte.
    pub fn payload_len(self) -> usize {
        match self {
            PacketType::JoinLobby => 4 + NICK_BUFFER_LEN,
            PacketType::PlayerJoined => 4 + 4 + NICK_BUFFER_LEN,
            PacketType::PlayerReady | PacketType::GameStart | PacketType::PlayerLeave => 0,
            PacketType::ReadyPropagation | PacketType::PlayerLeft | PacketType::PlayerAction => 4,
            PacketType::ActionPropagation => 8,
            PacketType::GameEnd => 4 + MAX_PLAYERS * 8,
            PacketType::GameSync => 4 * 4 + MAX_PLAYERS * 4 + MAX_PLAYERS * 4,
        }
    }

    pub fn channel(self) -> Channel {
        match self {
            PacketType::PlayerAction | PacketType::ActionPropagation | PacketType::GameSync => {
                Channel::Unreliable
            }
            _ => Channel::Reliable,
        }
    }
}

/// Discrete paddle command sent by a player. Doubles as a paddle's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    MoveLeft,
    MoveRight,
    #[default]
    Stop,
}

impl Action {
    pub fn to_wire(self) -> i32 {
        match self {
            Action::MoveLeft => 0,
            Action::MoveRight => 1,
            Action::Stop => 2,
        }
    }

    pub fn from_wire(value: i32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Action::MoveLeft),
            1 => Ok(Action::MoveRight),
            2 => Ok(Action::Stop),
            _ => Err(ProtocolError::InvalidField {
                field: "action",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub score: i32,
}

/// Full authoritative state carried by `GameSync`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SyncSnapshot {
    pub ball_x: f32,
    pub ball_y: f32,
    pub ball_vx: f32,
    pub ball_vy: f32,
    pub paddle_positions: [f32; MAX_PLAYERS],
    pub scores: [i32; MAX_PLAYERS],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    JoinLobby { nick: String },
    PlayerJoined { player_id: PlayerId, nick: String },
    PlayerReady,
    ReadyPropagation { player_id: PlayerId },
    GameStart,
    PlayerAction { action: Action },
    ActionPropagation { action: Action, player_id: PlayerId },
    GameEnd { scores: Vec<PlayerScore> },
    PlayerLeave,
    PlayerLeft { player_id: PlayerId },
    GameSync(SyncSnapshot),
}

// Payload layouts. Field order is the byte order on the wire.

#[derive(Serialize, Deserialize)]
struct JoinLobbyWire {
    nick_length: i32,
    nick: [u8; NICK_BUFFER_LEN],
}

#[derive(Serialize, Deserialize)]
struct PlayerJoinedWire {
    player_id: i32,
    nick_length: i32,
    nick: [u8; NICK_BUFFER_LEN],
}

#[derive(Serialize, Deserialize)]
struct PlayerIdWire {
    player_id: i32,
}

#[derive(Serialize, Deserialize)]
struct PlayerActionWire {
    action: i32,
}

#[derive(Serialize, Deserialize)]
struct ActionPropagationWire {
    action: i32,
    player_id: i32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Default)]
struct PlayerScoreWire {
    player_id: i32,
    score: i32,
}

#[derive(Serialize, Deserialize)]
struct GameEndWire {
    scores_len: i32,
    scores: [PlayerScoreWire; MAX_PLAYERS],
}

#[derive(Serialize, Deserialize)]
struct GameSyncWire {
    ball_x: f32,
    ball_y: f32,
    ball_velocity_x: f32,
    ball_velocity_y: f32,
    paddle_positions: [f32; MAX_PLAYERS],
    scores: [i32; MAX_PLAYERS],
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .allow_trailing_bytes()
}

fn put<T: Serialize>(buf: &mut Vec<u8>, payload: &T) -> Result<(), ProtocolError> {
    wire_options().serialize_into(buf, payload)?;
    Ok(())
}

fn take<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    Ok(wire_options().deserialize(payload)?)
}

fn player_id_to_wire(player_id: PlayerId) -> i32 {
    player_id as i32
}

fn player_id_from_wire(value: i32) -> Result<PlayerId, ProtocolError> {
    if (0..MAX_PLAYERS as i32).contains(&value) {
        Ok(value as PlayerId)
    } else {
        Err(ProtocolError::InvalidField {
            field: "player_id",
            value,
        })
    }
}

/// Packs a nickname into the fixed buffer, truncating to `MAX_NICK_LEN`
/// bytes on a character boundary. Returns the declared length and buffer.
pub fn encode_nick(nick: &str) -> (i32, [u8; NICK_BUFFER_LEN]) {
    let truncated = truncate_nick(nick);
    let mut buf = [0u8; NICK_BUFFER_LEN];
    buf[..truncated.len()].copy_from_slice(truncated.as_bytes());
    (truncated.len() as i32, buf)
}

/// Unpacks a nickname without trusting the declared length: the result never
/// reads past `MAX_NICK_LEN` bytes or the first NUL.
pub fn decode_nick(declared: i32, buf: &[u8; NICK_BUFFER_LEN]) -> Result<String, ProtocolError> {
    if declared < 0 {
        return Err(ProtocolError::InvalidField {
            field: "nick_length",
            value: declared,
        });
    }
    let terminator = buf.iter().position(|&b| b == 0).unwrap_or(MAX_NICK_LEN);
    let len = (declared as usize).min(MAX_NICK_LEN).min(terminator);
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}

pub fn truncate_nick(nick: &str) -> &str {
    if nick.len() <= MAX_NICK_LEN {
        return nick;
    }
    let mut end = MAX_NICK_LEN;
    while !nick.is_char_boundary(end) {
        end -= 1;
    }
    &nick[..end]
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::JoinLobby { .. } => PacketType::JoinLobby,
            Packet::PlayerJoined { .. } => PacketType::PlayerJoined,
            Packet::PlayerReady => PacketType::PlayerReady,
            Packet::ReadyPropagation { .. } => PacketType::ReadyPropagation,
            Packet::GameStart => PacketType::GameStart,
            Packet::PlayerAction { .. } => PacketType::PlayerAction,
            Packet::ActionPropagation { .. } => PacketType::ActionPropagation,
            Packet::GameEnd { .. } => PacketType::GameEnd,
            Packet::PlayerLeave => PacketType::PlayerLeave,
            Packet::PlayerLeft { .. } => PacketType::PlayerLeft,
            Packet::GameSync(_) => PacketType::GameSync,
        }
    }

    pub fn channel(&self) -> Channel {
        self.packet_type().channel()
    }

    /// Serializes the tag byte followed by the fixed payload.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let packet_type = self.packet_type();
        let mut buf = Vec::with_capacity(1 + packet_type.payload_len());
        buf.push(packet_type as u8);

        match self {
            Packet::JoinLobby { nick } => {
                let (nick_length, nick) = encode_nick(nick);
                put(&mut buf, &JoinLobbyWire { nick_length, nick })?;
            }
            Packet::PlayerJoined { player_id, nick } => {
                let (nick_length, nick) = encode_nick(nick);
                put(
                    &mut buf,
                    &PlayerJoinedWire {
                        player_id: player_id_to_wire(*player_id),
                        nick_length,
                        nick,
                    },
                )?;
            }
            Packet::PlayerReady | Packet::GameStart | Packet::PlayerLeave => {}
            Packet::ReadyPropagation { player_id } | Packet::PlayerLeft { player_id } => {
                put(
                    &mut buf,
                    &PlayerIdWire {
                        player_id: player_id_to_wire(*player_id),
                    },
                )?;
            }
            Packet::PlayerAction { action } => {
                put(
                    &mut buf,
                    &PlayerActionWire {
                        action: action.to_wire(),
                    },
                )?;
            }
            Packet::ActionPropagation { action, player_id } => {
                put(
                    &mut buf,
                    &ActionPropagationWire {
                        action: action.to_wire(),
                        player_id: player_id_to_wire(*player_id),
                    },
                )?;
            }
            Packet::GameEnd { scores } => {
                let mut table = [PlayerScoreWire::default(); MAX_PLAYERS];
                let count = scores.len().min(MAX_PLAYERS);
                for (slot, entry) in table.iter_mut().zip(scores.iter()) {
                    *slot = PlayerScoreWire {
                        player_id: player_id_to_wire(entry.player_id),
                        score: entry.score,
                    };
                }
                put(
                    &mut buf,
                    &GameEndWire {
                        scores_len: count as i32,
                        scores: table,
                    },
                )?;
            }
            Packet::GameSync(snapshot) => {
                put(
                    &mut buf,
                    &GameSyncWire {
                        ball_x: snapshot.ball_x,
                        ball_y: snapshot.ball_y,
                        ball_velocity_x: snapshot.ball_vx,
                        ball_velocity_y: snapshot.ball_vy,
                        paddle_positions: snapshot.paddle_positions,
                        scores: snapshot.scores,
                    },
                )?;
            }
        }

        Ok(buf)
    }

    /// Parses one whole message: tag byte plus payload. Bytes past the
    /// tag's fixed payload are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (&tag, payload) = bytes.split_first().ok_or(ProtocolError::Empty)?;
        let packet_type = PacketType::from_u8(tag).ok_or(ProtocolError::UnknownTag(tag))?;
        Self::decode_payload(packet_type, payload)
    }

    /// Parses the payload of an already identified packet type.
    pub fn decode_payload(packet_type: PacketType, payload: &[u8]) -> Result<Self, ProtocolError> {
        let expected = packet_type.payload_len();
        if payload.len() < expected {
            return Err(ProtocolError::Truncated {
                tag: packet_type,
                expected,
                actual: payload.len(),
            });
        }

        let packet = match packet_type {
            PacketType::JoinLobby => {
                let wire: JoinLobbyWire = take(payload)?;
                Packet::JoinLobby {
                    nick: decode_nick(wire.nick_length, &wire.nick)?,
                }
            }
            PacketType::PlayerJoined => {
                let wire: PlayerJoinedWire = take(payload)?;
                Packet::PlayerJoined {
                    player_id: player_id_from_wire(wire.player_id)?,
                    nick: decode_nick(wire.nick_length, &wire.nick)?,
                }
            }
            PacketType::PlayerReady => Packet::PlayerReady,
            PacketType::GameStart => Packet::GameStart,
            PacketType::PlayerLeave => Packet::PlayerLeave,
            PacketType::ReadyPropagation => {
                let wire: PlayerIdWire = take(payload)?;
                Packet::ReadyPropagation {
                    player_id: player_id_from_wire(wire.player_id)?,
                }
            }
            PacketType::PlayerLeft => {
                let wire: PlayerIdWire = take(payload)?;
                Packet::PlayerLeft {
                    player_id: player_id_from_wire(wire.player_id)?,
                }
            }
            PacketType::PlayerAction => {
                let wire: PlayerActionWire = take(payload)?;
                Packet::PlayerAction {
                    action: Action::from_wire(wire.action)?,
                }
            }
            PacketType::ActionPropagation => {
                let wire: ActionPropagationWire = take(payload)?;
                Packet::ActionPropagation {
                    action: Action::from_wire(wire.action)?,
                    player_id: player_id_from_wire(wire.player_id)?,
                }
            }
            PacketType::GameEnd => {
                let wire: GameEndWire = take(payload)?;
                if !(0..=MAX_PLAYERS as i32).contains(&wire.scores_len) {
                    return Err(ProtocolError::InvalidField {
                        field: "scores_len",
                        value: wire.scores_len,
                    });
                }
                let scores = wire.scores[..wire.scores_len as usize]
                    .iter()
                    .map(|entry| {
                        Ok(PlayerScore {
                            player_id: player_id_from_wire(entry.player_id)?,
                            score: entry.score,
                        })
                    })
                    .collect::<Result<Vec<_>, ProtocolError>>()?;
                Packet::GameEnd { scores }
            }
            PacketType::GameSync => {
                let wire: GameSyncWire = take(payload)?;
                Packet::GameSync(SyncSnapshot {
                    ball_x: wire.ball_x,
                    ball_y: wire.ball_y,
                    ball_vx: wire.ball_velocity_x,
                    ball_vy: wire.ball_velocity_y,
                    paddle_positions: wire.paddle_positions,
                    scores: wire.scores,
                })
            }
        };

        Ok(packet)
    }
}
