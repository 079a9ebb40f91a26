//! One-line scoreboard for logging the mirrored state.

use crate::game::{ClientGameState, ClientPhase};
use shared::{Wall, MAX_PLAYERS};
use std::fmt;

pub struct Scoreboard<'a>(pub &'a ClientGameState);

fn wall_letter(wall: Wall) -> char {
    match wall {
        Wall::North => 'N',
        Wall::East => 'E',
        Wall::South => 'S',
        Wall::West => 'W',
    }
}

impl Scoreboard<'_> {
    fn nick(&self, player_id: usize) -> &str {
        self.0
            .player(player_id)
            .map(|p| p.nick.as_str())
            .unwrap_or("-")
    }
}

impl fmt::Display for Scoreboard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0;
        let me = state.my_player_id();

        match state.phase() {
            ClientPhase::Lobby => {
                write!(f, "lobby")?;
                for id in 0..MAX_PLAYERS {
                    let marker = match state.player(id) {
                        Some(p) if !p.connected => " (left)",
                        Some(p) if p.ready => " (ready)",
                        _ => "",
                    };
                    let you = if id == me { "*" } else { "" };
                    write!(f, " | {}{}{}", you, self.nick(id), marker)?;
                }
                Ok(())
            }
            ClientPhase::Playing => {
                let game = state.game();
                write!(f, "ball ({:5.1}, {:5.1})", game.ball.x, game.ball.y)?;
                for paddle in game.paddles.iter() {
                    let id = paddle.player_id;
                    let you = if id == me { "*" } else { "" };
                    write!(
                        f,
                        " | {}{} {}:{} @{:.1}",
                        you,
                        wall_letter(paddle.wall),
                        self.nick(id),
                        game.scores[id],
                        paddle.position
                    )?;
                }
                Ok(())
            }
            ClientPhase::Finished => {
                write!(f, "final")?;
                for (id, score) in state.game().scores.iter().enumerate() {
                    write!(f, " | {}:{}", self.nick(id), score)?;
                }
                if let Some((winner, _)) = state
                    .game()
                    .scores
                    .iter()
                    .enumerate()
                    .filter(|(_, score)| **score > 0)
                    .max_by_key(|(_, score)| **score)
                {
                    write!(f, " | winner {}", self.nick(winner))?;
                }
                Ok(())
            }
        }
    }
}
