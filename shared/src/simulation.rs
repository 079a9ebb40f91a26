//! Authoritative arena simulation: one ball, four wall paddles, four scores.
//!
//! Coordinates run from `0` to `ARENA_SIZE` on both axes with `y` growing
//! southwards. Each paddle slides along its own wall; its `position` is the
//! along-wall coordinate of its centre.

use crate::protocol::{Action, PlayerScore, SyncSnapshot};
use crate::{
    PlayerId, ARENA_SIZE, BALL_RADIUS, BALL_SPEED, INITIAL_SCORE, MAX_PLAYERS, PADDLE_OFFSET,
    PADDLE_SIZE, PADDLE_SPEED,
};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    North,
    East,
    South,
    West,
}

impl Wall {
    /// Walls are handed out in join order: north, east, south, west.
    pub fn for_player(player_id: PlayerId) -> Self {
        match player_id % MAX_PLAYERS {
            0 => Wall::North,
            1 => Wall::East,
            2 => Wall::South,
            _ => Wall::West,
        }
    }

    /// Horizontal walls guard the y axis; their paddles slide along x.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Wall::North | Wall::South)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
}

impl Ball {
    pub fn new() -> Self {
        Self {
            x: ARENA_SIZE / 2.0,
            y: ARENA_SIZE / 2.0,
            vx: BALL_SPEED,
            vy: BALL_SPEED,
            radius: BALL_RADIUS,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        self.x += self.vx * dt;
        self.y += self.vy * dt;
    }

    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    /// Recentres the ball after a point.
    ///
    /// Only the vertical direction is randomised; the horizontal component is
    /// zeroed. This asymmetry is long-standing behaviour and is kept as is.
    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.x = ARENA_SIZE / 2.0;
        self.y = ARENA_SIZE / 2.0;
        self.vx = 0.0;
        self.vy = if rng.gen_bool(0.5) {
            BALL_SPEED
        } else {
            -BALL_SPEED
        };
    }
}

impl Default for Ball {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paddle {
    pub player_id: PlayerId,
    pub wall: Wall,
    pub position: f32,
    pub size: f32,
    pub intent: Action,
}

impl Paddle {
    pub fn new(player_id: PlayerId) -> Self {
        Self {
            player_id,
            wall: Wall::for_player(player_id),
            position: ARENA_SIZE / 2.0,
            size: PADDLE_SIZE,
            intent: Action::Stop,
        }
    }

    pub fn set_action(&mut self, action: Action) {
        self.intent = action;
    }

    pub fn update(&mut self, dt: f32) {
        match self.intent {
            Action::MoveLeft => self.position -= PADDLE_SPEED * dt,
            Action::MoveRight => self.position += PADDLE_SPEED * dt,
            Action::Stop => {}
        }
        self.clamp();
    }

    pub fn clamp(&mut self) {
        let half = self.size / 2.0;
        self.position = self.position.clamp(half, ARENA_SIZE - half);
    }

    pub fn span(&self) -> (f32, f32) {
        let half = self.size / 2.0;
        (self.position - half, self.position + half)
    }

    fn covers(&self, along: f32) -> bool {
        let (low, high) = self.span();
        along >= low && along <= high
    }
}

/// What happened during one simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub paddle_hit: Option<PlayerId>,
    pub scored_against: Option<PlayerId>,
    pub match_over: bool,
}

/// The single match instance: ball, paddles, scores and the running flag.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub ball: Ball,
    pub paddles: [Paddle; MAX_PLAYERS],
    pub scores: [i32; MAX_PLAYERS],
    pub running: bool,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            ball: Ball::new(),
            paddles: [Paddle::new(0), Paddle::new(1), Paddle::new(2), Paddle::new(3)],
            scores: [INITIAL_SCORE; MAX_PLAYERS],
            running: false,
        }
    }

    pub fn set_action(&mut self, player_id: PlayerId, action: Action) {
        if let Some(paddle) = self.paddles.get_mut(player_id) {
            paddle.set_action(action);
        }
    }

    /// Advances the match by `dt` seconds. Does nothing unless running.
    pub fn tick<R: Rng + ?Sized>(&mut self, dt: f32, rng: &mut R) -> TickReport {
        if !self.running {
            return TickReport::default();
        }

        for paddle in self.paddles.iter_mut() {
            paddle.update(dt);
        }
        self.ball.advance(dt);
        self.resolve_collisions(rng)
    }

    /// Paddles are tested in id order and the first hit wins; the walls are
    /// only tested when no paddle was hit.
    pub fn resolve_collisions<R: Rng + ?Sized>(&mut self, rng: &mut R) -> TickReport {
        let mut report = TickReport::default();

        if let Some(player_id) = (0..MAX_PLAYERS).find(|&id| self.paddle_collision(id)) {
            self.bounce_off(player_id);
            report.paddle_hit = Some(player_id);
            return report;
        }

        if let Some(player_id) = self.exited_wall() {
            self.scores[player_id] -= 1;
            self.ball.reset(rng);
            report.scored_against = Some(player_id);

            if self.alive_players() <= 1 {
                self.running = false;
                report.match_over = true;
            }
        }

        report
    }

    /// True when the ball's leading edge has crossed the paddle line while
    /// moving toward that wall and the ball lies within the paddle's span.
    pub fn paddle_collision(&self, player_id: PlayerId) -> bool {
        let Some(paddle) = self.paddles.get(player_id) else {
            return false;
        };
        let ball = &self.ball;

        match paddle.wall {
            Wall::North => {
                ball.vy < 0.0 && ball.y - ball.radius <= PADDLE_OFFSET && paddle.covers(ball.x)
            }
            Wall::South => {
                ball.vy > 0.0
                    && ball.y + ball.radius >= ARENA_SIZE - PADDLE_OFFSET
                    && paddle.covers(ball.x)
            }
            Wall::West => {
                ball.vx < 0.0 && ball.x - ball.radius <= PADDLE_OFFSET && paddle.covers(ball.y)
            }
            Wall::East => {
                ball.vx > 0.0
                    && ball.x + ball.radius >= ARENA_SIZE - PADDLE_OFFSET
                    && paddle.covers(ball.y)
            }
        }
    }

    /// Reflects off a paddle. Off-centre hits add spin along the wall; the
    /// resulting velocity is rescaled to exactly `BALL_SPEED`.
    pub fn bounce_off(&mut self, player_id: PlayerId) {
        let paddle = &self.paddles[player_id];
        let half = paddle.size / 2.0;
        let ball = &mut self.ball;

        if paddle.wall.is_horizontal() {
            let hit_pos = ((ball.x - paddle.position) / half).clamp(-1.0, 1.0);
            ball.vy = -ball.vy;
            ball.vx += hit_pos * BALL_SPEED * 0.5;
        } else {
            let hit_pos = ((ball.y - paddle.position) / half).clamp(-1.0, 1.0);
            ball.vx = -ball.vx;
            ball.vy += hit_pos * BALL_SPEED * 0.5;
        }

        let speed = ball.speed();
        if speed > 0.0 {
            ball.vx = ball.vx / speed * BALL_SPEED;
            ball.vy = ball.vy / speed * BALL_SPEED;
        }
    }

    /// Player whose wall the ball has left through, if any.
    pub fn exited_wall(&self) -> Option<PlayerId> {
        let ball = &self.ball;
        if ball.y <= 0.0 {
            Some(0)
        } else if ball.y >= ARENA_SIZE {
            Some(2)
        } else if ball.x <= 0.0 {
            Some(3)
        } else if ball.x >= ARENA_SIZE {
            Some(1)
        } else {
            None
        }
    }

    pub fn alive_players(&self) -> usize {
        self.scores.iter().filter(|&&score| score > 0).count()
    }

    pub fn final_scores(&self) -> Vec<PlayerScore> {
        self.scores
            .iter()
            .enumerate()
            .map(|(player_id, &score)| PlayerScore { player_id, score })
            .collect()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            ball_x: self.ball.x,
            ball_y: self.ball.y,
            ball_vx: self.ball.vx,
            ball_vy: self.ball.vy,
            paddle_positions: [
                self.paddles[0].position,
                self.paddles[1].position,
                self.paddles[2].position,
                self.paddles[3].position,
            ],
            scores: self.scores,
        }
    }

    /// Overwrites ball, paddle positions and scores. Intents are untouched.
    pub fn apply_snapshot(&mut self, snapshot: &SyncSnapshot) {
        self.ball.x = snapshot.ball_x;
        self.ball.y = snapshot.ball_y;
        self.ball.vx = snapshot.ball_vx;
        self.ball.vy = snapshot.ball_vy;
        for (paddle, &position) in self.paddles.iter_mut().zip(snapshot.paddle_positions.iter()) {
            paddle.position = position;
        }
        self.scores = snapshot.scores;
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn running_game() -> GameState {
        let mut game = GameState::new();
        game.running = true;
        game
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_initial_state() {
        let game = GameState::new();
        assert!(!game.running);
        assert_eq!(game.scores, [INITIAL_SCORE; MAX_PLAYERS]);
        assert_eq!(game.ball.x, ARENA_SIZE / 2.0);
        assert_eq!(game.ball.y, ARENA_SIZE / 2.0);
        for (id, paddle) in game.paddles.iter().enumerate() {
            assert_eq!(paddle.player_id, id);
            assert_eq!(paddle.position, ARENA_SIZE / 2.0);
            assert_eq!(paddle.intent, Action::Stop);
        }
    }

    #[test]
    fn test_walls_follow_join_order() {
        assert_eq!(Wall::for_player(0), Wall::North);
        assert_eq!(Wall::for_player(1), Wall::East);
        assert_eq!(Wall::for_player(2), Wall::South);
        assert_eq!(Wall::for_player(3), Wall::West);
    }

    #[test]
    fn test_tick_does_nothing_when_not_running() {
        let mut game = GameState::new();
        game.set_action(0, Action::MoveLeft);
        let before = game.clone();

        let report = game.tick(0.5, &mut rng());

        assert_eq!(report, TickReport::default());
        assert_eq!(game, before);
    }

    #[test]
    fn test_paddle_moves_with_intent() {
        let mut paddle = Paddle::new(0);
        paddle.set_action(Action::MoveRight);
        paddle.update(0.1);
        assert_approx_eq!(paddle.position, ARENA_SIZE / 2.0 + PADDLE_SPEED * 0.1, 1e-4);

        paddle.set_action(Action::MoveLeft);
        paddle.update(0.2);
        assert_approx_eq!(paddle.position, ARENA_SIZE / 2.0 - PADDLE_SPEED * 0.1, 1e-4);

        let stopped_at = paddle.position;
        paddle.set_action(Action::Stop);
        paddle.update(1.0);
        assert_eq!(paddle.position, stopped_at);
    }

    #[test]
    fn test_paddle_stays_in_range_for_any_dt() {
        let half = PADDLE_SIZE / 2.0;
        for action in [Action::MoveLeft, Action::MoveRight, Action::Stop] {
            for dt in [0.0, 0.001, 1.0 / 60.0, 0.5, 3.0, 1000.0] {
                for start in [half, 20.0, ARENA_SIZE / 2.0, ARENA_SIZE - half] {
                    let mut paddle = Paddle::new(1);
                    paddle.position = start;
                    paddle.set_action(action);
                    paddle.update(dt);
                    assert!(
                        paddle.position >= half && paddle.position <= ARENA_SIZE - half,
                        "{:?} dt={} start={} ended at {}",
                        action,
                        dt,
                        start,
                        paddle.position
                    );
                }
            }
        }
    }

    #[test]
    fn test_north_paddle_hit_flips_vertical_velocity() {
        let mut game = running_game();
        game.paddles[0].position = 40.0;
        game.ball.x = 40.0;
        game.ball.y = 0.0;
        game.ball.vx = 0.0;
        game.ball.vy = -BALL_SPEED;

        assert!(game.paddle_collision(0));
        let report = game.resolve_collisions(&mut rng());

        assert_eq!(report.paddle_hit, Some(0));
        assert_eq!(report.scored_against, None);
        assert!(game.ball.vy > 0.0);
        assert_eq!(game.scores[0], INITIAL_SCORE);
    }

    #[test]
    fn test_center_hit_adds_no_spin() {
        let mut game = running_game();
        game.paddles[2].position = 30.0;
        game.ball.x = 30.0;
        game.ball.y = ARENA_SIZE - 1.5;
        game.ball.vx = 0.0;
        game.ball.vy = BALL_SPEED;

        game.bounce_off(2);

        assert_approx_eq!(game.ball.vx, 0.0, 1e-6);
        assert_approx_eq!(game.ball.vy, -BALL_SPEED, 1e-4);
    }

    #[test]
    fn test_edge_hit_deflects() {
        let mut game = running_game();
        game.paddles[1].position = 40.0;
        game.ball.x = ARENA_SIZE - 1.5;
        game.ball.y = 40.0 + PADDLE_SIZE / 2.0;
        game.ball.vx = BALL_SPEED;
        game.ball.vy = 0.0;

        game.bounce_off(1);

        assert!(game.ball.vx < 0.0);
        assert!(game.ball.vy > 0.0);
    }

    #[test]
    fn test_speed_is_invariant_across_bounces() {
        let hits = [-1.0_f32, -0.6, -0.1, 0.0, 0.3, 0.9, 1.0];
        let velocities = [(BALL_SPEED, BALL_SPEED), (0.0, -BALL_SPEED), (-25.0, 4.0)];

        for player_id in 0..MAX_PLAYERS {
            for &hit in &hits {
                for &(vx, vy) in &velocities {
                    let mut game = running_game();
                    let along = 40.0 + hit * PADDLE_SIZE / 2.0;
                    game.paddles[player_id].position = 40.0;
                    if game.paddles[player_id].wall.is_horizontal() {
                        game.ball.x = along;
                    } else {
                        game.ball.y = along;
                    }
                    game.ball.vx = vx;
                    game.ball.vy = vy;

                    game.bounce_off(player_id);

                    assert_approx_eq!(game.ball.speed(), BALL_SPEED, 1e-3);
                }
            }
        }
    }

    #[test]
    fn test_paddle_priority_is_by_id() {
        // Ball in the north-west corner, inside both paddle 0 and paddle 3.
        let mut game = running_game();
        game.paddles[0].position = PADDLE_SIZE / 2.0;
        game.paddles[3].position = PADDLE_SIZE / 2.0;
        game.ball.x = 1.0;
        game.ball.y = 1.0;
        game.ball.vx = -BALL_SPEED;
        game.ball.vy = -BALL_SPEED;

        assert!(game.paddle_collision(0));
        assert!(game.paddle_collision(3));

        let report = game.resolve_collisions(&mut rng());
        assert_eq!(report.paddle_hit, Some(0));
        assert!(game.ball.vy > 0.0);
    }

    #[test]
    fn test_ball_leaving_paddle_is_not_hit_again() {
        let mut game = running_game();
        game.paddles[0].position = 40.0;
        game.ball.x = 40.0;
        game.ball.y = 1.5;
        game.ball.vx = 0.0;
        game.ball.vy = BALL_SPEED;

        assert!(!game.paddle_collision(0));
    }

    #[test]
    fn test_east_exit_scores_against_player_one_only() {
        let mut game = running_game();
        game.ball.x = ARENA_SIZE;
        game.ball.y = 70.0;
        game.ball.vx = BALL_SPEED;
        game.ball.vy = 0.0;

        let report = game.resolve_collisions(&mut rng());

        assert_eq!(report.scored_against, Some(1));
        assert_eq!(
            game.scores,
            [INITIAL_SCORE, INITIAL_SCORE - 1, INITIAL_SCORE, INITIAL_SCORE]
        );
    }

    #[test]
    fn test_each_wall_scores_against_its_owner() {
        let exits = [
            ((40.0, -0.5), 0),
            ((ARENA_SIZE + 0.5, 70.0), 1),
            ((40.0, ARENA_SIZE + 0.5), 2),
            ((-0.5, 70.0), 3),
        ];

        for ((x, y), owner) in exits {
            let mut game = running_game();
            // Park every paddle away from the exit point.
            for paddle in game.paddles.iter_mut() {
                paddle.position = if owner == 1 || owner == 3 { 10.0 } else { 70.0 };
            }
            game.ball.x = x;
            game.ball.y = y;

            let report = game.resolve_collisions(&mut rng());

            assert_eq!(report.scored_against, Some(owner));
            assert_eq!(game.scores[owner], INITIAL_SCORE - 1);
            assert_eq!(
                game.scores.iter().filter(|&&s| s == INITIAL_SCORE).count(),
                MAX_PLAYERS - 1
            );
        }
    }

    #[test]
    fn test_score_recenters_ball_with_vertical_serve() {
        let mut rng = rng();
        for _ in 0..20 {
            let mut game = running_game();
            game.ball.x = 10.0;
            game.ball.y = -1.0;
            game.ball.vx = 5.0;

            game.resolve_collisions(&mut rng);

            assert_eq!(game.ball.x, ARENA_SIZE / 2.0);
            assert_eq!(game.ball.y, ARENA_SIZE / 2.0);
            assert_eq!(game.ball.vx, 0.0);
            assert_eq!(game.ball.vy.abs(), BALL_SPEED);
        }
    }

    #[test]
    fn test_match_continues_while_two_players_alive() {
        let mut game = running_game();
        game.scores = [1, 2, 0, 0];
        game.ball.x = ARENA_SIZE + 1.0;
        game.ball.y = 70.0;

        let report = game.resolve_collisions(&mut rng());

        assert_eq!(game.scores, [1, 1, 0, 0]);
        assert!(!report.match_over);
        assert!(game.running);
    }

    #[test]
    fn test_match_ends_when_one_player_left() {
        let mut game = running_game();
        game.scores = [3, 1, 0, 0];
        game.ball.x = ARENA_SIZE + 1.0;
        game.ball.y = 70.0;

        let report = game.resolve_collisions(&mut rng());

        assert_eq!(report.scored_against, Some(1));
        assert!(report.match_over);
        assert!(!game.running);
        assert_eq!(game.alive_players(), 1);
    }

    #[test]
    fn test_full_tick_moves_paddles_then_ball() {
        let mut game = running_game();
        game.set_action(3, Action::MoveRight);
        let start = game.ball.clone();

        let report = game.tick(0.1, &mut rng());

        assert_eq!(report, TickReport::default());
        assert_approx_eq!(game.paddles[3].position, ARENA_SIZE / 2.0 + 5.0, 1e-4);
        assert_approx_eq!(game.ball.x, start.x + start.vx * 0.1, 1e-4);
        assert_approx_eq!(game.ball.y, start.y + start.vy * 0.1, 1e-4);
    }

    #[test]
    fn test_snapshot_round_trip_keeps_intents() {
        let mut source = running_game();
        source.ball.x = 3.0;
        source.ball.vy = -7.0;
        source.paddles[2].position = 12.0;
        source.scores = [4, 3, 2, 1];

        let mut mirror = GameState::new();
        mirror.set_action(1, Action::MoveLeft);
        mirror.apply_snapshot(&source.snapshot());

        assert_eq!(mirror.ball.x, 3.0);
        assert_eq!(mirror.ball.vy, -7.0);
        assert_eq!(mirror.paddles[2].position, 12.0);
        assert_eq!(mirror.scores, [4, 3, 2, 1]);
        assert_eq!(mirror.paddles[1].intent, Action::MoveLeft);
    }

    #[test]
    fn test_final_scores_table() {
        let mut game = GameState::new();
        game.scores = [2, 0, -1, 0];
        let table = game.final_scores();

        assert_eq!(table.len(), MAX_PLAYERS);
        assert_eq!(table[0], PlayerScore { player_id: 0, score: 2 });
        assert_eq!(table[2], PlayerScore { player_id: 2, score: -1 });
    }
}
