//! Integration tests for the networked match
//!
//! These run a real server on loopback and drive it with real clients.

use client::game::{ClientGameState, ClientPhase};
use client::input::{InputEvent, InputManager};
use client::network::Client;
use server::config::ServerConfig;
use server::network::{Server, ServerState, ShutdownHandle};
use server::session::{SessionPhase, SlotState};
use shared::{Action, Packet, PacketType, PlayerScore, Wall, ARENA_SIZE, MAX_PLAYERS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

const WAIT: Duration = Duration::from_secs(3);

struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: ShutdownHandle,
    handle: JoinHandle<()>,
}

async fn start_server() -> TestServer {
    let server = Server::bind(ServerConfig::new("127.0.0.1", 0))
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();
    let state = server.state();
    let shutdown = server.shutdown_handle();

    let handle = tokio::spawn(async move {
        let result = server.run().await;
        assert!(result.is_ok());
    });

    TestServer {
        addr,
        state,
        shutdown,
        handle,
    }
}

async fn join_all(server: &TestServer) -> Vec<Client> {
    let mut clients = Vec::new();
    for nick in ["ann", "bob", "cid", "dee"] {
        let client = Client::connect(&server.addr.to_string(), nick)
            .await
            .expect("Failed to join");
        clients.push(client);
    }
    clients
}

async fn start_match(server: &TestServer) -> Vec<Client> {
    let mut clients = join_all(server).await;
    for client in clients.iter_mut() {
        client.ready().await.unwrap();
    }
    for client in &clients {
        wait_for(client, "match start", |s| s.phase() == ClientPhase::Playing).await;
    }
    clients
}

async fn wait_for<F>(client: &Client, what: &str, mut check: F)
where
    F: FnMut(&ClientGameState) -> bool,
{
    let state = client.state();
    let deadline = Instant::now() + WAIT;
    loop {
        if check(&*state.lock().await) {
            return;
        }
        if Instant::now() > deadline {
            panic!("Timed out waiting for {}", what);
        }
        sleep(Duration::from_millis(10)).await;
    }
}

/// LOBBY TESTS
mod lobby_tests {
    use super::*;

    /// Slots follow join order, and each slot owns its fixed wall
    #[tokio::test]
    async fn players_seated_in_join_order() {
        let server = start_server().await;
        let clients = join_all(&server).await;

        let ids: Vec<_> = clients.iter().map(|c| c.player_id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        let session = server.state.session.lock().await;
        assert_eq!(session.phase(), SessionPhase::Filling);
        let walls: Vec<_> = (0..MAX_PLAYERS)
            .map(|id| session.slot(id).unwrap().wall)
            .collect();
        assert_eq!(walls, vec![Wall::North, Wall::East, Wall::South, Wall::West]);
    }

    /// Late joiners learn who is already in the lobby
    #[tokio::test]
    async fn roster_reaches_every_player() {
        let server = start_server().await;
        let clients = join_all(&server).await;

        for client in &clients {
            wait_for(client, "full roster", |s| {
                (0..MAX_PLAYERS).all(|id| s.player(id).is_some())
            })
            .await;
        }

        let state = clients[3].state();
        let state = state.lock().await;
        assert_eq!(state.player(0).unwrap().nick, "ann");
        assert_eq!(state.player(2).unwrap().nick, "cid");
    }

    #[tokio::test]
    async fn fifth_player_refused() {
        let server = start_server().await;
        let _clients = join_all(&server).await;

        let result = Client::connect(&server.addr.to_string(), "eve").await;
        assert!(result.is_err());
        assert_eq!(server.state.session.lock().await.connected_count(), 4);
    }

    /// No start until the fourth ready arrives
    #[tokio::test]
    async fn match_starts_when_all_ready() {
        let server = start_server().await;
        let mut clients = join_all(&server).await;

        for client in clients.iter_mut().take(3) {
            client.ready().await.unwrap();
        }
        wait_for(&clients[3], "three ready flags", |s| {
            (0..3).all(|id| s.player(id).map_or(false, |p| p.ready))
        })
        .await;
        assert_eq!(
            server.state.session.lock().await.phase(),
            SessionPhase::Filling
        );

        clients[3].ready().await.unwrap();
        for client in &clients {
            wait_for(client, "match start", |s| s.phase() == ClientPhase::Playing).await;
        }
        assert_eq!(
            server.state.session.lock().await.phase(),
            SessionPhase::Running
        );
    }

    /// A key pressed in the lobby is not predicted, and pressing it again
    /// after the start reaches the server
    #[tokio::test]
    async fn lobby_action_not_kept_after_start() {
        let server = start_server().await;
        let mut clients = join_all(&server).await;
        let mut input = InputManager::new();

        for client in clients.iter_mut().take(3) {
            client.ready().await.unwrap();
        }
        let Some(InputEvent::Action(early)) = input.handle_key('a') else {
            panic!("Expected a movement event");
        };
        assert!(!clients[0].send_action(early).await.unwrap());
        input.reset();
        assert_eq!(
            clients[0].state().lock().await.game().paddles[0].intent,
            Action::Stop
        );

        clients[3].ready().await.unwrap();
        for client in &clients {
            wait_for(client, "match start", |s| s.phase() == ClientPhase::Playing).await;
        }

        let Some(InputEvent::Action(action)) = input.handle_key('a') else {
            panic!("Key was swallowed after the start");
        };
        assert!(clients[0].send_action(action).await.unwrap());

        let deadline = Instant::now() + WAIT;
        loop {
            let intent = server.state.session.lock().await.game().paddles[0].intent;
            if intent == Action::MoveLeft {
                break;
            }
            assert!(Instant::now() < deadline, "Server never applied the action");
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            clients[0].state().lock().await.game().paddles[0].intent,
            Action::MoveLeft
        );
    }

    #[tokio::test]
    async fn leave_is_announced() {
        let server = start_server().await;
        let mut clients = join_all(&server).await;

        let leaver = clients.remove(2);
        leaver.leave().await;

        for client in &clients {
            wait_for(client, "player left", |s| {
                s.player(2).map_or(false, |p| !p.connected)
            })
            .await;
        }
        let session = server.state.session.lock().await;
        assert_eq!(session.slot(2).unwrap().state, SlotState::Disconnected);
        assert_eq!(session.connected_count(), 3);
    }
}

/// MATCH TESTS
mod match_tests {
    use super::*;

    #[tokio::test]
    async fn sync_snapshots_arrive() {
        let server = start_server().await;
        let clients = start_match(&server).await;

        for client in &clients {
            wait_for(client, "two syncs", |s| s.syncs_received() >= 2).await;
        }
    }

    /// Actions reach the other players before the next sync
    #[tokio::test]
    async fn action_propagates_to_others() {
        let server = start_server().await;
        let clients = start_match(&server).await;

        clients[0].send_action(Action::MoveLeft).await.unwrap();

        for client in &clients[1..] {
            wait_for(client, "propagated action", |s| {
                s.game().paddles[0].intent == Action::MoveLeft
            })
            .await;
        }

        let deadline = Instant::now() + WAIT;
        loop {
            let intent = server.state.session.lock().await.game().paddles[0].intent;
            if intent == Action::MoveLeft {
                break;
            }
            assert!(Instant::now() < deadline, "Server never applied the action");
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Junk and strangers on the datagram port change nothing
    #[tokio::test]
    async fn malformed_datagrams_are_ignored() {
        let server = start_server().await;
        let clients = start_match(&server).await;
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let valid = Packet::PlayerAction {
            action: Action::MoveRight,
        }
        .encode()
        .unwrap();
        let undersized = [PacketType::PlayerAction as u8, 1, 0];
        let bad_action = [PacketType::PlayerAction as u8, 7, 0, 0, 0];

        for datagram in [&valid[..], &undersized[..], &bad_action[..], &[0xAB][..]] {
            stranger.send_to(datagram, server.addr).await.unwrap();
        }
        sleep(Duration::from_millis(100)).await;

        {
            let session = server.state.session.lock().await;
            assert!(session.is_running());
            for paddle in session.game().paddles.iter() {
                assert_eq!(paddle.intent, Action::Stop);
            }
        }
        assert!(server.state.actions.is_empty().await);

        let before = clients[0].state().lock().await.syncs_received();
        wait_for(&clients[0], "sync after junk", |s| s.syncs_received() > before).await;
    }

    /// Last player with points left ends the match and stops the server
    #[tokio::test]
    async fn match_end_reports_scores() {
        let server = start_server().await;
        let clients = start_match(&server).await;

        {
            let mut session = server.state.session.lock().await;
            let game = session.game_mut();
            game.scores = [1, 0, 0, 2];
            game.ball.x = ARENA_SIZE / 8.0;
            game.ball.y = 1.0;
            game.ball.vx = 0.0;
            game.ball.vy = -30.0;
        }

        let expected = vec![
            PlayerScore { player_id: 0, score: 0 },
            PlayerScore { player_id: 1, score: 0 },
            PlayerScore { player_id: 2, score: 0 },
            PlayerScore { player_id: 3, score: 2 },
        ];
        for client in &clients {
            wait_for(client, "game end", |s| s.phase() == ClientPhase::Finished).await;
            let state = client.state();
            assert_eq!(state.lock().await.final_scores(), Some(expected.as_slice()));
        }

        timeout(WAIT, server.handle)
            .await
            .expect("Server did not stop after the match")
            .unwrap();
        assert!(server.shutdown.is_triggered());
        assert_eq!(
            server.state.session.lock().await.phase(),
            SessionPhase::Ended
        );
    }

    #[tokio::test]
    async fn shutdown_stops_server() {
        let server = start_server().await;
        let clients = join_all(&server).await;

        server.shutdown.trigger();
        timeout(WAIT, server.handle)
            .await
            .expect("Server did not stop")
            .unwrap();

        for client in &clients {
            wait_for(client, "disconnect", |s| !s.is_connected()).await;
        }
    }
}
