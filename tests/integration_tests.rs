//! Integration tests for the lobby server and client
//!
//! These tests start a real server on an ephemeral port and talk to it over
//! HTTP and WebSocket exactly like a browser would.

use client::game::{play, Bot};
use client::network::{Connection, LobbyApi};
use server::config::ServerConfig;
use server::network::Server;
use server::session::Session;
use server::utils::get_timestamp;
use shared::{
    score_round, ClientAction, Phase, ServerEvent, SessionView, Status, MAX_ROUNDS,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    base_url: String,
    gateway: std::sync::Arc<server::gateway::Gateway>,
}

async fn start_server() -> TestServer {
    let config = ServerConfig {
        port: 0,
        seed: Some(99),
        ..ServerConfig::default()
    };
    let server = Server::new(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let gateway = server.gateway();
    tokio::spawn(server.run());

    TestServer {
        base_url: format!("http://{}", addr),
        gateway,
    }
}

async fn within<T>(future: impl Future<Output = T>) -> T {
    timeout(STEP_TIMEOUT, future)
        .await
        .expect("timed out waiting for the server")
}

/// Reads events until a state view satisfies `pred`.
async fn wait_for_state(
    conn: &mut Connection,
    pred: impl Fn(&SessionView) -> bool,
) -> SessionView {
    within(async {
        loop {
            match conn.next_event().await.unwrap() {
                ServerEvent::State { state } | ServerEvent::Joined { state, .. } => {
                    if pred(&state) {
                        return state;
                    }
                }
                ServerEvent::Error { message } => panic!("unexpected error: {}", message),
            }
        }
    })
    .await
}

async fn join(server: &TestServer, code: &str, player_id: &str) -> Connection {
    let mut conn = within(Connection::connect(&server.base_url)).await.unwrap();
    conn.send(&ClientAction::JoinLobby {
        code: code.to_string(),
        name: format!("Player {}", player_id),
        player_id: Some(player_id.to_string()),
    })
    .await
    .unwrap();

    let joined = within(conn.next_event()).await.unwrap();
    match joined {
        ServerEvent::Joined { player_id: id, .. } => assert_eq!(id, player_id),
        other => panic!("expected joined, got {:?}", other),
    }
    conn
}

/// HTTP LOBBY TESTS
mod http_tests {
    use super::*;

    /// Tests creating a lobby and reading its status back
    #[tokio::test]
    async fn create_and_inspect_lobby() {
        let server = start_server().await;
        let api = LobbyApi::new(&server.base_url);

        let code = api.create_lobby().await.unwrap();
        assert_eq!(code.len(), shared::CODE_LENGTH);

        let status = api.lobby_status(&code.to_lowercase()).await.unwrap().unwrap();
        assert!(status.exists);
        assert_eq!(status.player_count, 0);
        assert_eq!(status.phase, Phase::Waiting);
        assert_eq!(status.status, Status::Active);
    }

    /// Tests that unknown codes come back as not found
    #[tokio::test]
    async fn unknown_lobby_not_found() {
        let server = start_server().await;
        let api = LobbyApi::new(&server.base_url);
        assert!(api.lobby_status("QQQQQQ").await.unwrap().is_none());
    }
}

/// REAL-TIME CHANNEL TESTS
mod realtime_tests {
    use super::*;

    /// Walks three players through one full round in lobby ABC123
    #[tokio::test]
    async fn three_player_round() {
        let server = start_server().await;
        server
            .gateway
            .store()
            .insert_new(Session::new("ABC123".to_string(), get_timestamp()))
            .await
            .unwrap();

        let ids = ["p1", "p2", "p3"];
        let mut conns = Vec::new();
        for id in ids {
            conns.push(join(&server, "ABC123", id).await);
        }
        wait_for_state(&mut conns[0], |v| v.players.len() == 3).await;

        conns[0]
            .send(&ClientAction::StartGame {
                code: "ABC123".to_string(),
                player_id: "p1".to_string(),
            })
            .await
            .unwrap();
        let view = wait_for_state(&mut conns[1], |v| v.phase == Phase::Answering).await;
        assert!(view.current_prompt.is_some());

        for (i, answer) in [5.0, 3.0, 9.0].into_iter().enumerate() {
            conns[i]
                .send(&ClientAction::SubmitAnswer {
                    code: "ABC123".to_string(),
                    player_id: ids[i].to_string(),
                    answer,
                })
                .await
                .unwrap();
        }
        let view = wait_for_state(&mut conns[2], |v| v.phase == Phase::Placing).await;
        assert!(view.players.iter().all(|p| p.answer.is_none()));

        for (i, position) in [1, 0, 2].into_iter().enumerate() {
            conns[i]
                .send(&ClientAction::PlaceArrow {
                    code: "ABC123".to_string(),
                    player_id: ids[i].to_string(),
                    position,
                })
                .await
                .unwrap();
        }
        let view = wait_for_state(&mut conns[0], |v| {
            v.can_advance_lead && v.players.iter().all(|p| p.has_placed)
        })
        .await;
        assert!(view.players.iter().all(|p| p.answer.is_none()));

        conns[0]
            .send(&ClientAction::RevealAnswers {
                code: "ABC123".to_string(),
                player_id: "p1".to_string(),
            })
            .await
            .unwrap();
        let view = wait_for_state(&mut conns[0], |v| v.phase == Phase::Revealing).await;
        let score = score_round(&view.players);
        assert_eq!(score, 3);

        conns[0]
            .send(&ClientAction::NextRound {
                code: "ABC123".to_string(),
                round_score: score,
            })
            .await
            .unwrap();
        let view = wait_for_state(&mut conns[2], |v| v.current_round == 2).await;
        assert_eq!(view.total_score, 3);
        assert_eq!(view.round_scores, vec![3]);
        assert_eq!(view.start_player_index, 1);
        assert_eq!(view.phase, Phase::Answering);
    }

    /// Tests that a dropped socket keeps the seat and a rejoin resumes it
    #[tokio::test]
    async fn reconnect_keeps_seat() {
        let server = start_server().await;
        let code = LobbyApi::new(&server.base_url).create_lobby().await.unwrap();

        let mut host = join(&server, &code, "host").await;
        let guest = join(&server, &code, "guest").await;
        wait_for_state(&mut host, |v| v.players.len() == 2).await;

        guest.close().await.unwrap();
        let view = wait_for_state(&mut host, |v| {
            v.player("guest").is_some_and(|p| !p.connected)
        })
        .await;
        assert_eq!(view.players.len(), 2);

        let _guest = join(&server, &code, "guest").await;
        let view = wait_for_state(&mut host, |v| {
            v.player("guest").is_some_and(|p| p.connected)
        })
        .await;
        assert_eq!(view.players.len(), 2);
        assert_eq!(view.players[1].id, "guest");
    }

    /// Tests that joining a missing lobby only produces a private error
    #[tokio::test]
    async fn unknown_lobby_reports_error() {
        let server = start_server().await;
        let mut conn = within(Connection::connect(&server.base_url)).await.unwrap();

        conn.send(&ClientAction::JoinLobby {
            code: "NOPE42".to_string(),
            name: "Lost".to_string(),
            player_id: None,
        })
        .await
        .unwrap();

        match within(conn.next_event()).await.unwrap() {
            ServerEvent::Error { message } => assert_eq!(message, "Lobby not found"),
            other => panic!("expected error, got {:?}", other),
        }
    }
}

/// BOT GAMEPLAY TESTS
mod bot_tests {
    use super::*;

    /// Runs three bots through an entire game
    #[tokio::test]
    async fn bots_finish_a_game() {
        let server = start_server().await;
        let code = LobbyApi::new(&server.base_url).create_lobby().await.unwrap();

        let mut handles = Vec::new();
        for i in 0..3 {
            let base_url = server.base_url.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                let mut bot = Bot::new(&code, &format!("Bot {}", i), &format!("bot-{}", i), i);
                let mut conn = Connection::connect(&base_url).await.unwrap();
                play(&mut conn, &mut bot).await.unwrap()
            }));
        }

        let mut views = Vec::new();
        for handle in handles {
            views.push(
                timeout(Duration::from_secs(30), handle)
                    .await
                    .expect("game did not finish")
                    .unwrap(),
            );
        }

        for view in &views {
            assert_eq!(view.phase, Phase::Finished);
            assert_eq!(view.status, Status::Finished);
            assert_eq!(view.round_scores.len(), MAX_ROUNDS as usize);
            assert_eq!(view.total_score, view.round_scores.iter().sum::<u32>());
        }
    }
}
