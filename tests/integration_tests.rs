//! Integration tests for the multiplayer quiz synchronization core.
//!
//! These tests validate cross-crate interactions: client state machines
//! against the authoritative server flow, the request/response API, and
//! real UDP transport behavior.

use client::{Effect, Identity, LobbySync, QuizMachine, QuizPhase, SnapshotSource};
use server::lobby::LobbyRegistry;
use server::network::Server;
use server::questions::SampleQuestionBank;
use server::service::InProcessApi;
use shared::api::{ApiError, LobbyApi};
use shared::protocol::{ClientIntent, ServerEvent};
use shared::{AnswerEvent, GameSettings, Question};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

fn test_questions(count: usize) -> Vec<Question> {
    (0..count)
        .map(|index| Question {
            index,
            text: format!("Question {}?", index),
            options: vec![
                "A. Alpha".to_string(),
                "B. Beta".to_string(),
                "C. Gamma".to_string(),
                "D. Delta".to_string(),
            ],
            correct_answer: "A".to_string(),
            difficulty: "medium".to_string(),
            image: None,
        })
        .collect()
}

fn submitted_answer(effects: &[Effect]) -> AnswerEvent {
    match effects {
        [Effect::Send(ClientIntent::SubmitAnswer { answer, .. })] => answer.clone(),
        other => panic!("expected an answer submission, got {:?}", other),
    }
}

/// FULL GAME ROUND TESTS
mod quiz_round_tests {
    use super::*;

    /// Two players, 15s timer, medium difficulty: A answers correctly with
    /// 10s remaining (10 points), B times out (0 points); all answers in
    /// triggers the 3s pause, then the server-paced question 1 resets both
    /// clients with a re-armed countdown.
    #[tokio::test]
    async fn two_player_round_trip() {
        let mut registry = LobbyRegistry::new();
        let (code, alice_id) = registry.create("Alice", "🦊");
        let bob_id = registry.join(&code, "Bob", "🐢").unwrap();
        registry.toggle_ready(&code, "Bob", true).unwrap();

        let questions = test_questions(2);
        let first = registry.start_game(&code, questions.clone()).unwrap();
        assert_eq!(first.index, 0);

        let roster = registry.snapshot(&code).unwrap().players;
        let settings = registry.snapshot(&code).unwrap().settings;
        assert_eq!(settings.time_per_question, 15);

        let mut alice = QuizMachine::new(&code, &alice_id, "Alice", settings.clone());
        alice.begin(questions.clone(), roster.clone(), 0);
        let mut bob = QuizMachine::new(&code, &bob_id, "Bob", settings);
        bob.begin(questions, roster, 0);

        // Alice answers correctly after 5 seconds (10 remaining)
        for _ in 0..50 {
            alice.tick(0.1);
        }
        let alice_answer = submitted_answer(&alice.select_answer("A"));
        assert!(alice_answer.is_correct);
        assert_eq!(alice_answer.score, 10);
        assert_eq!(alice.phase(), QuizPhase::Question); // feedback delay

        let lobby = registry.lobby_mut(&code).unwrap();
        match lobby.record_answer(&alice_answer).unwrap() {
            server::game::RecordOutcome::Recorded { all_answered, .. } => {
                assert!(!all_answered)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        // Server echoes the answer to everyone, including the sender
        let echo = ServerEvent::PlayerAnswered(alice_answer.clone());
        alice.handle_event(&echo);
        bob.handle_event(&echo);

        // Bob runs out the clock and auto-submits an empty answer
        let mut bob_effects = Vec::new();
        for _ in 0..160 {
            bob_effects.extend(bob.tick(0.1));
        }
        let bob_answer = submitted_answer(&bob_effects);
        assert!(!bob_answer.is_correct);
        assert_eq!(bob_answer.score, 0);
        assert_eq!(bob_answer.answer, "");

        let lobby = registry.lobby_mut(&code).unwrap();
        match lobby.record_answer(&bob_answer).unwrap() {
            server::game::RecordOutcome::Recorded {
                all_answered,
                last_question,
            } => {
                assert!(all_answered);
                assert!(!last_question);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let echo = ServerEvent::PlayerAnswered(bob_answer.clone());
        alice.handle_event(&echo);
        bob.handle_event(&echo);
        alice.handle_event(&ServerEvent::AllAnswersIn);
        bob.handle_event(&ServerEvent::AllAnswersIn);
        assert_eq!(alice.phase(), QuizPhase::Waiting);
        assert_eq!(bob.phase(), QuizPhase::Waiting);

        // Both scoreboards agree after the exchange
        for machine in [&alice, &bob] {
            let board = machine.scoreboard();
            assert_eq!(
                board.iter().find(|p| p.name == "Alice").unwrap().score,
                10
            );
            assert_eq!(board.iter().find(|p| p.name == "Bob").unwrap().score, 0);
        }

        // 3 second pause, then both clients ask for the next question
        let mut requests = Vec::new();
        for _ in 0..3 {
            requests.extend(alice.tick_pause(1.0));
            requests.extend(bob.tick_pause(1.0));
        }
        assert_eq!(requests.len(), 2, "each client requests exactly once");

        // Only the first request advances; the second is a no-op
        let lobby = registry.lobby_mut(&code).unwrap();
        let game = lobby.game.as_mut().unwrap();
        let advanced = game.advance();
        let (index, question) = match advanced {
            server::game::AdvanceOutcome::Next { index, question } => (index, question),
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(index, 1);
        assert_eq!(game.advance(), server::game::AdvanceOutcome::Pending);

        let push = ServerEvent::NewQuestion { index, question };
        alice.handle_event(&push);
        bob.handle_event(&push);

        for machine in [&alice, &bob] {
            assert_eq!(machine.phase(), QuizPhase::Question);
            assert_eq!(machine.question_index(), 1);
            assert_eq!(machine.countdown(), 15.0);
            assert!(!machine.has_answered());
        }
        // Roster progress tracked on both sides
        let bob_row = alice
            .scoreboard()
            .iter()
            .find(|p| p.name == "Bob")
            .unwrap()
            .clone();
        assert_eq!(bob_row.current_question, 1);
    }

    /// Redelivered answer submissions reach the server more than once but
    /// the final aggregates match a single application.
    #[tokio::test]
    async fn duplicate_submissions_settle_to_single_application() {
        let registry = Arc::new(Mutex::new(LobbyRegistry::new()));
        let api = InProcessApi::new(Arc::clone(&registry), Arc::new(SampleQuestionBank));

        let created = api.create_lobby("Alice", "🦊").await.unwrap();
        let code = created.lobby_code;
        api.join_lobby(&code, "Bob", "🐢").await.unwrap();
        api.toggle_ready(&code, "Bob", true).await.unwrap();
        api.start_game(&code).await.unwrap();

        let answer = AnswerEvent {
            player_id: created.player_id,
            player_name: "Alice".to_string(),
            question_index: 0,
            answer: "A".to_string(),
            time_taken: 5.0,
            is_correct: true,
            score: 10,
        };
        for _ in 0..4 {
            api.submit_answer(&code, &answer).await.unwrap();
        }

        let results = api.game_results(&code).await.unwrap();
        let alice = results
            .standings
            .iter()
            .find(|s| s.name == "Alice")
            .unwrap();
        assert_eq!(alice.score, 10);
        assert_eq!(alice.correct_answers, 1);
    }
}

/// LOBBY SYNCHRONIZATION TESTS
mod lobby_flow_tests {
    use super::*;

    /// Push and poll snapshots from the live service interleave; the
    /// client view always settles on the highest mutation, not the most
    /// recent arrival.
    #[tokio::test]
    async fn push_poll_reconciliation_against_live_service() {
        let registry = Arc::new(Mutex::new(LobbyRegistry::new()));
        let api = InProcessApi::new(Arc::clone(&registry), Arc::new(SampleQuestionBank));

        let created = api.create_lobby("Alice", "🦊").await.unwrap();
        let code = created.lobby_code;

        let mut sync = LobbySync::new(
            &code,
            Identity {
                player_id: created.player_id,
                player_name: "Alice".to_string(),
                is_host: true,
            },
        );
        sync.join();

        // A poll snapshot taken now...
        let stale_poll = api.lobby_info(&code).await.unwrap();
        // ...then two mutations arrive as pushes first
        api.join_lobby(&code, "Bob", "🐢").await.unwrap();
        let push = api.lobby_info(&code).await.unwrap();
        assert!(sync.apply_snapshot(SnapshotSource::Push, push, Instant::now()));
        assert_eq!(sync.snapshot().unwrap().players.len(), 2);

        // The slow poll response lands last but loses on seq
        assert!(!sync.apply_snapshot(SnapshotSource::Poll, stale_poll, Instant::now()));
        assert_eq!(sync.snapshot().unwrap().players.len(), 2);

        // A genuinely fresher poll wins over the older push
        api.toggle_ready(&code, "Bob", true).await.unwrap();
        let fresh_poll = api.lobby_info(&code).await.unwrap();
        assert!(sync.apply_snapshot(SnapshotSource::Poll, fresh_poll, Instant::now()));
        let bob = sync
            .snapshot()
            .unwrap()
            .players
            .iter()
            .find(|p| p.name == "Bob")
            .unwrap()
            .clone();
        assert!(bob.ready);
    }

    /// The API surfaces the conflict taxonomy to join/create callers.
    #[tokio::test]
    async fn join_conflicts_surface_as_api_errors() {
        let registry = Arc::new(Mutex::new(LobbyRegistry::new()));
        let api = InProcessApi::new(Arc::clone(&registry), Arc::new(SampleQuestionBank));

        assert_eq!(
            api.join_lobby("NOPE42", "Bob", "🐢").await.unwrap_err(),
            ApiError::NotFound
        );

        let created = api.create_lobby("Alice", "🦊").await.unwrap();
        let code = created.lobby_code;
        assert_eq!(
            api.join_lobby(&code, "Alice", "🐢").await.unwrap_err(),
            ApiError::NameTaken
        );

        api.join_lobby(&code, "Bob", "🐢").await.unwrap();
        api.toggle_ready(&code, "Bob", true).await.unwrap();
        api.start_game(&code).await.unwrap();
        assert_eq!(
            api.join_lobby(&code, "Carol", "🦉").await.unwrap_err(),
            ApiError::AlreadyStarted
        );

        // The running game is readable for (re-)entry
        let view = api.game_state(&code).await.unwrap();
        assert_eq!(view.current_question, 0);
        assert_eq!(
            view.questions.len(),
            GameSettings::default().num_questions
        );
    }
}

/// NETWORK TRANSPORT TESTS
mod transport_tests {
    use super::*;

    /// Real UDP round trip against the server loop: handshake, then a
    /// pulled lobby snapshot carrying a sequence number.
    #[tokio::test]
    async fn udp_handshake_and_lobby_fetch() {
        let registry = Arc::new(Mutex::new(LobbyRegistry::new()));
        let (code, host_id) = {
            let mut registry = registry.lock().await;
            registry.create("Alice", "🦊")
        };

        let mut server = Server::new(
            "127.0.0.1:0",
            Arc::clone(&registry),
            Arc::new(SampleQuestionBank),
        )
        .await
        .expect("failed to bind server");
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server_addr).await.unwrap();
        let mut buffer = [0u8; 8192];

        let hello = ClientIntent::Hello {
            player_id: host_id,
            player_name: "Alice".to_string(),
            lobby_code: code.clone(),
        };
        socket
            .send(&bincode::serialize(&hello).unwrap())
            .await
            .unwrap();

        let len = timeout(Duration::from_secs(2), socket.recv(&mut buffer))
            .await
            .expect("no handshake reply")
            .unwrap();
        let event: ServerEvent = bincode::deserialize(&buffer[..len]).unwrap();
        assert!(matches!(event, ServerEvent::Welcome));

        let fetch = ClientIntent::FetchLobby {
            lobby_code: code.clone(),
        };
        socket
            .send(&bincode::serialize(&fetch).unwrap())
            .await
            .unwrap();

        let len = timeout(Duration::from_secs(2), socket.recv(&mut buffer))
            .await
            .expect("no snapshot reply")
            .unwrap();
        match bincode::deserialize::<ServerEvent>(&buffer[..len]).unwrap() {
            ServerEvent::LobbyUpdate(snapshot) => {
                assert_eq!(snapshot.code, code);
                assert_eq!(snapshot.players.len(), 1);
                assert!(snapshot.seq >= 1);
                assert!(!snapshot.game_started);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    /// Fetching a nonexistent lobby over UDP yields an error event, not
    /// silence.
    #[tokio::test]
    async fn udp_fetch_unknown_lobby_reports_error() {
        let registry = Arc::new(Mutex::new(LobbyRegistry::new()));
        let mut server = Server::new(
            "127.0.0.1:0",
            Arc::clone(&registry),
            Arc::new(SampleQuestionBank),
        )
        .await
        .expect("failed to bind server");
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(server_addr).await.unwrap();
        let fetch = ClientIntent::FetchLobby {
            lobby_code: "NOPE42".to_string(),
        };
        socket
            .send(&bincode::serialize(&fetch).unwrap())
            .await
            .unwrap();

        let mut buffer = [0u8; 8192];
        let len = timeout(Duration::from_secs(2), socket.recv(&mut buffer))
            .await
            .expect("no error reply")
            .unwrap();
        match bincode::deserialize::<ServerEvent>(&buffer[..len]).unwrap() {
            ServerEvent::Error { message } => {
                assert!(message.contains("not found"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
