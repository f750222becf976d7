use daredash::abuse::AbuseConfig;
use daredash::content::{ContentSet, StarterDare, Theme};
use daredash::digest::{DigestConfig, DigestService};
use daredash::protocol::{ClientMessage, RoomView, ServerMessage};
use daredash::state::AppState;
use daredash::types::{ResponseKind, RoomPhase, TimingConfig, TurnStatus};
use daredash::ws::handlers::handle_message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn theme(prefix: &str, count: usize) -> Theme {
    Theme {
        name: None,
        starts: (0..count)
            .map(|i| StarterDare {
                title: format!("{} dare {}", prefix, i),
                extra: format!("{} extra {}", prefix, i),
            })
            .collect(),
    }
}

fn test_state(sensual_starters: usize) -> Arc<AppState> {
    let content = ContentSet::from_themes(vec![
        ("Sensual".to_string(), theme("sensual", sensual_starters)),
        ("Spicy".to_string(), theme("spicy", 5)),
        ("Empty".to_string(), Theme::default()),
    ]);
    Arc::new(AppState::new_with(
        content,
        TimingConfig::default(),
        AbuseConfig::default(),
        DigestService::new(DigestConfig::default()),
    ))
}

/// One socket, as the server sees it
struct Client {
    conn: String,
    rx: UnboundedReceiver<ServerMessage>,
    player_id: String,
}

impl Client {
    async fn connect(state: &Arc<AppState>, ip: &str) -> Self {
        let (conn, rx) = state.register_connection(ip).await;
        Self {
            conn,
            rx,
            player_id: String::new(),
        }
    }

    async fn send(&self, state: &Arc<AppState>, msg: ClientMessage) -> Option<ServerMessage> {
        handle_message(msg, &self.conn, state).await
    }

    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if let ServerMessage::PlayerYou { player_id } = &msg {
                self.player_id = player_id.clone();
            }
            out.push(msg);
        }
        out
    }

    /// Most recent room snapshot delivered to this socket
    fn latest_state(&mut self) -> RoomView {
        self.drain()
            .into_iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::RoomState(view) => Some(view),
                _ => None,
            })
            .expect("no room:state received")
    }
}

async fn join(state: &Arc<AppState>, code: &str, name: &str, ip: &str) -> Client {
    let mut client = Client::connect(state, ip).await;
    let reply = client
        .send(
            state,
            ClientMessage::RoomJoin {
                code: code.to_string(),
                name: name.to_string(),
            },
        )
        .await;
    assert!(reply.is_none(), "join failed: {:?}", reply);
    client.drain();
    assert!(!client.player_id.is_empty());
    client
}

/// Room `alpha-bravo-charlie` with the given players joined in order
async fn room_with(state: &Arc<AppState>, names: &[&str]) -> Vec<Client> {
    state
        .create_room_with_code("alpha-bravo-charlie")
        .await
        .expect("code free");
    let mut clients = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let ip = format!("10.0.0.{}", i + 1);
        clients.push(join(state, "alpha-bravo-charlie", name, &ip).await);
    }
    clients
}

async fn start(state: &Arc<AppState>, host: &Client, theme: &str) {
    let reply = host
        .send(
            state,
            ClientMessage::ThemeFinalize {
                theme: Some(theme.to_string()),
            },
        )
        .await;
    assert!(reply.is_none());
}

fn prompt_in(msgs: &[ServerMessage]) -> Option<(String, String)> {
    msgs.iter().rev().find_map(|m| match m {
        ServerMessage::AbsentPrompt {
            prompt_id,
            target_id,
            ..
        } => Some((prompt_id.clone(), target_id.clone())),
        _ => None,
    })
}

#[tokio::test]
async fn test_three_player_turn_flow() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;

    let view = clients[0].latest_state();
    assert_eq!(view.code, "alpha-bravo-charlie");
    assert_eq!(view.state, RoomPhase::Lobby);
    assert_eq!(view.host_id.as_deref(), Some(clients[0].player_id.as_str()));
    assert_eq!(view.players.len(), 3);

    start(&state, &clients[0], "sensual").await;
    let view = clients[1].latest_state();
    assert_eq!(view.state, RoomPhase::Main);
    assert_eq!(view.chosen_theme.as_deref(), Some("Sensual"));
    assert_eq!(view.dare_menu.len(), 10);
    assert!(view.dare_menu.iter().all(|d| d.created_by.is_none()));
    let turn = view.turn.expect("turn");
    assert_eq!(turn.index, 0);
    assert_eq!(turn.order[0], clients[0].player_id);

    // Active player proposes, the others respond
    clients[0]
        .send(&state, ClientMessage::SelectDare { index: 0 })
        .await;
    clients[1]
        .send(
            &state,
            ClientMessage::Submit {
                response: ResponseKind::YesPlease,
            },
        )
        .await;
    clients[2]
        .send(
            &state,
            ClientMessage::Submit {
                response: ResponseKind::NoThanks,
            },
        )
        .await;

    // Only the active player sees everyone's response
    let active_view = clients[0].latest_state().turn.unwrap();
    assert_eq!(active_view.selected_dare_index, Some(0));
    assert!(active_view
        .submissions
        .iter()
        .all(|s| s.response.is_some()));

    let bob_id = clients[1].player_id.clone();
    let bob_view = clients[1].latest_state().turn.unwrap();
    assert_eq!(bob_view.submissions.len(), 2);
    for s in &bob_view.submissions {
        if s.player_id == bob_id {
            assert_eq!(s.response, Some(ResponseKind::YesPlease));
        } else {
            assert_eq!(s.response, None);
        }
    }

    clients[0]
        .send(
            &state,
            ClientMessage::Complete {
                completed_most_daring: false,
            },
        )
        .await;
    let turn = clients[2].latest_state().turn.unwrap();
    assert_eq!(turn.index, 1);
    assert_eq!(turn.selected_dare_index, None);
    assert!(turn.submissions.is_empty());
    assert_eq!(turn.status, TurnStatus::Collecting);

    // Usage counters saw the start
    assert_eq!(state.stats.read().await.successful_starts, 1);
}

#[tokio::test]
async fn test_start_requires_three_connected_players() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob"]).await;
    clients[0].drain();

    start(&state, &clients[0], "Sensual").await;
    assert!(clients[0].drain().is_empty());
    let room = state.lookup_room("alpha-bravo-charlie").await.unwrap();
    assert_eq!(room.lock().await.phase, RoomPhase::Lobby);
}

#[tokio::test]
async fn test_creator_theme_preference_wins() {
    let state = test_state(10);
    let mut host = Client::connect(&state, "10.1.0.1").await;
    host.send(
        &state,
        ClientMessage::RoomCreate {
            name: "Ann".to_string(),
            theme: Some("SPICY".to_string()),
        },
    )
    .await;
    let view = host.latest_state();
    assert_eq!(view.chosen_theme.as_deref(), Some("Spicy"));
    let code = view.code.clone();

    let mut bob = join(&state, &code, "Bob", "10.1.0.2").await;
    let _cy = join(&state, &code, "Cy", "10.1.0.3").await;

    // The request param is only a last resort
    start(&state, &bob, "Sensual").await;
    let view = bob.latest_state();
    assert_eq!(view.chosen_theme.as_deref(), Some("Spicy"));
    assert_eq!(view.dare_menu[0].title, "spicy dare 0");
}

#[tokio::test]
async fn test_theme_without_starters_falls_back() {
    let state = test_state(4);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;

    start(&state, &clients[0], "empty").await;
    let view = clients[0].latest_state();
    assert_eq!(view.chosen_theme.as_deref(), Some("Sensual"));
    assert_eq!(view.dare_menu.len(), 4);
}

#[tokio::test]
async fn test_most_daring_completion_requires_authoring() {
    let state = test_state(99);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;
    start(&state, &clients[0], "Sensual").await;

    clients[0]
        .send(&state, ClientMessage::SelectDare { index: 98 })
        .await;
    clients[0]
        .send(
            &state,
            ClientMessage::Complete {
                completed_most_daring: true,
            },
        )
        .await;
    let turn = clients[1].latest_state().turn.unwrap();
    assert_eq!(turn.status, TurnStatus::Adding);
    assert_eq!(turn.adding_by.as_deref(), Some(clients[0].player_id.as_str()));
    assert_eq!(turn.index, 0);

    // Nothing else moves while the author writes
    clients[0].send(&state, ClientMessage::Pass).await;
    clients[1]
        .send(&state, ClientMessage::SelectDare { index: 1 })
        .await;
    clients[1]
        .send(
            &state,
            ClientMessage::AddDare {
                title: "Not mine".to_string(),
                extra: "to write".to_string(),
            },
        )
        .await;
    // Blank fields are dropped
    clients[0]
        .send(
            &state,
            ClientMessage::AddDare {
                title: "  ".to_string(),
                extra: "x".to_string(),
            },
        )
        .await;
    let room = state.lookup_room("alpha-bravo-charlie").await.unwrap();
    {
        let room = room.lock().await;
        assert_eq!(room.menu.len(), 99);
        assert_eq!(room.turn.as_ref().unwrap().status(), TurnStatus::Adding);
    }

    clients[0]
        .send(
            &state,
            ClientMessage::AddDare {
                title: "Sing\u{0007} loudly".to_string(),
                extra: "In the hallway".to_string(),
            },
        )
        .await;
    let view = clients[2].latest_state();
    assert_eq!(view.dare_menu.len(), 100);
    let added = view.dare_menu.last().unwrap();
    assert_eq!(added.title, "Sing loudly");
    assert_eq!(added.created_by.as_deref(), Some(clients[0].player_id.as_str()));
    let turn = view.turn.unwrap();
    assert_eq!(turn.status, TurnStatus::Collecting);
    assert_eq!(turn.adding_by, None);
    assert_eq!(turn.index, 1);
}

#[tokio::test]
async fn test_add_dare_over_capacity_is_rejected() {
    let state = test_state(100);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;
    start(&state, &clients[0], "Sensual").await;

    clients[0]
        .send(&state, ClientMessage::SelectDare { index: 99 })
        .await;
    clients[0]
        .send(
            &state,
            ClientMessage::Complete {
                completed_most_daring: true,
            },
        )
        .await;

    // A full menu still hands the turn to the author
    let view = clients[1].latest_state();
    assert_eq!(view.dare_menu.len(), 100);
    let turn = view.turn.unwrap();
    assert_eq!(turn.status, TurnStatus::Adding);
    assert_eq!(turn.adding_by.as_deref(), Some(clients[0].player_id.as_str()));
    assert_eq!(turn.index, 0);
    clients[0].drain();

    let reply = clients[0]
        .send(
            &state,
            ClientMessage::AddDare {
                title: "One more".to_string(),
                extra: "Please".to_string(),
            },
        )
        .await;
    match reply {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "DARE_LIMIT"),
        other => panic!("expected DARE_LIMIT, got {:?}", other),
    }
    assert!(clients[0].drain().is_empty());

    let room = state.lookup_room("alpha-bravo-charlie").await.unwrap();
    let room = room.lock().await;
    assert_eq!(room.menu.len(), 100);
    let turn = room.turn.as_ref().unwrap();
    assert_eq!(turn.status(), TurnStatus::Adding);
    assert_eq!(turn.index, 0);
}

#[tokio::test(start_paused = true)]
async fn test_absent_active_player_is_removed_on_confirmation() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy", "Dee"]).await;
    start(&state, &clients[0], "Sensual").await;
    let ann_id = clients[0].player_id.clone();

    // Ann's socket drops and she does not come back
    state.connection_closed(&clients[0].conn).await;
    tokio::time::sleep(
        state.timing.disconnect_grace + state.timing.disconnect_prompt_delay + Duration::from_secs(1),
    )
    .await;

    let msgs = clients[1].drain();
    let (prompt_id, target) = prompt_in(&msgs).expect("absent prompt");
    assert_eq!(target, ann_id);

    clients[1]
        .send(
            &state,
            ClientMessage::AbsentResponse {
                prompt_id: prompt_id.clone(),
                target_id: ann_id.clone(),
                present: false,
            },
        )
        .await;

    let msgs = clients[2].drain();
    assert!(msgs
        .iter()
        .any(|m| matches!(m, ServerMessage::AbsentDismiss { prompt_id: p } if *p == prompt_id)));
    let view = msgs
        .into_iter()
        .rev()
        .find_map(|m| match m {
            ServerMessage::RoomState(view) => Some(view),
            _ => None,
        })
        .unwrap();
    assert_eq!(view.players.len(), 3);
    assert_eq!(view.state, RoomPhase::Main);
    let turn = view.turn.unwrap();
    assert!(!turn.order.contains(&ann_id));
    assert_eq!(turn.order[turn.index], clients[1].player_id);

    // A late second answer changes nothing
    clients[3]
        .send(
            &state,
            ClientMessage::AbsentResponse {
                prompt_id,
                target_id: ann_id,
                present: true,
            },
        )
        .await;
    let room = state.lookup_room("alpha-bravo-charlie").await.unwrap();
    assert_eq!(room.lock().await.players.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_absence_moves_on_to_next_disconnected_player() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy", "Dee", "Eve"]).await;
    start(&state, &clients[0], "Sensual").await;
    let ann_id = clients[0].player_id.clone();
    let bob_id = clients[1].player_id.clone();

    // Both Ann and the player after her drop off
    state.connection_closed(&clients[0].conn).await;
    state.connection_closed(&clients[1].conn).await;
    tokio::time::sleep(
        state.timing.disconnect_grace + state.timing.disconnect_prompt_delay + Duration::from_secs(1),
    )
    .await;

    let (prompt_id, target) = prompt_in(&clients[2].drain()).expect("absent prompt");
    assert_eq!(target, ann_id);

    clients[2]
        .send(
            &state,
            ClientMessage::AbsentResponse {
                prompt_id,
                target_id: ann_id.clone(),
                present: false,
            },
        )
        .await;
    let turn = clients[3].latest_state().turn.unwrap();
    assert!(!turn.order.contains(&ann_id));
    assert_eq!(turn.order[turn.index], bob_id);

    // Focus landed on Bob, who is gone too
    tokio::time::sleep(state.timing.focus_prompt_delay + Duration::from_secs(1)).await;
    let (_, target) = prompt_in(&clients[3].drain()).expect("second absent prompt");
    assert_eq!(target, bob_id);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_cancels_absent_prompt() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy", "Dee"]).await;
    start(&state, &clients[0], "Sensual").await;
    let ann_id = clients[0].player_id.clone();

    state.connection_closed(&clients[0].conn).await;
    tokio::time::sleep(
        state.timing.disconnect_grace + state.timing.disconnect_prompt_delay + Duration::from_secs(1),
    )
    .await;
    let (prompt_id, _) = prompt_in(&clients[1].drain()).expect("absent prompt");

    let mut ann = Client::connect(&state, "10.0.0.1").await;
    ann.send(
        &state,
        ClientMessage::RoomResume {
            code: "ALPHA-BRAVO-CHARLIE".to_string(),
            player_id: ann_id.clone(),
        },
    )
    .await;
    assert!(ann.latest_state().players[0].connected);
    assert_eq!(ann.player_id, ann_id);

    assert!(clients[2]
        .drain()
        .iter()
        .any(|m| matches!(m, ServerMessage::AbsentDismiss { prompt_id: p } if *p == prompt_id)));

    // The stale prompt can no longer remove her
    clients[1]
        .send(
            &state,
            ClientMessage::AbsentResponse {
                prompt_id,
                target_id: ann_id,
                present: false,
            },
        )
        .await;
    let room = state.lookup_room("alpha-bravo-charlie").await.unwrap();
    assert_eq!(room.lock().await.players.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_pause_below_three_and_resume() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;
    start(&state, &clients[0], "Sensual").await;
    let cy_id = clients[2].player_id.clone();

    state.connection_closed(&clients[2].conn).await;
    tokio::time::sleep(state.timing.disconnect_grace + Duration::from_millis(100)).await;

    let view = clients[0].latest_state();
    assert_eq!(view.state, RoomPhase::Lobby);
    assert!(view.paused);
    assert!(view.turn.is_some());

    // Turn actions are ignored while paused
    clients[0]
        .send(&state, ClientMessage::SelectDare { index: 1 })
        .await;
    clients[0].send(&state, ClientMessage::GameResume).await;
    assert!(clients[0].drain().is_empty());

    // Cy comes back on a new socket
    let mut cy = Client::connect(&state, "10.0.0.3").await;
    cy.send(
        &state,
        ClientMessage::RoomResume {
            code: "alpha-bravo-charlie".to_string(),
            player_id: cy_id,
        },
    )
    .await;
    cy.drain();

    clients[1].send(&state, ClientMessage::GameResume).await;
    let view = cy.latest_state();
    assert_eq!(view.state, RoomPhase::Main);
    assert!(!view.paused);

    clients[0]
        .send(&state, ClientMessage::SelectDare { index: 1 })
        .await;
    assert_eq!(
        cy.latest_state().turn.unwrap().selected_dare_index,
        Some(1)
    );
}

#[tokio::test]
async fn test_leave_reassigns_host_and_pauses() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;
    start(&state, &clients[0], "Sensual").await;
    let bob_id = clients[1].player_id.clone();

    clients[0].send(&state, ClientMessage::RoomLeave).await;
    assert!(state.binding_of(&clients[0].conn).await.is_none());

    let view = clients[1].latest_state();
    assert_eq!(view.players.len(), 2);
    assert_eq!(view.host_id.as_deref(), Some(bob_id.as_str()));
    assert_eq!(view.state, RoomPhase::Lobby);
    assert!(view.paused);

    // The leaver no longer receives room updates
    clients[0].drain();
    clients[1]
        .send(
            &state,
            ClientMessage::PlayerUpdate {
                name: Some("Bobby".to_string()),
                color: None,
            },
        )
        .await;
    assert!(clients[0].drain().is_empty());
    assert_eq!(clients[2].latest_state().players[0].name, "Bobby");
}

#[tokio::test]
async fn test_peek_and_unknown_rooms() {
    let state = test_state(10);
    let clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;
    start(&state, &clients[0], "Sensual").await;
    clients[0]
        .send(&state, ClientMessage::SelectDare { index: 0 })
        .await;
    clients[1]
        .send(
            &state,
            ClientMessage::Submit {
                response: ResponseKind::HeckYes,
            },
        )
        .await;

    let outsider = Client::connect(&state, "192.0.2.1").await;
    match outsider
        .send(
            &state,
            ClientMessage::RoomPeek {
                code: " Alpha-Bravo-Charlie ".to_string(),
            },
        )
        .await
    {
        Some(ServerMessage::PeekResult {
            ok: true,
            state: Some(view),
            used_colors,
        }) => {
            assert_eq!(used_colors, vec!["Purple", "Red", "White"]);
            let turn = view.turn.unwrap();
            assert_eq!(turn.submissions.len(), 1);
            assert_eq!(turn.submissions[0].response, None);
        }
        other => panic!("unexpected peek {:?}", other),
    }

    match outsider
        .send(
            &state,
            ClientMessage::RoomJoin {
                code: "no-such-room".to_string(),
                name: "Eve".to_string(),
            },
        )
        .await
    {
        Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "NO_SUCH_ROOM"),
        other => panic!("unexpected join reply {:?}", other),
    }
}

#[tokio::test]
async fn test_player_update_rules() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob"]).await;

    // Taken colour is refused, the name still changes
    clients[1]
        .send(
            &state,
            ClientMessage::PlayerUpdate {
                name: Some("  Robert\n".to_string()),
                color: Some("Purple".to_string()),
            },
        )
        .await;
    let view = clients[1].latest_state();
    assert_eq!(view.players[1].name, "Robert");
    assert_eq!(view.players[1].color.as_deref(), Some("Red"));

    clients[1]
        .send(
            &state,
            ClientMessage::PlayerUpdate {
                name: None,
                color: Some("Green".to_string()),
            },
        )
        .await;
    assert_eq!(
        clients[0].latest_state().players[1].color.as_deref(),
        Some("Green")
    );
}

#[tokio::test]
async fn test_mid_game_joiner_enters_rotation_next() {
    let state = test_state(10);
    let mut clients = room_with(&state, &["Ann", "Bob", "Cy"]).await;
    start(&state, &clients[0], "Sensual").await;

    let dee = join(&state, "alpha-bravo-charlie", "Dee", "10.0.0.4").await;
    let turn = clients[0].latest_state().turn.unwrap();
    assert_eq!(turn.order.len(), 4);
    assert_eq!(turn.order[1], dee.player_id);
    assert_eq!(turn.index, 0);
}
