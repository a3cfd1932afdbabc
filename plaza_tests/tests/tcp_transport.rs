//! Client against a scripted TCP room.

use std::sync::Arc;

use plaza_client::{
    connection::{ConnectionEvent, ConnectionStatus},
    controller::ControllerSample,
    transport::TcpTransport,
    GameClient,
};
use plaza_shared::{
    animation::AnimationName,
    config::ClientConfig,
    math::{Euler, Vec3},
    net::{ClientMessage, PlayerState, RoomFrame},
};
use plaza_tests::{init_tracing, poll_until, within, ScriptedRoom};
use tokio::time::Instant;

fn tcp_client(endpoint: &str) -> GameClient {
    let cfg = ClientConfig {
        server_endpoint: endpoint.to_string(),
        player_name: "Tester".to_string(),
        ..ClientConfig::default()
    };
    GameClient::new(cfg, Arc::new(TcpTransport::new()))
}

fn walker(x: f32) -> PlayerState {
    PlayerState::full("walker", Vec3::new(x, 0.0, 0.0), Euler::IDENTITY, AnimationName::Walk)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_sync_and_leave() -> anyhow::Result<()> {
    init_tracing();
    let room = ScriptedRoom::bind().await?;
    let mut client = tcp_client(room.endpoint());

    client.connect()?;
    let mut peer = room
        .accept_join(
            "me",
            vec![
                ("p1".to_string(), walker(1.0)),
                ("me".to_string(), walker(0.0)),
            ],
        )
        .await?;
    assert_eq!(peer.room, "my_room");
    assert_eq!(peer.options.username.as_deref(), Some("Tester"));

    let events = within(client.settled()).await?;
    assert_eq!(
        events,
        vec![ConnectionEvent::Connected {
            session_id: "me".into()
        }]
    );
    assert_eq!(client.remotes().len(), 1);
    assert!(client.remotes().contains("p1"));

    // Room pushes a change for p1 and an echo of ourselves.
    peer.send(RoomFrame::PlayerChanged {
        key: "p1".into(),
        state: walker(10.0),
    })
    .await?;
    peer.send(RoomFrame::PlayerChanged {
        key: "me".into(),
        state: walker(99.0),
    })
    .await?;
    poll_until(&mut client, |c| {
        c.remotes().get("p1").map(|e| e.position) == Some(Vec3::new(10.0, 0.0, 0.0))
    })
    .await?;
    assert!(!client.remotes().contains("me"));

    // First connected tick sends the local pose.
    let sample = ControllerSample::new(Vec3::new(1.0, 0.0, 2.0), Euler::IDENTITY).with_action("run");
    let out = client.tick(Instant::now(), &sample);
    assert!(out.sent.is_some());
    match peer.recv().await? {
        RoomFrame::Send(ClientMessage::Move(data)) => {
            assert_eq!(data.position, Vec3::new(1.0, 0.0, 2.0));
            assert_eq!(data.animation, AnimationName::Run);
        }
        other => anyhow::bail!("expected move, got {other:?}"),
    }

    peer.send(RoomFrame::PlayerRemoved { key: "p1".into() }).await?;
    poll_until(&mut client, |c| c.remotes().is_empty()).await?;

    within(client.disconnect()).await?;
    assert_eq!(peer.recv().await?, RoomFrame::Leave);
    assert_eq!(client.connection_state().status, ConnectionStatus::Disconnected);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_changes_merge_into_remote() -> anyhow::Result<()> {
    init_tracing();
    let room = ScriptedRoom::bind().await?;
    let mut client = tcp_client(room.endpoint());

    client.connect()?;
    let mut peer = room
        .accept_join("me", vec![("p1".to_string(), walker(4.0))])
        .await?;
    within(client.settled()).await?;

    peer.send(RoomFrame::PlayerChanged {
        key: "p1".into(),
        state: PlayerState {
            animation: Some("run".into()),
            ..PlayerState::default()
        },
    })
    .await?;
    peer.send(RoomFrame::PlayerChanged {
        key: "p1".into(),
        state: PlayerState {
            username: Some("sprinter".into()),
            ..PlayerState::default()
        },
    })
    .await?;
    poll_until(&mut client, |c| {
        c.remotes().get("p1").map(|e| e.username.as_str()) == Some("sprinter")
    })
    .await?;

    let entry = client
        .remotes()
        .get("p1")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("p1 missing"))?;
    assert_eq!(entry.animation, AnimationName::Run);
    assert_eq!(entry.position, Vec3::new(4.0, 0.0, 0.0));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_stream_disconnects_and_clears() -> anyhow::Result<()> {
    init_tracing();
    let room = ScriptedRoom::bind().await?;
    let mut client = tcp_client(room.endpoint());

    client.connect()?;
    let peer = room
        .accept_join("me", vec![("p1".to_string(), walker(1.0))])
        .await?;
    within(client.settled()).await?;
    assert_eq!(client.remotes().len(), 1);

    drop(peer);
    poll_until(&mut client, |c| {
        c.connection_state().status == ConnectionStatus::Disconnected
    })
    .await?;
    assert!(client.remotes().is_empty());
    assert_eq!(client.local().session_id(), "");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_join_fails_with_message() -> anyhow::Result<()> {
    init_tracing();
    let room = ScriptedRoom::bind().await?;
    let mut client = tcp_client(room.endpoint());

    client.connect()?;
    let mut peer = room.accept().await?;
    peer.send(RoomFrame::RoomError {
        code: 4212,
        message: "room locked".into(),
    })
    .await?;

    within(client.settled()).await?;
    let state = client.connection_state();
    assert_eq!(state.status, ConnectionStatus::Failed);
    let message = state.error.clone().unwrap_or_default();
    assert!(message.contains("room locked"), "{message}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn room_error_keeps_session() -> anyhow::Result<()> {
    init_tracing();
    let room = ScriptedRoom::bind().await?;
    let mut client = tcp_client(room.endpoint());

    client.connect()?;
    let mut peer = room.accept_join("me", Vec::new()).await?;
    within(client.settled()).await?;

    peer.send(RoomFrame::RoomError {
        code: 4000,
        message: "rate limited".into(),
    })
    .await?;
    poll_until(&mut client, |c| c.connection_state().error.is_some()).await?;
    assert_eq!(client.connection_state().status, ConnectionStatus::Connected);

    peer.send(RoomFrame::Left { code: 4001 }).await?;
    poll_until(&mut client, |c| !c.is_connected()).await?;
    assert_eq!(client.connection_state().status, ConnectionStatus::Disconnected);
    Ok(())
}
