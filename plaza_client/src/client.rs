//! Client implementation.
//!
//! The client maintains:
//! - The connection lifecycle (one session at a time)
//! - Local player state fed from the character controller every tick
//! - The remote player registry, fed by inbound room events
//! - Outbound move throttling
//! - Per-player smoothing and the render frame
//! - The world grid cell under the local player
//!
//! Everything is driven from [`GameClient::tick`] on one task. Network
//! completions are queued by the transport and applied at the start of the
//! next tick, never in the middle of one.

use std::sync::Arc;

use plaza_shared::{
    config::ClientConfig,
    math::{Euler, Vec3},
    net::{ClientMessage, JoinOptions, MoveData, ProfileData},
    world::{GridCell, WorldGrid},
};
use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    connection::{ConnectError, ConnectionEvent, ConnectionManager, ConnectionState},
    console::{ConsoleCommand, HELP},
    controller::ControllerSample,
    inbound::InboundSync,
    local_player::{LocalPlayer, Teleport},
    outbound::OutboundSync,
    registry::RemotePlayers,
    render::{LocalRenderState, RemoteSmoothing, RenderFrame},
    transport::Transport,
};

/// What one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutput {
    /// Where to move the character controller, after a teleport or fall
    /// reset.
    pub correction: Option<Teleport>,
    /// Move payload sent this tick.
    pub sent: Option<MoveData>,
    /// New grid cell, when the local player crossed into one.
    pub grid_changed: Option<GridCell>,
    pub frame: RenderFrame,
}

/// High-level game client.
pub struct GameClient {
    cfg: ClientConfig,
    connection: ConnectionManager,
    local: LocalPlayer,
    remotes: RemotePlayers,
    inbound: InboundSync,
    outbound: OutboundSync,
    smoothing: RemoteSmoothing,
    grid: WorldGrid,
    last_tick: Option<Instant>,
}

impl GameClient {
    pub fn new(cfg: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            connection: ConnectionManager::new(transport, &cfg),
            local: LocalPlayer::from_config(&cfg),
            remotes: RemotePlayers::new(),
            inbound: InboundSync::new(),
            outbound: OutboundSync::new(&cfg.sync),
            smoothing: RemoteSmoothing::new(cfg.smoothing),
            grid: WorldGrid::new(cfg.world),
            last_tick: None,
            cfg,
        }
    }

    // ─── Accessors ───

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    pub fn local(&self) -> &LocalPlayer {
        &self.local
    }

    pub fn remotes(&self) -> &RemotePlayers {
        &self.remotes
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_state(&self) -> &ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    // ─── Connection ───

    /// Joins the configured room.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        let room = self.cfg.room_name.clone();
        self.connect_to(&room)
    }

    pub fn connect_to(&mut self, room: &str) -> Result<(), ConnectError> {
        let options = JoinOptions {
            username: Some(self.local.username().to_string()),
        };
        self.connection.connect(room, options)
    }

    /// Waits for an outstanding connect attempt and applies its outcome.
    pub async fn settled(&mut self) -> Vec<ConnectionEvent> {
        let events = self.connection.settled().await;
        self.apply_connection_events(&events);
        self.inbound.pump(&mut self.remotes);
        events
    }

    /// Applies queued connection outcomes and room events.
    pub fn poll_network(&mut self) -> Vec<ConnectionEvent> {
        let events = self.connection.poll();
        self.apply_connection_events(&events);
        self.inbound.pump(&mut self.remotes);
        events
    }

    fn apply_connection_events(&mut self, events: &[ConnectionEvent]) {
        for event in events {
            match event {
                ConnectionEvent::Connected { session_id } => {
                    self.local.assign_session_id(session_id);
                    self.outbound.reset();
                    if let Some(session) = self.connection.session() {
                        self.inbound.attach(session.as_ref(), &mut self.remotes);
                    }
                    info!(
                        session_id = %session_id,
                        remotes = self.remotes.len(),
                        "Room joined"
                    );
                }
                ConnectionEvent::Disconnected { code } => {
                    self.inbound.detach(&mut self.remotes);
                    self.local.clear_session();
                    self.outbound.reset();
                    info!(code, "Room left");
                }
                ConnectionEvent::Failed { message } => {
                    debug!(message = %message, "Connect attempt failed");
                }
                ConnectionEvent::RoomError { .. } => {}
            }
        }
    }

    /// Leaves the room. Local state always ends disconnected with an empty
    /// registry.
    pub async fn disconnect(&mut self) {
        self.inbound.detach(&mut self.remotes);
        self.connection.disconnect().await;
        self.local.clear_session();
        self.outbound.reset();
        self.smoothing.clear();
    }

    // ─── Local player ───

    /// Changes the display name; sent right away when connected.
    pub fn set_username(&mut self, username: &str) -> anyhow::Result<()> {
        self.local.set_username(username);
        if let Some(session) = self.connection.session() {
            if self.connection.is_connected() {
                session.send(ClientMessage::ChangeProfile(ProfileData {
                    username: self.local.username().to_string(),
                }))?;
            }
        }
        Ok(())
    }

    pub fn request_teleport(&mut self, position: Vec3, rotation: Option<Euler>) {
        self.local.request_teleport(position, rotation);
    }

    // ─── Tick ───

    /// Advances one render tick.
    pub fn tick(&mut self, now: Instant, sample: &ControllerSample) -> TickOutput {
        self.poll_network();

        let correction = self.local.apply_controller_sample(sample);

        let connected = self.connection.is_connected();
        let sent = self.outbound.tick(now, connected, &self.local);
        if let (Some(data), Some(session)) = (sent, self.connection.session()) {
            if let Err(e) = session.send(ClientMessage::Move(data)) {
                warn!(error = %e, "Move send failed");
            }
        }

        let grid_changed = self.grid.update(self.local.position());
        if let Some(cell) = grid_changed {
            debug!(x = cell.x, z = cell.z, "Entered grid cell");
        }

        let dt = match self.last_tick {
            Some(prev) => now.saturating_duration_since(prev),
            None => self.cfg.tick_interval(),
        };
        self.last_tick = Some(now);

        let remotes = self
            .smoothing
            .advance(&self.remotes.snapshot(), dt.as_secs_f32());
        let frame = RenderFrame {
            local: LocalRenderState::from_player(&self.local, self.outbound.last_sent_at()),
            remotes,
        };

        TickOutput {
            correction,
            sent,
            grid_changed,
            frame,
        }
    }

    // ─── Console ───

    /// Executes a parsed console command and returns lines to print.
    pub async fn exec_console(&mut self, cmd: ConsoleCommand) -> Vec<String> {
        match cmd {
            ConsoleCommand::Connect { room } => {
                let room = room.unwrap_or_else(|| self.cfg.room_name.clone());
                match self.connect_to(&room) {
                    Ok(()) => vec![format!("Connecting to {room}...")],
                    Err(e) => vec![format!("Connect: {e}")],
                }
            }
            ConsoleCommand::Disconnect => {
                self.disconnect().await;
                vec!["Disconnected".to_string()]
            }
            ConsoleCommand::Status => self.status_lines(),
            ConsoleCommand::Name(name) => match self.set_username(&name) {
                Ok(()) => vec![format!("Name set to {}", self.local.username())],
                Err(e) => vec![format!("Name change not sent: {e}")],
            },
            ConsoleCommand::Teleport(pos) => {
                self.request_teleport(pos, None);
                vec![format!("Teleporting to ({}, {}, {})", pos.x, pos.y, pos.z)]
            }
            ConsoleCommand::Help => HELP.iter().map(|s| s.to_string()).collect(),
            ConsoleCommand::Quit => Vec::new(),
        }
    }

    pub fn status_lines(&self) -> Vec<String> {
        let state = self.connection.state();
        let mut out = vec![format!("State: {}", state.status)];
        out.push(format!("Endpoint: {}", self.connection.endpoint()));
        if self.connection.is_connecting() {
            out.push("Connect attempt in progress".to_string());
        }
        if let Some(err) = &state.error {
            out.push(format!("Last error: {err}"));
        }
        if !self.local.session_id().is_empty() {
            out.push(format!("Session: {}", self.local.session_id()));
        }
        let p = self.local.position();
        out.push(format!(
            "Player: {} at ({:.2}, {:.2}, {:.2}) [{}]",
            self.local.username(),
            p.x,
            p.y,
            p.z,
            self.local.animation()
        ));
        let cell = self.grid.current();
        out.push(format!("Grid cell: ({}, {})", cell.x, cell.z));
        out.push(format!("Remote players: {}", self.remotes.len()));
        for entry in self.remotes.iter() {
            out.push(format!(
                "  {} {} ({:.1}, {:.1}, {:.1}) [{}]",
                entry.session_id,
                entry.username,
                entry.position.x,
                entry.position.y,
                entry.position.z,
                entry.animation
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackRoom, LoopbackTransport};
    use plaza_shared::{animation::AnimationName, net::PlayerState};
    use std::time::Duration;

    fn client(room: &LoopbackRoom) -> GameClient {
        GameClient::new(
            ClientConfig::default(),
            Arc::new(LoopbackTransport::new(room.clone())),
        )
    }

    #[tokio::test]
    async fn connect_assigns_session_and_reconciles() {
        let room = LoopbackRoom::new("my_room");
        room.add_player(
            "bot",
            PlayerState::full("bot", Vec3::new(2.0, 0.0, 0.0), Euler::IDENTITY, AnimationName::Idle),
        );
        let mut c = client(&room);
        c.connect().unwrap();
        c.settled().await;

        assert!(c.is_connected());
        assert_eq!(c.local().session_id(), "s1");
        assert_eq!(c.remotes().len(), 1);

        let out = c.tick(Instant::now(), &ControllerSample::default());
        assert!(out.sent.is_some());
        assert_eq!(out.frame.remotes.len(), 1);
        assert_eq!(out.frame.local.session_id, "s1");
    }

    #[tokio::test]
    async fn username_change_is_sent_immediately() {
        let room = LoopbackRoom::new("my_room");
        let mut c = client(&room);
        c.set_username("offline").unwrap();
        c.connect().unwrap();
        c.settled().await;
        assert_eq!(room.player("s1").unwrap().username.as_deref(), Some("offline"));

        c.set_username("ann").unwrap();
        let sent = room.messages_from("s1");
        assert_eq!(
            sent,
            vec![ClientMessage::ChangeProfile(ProfileData {
                username: "ann".into()
            })]
        );
    }

    #[tokio::test]
    async fn disconnect_clears_everything() {
        let room = LoopbackRoom::new("my_room");
        room.add_player("a", PlayerState::full("a", Vec3::ZERO, Euler::IDENTITY, AnimationName::Idle));
        let mut c = client(&room);
        c.connect().unwrap();
        c.settled().await;
        let now = Instant::now();
        c.tick(now, &ControllerSample::default());

        c.disconnect().await;
        assert!(c.remotes().is_empty());
        assert_eq!(c.local().session_id(), "");
        let out = c.tick(now + Duration::from_millis(100), &ControllerSample::default());
        assert!(out.sent.is_none());
        assert!(out.frame.remotes.is_empty());
    }

    #[tokio::test]
    async fn console_commands_drive_client() {
        let room = LoopbackRoom::new("my_room");
        let mut c = client(&room);
        let lines = c
            .exec_console(ConsoleCommand::Connect { room: None })
            .await;
        assert_eq!(lines, vec!["Connecting to my_room...".to_string()]);
        let lines = c
            .exec_console(ConsoleCommand::Connect { room: None })
            .await;
        assert!(lines[0].contains("already in progress"));
        let status = c.status_lines();
        assert_eq!(status[1], "Endpoint: 127.0.0.1:2567");
        assert_eq!(status[2], "Connect attempt in progress");
        c.settled().await;

        c.exec_console(ConsoleCommand::Teleport(Vec3::new(30.0, 0.0, 0.0)))
            .await;
        let out = c.tick(Instant::now(), &ControllerSample::default());
        assert_eq!(
            out.correction.map(|t| t.position),
            Some(Vec3::new(30.0, 0.0, 0.0))
        );
        assert_eq!(out.grid_changed, Some(GridCell::new(2, 0)));

        let status = c.status_lines();
        assert_eq!(status[0], "State: connected");
        assert!(!status.iter().any(|l| l == "Connect attempt in progress"));
    }
}
