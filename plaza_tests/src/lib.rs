//! Shared helpers for the integration tests.
//!
//! [`ScriptedRoom`] is a bare TCP listener that speaks the room frame
//! protocol one frame at a time, so tests decide exactly what the client
//! sees and when.

use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context};
use plaza_client::GameClient;
use plaza_shared::net::{JoinOptions, PlayerState, ReliableConn, RoomFrame};
use tokio::net::TcpListener;
use tracing::debug;

/// Installs a test-writer subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Listener on an ephemeral localhost port.
pub struct ScriptedRoom {
    listener: TcpListener,
    endpoint: String,
}

impl ScriptedRoom {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind scripted room")?;
        let endpoint = listener.local_addr().context("local_addr")?.to_string();
        Ok(Self { listener, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Accepts one connection and reads its `Join`.
    pub async fn accept(&self) -> anyhow::Result<RoomPeer> {
        let (stream, _) = self.listener.accept().await.context("accept")?;
        stream.set_nodelay(true).context("set nodelay")?;
        let mut conn = ReliableConn::new(stream);
        let (room, options) = match conn.recv().await? {
            RoomFrame::Join { room, options } => (room, options),
            other => bail!("expected Join, got {other:?}"),
        };
        debug!(room = %room, username = ?options.username, "Scripted room got join");
        Ok(RoomPeer {
            conn,
            room,
            options,
        })
    }

    /// Accepts and completes the join with `session_id` and `players`.
    pub async fn accept_join(
        &self,
        session_id: &str,
        players: Vec<(String, PlayerState)>,
    ) -> anyhow::Result<RoomPeer> {
        let mut peer = self.accept().await?;
        peer.send(RoomFrame::Joined {
            session_id: session_id.to_string(),
            players,
        })
        .await?;
        Ok(peer)
    }
}

/// Server side of one client connection.
pub struct RoomPeer {
    conn: ReliableConn,
    pub room: String,
    pub options: JoinOptions,
}

impl RoomPeer {
    pub async fn send(&mut self, frame: RoomFrame) -> anyhow::Result<()> {
        self.conn.send(&frame).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<RoomFrame> {
        tokio::time::timeout(Duration::from_secs(5), self.conn.recv())
            .await
            .context("timed out waiting for client frame")?
    }
}

/// Polls the client's network side until `done` holds, or fails after 5 s.
pub async fn poll_until<F>(client: &mut GameClient, mut done: F) -> anyhow::Result<()>
where
    F: FnMut(&GameClient) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        client.poll_network();
        if done(client) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not reached in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Runs `fut` with a 5 s cap.
pub async fn within<T>(fut: impl Future<Output = T>) -> anyhow::Result<T> {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .context("timed out")
}
