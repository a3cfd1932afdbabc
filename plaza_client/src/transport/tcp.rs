//! TCP room transport.
//!
//! Joins a room over a reliable stream of length-prefixed JSON
//! [`RoomFrame`]s. After the `Join`/`Joined` handshake the stream is split:
//! a reader task turns inbound frames into [`RoomEvent`]s on the session's
//! [`EventHub`], and a writer task drains an outbound queue so `send` never
//! waits on the socket.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use plaza_shared::net::{
    read_frame, write_frame, ClientMessage, JoinOptions, PlayerState, ReliableConn, RoomFrame,
};
use tokio::{
    io::AsyncWriteExt,
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use super::{
    EventHub, EventSink, RoomEvent, RoomEventKind, Session, Subscription, Transport,
    CLOSE_ABNORMAL,
};

enum Outgoing {
    Frame(RoomFrame),
    Leave(oneshot::Sender<anyhow::Result<()>>),
}

/// Joins rooms on a TCP room server.
#[derive(Debug, Default, Clone)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        endpoint: &str,
        room: &str,
        options: &JoinOptions,
    ) -> anyhow::Result<Arc<dyn Session>> {
        info!(endpoint, room, "Joining room over tcp");
        let mut conn = ReliableConn::connect(endpoint).await?;
        conn.send(&RoomFrame::Join {
            room: room.to_string(),
            options: options.clone(),
        })
        .await?;

        let (session_id, players) = match conn.recv().await.context("join reply")? {
            RoomFrame::Joined {
                session_id,
                players,
            } => (session_id, players),
            RoomFrame::RoomError { code, message } => {
                bail!("join rejected ({code}): {message}")
            }
            other => bail!("expected Joined, got {other:?}"),
        };

        let (reader, writer) = conn.into_split();
        let hub = Arc::new(EventHub::with_players(players));
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(read_loop(reader, Arc::clone(&hub)));
        tokio::spawn(write_loop(writer, out_rx));

        info!(session_id = %session_id, "Joined room");
        Ok(Arc::new(TcpSession {
            session_id,
            outbound: out_tx,
            hub,
            reader_task: Mutex::new(Some(reader_task)),
        }))
    }
}

async fn read_loop(mut reader: OwnedReadHalf, hub: Arc<EventHub>) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("room closed the stream");
                hub.publish(RoomEvent::Left {
                    code: CLOSE_ABNORMAL,
                });
                return;
            }
            Err(e) => {
                warn!(error = %e, "room stream failed");
                hub.publish(RoomEvent::Left {
                    code: CLOSE_ABNORMAL,
                });
                return;
            }
        };
        match frame {
            RoomFrame::PlayerAdded { key, state } => {
                hub.publish(RoomEvent::PlayerAdded { key, state });
            }
            RoomFrame::PlayerChanged { key, state } => {
                hub.publish(RoomEvent::PlayerChanged { key, state });
            }
            RoomFrame::PlayerRemoved { key } => {
                hub.publish(RoomEvent::PlayerRemoved { key });
            }
            RoomFrame::RoomError { code, message } => {
                hub.publish(RoomEvent::Error { code, message });
            }
            RoomFrame::Left { code } => {
                hub.publish(RoomEvent::Left { code });
                return;
            }
            other => {
                debug!(?other, "Unexpected frame from room");
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(item) = rx.recv().await {
        match item {
            Outgoing::Frame(frame) => {
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    warn!(error = %e, "room write failed");
                    return;
                }
            }
            Outgoing::Leave(done) => {
                let result = async {
                    write_frame(&mut writer, &RoomFrame::Leave).await?;
                    writer.shutdown().await.context("tcp shutdown")?;
                    Ok(())
                }
                .await;
                let _ = done.send(result);
                return;
            }
        }
    }
}

/// Session joined through a [`TcpTransport`].
pub struct TcpSession {
    session_id: String,
    outbound: mpsc::UnboundedSender<Outgoing>,
    hub: Arc<EventHub>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpSession {
    fn stop_reader(&self) {
        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

#[async_trait]
impl Session for TcpSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn send(&self, message: ClientMessage) -> anyhow::Result<()> {
        trace!(session_id = %self.session_id, message_type = ?message.message_type(), "Queueing message");
        self.outbound
            .send(Outgoing::Frame(RoomFrame::Send(message)))
            .map_err(|_| anyhow!("session closed"))
    }

    fn players(&self) -> Vec<(String, PlayerState)> {
        self.hub.players()
    }

    fn subscribe(&self, kind: RoomEventKind, sink: EventSink) -> Subscription {
        self.hub.subscribe(kind, sink)
    }

    async fn leave(&self) -> anyhow::Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let queued = self.outbound.send(Outgoing::Leave(done_tx));
        self.stop_reader();
        queued.map_err(|_| anyhow!("session closed"))?;
        done_rx.await.context("writer stopped before leave")?
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.stop_reader();
    }
}
