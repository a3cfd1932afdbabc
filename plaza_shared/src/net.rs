//! Wire messages and framing.
//!
//! Payload shapes are transport-agnostic: `MoveData`, `ProfileData` and
//! `PlayerState` are what any room transport carries. `RoomFrame` is the
//! envelope the TCP room transport puts around them, written as
//! length-prefixed JSON frames.

use anyhow::{bail, Context};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::{
    animation::AnimationName,
    math::{Euler, Vec3},
};

/// Frames larger than this are rejected before allocation.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Message type tags understood by the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ChangeProfile,
    Move,
}

/// Outbound "move": full local pose in one message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveData {
    pub position: Vec3,
    pub rotation: Euler,
    pub animation: AnimationName,
}

/// Outbound "change profile".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub username: String,
}

/// Anything the client sends into a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    Move(MoveData),
    ChangeProfile(ProfileData),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::Move(_) => MessageType::Move,
            ClientMessage::ChangeProfile(_) => MessageType::ChangeProfile,
        }
    }
}

/// Inbound per-player state as the room reports it.
///
/// Every field is optional on the wire; validation happens on the client
/// before anything reaches the registry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    pub username: Option<String>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub animation: Option<String>,
    pub avatar: Option<String>,
}

impl PlayerState {
    /// A complete state, as a room would publish for a joined player.
    pub fn full(
        username: impl Into<String>,
        position: Vec3,
        rotation: Euler,
        animation: AnimationName,
    ) -> Self {
        Self {
            username: Some(username.into()),
            position: Some(position),
            rotation: Some(rotation.into()),
            animation: Some(animation.as_str().to_string()),
            avatar: None,
        }
    }
}

/// Options passed along with a join request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JoinOptions {
    #[serde(default)]
    pub username: Option<String>,
}

/// Envelope for the TCP room protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoomFrame {
    // ─── Client -> room ───
    Join {
        room: String,
        options: JoinOptions,
    },
    Send(ClientMessage),
    Leave,

    // ─── Room -> client ───
    Joined {
        session_id: String,
        players: Vec<(String, PlayerState)>,
    },
    PlayerAdded {
        key: String,
        state: PlayerState,
    },
    PlayerChanged {
        key: String,
        state: PlayerState,
    },
    PlayerRemoved {
        key: String,
    },
    RoomError {
        code: i32,
        message: String,
    },
    Left {
        code: i32,
    },
}

/// Serializes a frame body.
pub fn encode_to_bytes(frame: &RoomFrame) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(frame).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<RoomFrame> {
    serde_json::from_slice(b).context("deserialize")
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, frame: &RoomFrame) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode_to_bytes(frame)?;
    if payload.len() > MAX_FRAME_LEN {
        bail!("frame too large: {} bytes", payload.len());
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    writer.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

/// Reads one length-prefixed frame. `Ok(None)` means the peer closed the
/// stream cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> anyhow::Result<Option<RoomFrame>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("tcp read len"),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("frame too large: {len} bytes");
    }
    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    decode_from_bytes(&payload).map(Some)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("tcp connect {addr}"))?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, frame: &RoomFrame) -> anyhow::Result<()> {
        write_frame(&mut self.stream, frame).await
    }

    /// Receives the next frame; a closed stream is an error here.
    pub async fn recv(&mut self) -> anyhow::Result<RoomFrame> {
        match read_frame(&mut self.stream).await? {
            Some(frame) => Ok(frame),
            None => bail!("connection closed"),
        }
    }

    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}
