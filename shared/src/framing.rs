//! Packet framing for the reliable (stream) channel.
//!
//! A stream carries back-to-back messages with no length prefix: the tag byte
//! alone determines how many payload bytes follow.

use crate::protocol::{Packet, PacketType, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed by peer")]
    Closed,
    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl FrameError {
    /// Protocol errors drop a single message; everything else ends the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::Protocol(_))
    }
}

/// Reads the next message from a stream.
///
/// An unknown tag consumes only the tag byte. A known tag with an invalid
/// payload consumes the whole fixed payload, so the stream stays aligned.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut tag = [0u8; 1];
    match reader.read_exact(&mut tag).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(FrameError::Io(e)),
    }

    let packet_type = PacketType::from_u8(tag[0]).ok_or(ProtocolError::UnknownTag(tag[0]))?;

    let mut payload = vec![0u8; packet_type.payload_len()];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(e) => return Err(FrameError::Io(e)),
    }

    Ok(Packet::decode_payload(packet_type, &payload)?)
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
