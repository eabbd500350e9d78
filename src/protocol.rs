//! Wire framing
//!
//! Both sockets speak length-prefixed multipart messages: each part is a
//! 32-bit big-endian length followed by that many bytes. Command messages
//! carry two parts (tag, body); publish messages carry three (tag, sequence
//! as decimal ASCII, payload).

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{RcamError, Result};

/// Upper bound on a single message part; anything larger indicates a
/// corrupted or hostile stream.
pub const MAX_PART_LEN: usize = 32 * 1024 * 1024;

/// Publish message tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    Metadata,
    Jpeg,
}

impl MessageTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTag::Metadata => "metadata",
            MessageTag::Jpeg => "jpeg",
        }
    }

    pub fn parse(raw: &[u8]) -> Result<Self> {
        match raw {
            b"metadata" => Ok(MessageTag::Metadata),
            b"jpeg" => Ok(MessageTag::Jpeg),
            other => Err(RcamError::Protocol(format!(
                "unknown publish tag: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

/// One published wire unit
#[derive(Debug, Clone)]
pub struct PubMessage {
    pub tag: MessageTag,
    pub sequence: u64,
    pub payload: Bytes,
}

impl PubMessage {
    pub fn metadata(sequence: u64, payload: Bytes) -> Self {
        Self {
            tag: MessageTag::Metadata,
            sequence,
            payload,
        }
    }

    pub fn jpeg(sequence: u64, payload: Bytes) -> Self {
        Self {
            tag: MessageTag::Jpeg,
            sequence,
            payload,
        }
    }

    /// Write the three-part message to a stream
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        write_part(writer, self.tag.as_str().as_bytes()).await?;
        write_part(writer, self.sequence.to_string().as_bytes()).await?;
        write_part(writer, &self.payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one three-part message from a stream
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let tag = MessageTag::parse(&read_part(reader).await?)?;
        let sequence_raw = read_part(reader).await?;
        let sequence = std::str::from_utf8(&sequence_raw)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| RcamError::Protocol("bad sequence field".into()))?;
        let payload = Bytes::from(read_part(reader).await?);
        Ok(Self {
            tag,
            sequence,
            payload,
        })
    }
}

/// Write one length-prefixed part
pub async fn write_part<W: AsyncWrite + Unpin>(writer: &mut W, part: &[u8]) -> Result<()> {
    writer.write_u32(part.len() as u32).await?;
    writer.write_all(part).await?;
    Ok(())
}

/// Read one length-prefixed part
pub async fn read_part<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_PART_LEN {
        return Err(RcamError::Protocol(format!(
            "message part of {} bytes exceeds limit",
            len
        )));
    }
    let mut part = vec![0u8; len];
    reader.read_exact(&mut part).await?;
    Ok(part)
}

/// Write a two-part command message
pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    tag: &str,
    body: &[u8],
) -> Result<()> {
    write_part(writer, tag.as_bytes()).await?;
    write_part(writer, body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a two-part command message
pub async fn read_command<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(Vec<u8>, Vec<u8>)> {
    let tag = read_part(reader).await?;
    let body = read_part(reader).await?;
    Ok((tag, body))
}
