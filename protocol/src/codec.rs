//! Frame encoding and decoding.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Data, Message, MessageKind, PROTOCOL_VERSION};

/// Longest header line accepted, newline excluded.
pub const MAX_HEADER_BYTES: u64 = 1024 * 1024;

/// Largest data block or payload accepted from a single header.
pub const MAX_BLOCK_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot encode message: {0}")]
    Encoding(String),
    #[error("malformed frame: {0}")]
    Framing(String),
    #[error("cannot decode message: {0}")]
    Decoding(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Data>,
    #[serde(default, skip_serializing_if = "is_zero")]
    data_length: usize,
    #[serde(default, skip_serializing_if = "is_zero")]
    payload_length: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Encode one message into a complete frame.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    if !message.kind.is_known() {
        return Err(CodecError::Encoding(format!(
            "unknown message kind {:?}",
            message.kind.as_str()
        )));
    }
    if message.payload.is_some() && message.kind != MessageKind::AudioChunk {
        return Err(CodecError::Encoding(format!(
            "{} messages cannot carry a payload",
            message.kind
        )));
    }

    let data = if message.data.is_empty() {
        Vec::new()
    } else {
        serde_json::to_vec(&message.data).map_err(|e| CodecError::Encoding(e.to_string()))?
    };
    let payload = message.payload.as_deref().unwrap_or_default();

    let header = Header {
        kind: message.kind.as_str().to_string(),
        version: Some(PROTOCOL_VERSION.to_string()),
        data: None,
        data_length: data.len(),
        payload_length: payload.len(),
    };

    let mut frame = serde_json::to_vec(&header).map_err(|e| CodecError::Encoding(e.to_string()))?;
    frame.reserve(1 + data.len() + payload.len());
    frame.push(b'\n');
    frame.extend_from_slice(&data);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encode and write one message, then flush.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary. A
/// stream that ends anywhere inside a frame is a [`CodecError::Framing`].
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(MAX_HEADER_BYTES + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        if line.len() as u64 > MAX_HEADER_BYTES {
            return Err(CodecError::Framing(format!(
                "header exceeds {MAX_HEADER_BYTES} bytes"
            )));
        }
        return Err(CodecError::Framing(format!(
            "stream ended inside a header after {} bytes",
            line.len()
        )));
    }

    let header: Header = serde_json::from_slice(&line)
        .map_err(|e| CodecError::Decoding(format!("invalid header: {e}")))?;

    let mut data = header.data.unwrap_or_default();
    if header.data_length > 0 {
        let block = read_block(reader, header.data_length, "data").await?;
        let extra: Data = serde_json::from_slice(&block)
            .map_err(|e| CodecError::Decoding(format!("invalid data block: {e}")))?;
        data.extend(extra);
    }

    let payload = if header.payload_length > 0 {
        Some(read_block(reader, header.payload_length, "payload").await?)
    } else {
        None
    };

    Ok(Some(Message {
        kind: MessageKind::parse(&header.kind),
        data,
        payload,
    }))
}

async fn read_block<R>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    if len > MAX_BLOCK_BYTES {
        return Err(CodecError::Framing(format!(
            "declared {what} length {len} exceeds {MAX_BLOCK_BYTES} bytes"
        )));
    }
    let mut buf = vec![0; len];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(CodecError::Framing(format!(
            "stream ended before all {len} {what} bytes arrived"
        ))),
        Err(e) => Err(e.into()),
    }
}
