use std::io;
use std::time::Duration;

use thiserror::Error;
use voxcheck_protocol::{CodecError, MessageKind};

use crate::session::SessionState;

/// Everything that can go wrong while talking to a speech service.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("invalid synthesis request: {0}")]
    Validation(String),
    #[error("cannot connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("malformed frame: {0}")]
    Framing(String),
    #[error("undecodable message: {0}")]
    Decoding(String),
    #[error("cannot encode message: {0}")]
    Encoding(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("voice {requested:?} not found ({} available)", .available.len())]
    VoiceNotFound {
        requested: String,
        available: Vec<String>,
    },
    #[error("audio stream ended after {chunks} chunk(s) without audio-stop")]
    IncompleteStream { chunks: usize },
    #[error("no audio-stop within {0:?}")]
    Timeout(Duration),
    #[error("cannot build audio container: {0}")]
    Container(String),
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),
}

/// Peer hung up, one way or another.
fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

impl From<io::Error> for SynthesisError {
    fn from(err: io::Error) -> Self {
        if is_disconnect(&err) {
            SynthesisError::ConnectionClosed
        } else {
            SynthesisError::Io(err)
        }
    }
}

impl From<CodecError> for SynthesisError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encoding(msg) => SynthesisError::Encoding(msg),
            CodecError::Framing(msg) => SynthesisError::Framing(msg),
            CodecError::Decoding(msg) => SynthesisError::Decoding(msg),
            CodecError::Io(e) => e.into(),
        }
    }
}

impl From<hound::Error> for SynthesisError {
    fn from(err: hound::Error) -> Self {
        SynthesisError::Container(err.to_string())
    }
}

/// A [`SynthesisError`] plus where the session was when it happened.
///
/// `service_error` holds the text of the last `error` event the service sent
/// before the failure, which often explains an incomplete stream.
#[derive(Debug, Error)]
#[error(
    "session failed while {state} (last message: {}, {messages_decoded} decoded){}",
    .last_message.as_ref().map_or("none", MessageKind::as_str),
    .service_error.as_ref().map(|text| format!("; service said: {text}")).unwrap_or_default()
)]
pub struct SessionError {
    pub state: SessionState,
    pub last_message: Option<MessageKind>,
    pub messages_decoded: usize,
    pub service_error: Option<String>,
    #[source]
    pub kind: SynthesisError,
}

impl SessionError {
    pub fn kind(&self) -> &SynthesisError {
        &self.kind
    }
}
