//! Shared protocol definitions for talking to a Wyoming speech service.
//!
//! Every event travels as one frame:
//! - a JSON header line with `type`, `version`, `data_length` and `payload_length`
//! - `data_length` bytes holding the event data as a JSON object
//! - `payload_length` raw bytes (only audio chunks carry a payload)
//!
//! Older peers put the event data inline in the header under `data`; both
//! forms are accepted when reading.

mod codec;
mod events;

use std::fmt;

pub use codec::{encode, read_message, write_message, CodecError, MAX_BLOCK_BYTES, MAX_HEADER_BYTES};
pub use events::{
    AudioChunk, AudioFormat, AudioStart, AudioStop, Describe, ErrorEvent, Event, Info, Synthesize,
    SynthesizeVoice, TtsProgram, TtsVoice, TtsVoiceSpeaker,
};

/// Protocol version written into every outgoing header.
pub const PROTOCOL_VERSION: &str = "1.5.2";

/// Event data: string keys to JSON values.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// The `type` field of a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Describe,
    Info,
    Synthesize,
    AudioStart,
    AudioChunk,
    AudioStop,
    Error,
    /// Any type this crate does not model. Decodable, never encodable.
    Unknown(String),
}

impl MessageKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "describe" => Self::Describe,
            "info" => Self::Info,
            "synthesize" => Self::Synthesize,
            "audio-start" => Self::AudioStart,
            "audio-chunk" => Self::AudioChunk,
            "audio-stop" => Self::AudioStop,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Describe => "describe",
            Self::Info => "info",
            Self::Synthesize => "synthesize",
            Self::AudioStart => "audio-start",
            Self::AudioChunk => "audio-chunk",
            Self::AudioStop => "audio-stop",
            Self::Error => "error",
            Self::Unknown(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete unit of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub data: Data,
    pub payload: Option<Vec<u8>>,
}

impl Message {
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            data: Data::new(),
            payload: None,
        }
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }
}
