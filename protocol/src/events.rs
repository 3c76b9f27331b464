//! Typed views over the event data of each known message kind.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{CodecError, Data, Message, MessageKind};

/// A typed event that maps onto a [`Message`].
pub trait Event: Serialize + DeserializeOwned {
    const KIND: MessageKind;

    fn into_message(self) -> Message {
        Message::new(Self::KIND).with_data(to_data(&self))
    }

    fn from_message(message: &Message) -> Result<Self, CodecError> {
        expect_kind(message, &Self::KIND)?;
        from_data(&message.data)
    }
}

fn to_data<T: Serialize>(value: &T) -> Data {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Data::new(),
    }
}

fn from_data<T: DeserializeOwned>(data: &Data) -> Result<T, CodecError> {
    serde_json::from_value(Value::Object(data.clone()))
        .map_err(|e| CodecError::Decoding(e.to_string()))
}

fn expect_kind(message: &Message, kind: &MessageKind) -> Result<(), CodecError> {
    if &message.kind != kind {
        return Err(CodecError::Decoding(format!(
            "expected {kind} message, got {}",
            message.kind
        )));
    }
    Ok(())
}

/// Asks the service to describe itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Describe {}

impl Event for Describe {
    const KIND: MessageKind = MessageKind::Describe;
}

/// The service's answer to [`Describe`]. Sections for other service types
/// (asr, wake, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tts: Vec<TtsProgram>,
}

impl Event for Info {
    const KIND: MessageKind = MessageKind::Info;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsProgram {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default = "installed")]
    pub installed: bool,
    #[serde(default)]
    pub voices: Vec<TtsVoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsVoice {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default = "installed")]
    pub installed: bool,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speakers: Option<Vec<TtsVoiceSpeaker>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsVoiceSpeaker {
    pub name: String,
}

fn installed() -> bool {
    true
}

/// Request to speak `text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Synthesize {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<SynthesizeVoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_w_scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_silence: Option<f32>,
}

impl Event for Synthesize {
    const KIND: MessageKind = MessageKind::Synthesize;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesizeVoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Speaker name or numeric id for multi-speaker voices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// PCM layout of an audio stream.
///
/// `width` is kept as it appeared on the wire. Wyoming sends bytes per
/// sample, but 8/16/24/32 are read as bits; see [`AudioFormat::width_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub rate: u32,
    pub width: u16,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(rate: u32, width: u16, channels: u16) -> Self {
        Self {
            rate,
            width,
            channels,
        }
    }

    /// Bytes per sample, or `None` for a width that is neither a byte count
    /// in 1..=4 nor a bit count in {8, 16, 24, 32}.
    pub fn width_bytes(&self) -> Option<u16> {
        match self.width {
            1..=4 => Some(self.width),
            8 | 16 | 24 | 32 => Some(self.width / 8),
            _ => None,
        }
    }

    /// Bytes per frame (one sample for every channel).
    pub fn frame_bytes(&self) -> Option<usize> {
        let width = self.width_bytes()?;
        if self.channels == 0 {
            return None;
        }
        Some(width as usize * self.channels as usize)
    }

    /// Same layout once width is normalized to bytes.
    pub fn same_layout(&self, other: &AudioFormat) -> bool {
        self.rate == other.rate
            && self.channels == other.channels
            && self.width_bytes() == other.width_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStart {
    #[serde(flatten)]
    pub format: AudioFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Event for AudioStart {
    const KIND: MessageKind = MessageKind::AudioStart;
}

/// One slice of raw PCM. The samples travel as the frame payload, not in the
/// event data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunk {
    #[serde(flatten)]
    pub format: AudioFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip)]
    pub audio: Vec<u8>,
}

impl Event for AudioChunk {
    const KIND: MessageKind = MessageKind::AudioChunk;

    fn into_message(self) -> Message {
        let message = Message::new(Self::KIND).with_data(to_data(&self));
        // an empty payload is not framed, so it decodes as none
        if self.audio.is_empty() {
            message
        } else {
            message.with_payload(self.audio)
        }
    }

    fn from_message(message: &Message) -> Result<Self, CodecError> {
        expect_kind(message, &Self::KIND)?;
        let mut chunk: AudioChunk = from_data(&message.data)?;
        chunk.audio = message.payload.clone().unwrap_or_default();
        Ok(chunk)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStop {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl Event for AudioStop {
    const KIND: MessageKind = MessageKind::AudioStop;
}

/// Failure reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Event for ErrorEvent {
    const KIND: MessageKind = MessageKind::Error;
}
