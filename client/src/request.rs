use voxcheck_protocol::{Synthesize, SynthesizeVoice};

use crate::error::SynthesisError;

/// Optional Piper prosody controls. Every value must be a positive, finite
/// factor; unset values leave the service's default in place.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Prosody {
    /// Speaking rate; higher is slower.
    pub length_scale: Option<f32>,
    /// Generator noise.
    pub noise_scale: Option<f32>,
    /// Phoneme width noise.
    pub noise_w_scale: Option<f32>,
    /// Seconds of silence between sentences.
    pub sentence_silence: Option<f32>,
}

impl Prosody {
    fn fields(&self) -> [(&'static str, Option<f32>); 4] {
        [
            ("length_scale", self.length_scale),
            ("noise_scale", self.noise_scale),
            ("noise_w_scale", self.noise_w_scale),
            ("sentence_silence", self.sentence_silence),
        ]
    }
}

/// What to say and how. The voice travels with each request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: Option<String>,
    /// Speaker name or numeric id for multi-speaker voices.
    pub speaker: Option<String>,
    pub prosody: Prosody,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            speaker: None,
            prosody: Prosody::default(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_length_scale(mut self, scale: f32) -> Self {
        self.prosody.length_scale = Some(scale);
        self
    }

    pub fn with_noise_scale(mut self, scale: f32) -> Self {
        self.prosody.noise_scale = Some(scale);
        self
    }

    pub fn with_noise_w_scale(mut self, scale: f32) -> Self {
        self.prosody.noise_w_scale = Some(scale);
        self
    }

    pub fn with_sentence_silence(mut self, seconds: f32) -> Self {
        self.prosody.sentence_silence = Some(seconds);
        self
    }

    /// Checked before any network I/O.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        if self.text.trim().is_empty() {
            return Err(SynthesisError::Validation("text is empty".to_string()));
        }
        if let Some(voice) = &self.voice {
            if voice.trim().is_empty() {
                return Err(SynthesisError::Validation("voice name is empty".to_string()));
            }
        }
        for (name, value) in self.prosody.fields() {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(SynthesisError::Validation(format!(
                        "{name} must be a positive number, got {v}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn to_event(&self) -> Synthesize {
        let voice = if self.voice.is_some() || self.speaker.is_some() {
            Some(SynthesizeVoice {
                name: self.voice.clone(),
                language: None,
                speaker: self.speaker.clone(),
            })
        } else {
            None
        };

        Synthesize {
            text: self.text.clone(),
            voice,
            length_scale: self.prosody.length_scale,
            noise_scale: self.prosody.noise_scale,
            noise_w_scale: self.prosody.noise_w_scale,
            sentence_silence: self.prosody.sentence_silence,
        }
    }
}
