//! What the service says it can speak with.

use std::fmt;

use voxcheck_protocol::{Info, TtsVoice};

/// Piper model quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    XLow,
    Low,
    Medium,
    High,
    Unknown,
}

impl Quality {
    pub fn parse(tier: &str) -> Self {
        match tier {
            "x_low" => Self::XLow,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XLow => "x_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }

    /// Output rate Piper models of this tier are trained at.
    pub fn default_sample_rate(&self) -> u32 {
        match self {
            Self::XLow | Self::Low => 16_000,
            Self::Medium | Self::High | Self::Unknown => 22_050,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceDescriptor {
    pub name: String,
    pub language: Option<String>,
    pub quality: Quality,
    pub sample_rate: u32,
    pub description: Option<String>,
    pub speakers: Vec<String>,
}

impl VoiceDescriptor {
    /// Fills gaps from the `<language>-<dataset>-<quality>` naming scheme.
    pub fn from_wire(voice: &TtsVoice) -> Self {
        let mut parts = voice.name.split('-');
        let name_language = parts.next().filter(|p| p.contains('_')).map(str::to_string);
        let name_quality = voice.name.rsplit('-').next().map(Quality::parse);

        let quality = voice
            .quality
            .as_deref()
            .map(Quality::parse)
            .or(name_quality)
            .unwrap_or(Quality::Unknown);

        Self {
            name: voice.name.clone(),
            language: voice.languages.first().cloned().or(name_language),
            quality,
            sample_rate: voice.sample_rate.unwrap_or_else(|| quality.default_sample_rate()),
            description: voice.description.clone(),
            speakers: voice
                .speakers
                .iter()
                .flatten()
                .map(|s| s.name.clone())
                .collect(),
        }
    }
}

impl fmt::Display for VoiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {} Hz)",
            self.name,
            self.language.as_deref().unwrap_or("unknown"),
            self.quality,
            self.sample_rate
        )?;
        if let Some(description) = &self.description {
            write!(f, " - {description}")?;
        }
        Ok(())
    }
}

/// The service's self-description, reduced to installed voices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub voices: Vec<VoiceDescriptor>,
}

impl ServiceInfo {
    pub fn voice(&self, name: &str) -> Option<&VoiceDescriptor> {
        self.voices.iter().find(|v| v.name == name)
    }

    pub fn voice_names(&self) -> Vec<String> {
        self.voices.iter().map(|v| v.name.clone()).collect()
    }
}

impl From<Info> for ServiceInfo {
    fn from(info: Info) -> Self {
        let program = info.tts.first();
        Self {
            name: program.map(|p| p.name.clone()),
            version: program.and_then(|p| p.version.clone()),
            description: program.and_then(|p| p.description.clone()),
            voices: info
                .tts
                .iter()
                .flat_map(|p| p.voices.iter())
                .filter(|v| v.installed)
                .map(VoiceDescriptor::from_wire)
                .collect(),
        }
    }
}
