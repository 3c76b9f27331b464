//! Audio stream assembly and the WAV artifact it produces.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use voxcheck_protocol::AudioFormat;

use crate::error::SynthesisError;

/// Format assumed when a stream stops before describing itself.
pub const FALLBACK_FORMAT: AudioFormat = AudioFormat::new(22_050, 2, 1);

/// Collects streamed PCM in arrival order until `audio-stop`.
#[derive(Debug, Default)]
pub struct AudioAssembly {
    format: Option<AudioFormat>,
    chunks: Vec<Vec<u8>>,
    complete: bool,
}

impl AudioAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream format, once `audio-start` or a chunk has fixed it.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// PCM bytes collected so far.
    pub fn pcm_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Record the format announced by `audio-start`.
    pub fn start(&mut self, format: AudioFormat) -> Result<(), SynthesisError> {
        check_format(&format)?;
        match self.format {
            Some(current) if !self.chunks.is_empty() && !current.same_layout(&format) => {
                Err(SynthesisError::Protocol(format!(
                    "audio-start {format:?} after chunks in {current:?}"
                )))
            }
            _ => {
                self.format = Some(format);
                Ok(())
            }
        }
    }

    /// Append one chunk. The first chunk fixes the format if no
    /// `audio-start` did.
    pub fn push(&mut self, format: AudioFormat, pcm: Vec<u8>) -> Result<(), SynthesisError> {
        if self.complete {
            return Err(SynthesisError::Protocol(
                "audio-chunk after audio-stop".to_string(),
            ));
        }
        match self.format {
            Some(current) if !current.same_layout(&format) => {
                return Err(SynthesisError::Protocol(format!(
                    "audio-chunk in {format:?} does not match stream format {current:?}"
                )));
            }
            Some(_) => {}
            None => {
                check_format(&format)?;
                self.format = Some(format);
            }
        }
        self.chunks.push(pcm);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.complete = true;
    }

    /// Concatenate the chunks into a finished artifact. Only a stream closed
    /// by `audio-stop` can be finished.
    pub fn finish(self) -> Result<SynthesizedAudio, SynthesisError> {
        if !self.complete {
            return Err(SynthesisError::IncompleteStream {
                chunks: self.chunks.len(),
            });
        }
        let format = self.format.unwrap_or(FALLBACK_FORMAT);
        let chunk_count = self.chunks.len();
        let pcm = self.chunks.concat();

        let frame = format.frame_bytes().unwrap_or(1);
        if pcm.len() % frame != 0 {
            return Err(SynthesisError::Protocol(format!(
                "{} PCM bytes is not a whole number of {frame}-byte frames",
                pcm.len()
            )));
        }

        Ok(SynthesizedAudio {
            format,
            pcm,
            chunk_count,
        })
    }
}

fn check_format(format: &AudioFormat) -> Result<(), SynthesisError> {
    if format.rate == 0 || format.frame_bytes().is_none() {
        return Err(SynthesisError::Protocol(format!(
            "unsupported audio format {format:?}"
        )));
    }
    Ok(())
}

/// A complete utterance: raw PCM plus the format needed to play it.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub format: AudioFormat,
    /// Little-endian interleaved samples.
    pub pcm: Vec<u8>,
    /// How many `audio-chunk` messages carried it.
    pub chunk_count: usize,
}

impl SynthesizedAudio {
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.format.width_bytes().unwrap_or(2) * 8
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.pcm.len() / self.format.frame_bytes().unwrap_or(1)
    }

    /// Playing time. Zero for an empty stream or a zero sample rate.
    pub fn duration(&self) -> Duration {
        if self.format.rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.format.rate as f64)
    }

    /// Render as a RIFF/WAVE file in memory.
    pub fn to_wav(&self) -> Result<Vec<u8>, SynthesisError> {
        let spec = WavSpec {
            channels: self.format.channels,
            sample_rate: self.format.rate,
            bits_per_sample: self.bits_per_sample(),
            sample_format: SampleFormat::Int,
        };

        let mut wav_buffer = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut wav_buffer, spec)?;
            match self.format.width_bytes() {
                Some(1) => {
                    // 8-bit WAV is unsigned; hound shifts i8 back up on write.
                    for &b in &self.pcm {
                        writer.write_sample((b as i16 - 128) as i8)?;
                    }
                }
                Some(2) => {
                    for s in self.pcm.chunks_exact(2) {
                        writer.write_sample(i16::from_le_bytes([s[0], s[1]]))?;
                    }
                }
                Some(3) => {
                    for s in self.pcm.chunks_exact(3) {
                        writer.write_sample(i32::from_le_bytes([0, s[0], s[1], s[2]]) >> 8)?;
                    }
                }
                Some(4) => {
                    for s in self.pcm.chunks_exact(4) {
                        writer.write_sample(i32::from_le_bytes([s[0], s[1], s[2], s[3]]))?;
                    }
                }
                _ => {
                    return Err(SynthesisError::Container(format!(
                        "unsupported sample width {}",
                        self.format.width
                    )))
                }
            }
            writer.finalize()?;
        }

        Ok(wav_buffer.into_inner())
    }

    /// Render and save to `path`, replacing any existing file.
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<(), SynthesisError> {
        let wav = self.to_wav()?;
        std::fs::write(path, wav).map_err(SynthesisError::Io)
    }
}
