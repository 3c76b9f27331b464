//! Client side of the Wyoming text-to-speech protocol.
//!
//! A [`Session`] connects to a speech service, reads its voice catalog,
//! sends one synthesis request and assembles the streamed audio into a
//! [`SynthesizedAudio`] that renders as a WAV file.
//!
//! ```no_run
//! use voxcheck_client::{Session, SessionConfig, SynthesisRequest};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::new(SessionConfig::new("localhost", 10200));
//! let request = SynthesisRequest::new("Hello!").with_voice("en_US-amy-medium");
//! let audio = session.synthesize(&request).await?;
//! audio.write_wav("hello.wav")?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod request;
pub mod session;
pub mod transport;
pub mod voice;

pub use audio::{AudioAssembly, SynthesizedAudio};
pub use config::SessionConfig;
pub use error::{SessionError, SynthesisError};
pub use request::{Prosody, SynthesisRequest};
pub use session::{AudioEvent, AudioStream, Session, SessionState};
pub use transport::Connection;
pub use voice::{Quality, ServiceInfo, VoiceDescriptor};
pub use voxcheck_protocol as protocol;
