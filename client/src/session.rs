//! The synthesis session: connect, describe, synthesize, drain, disconnect.

use std::fmt;

use futures_util::stream::{self, Stream};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};
use voxcheck_protocol::{
    AudioChunk, AudioFormat, AudioStart, Describe, ErrorEvent, Event, Info, Message, MessageKind,
};

use crate::audio::{AudioAssembly, SynthesizedAudio};
use crate::config::SessionConfig;
use crate::error::{SessionError, SynthesisError};
use crate::request::SynthesisRequest;
use crate::transport::Connection;
use crate::voice::{ServiceInfo, VoiceDescriptor};

/// Where a [`Session`] is in its exchange with the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing sent yet.
    Idle,
    /// Connected; `describe` not answered yet.
    Connected,
    /// Voice catalog received.
    InfoReceived,
    /// `synthesize` sent, audio streaming in.
    Synthesizing,
    /// `audio-stop` received.
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Connected => "connected",
            Self::InfoReceived => "info-received",
            Self::Synthesizing => "synthesizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// One item of the lazily drained audio stream. The stream ends after
/// `audio-stop`.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// `audio-start` announced the stream format.
    Started(AudioFormat),
    /// One `audio-chunk` of raw PCM.
    Chunk { format: AudioFormat, pcm: Vec<u8> },
}

/// Drives one exchange with a speech service over a connection it owns.
///
/// Failures move the session to [`SessionState::Failed`] and release the
/// connection. A failed or completed session is not reused.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    connection: Option<Connection>,
    info: Option<ServiceInfo>,
    deadline: Option<Instant>,
    last_message: Option<MessageKind>,
    messages_decoded: usize,
    service_error: Option<String>,
}

impl Session {
    /// An idle session; nothing touches the network until [`Session::connect`].
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            connection: None,
            info: None,
            deadline: None,
            last_message: None,
            messages_decoded: 0,
            service_error: None,
        }
    }

    /// The configuration this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current position in the exchange.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The catalog from `info`, once received.
    pub fn info(&self) -> Option<&ServiceInfo> {
        self.info.as_ref()
    }

    /// Kind of the most recently decoded message.
    pub fn last_message(&self) -> Option<&MessageKind> {
        self.last_message.as_ref()
    }

    /// Messages decoded from the service so far.
    pub fn messages_decoded(&self) -> usize {
        self.messages_decoded
    }

    /// Text of the last `error` event the service sent, if any.
    pub fn service_error(&self) -> Option<&str> {
        self.service_error.as_deref()
    }

    /// Whether the session still holds an open connection.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_open)
    }

    /// Speak `request` end to end and return the finished audio.
    pub async fn synthesize(
        &mut self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, SessionError> {
        if let Err(e) = request.validate() {
            return Err(self.reject(e));
        }
        self.connect().await?;
        self.describe().await?;
        let audio = self.stream(request).await?.collect_audio().await?;
        self.close().await;
        Ok(audio)
    }

    /// `Idle` to `Connected`. Starts the exchange deadline.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Idle, "connect")?;
        info!("Connecting to {}", self.config.addr());
        let connected = Connection::connect(
            &self.config.host,
            self.config.port,
            self.config.connect_timeout,
        )
        .await;
        match connected {
            Ok(connection) => {
                self.connection = Some(connection);
                self.deadline = Some(Instant::now() + self.config.timeout);
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// `Connected` to `InfoReceived`: ask for and wait on the service's
    /// voice catalog.
    pub async fn describe(&mut self) -> Result<&ServiceInfo, SessionError> {
        self.expect_state(SessionState::Connected, "describe")?;
        match self.await_info().await {
            Ok(service) => {
                info!(
                    "Service {} {} offers {} voice(s)",
                    service.name.as_deref().unwrap_or("(unnamed)"),
                    service.version.as_deref().unwrap_or(""),
                    service.voices.len()
                );
                self.state = SessionState::InfoReceived;
                let service: &ServiceInfo = self.info.insert(service);
                Ok(service)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn await_info(&mut self) -> Result<ServiceInfo, SynthesisError> {
        self.send(Describe::default().into_message()).await?;
        for _ in 0..self.config.max_info_attempts {
            let message = self
                .receive()
                .await?
                .ok_or(SynthesisError::ConnectionClosed)?;
            match message.kind {
                MessageKind::Info => return Ok(Info::from_message(&message)?.into()),
                MessageKind::Error => self.note_service_error(&message),
                ref other => warn!("Skipping {} while waiting for info", other),
            }
        }
        Err(SynthesisError::Protocol(format!(
            "no info among the first {} message(s)",
            self.config.max_info_attempts
        )))
    }

    /// Look a voice up in the catalog. An absent voice fails the session so
    /// no doomed `synthesize` is ever sent.
    pub fn select_voice(&mut self, name: &str) -> Result<VoiceDescriptor, SessionError> {
        self.expect_state(SessionState::InfoReceived, "select a voice")?;
        let found = self.info.as_ref().and_then(|info| info.voice(name)).cloned();
        match found {
            Some(voice) => {
                debug!("Selected voice {}", voice);
                Ok(voice)
            }
            None => {
                let available = self
                    .info
                    .as_ref()
                    .map(ServiceInfo::voice_names)
                    .unwrap_or_default();
                Err(self.fail(SynthesisError::VoiceNotFound {
                    requested: name.to_string(),
                    available,
                }))
            }
        }
    }

    /// `InfoReceived` to `Synthesizing`: send the request and hand back the
    /// stream of audio it produces.
    pub async fn stream(
        &mut self,
        request: &SynthesisRequest,
    ) -> Result<AudioStream<'_>, SessionError> {
        if let Err(e) = request.validate() {
            return Err(self.reject(e));
        }
        self.expect_state(SessionState::InfoReceived, "synthesize")?;
        if let Some(name) = &request.voice {
            self.select_voice(name)?;
        }

        self.state = SessionState::Synthesizing;
        info!(
            "Synthesizing {} chars (voice: {})",
            request.text.chars().count(),
            request.voice.as_deref().unwrap_or("service default")
        );
        if let Err(e) = self.send(request.to_event().into_message()).await {
            return Err(self.fail(e));
        }

        Ok(AudioStream {
            session: self,
            assembly: AudioAssembly::new(),
            progress: Progress::Open,
        })
    }

    /// Release the connection. Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }

    async fn send(&mut self, message: Message) -> Result<(), SynthesisError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(SynthesisError::ConnectionClosed)?;
        trace!("Sending {}", message.kind);
        connection.send_message(&message).await
    }

    async fn receive(&mut self) -> Result<Option<Message>, SynthesisError> {
        let timeout = self.config.timeout;
        let deadline = self.deadline;
        let connection = self
            .connection
            .as_mut()
            .ok_or(SynthesisError::ConnectionClosed)?;

        let received = match deadline {
            Some(deadline) => time::timeout_at(deadline, connection.receive_message())
                .await
                .map_err(|_| SynthesisError::Timeout(timeout))??,
            None => connection.receive_message().await?,
        };

        if let Some(message) = &received {
            self.messages_decoded += 1;
            self.last_message = Some(message.kind.clone());
            trace!("Received {} ({} payload bytes)", message.kind, message.payload_len());
        }
        Ok(received)
    }

    fn expect_state(&self, expected: SessionState, action: &str) -> Result<(), SessionError> {
        if self.state != expected {
            return Err(self.reject(SynthesisError::Protocol(format!(
                "cannot {action} while {}",
                self.state
            ))));
        }
        Ok(())
    }

    /// Error without a state change, for misuse and local validation.
    fn reject(&self, kind: SynthesisError) -> SessionError {
        SessionError {
            state: self.state,
            last_message: self.last_message.clone(),
            messages_decoded: self.messages_decoded,
            service_error: self.service_error.clone(),
            kind,
        }
    }

    /// Move to `Failed`, dropping the connection.
    fn fail(&mut self, kind: SynthesisError) -> SessionError {
        let err = self.reject(kind);
        warn!("Session failed while {}: {}", err.state, err.kind);
        self.state = SessionState::Failed;
        self.connection = None;
        err
    }

    /// `error` events are logged and remembered, never fatal on their own.
    fn note_service_error(&mut self, message: &Message) {
        let text = match ErrorEvent::from_message(message) {
            Ok(event) => event.text,
            Err(e) => format!("unreadable error event: {e}"),
        };
        warn!("Service reported an error: {}", text);
        self.service_error = Some(text);
    }
}

/// The audio a `synthesize` request produces, read from the connection one
/// event at a time. Finite and not restartable: it ends at `audio-stop`, after
/// which the connection is closed and the session is `Completed`.
///
/// Dropping the stream before `audio-stop` fails the session and releases
/// the connection.
pub struct AudioStream<'a> {
    session: &'a mut Session,
    assembly: AudioAssembly,
    progress: Progress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Open,
    Stopped,
    Failed,
}

impl<'a> AudioStream<'a> {
    /// Audio chunks received so far.
    pub fn chunks_received(&self) -> usize {
        self.assembly.chunk_count()
    }

    /// Next audio event, or `None` once `audio-stop` has arrived. Other
    /// message kinds are skipped. Events pulled here still count towards
    /// [`AudioStream::collect_audio`].
    pub async fn next_event(&mut self) -> Result<Option<AudioEvent>, SessionError> {
        if self.progress == Progress::Stopped {
            return Ok(None);
        }
        match self.read_event().await {
            Ok(Some(event)) => match self.absorb(&event) {
                Ok(()) => Ok(Some(event)),
                Err(e) => Err(self.fail(e)),
            },
            Ok(None) => {
                self.session.state = SessionState::Completed;
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Drain the rest of the stream into a finished artifact.
    pub async fn collect_audio(mut self) -> Result<SynthesizedAudio, SessionError> {
        loop {
            let absorbed = match self.read_event().await {
                Ok(Some(event)) => self.absorb(&event),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            if let Err(e) = absorbed {
                return Err(self.fail(e));
            }
        }

        let mut assembly = std::mem::take(&mut self.assembly);
        assembly.stop();
        match assembly.finish() {
            Ok(audio) => {
                info!(
                    "Received {} chunk(s), {} bytes, {:.2}s",
                    audio.chunk_count,
                    audio.pcm.len(),
                    audio.duration().as_secs_f32()
                );
                self.session.state = SessionState::Completed;
                Ok(audio)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// The same sequence as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<AudioEvent, SessionError>> + 'a {
        stream::try_unfold(self, |mut audio| async move {
            let next = audio.next_event().await?;
            Ok::<_, SessionError>(next.map(|event| (event, audio)))
        })
    }

    fn absorb(&mut self, event: &AudioEvent) -> Result<(), SynthesisError> {
        match event {
            AudioEvent::Started(format) => self.assembly.start(*format),
            AudioEvent::Chunk { format, pcm } => self.assembly.push(*format, pcm.clone()),
        }
    }

    async fn read_event(&mut self) -> Result<Option<AudioEvent>, SynthesisError> {
        match self.progress {
            Progress::Open => {}
            Progress::Stopped => return Ok(None),
            Progress::Failed => {
                return Err(SynthesisError::Protocol(
                    "audio stream already failed".to_string(),
                ))
            }
        }
        loop {
            let message = match self.session.receive().await {
                Ok(Some(message)) => message,
                Ok(None) | Err(SynthesisError::ConnectionClosed) => {
                    return Err(SynthesisError::IncompleteStream {
                        chunks: self.assembly.chunk_count(),
                    })
                }
                Err(e) => return Err(e),
            };

            match message.kind {
                MessageKind::AudioStart => {
                    let start = AudioStart::from_message(&message)?;
                    debug!(
                        "Audio format: {} Hz, {}-bit, {} channel(s)",
                        start.format.rate,
                        start.format.width_bytes().unwrap_or(0) * 8,
                        start.format.channels
                    );
                    return Ok(Some(AudioEvent::Started(start.format)));
                }
                MessageKind::AudioChunk => {
                    let chunk = AudioChunk::from_message(&message)?;
                    return Ok(Some(AudioEvent::Chunk {
                        format: chunk.format,
                        pcm: chunk.audio,
                    }));
                }
                MessageKind::AudioStop => {
                    debug!(
                        "Audio stopped after {} chunk(s)",
                        self.assembly.chunk_count()
                    );
                    self.progress = Progress::Stopped;
                    self.session.close().await;
                    return Ok(None);
                }
                MessageKind::Error => self.session.note_service_error(&message),
                ref other => warn!("Ignoring unexpected {} during synthesis", other),
            }
        }
    }

    fn fail(&mut self, kind: SynthesisError) -> SessionError {
        self.progress = Progress::Failed;
        self.session.fail(kind)
    }
}

impl Drop for AudioStream<'_> {
    fn drop(&mut self) {
        if self.progress == Progress::Open {
            let chunks = self.assembly.chunk_count();
            self.fail(SynthesisError::IncompleteStream { chunks });
        }
    }
}
