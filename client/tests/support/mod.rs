//! Scripted stand-in for a Wyoming speech service.

#![allow(dead_code)]

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use voxcheck_client::protocol::{
    read_message, write_message, AudioChunk, AudioFormat, AudioStart, AudioStop, Event, Info,
    Message, MessageKind, TtsProgram, TtsVoice,
};
use voxcheck_client::SessionConfig;

pub enum Reply {
    Send(Message),
    Raw(Vec<u8>),
    /// Drop the socket.
    Hangup,
    /// Stop answering and wait for the client to go away.
    Stall,
}

#[derive(Default)]
pub struct Script {
    pub on_connect: Vec<Reply>,
    pub on_describe: Vec<Reply>,
    pub on_synthesize: Vec<Reply>,
}

pub struct FakeService {
    pub addr: SocketAddr,
    handle: JoinHandle<Vec<Message>>,
}

impl FakeService {
    /// Accept one connection and play `script` against it.
    pub async fn spawn(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(BufReader::new(stream), script).await
        });
        Self { addr, handle }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::new(self.addr.ip().to_string(), self.addr.port())
    }

    /// Messages the client sent, once the connection is gone.
    pub async fn received(self) -> Vec<Message> {
        self.handle.await.unwrap()
    }
}

async fn serve(mut stream: BufReader<TcpStream>, script: Script) -> Vec<Message> {
    let mut received = Vec::new();
    if !play(&mut stream, &script.on_connect).await {
        return received;
    }
    while let Ok(Some(message)) = read_message(&mut stream).await {
        let replies: &[Reply] = match message.kind {
            MessageKind::Describe => &script.on_describe,
            MessageKind::Synthesize => &script.on_synthesize,
            _ => &[],
        };
        received.push(message);
        if !play(&mut stream, replies).await {
            break;
        }
    }
    received
}

/// False once the script has ended the conversation.
async fn play(stream: &mut BufReader<TcpStream>, replies: &[Reply]) -> bool {
    for reply in replies {
        match reply {
            Reply::Send(message) => {
                if write_message(stream, message).await.is_err() {
                    return false;
                }
            }
            Reply::Raw(bytes) => {
                if stream.write_all(bytes).await.is_err() || stream.flush().await.is_err() {
                    return false;
                }
            }
            Reply::Hangup => return false,
            Reply::Stall => {
                let mut rest = Vec::new();
                let _ = stream.read_to_end(&mut rest).await;
                return false;
            }
        }
    }
    true
}

pub fn info(voices: &[&str]) -> Message {
    Info {
        tts: vec![TtsProgram {
            name: "piper".to_string(),
            description: Some("A fast, local, neural text to speech engine".to_string()),
            version: Some("1.6.2".to_string()),
            installed: true,
            voices: voices
                .iter()
                .map(|name| TtsVoice {
                    name: name.to_string(),
                    installed: true,
                    languages: vec![name.split('-').next().unwrap_or_default().to_string()],
                    ..Default::default()
                })
                .collect(),
        }],
    }
    .into_message()
}

pub fn start(format: AudioFormat) -> Message {
    AudioStart {
        format,
        timestamp: Some(0),
    }
    .into_message()
}

pub fn chunk(format: AudioFormat, pcm: Vec<u8>) -> Message {
    AudioChunk {
        format,
        timestamp: None,
        audio: pcm,
    }
    .into_message()
}

pub fn stop() -> Message {
    AudioStop::default().into_message()
}

pub fn sends(messages: Vec<Message>) -> Vec<Reply> {
    messages.into_iter().map(Reply::Send).collect()
}
