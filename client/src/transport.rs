//! One TCP connection to a speech service.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;
use voxcheck_protocol::{read_message, write_message, Message};

use crate::error::SynthesisError;

/// An exclusively owned TCP connection that speaks the frame codec.
///
/// Once closed, every read and write fails with
/// [`SynthesisError::ConnectionClosed`].
pub struct Connection {
    addr: String,
    stream: Option<BufReader<TcpStream>>,
}

impl Connection {
    /// Open `host:port`, giving up after `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, SynthesisError> {
        let addr = format!("{host}:{port}");
        let stream = match time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SynthesisError::Connection {
                    addr,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SynthesisError::Connection {
                    addr,
                    reason: format!("timed out after {timeout:?}"),
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on {}: {}", addr, e);
        }
        debug!("Connected to {}", addr);

        Ok(Self {
            addr,
            stream: Some(BufReader::new(stream)),
        })
    }

    /// The `host:port` this connection was opened to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// False once [`Connection::close`] has run.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>, SynthesisError> {
        self.stream.as_mut().ok_or(SynthesisError::ConnectionClosed)
    }

    /// Write all of `bytes` and flush.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), SynthesisError> {
        let stream = self.stream()?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read exactly `len` bytes.
    pub async fn receive(&mut self, len: usize) -> Result<Vec<u8>, SynthesisError> {
        let mut buf = vec![0; len];
        self.stream()?.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Encode `message` and write it as one frame.
    pub async fn send_message(&mut self, message: &Message) -> Result<(), SynthesisError> {
        write_message(self.stream()?, message).await?;
        Ok(())
    }

    /// `Ok(None)` when the peer closed cleanly between frames.
    pub async fn receive_message(&mut self) -> Result<Option<Message>, SynthesisError> {
        Ok(read_message(self.stream()?).await?)
    }

    /// Shut the connection down. Calling it again does nothing.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.get_mut().shutdown().await {
                debug!("Shutdown of {} failed: {}", self.addr, e);
            }
            debug!("Closed connection to {}", self.addr);
        }
    }
}
