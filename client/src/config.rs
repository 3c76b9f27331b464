use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 10200;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_INFO_ATTEMPTS: usize = 16;

/// Where a session connects and how long it is willing to wait.
/// Where to find the speech service and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Bound on establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Bound on the whole exchange, from `describe` to `audio-stop`.
    pub timeout: Duration,
    /// Messages read while waiting for `info` before giving up.
    pub max_info_attempts: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl SessionConfig {
    /// Default timeouts against `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            timeout: DEFAULT_TIMEOUT,
            max_info_attempts: DEFAULT_MAX_INFO_ATTEMPTS,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_info_attempts(mut self, attempts: usize) -> Self {
        self.max_info_attempts = attempts;
        self
    }

    /// `host:port`, as dialled.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
