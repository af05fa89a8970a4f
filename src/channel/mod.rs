//! The WebSocket link to the controller that announces avatar states.
//!
//! Both transports (tokio-tungstenite natively, the browser `WebSocket` on
//! wasm) drive the same [`ConnectionMachine`] and report everything as
//! [`ChannelEvent`]s, which the event loop interprets with [`interpret`].
//! The channel is receive-only.

use std::fmt::{self, Display, Formatter};

use instant::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::states::{AssetTable, AvatarState};

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod web;

/// `ws://host:port`, with IPv6 literals put in brackets.
pub fn endpoint_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("ws://[{}]:{}", host, port)
    } else {
        format!("ws://{}:{}", host, port)
    }
}

/// When to try again after the connection closed or failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// `false` connects exactly once.
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before giving up, `None` for no limit.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay before reconnect `attempt` (starting at 1), `None` once the
    /// policy gives up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || attempt == 0 {
            return None;
        }
        if let Some(max) = self.max_attempts {
            if attempt > max {
                return None;
            }
        }
        let exponent = (attempt - 1).min(64) as i32;
        let millis = (self.initial_delay_ms as f64 * self.factor.max(1.0).powi(exponent))
            .min(self.max_delay_ms as f64);
        Some(Duration::from_millis(millis as u64))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
    WaitingToReconnect { attempt: u32, delay: Duration },
}

/// Connection lifecycle shared by the transports.
///
/// `Connecting -> Open -> (Closed | Errored) -> WaitingToReconnect -> Connecting`.
/// An error followed by a close (the browser reports both) stays `Errored`.
#[derive(Clone, Debug)]
pub struct ConnectionMachine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempt: u32,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Connecting,
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn on_open(&mut self) {
        self.state = ConnectionState::Open;
        self.attempt = 0;
    }

    pub fn on_close(&mut self) {
        if self.state != ConnectionState::Errored {
            self.state = ConnectionState::Closed;
        }
    }

    pub fn on_error(&mut self) {
        self.state = ConnectionState::Errored;
    }

    /// Moves a closed or failed connection to `WaitingToReconnect` and returns
    /// the delay, or `None` if the policy gives up or the connection is still live.
    pub fn next_retry(&mut self) -> Option<Duration> {
        match self.state {
            ConnectionState::Closed | ConnectionState::Errored => {}
            ConnectionState::WaitingToReconnect { delay, .. } => return Some(delay),
            ConnectionState::Connecting | ConnectionState::Open => return None,
        }
        let attempt = self.attempt + 1;
        let delay = self.policy.delay(attempt)?;
        self.attempt = attempt;
        self.state = ConnectionState::WaitingToReconnect { attempt, delay };
        Some(delay)
    }

    /// The reconnect delay has passed.
    pub fn on_retry(&mut self) {
        if let ConnectionState::WaitingToReconnect { .. } = self.state {
            self.state = ConnectionState::Connecting;
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChannelError {
    Connect(String),
    Transport(String),
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Connect(reason) => write!(f, "could not connect: {}", reason),
            ChannelError::Transport(reason) => write!(f, "connection failed: {}", reason),
        }
    }
}

impl std::error::Error for ChannelError {}

/// What the transports report to the event loop.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Opened { url: String },
    Message(String),
    Closed { reason: Option<String> },
    Error(ChannelError),
    Reconnecting { attempt: u32, delay: Duration },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    Swap { state: AvatarState, path: String },
    /// A well formed message naming no known state.
    Unknown(Option<String>),
    Malformed(String),
}

/// Reads an inbound notification such as `{"estado": "hablar"}`. The state
/// is taken from `estado`, falling back to `state`; JSON that isn't an
/// object names no state.
pub fn interpret(text: &str, assets: &AssetTable) -> Dispatch {
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return Dispatch::Malformed(e.to_string()),
    };
    let Value::Object(fields) = message else {
        return Dispatch::Unknown(None);
    };
    match fields.get("estado").or_else(|| fields.get("state")) {
        Some(Value::String(name)) => match assets.resolve(name) {
            Some((state, path)) => Dispatch::Swap {
                state,
                path: path.to_string(),
            },
            None => Dispatch::Unknown(Some(name.clone())),
        },
        Some(other) => Dispatch::Unknown(Some(other.to_string())),
        None => Dispatch::Unknown(None),
    }
}

/// Binary frames carry the same JSON as text frames.
pub fn decode_binary(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
