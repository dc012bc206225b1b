use std::time::{Duration, Instant};
use thiserror::Error;

pub const MAX_CONNECT_ATTEMPTS: u32 = 5;
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("transport queue full")]
    QueueFull,
    #[error("transport io: {0}")]
    Io(String),
}

/// What the socket reports back to the session core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed,
}

/// The persistent duplex text channel.
///
/// Implementations are non-blocking; outcomes of `connect` arrive later as
/// [`TransportEvent`]s on the channel handed to the controller.
pub trait Transport {
    fn connect(&mut self);
    fn send(&mut self, wire: String) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    RetryAt(Instant),
    RetryPending,
    GaveUp,
}

/// Connection status plus the capped fixed-delay reconnect policy.
#[derive(Debug, Clone)]
pub struct LinkState {
    status: LinkStatus,
    attempts: u32,
    retry_at: Option<Instant>,
    gave_up: bool,
    max_attempts: u32,
    retry_delay: Duration,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new(MAX_CONNECT_ATTEMPTS, RETRY_DELAY)
    }
}

impl LinkState {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            status: LinkStatus::Disconnected,
            attempts: 0,
            retry_at: None,
            gave_up: false,
            max_attempts,
            retry_delay,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn connect(&mut self, transport: &mut dyn Transport) {
        self.status = LinkStatus::Connecting;
        transport.connect();
    }

    pub fn opened(&mut self) {
        self.status = LinkStatus::Connected;
        self.attempts = 0;
        self.retry_at = None;
        self.gave_up = false;
    }

    pub fn closed(&mut self, now: Instant) -> CloseOutcome {
        self.status = LinkStatus::Disconnected;
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            self.retry_at = None;
            self.gave_up = true;
            return CloseOutcome::GaveUp;
        }
        match self.retry_at {
            Some(_) => CloseOutcome::RetryPending,
            None => {
                let at = now + self.retry_delay;
                self.retry_at = Some(at);
                CloseOutcome::RetryAt(at)
            }
        }
    }

    /// True once when the scheduled retry is due.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.retry_at {
            Some(at) if now >= at => {
                self.retry_at = None;
                true
            }
            _ => false,
        }
    }

    /// Manual reload after the ceiling was hit.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.retry_at = None;
        self.gave_up = false;
    }
}
