//! Connection health over refresh cycles.
//!
//! A rolling state machine: any cycle failure records an error, three
//! consecutive failures mean disconnected, any success restores connected.
//! Refresh loops consult `is_disconnected` to suppress deliveries that would
//! paint the UI from a stale replica.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Consecutive failures that flip the state to disconnected.
pub const DISCONNECT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Degraded,
    Disconnected,
}

/// State change produced by a report; callers forward these to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Degraded,
    Disconnected,
    Reconnected,
}

#[derive(Debug)]
struct HealthInner {
    state: ConnectionState,
    consecutive_failures: u32,
    last_error: Option<(String, DateTime<Utc>)>,
}

pub struct HealthTracker {
    inner: RwLock<HealthInner>,
    threshold: u32,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::with_threshold(DISCONNECT_THRESHOLD)
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            inner: RwLock::new(HealthInner {
                state: ConnectionState::Connected,
                consecutive_failures: 0,
                last_error: None,
            }),
            threshold: threshold.max(1),
        }
    }

    /// Record a cycle failure. Returns the transition it caused, if any.
    pub fn report_error(&self, err: impl Into<String>) -> Transition {
        let mut inner = self.inner.write().expect("health lock");
        inner.consecutive_failures += 1;
        inner.last_error = Some((err.into(), Utc::now()));
        let next = if inner.consecutive_failures >= self.threshold {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Degraded
        };
        if inner.state == next {
            return Transition::None;
        }
        inner.state = next;
        match next {
            ConnectionState::Disconnected => Transition::Disconnected,
            _ => Transition::Degraded,
        }
    }

    /// Record a cycle success; resets the failure counter.
    pub fn report_success(&self) -> Transition {
        let mut inner = self.inner.write().expect("health lock");
        inner.consecutive_failures = 0;
        if inner.state == ConnectionState::Connected {
            return Transition::None;
        }
        inner.state = ConnectionState::Connected;
        Transition::Reconnected
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.read().expect("health lock").state == ConnectionState::Disconnected
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read().expect("health lock").state
    }

    pub fn last_error(&self) -> Option<(String, DateTime<Utc>)> {
        self.inner.read().expect("health lock").last_error.clone()
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
