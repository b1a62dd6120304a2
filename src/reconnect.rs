//! The auto-reconnect controller.
//!
//! Tracks how many consecutive attempts have been made, when the next one
//! is allowed, and whether the client has been told to stay dead. A
//! negative attempt bound means "retry forever"; a successful handshake
//! resets the counter.

use std::time::Duration;

use tokio::time::Instant;

/// Reconnect policy and progress for one client.
#[derive(Clone, Debug)]
pub struct Reconnector {
    max_attempts: i32,
    attempts: i32,
    delay: Duration,
    next_attempt_at: Option<Instant>,
    stay_dead: bool,
}

impl Reconnector {
    /// Create a controller with the given delay window and attempt bound.
    #[must_use]
    pub fn new(delay: Duration, max_attempts: i32) -> Self {
        Reconnector {
            max_attempts,
            attempts: 0,
            delay,
            next_attempt_at: None,
            stay_dead: false,
        }
    }

    /// Replace the policy (re-read from config on each connect cycle).
    pub fn set_policy(&mut self, delay: Duration, max_attempts: i32) {
        self.delay = delay;
        self.max_attempts = max_attempts;
    }

    /// The delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Consecutive attempts made since the last successful handshake.
    #[must_use]
    pub fn attempts(&self) -> i32 {
        self.attempts
    }

    /// The attempt bound; negative means infinite.
    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Change the attempt bound.
    pub fn set_max_attempts(&mut self, max_attempts: i32) {
        self.max_attempts = max_attempts;
    }

    /// Whether reconnecting has been suppressed entirely.
    #[must_use]
    pub fn stay_dead(&self) -> bool {
        self.stay_dead
    }

    /// Suppress (or re-allow) reconnecting.
    pub fn set_stay_dead(&mut self, stay_dead: bool) {
        self.stay_dead = stay_dead;
    }

    /// Record a disconnect: the next attempt may run after the delay.
    pub fn schedule(&mut self) {
        self.next_attempt_at = Some(Instant::now() + self.delay);
    }

    /// Whether the delay window has elapsed.
    #[must_use]
    pub fn due(&self) -> bool {
        match self.next_attempt_at {
            Some(at) => Instant::now() >= at,
            None => true,
        }
    }

    /// Whether the attempt budget is spent (never true for a negative
    /// bound).
    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.max_attempts >= 0 && self.attempts > self.max_attempts
    }

    /// Count an attempt as it begins.
    pub fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Successful handshake: clear the counter and the pending window.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_attempt_at = None;
    }
}
