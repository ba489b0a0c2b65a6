//! Echo suppression
//!
//! Applying a remote command moves the local clock exactly like a user action
//! would. While the guard is armed, local actions are not turned into
//! outbound messages, so a command never bounces back and forth between peers.
//!
//! The guard is a deadline rather than a flag plus a stray timer: arming again
//! inside the window pushes the deadline back, and the event loop schedules
//! the clear from [`EchoGuard::deadline`].

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct EchoGuard {
    window: Duration,
    armed_until: Option<Instant>,
}

impl EchoGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            armed_until: None,
        }
    }

    /// Arm (or re-arm) the guard for one full window from now
    pub fn arm(&mut self) {
        self.armed_until = Some(Instant::now() + self.window);
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.armed_until, Some(until) if Instant::now() < until)
    }

    /// When the event loop should clear the guard
    pub fn deadline(&self) -> Option<Instant> {
        self.armed_until
    }

    /// Clear the guard if its deadline has passed. Returns whether it cleared.
    pub fn expire(&mut self) -> bool {
        match self.armed_until {
            Some(until) if Instant::now() >= until => {
                self.armed_until = None;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.armed_until = None;
    }
}
