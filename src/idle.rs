use crate::host::HostCommands;
use log::{debug, info, warn};
use std::sync::Arc;

/// Puts the host to sleep after a period without user activity.
///
/// Owns the only idle timer in the process and the "a session is open"
/// flag. Both change only through [`record_activity`](Self::record_activity)
/// and [`suppress_while_playing`](Self::suppress_while_playing).
pub struct IdleSession {
    host: Arc<dyn HostCommands>,
    timeout_secs: f64,
    deadline: Option<f64>,
    session_open: bool,
    torn_down: bool,
    sleep_requests: u32,
}

impl IdleSession {
    pub fn new(host: Arc<dyn HostCommands>, timeout_minutes: u32) -> Self {
        Self {
            host,
            timeout_secs: minutes_to_secs(timeout_minutes),
            deadline: None,
            session_open: false,
            torn_down: false,
            sleep_requests: 0,
        }
    }

    /// Starts the timer for the first time.
    pub fn start(&mut self, now: f64) {
        self.rearm(now);
    }

    pub fn timeout_secs(&self) -> f64 {
        self.timeout_secs
    }

    pub fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    pub fn is_session_open(&self) -> bool {
        self.session_open
    }

    pub fn sleep_requests(&self) -> u32 {
        self.sleep_requests
    }

    /// Applies a new timeout. A running timer restarts with the new duration.
    pub fn set_timeout_minutes(&mut self, minutes: u32, now: f64) {
        let secs = minutes_to_secs(minutes);
        if (secs - self.timeout_secs).abs() < f64::EPSILON {
            return;
        }
        info!("Idle timeout set to {} min", minutes);
        self.timeout_secs = secs;
        if self.deadline.is_some() {
            self.rearm(now);
        }
    }

    /// Any user input: restart the timer and tell the host.
    pub fn record_activity(&mut self, now: f64) {
        if self.torn_down {
            return;
        }
        self.rearm(now);
        if let Err(e) = self.host.reset_idle_tracker() {
            warn!("Idle tracker reset failed: {}", e);
        }
    }

    /// Marks a playback session as opened (`true`) or closed (`false`).
    /// Both restart the timer with its full duration.
    pub fn suppress_while_playing(&mut self, active: bool, now: f64) {
        if self.torn_down {
            return;
        }
        debug!("Playback session open: {}", active);
        self.session_open = active;
        self.rearm(now);
    }

    /// Fires the timer when due. Returns `true` if sleep was requested.
    pub fn tick(&mut self, now: f64) -> bool {
        match self.deadline {
            Some(due) if now >= due => {}
            _ => return false,
        }
        self.deadline = None;

        if self.session_open {
            debug!("Idle timeout reached during playback, ignoring");
            return false;
        }

        info!("No activity for {:.0}s, putting host to sleep", self.timeout_secs);
        self.sleep_requests += 1;
        if let Err(e) = self.host.sleep() {
            warn!("Sleep request failed: {}", e);
        }
        true
    }

    /// Cancels the timer and ignores every later event.
    pub fn teardown(&mut self) {
        self.deadline = None;
        self.torn_down = true;
    }

    fn rearm(&mut self, now: f64) {
        if !self.torn_down {
            self.deadline = Some(now + self.timeout_secs);
        }
    }
}

fn minutes_to_secs(minutes: u32) -> f64 {
    f64::from(minutes.max(1)) * 60.0
}
