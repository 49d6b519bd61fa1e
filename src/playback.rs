use crate::error::{MediaError, PlaybackError};
use log::{debug, info, warn};
use std::fmt;

/// Notifications raised by a media surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The source is prepared and playback can begin.
    Ready,
    /// Playback moved forward (a frame was presented).
    Progress,
    /// The clip reached its natural end.
    Ended,
    Error(String),
}

/// The decode/render primitive a session drives.
pub trait MediaSurface {
    fn load(&mut self, url: &str) -> Result<(), MediaError>;
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self) -> Result<(), MediaError>;
    fn seek_to_start(&mut self) -> Result<(), MediaError>;

    /// Play as if the user had asked for it. Surfaces that refuse
    /// programmatic resumes override this.
    fn user_gesture_play(&mut self) -> Result<(), MediaError> {
        self.play()
    }

    /// Drains the events raised since the previous call.
    fn poll_events(&mut self) -> Vec<MediaEvent>;

    /// Frees everything acquired by `load`. Called exactly once per session.
    fn release(&mut self);
}

/// Surface used when the binary is built without a media backend.
#[derive(Debug, Default)]
pub struct UnavailableSurface;

impl MediaSurface for UnavailableSurface {
    fn load(&mut self, _url: &str) -> Result<(), MediaError> {
        Err(MediaError("no media backend compiled in".to_string()))
    }

    fn play(&mut self) -> Result<(), MediaError> {
        Err(MediaError("no media backend compiled in".to_string()))
    }

    fn pause(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    fn seek_to_start(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        Vec::new()
    }

    fn release(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackTiming {
    /// How long a playing session may go without progress.
    pub stall_check_secs: f64,
    /// Delay between dropping and restoring play intent during recovery.
    pub recovery_debounce_secs: f64,
    pub max_recovery_attempts: u32,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            stall_check_secs: 1.0,
            recovery_debounce_secs: 0.05,
            max_recovery_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Ready,
    Playing,
    Paused,
    Stalled,
    Recovering,
    Error,
    Completed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Error | Phase::Completed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What to play. Values are copied from the configuration at selection
/// time and never change for the life of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub action_id: i64,
    pub title: String,
    pub url: String,
    pub play_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Finished { plays: u32 },
    Failed(PlaybackError),
}

/// One run of a selected action: plays the clip `play_count` times,
/// watching for stalls and recovering from them.
///
/// The session is clock-driven. Callers feed the current time to
/// [`tick`](Self::tick); media events are drained from the surface there,
/// then the resume and watchdog deadlines are checked.
pub struct PlaybackSession {
    surface: Box<dyn MediaSurface>,
    timing: PlaybackTiming,
    request: SessionRequest,
    phase: Phase,
    completed_plays: u32,
    retry_count: u32,
    play_starts: u32,
    ready_seen: bool,
    play_intent: bool,
    // A loop ended while paused; resuming starts the next one.
    restart_pending: bool,
    // Monotonic count of progress events and its value at the last check.
    progress: u64,
    progress_at_check: u64,
    watchdog_due: Option<f64>,
    resume_due: Option<f64>,
    released: bool,
}

impl PlaybackSession {
    /// Loads the media and returns a session waiting for readiness.
    pub fn open(
        surface: Box<dyn MediaSurface>,
        mut request: SessionRequest,
        timing: PlaybackTiming,
    ) -> Result<Self, PlaybackError> {
        request.play_count = request.play_count.max(1);
        let mut session = Self {
            surface,
            timing,
            request,
            phase: Phase::Loading,
            completed_plays: 0,
            retry_count: 0,
            play_starts: 0,
            ready_seen: false,
            play_intent: false,
            restart_pending: false,
            progress: 0,
            progress_at_check: 0,
            watchdog_due: None,
            resume_due: None,
            released: false,
        };

        info!(
            target: "playback",
            "Opening action {} '{}' x{} from {}",
            session.request.action_id,
            session.request.title,
            session.request.play_count,
            session.request.url
        );
        if let Err(e) = session.surface.load(&session.request.url) {
            session.set_phase(Phase::Error);
            // Dropping the session releases the surface.
            return Err(PlaybackError::MediaPrepare(e.0));
        }
        Ok(session)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn action_id(&self) -> i64 {
        self.request.action_id
    }

    pub fn title(&self) -> &str {
        &self.request.title
    }

    pub fn url(&self) -> &str {
        &self.request.url
    }

    pub fn target_plays(&self) -> u32 {
        self.request.play_count
    }

    pub fn completed_plays(&self) -> u32 {
        self.completed_plays
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Number of times the clip was started from the beginning.
    pub fn play_starts(&self) -> u32 {
        self.play_starts
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Paused
    }

    pub fn has_pending_timers(&self) -> bool {
        self.watchdog_due.is_some() || self.resume_due.is_some()
    }

    /// Advances the session to `now`. Returns the outcome once it ends.
    pub fn tick(&mut self, now: f64) -> Option<SessionOutcome> {
        if self.phase.is_terminal() {
            return None;
        }

        for event in self.surface.poll_events() {
            if let Some(outcome) = self.handle_event(event, now) {
                return Some(outcome);
            }
        }

        if matches!(self.resume_due, Some(due) if now >= due) {
            self.resume(now);
        }

        if matches!(self.watchdog_due, Some(due) if now >= due) {
            return self.check_progress(now);
        }
        None
    }

    /// Flips between playing and paused. Ignored until the surface has
    /// reported readiness, and outside of the playing/paused phases.
    pub fn toggle_pause(&mut self, now: f64) -> bool {
        if !self.ready_seen {
            debug!(target: "playback", "Toggle ignored, media not ready");
            return false;
        }
        match self.phase {
            Phase::Playing => {
                if let Err(e) = self.surface.pause() {
                    warn!(target: "playback", "Pause failed: {}", e);
                }
                self.play_intent = false;
                self.watchdog_due = None;
                self.set_phase(Phase::Paused);
                true
            }
            Phase::Paused => {
                if self.restart_pending {
                    self.restart_pending = false;
                    self.play_starts += 1;
                }
                self.request_play(false);
                self.play_intent = true;
                self.arm_watchdog(now);
                self.set_phase(Phase::Playing);
                true
            }
            _ => false,
        }
    }

    /// Cancels every pending timer and releases the surface.
    pub fn close(&mut self) {
        self.watchdog_due = None;
        self.resume_due = None;
        self.play_intent = false;
        if !self.released {
            info!(
                target: "playback",
                "Closing action {} in phase {}",
                self.request.action_id,
                self.phase
            );
            self.surface.release();
            self.released = true;
        }
    }

    fn handle_event(&mut self, event: MediaEvent, now: f64) -> Option<SessionOutcome> {
        match event {
            MediaEvent::Ready => {
                if self.phase != Phase::Loading {
                    return None;
                }
                self.ready_seen = true;
                self.set_phase(Phase::Ready);
                self.start_play(now);
                None
            }
            MediaEvent::Progress => {
                self.progress += 1;
                if self.phase == Phase::Recovering {
                    info!(
                        target: "playback",
                        "Action {} recovered after {} attempt(s)",
                        self.request.action_id,
                        self.retry_count
                    );
                    self.retry_count = 0;
                    self.set_phase(Phase::Playing);
                }
                None
            }
            MediaEvent::Ended => {
                if !matches!(self.phase, Phase::Playing | Phase::Recovering | Phase::Paused) {
                    debug!(target: "playback", "End of clip ignored in phase {}", self.phase);
                    return None;
                }
                self.completed_plays += 1;
                if self.completed_plays < self.request.play_count {
                    debug!(
                        target: "playback",
                        "Loop {}/{} finished, restarting",
                        self.completed_plays,
                        self.request.play_count
                    );
                    if let Err(e) = self.surface.seek_to_start() {
                        warn!(target: "playback", "Seek to start failed: {}", e);
                    }
                    self.retry_count = 0;
                    if self.phase == Phase::Paused {
                        self.restart_pending = true;
                    } else {
                        self.set_phase(Phase::Playing);
                        self.start_play(now);
                    }
                    None
                } else {
                    self.set_phase(Phase::Completed);
                    self.cancel_timers();
                    Some(SessionOutcome::Finished {
                        plays: self.completed_plays,
                    })
                }
            }
            MediaEvent::Error(message) => {
                let error = if self.phase == Phase::Loading {
                    PlaybackError::MediaPrepare(message)
                } else {
                    PlaybackError::Media(message)
                };
                warn!(target: "playback", "Action {}: {}", self.request.action_id, error);
                self.set_phase(Phase::Error);
                self.cancel_timers();
                Some(SessionOutcome::Failed(error))
            }
        }
    }

    fn start_play(&mut self, now: f64) {
        self.play_starts += 1;
        self.request_play(false);
        self.play_intent = true;
        if self.phase == Phase::Ready {
            self.set_phase(Phase::Playing);
        }
        self.arm_watchdog(now);
    }

    /// Asks the surface to play, simulating a user gesture when the
    /// programmatic request is refused or when `gesture` is set.
    fn request_play(&mut self, gesture: bool) {
        if !gesture {
            match self.surface.play() {
                Ok(()) => return,
                Err(e) => warn!(target: "playback", "Play refused: {}", e),
            }
        }
        if let Err(e) = self.surface.user_gesture_play() {
            warn!(target: "playback", "Gesture play refused: {}", e);
        }
    }

    fn check_progress(&mut self, now: f64) -> Option<SessionOutcome> {
        if !self.play_intent {
            self.watchdog_due = None;
            return None;
        }
        if self.progress != self.progress_at_check {
            self.arm_watchdog(now);
            return None;
        }

        self.set_phase(Phase::Stalled);
        if self.retry_count >= self.timing.max_recovery_attempts {
            let error = PlaybackError::StallTimeout {
                attempts: self.retry_count,
            };
            warn!(target: "playback", "Action {}: {}", self.request.action_id, error);
            self.set_phase(Phase::Error);
            self.cancel_timers();
            return Some(SessionOutcome::Failed(error));
        }

        self.retry_count += 1;
        self.set_phase(Phase::Recovering);
        info!(
            target: "playback",
            "Recovery attempt {}/{} for action {}",
            self.retry_count,
            self.timing.max_recovery_attempts,
            self.request.action_id
        );
        if let Err(e) = self.surface.seek_to_start() {
            warn!(target: "playback", "Seek to start failed: {}", e);
        }
        if let Err(e) = self.surface.pause() {
            warn!(target: "playback", "Pause failed: {}", e);
        }
        self.play_intent = false;
        self.watchdog_due = None;
        self.resume_due = Some(now + self.timing.recovery_debounce_secs);
        None
    }

    fn resume(&mut self, now: f64) {
        self.resume_due = None;
        let last_attempt = self.retry_count >= self.timing.max_recovery_attempts;
        self.request_play(last_attempt);
        self.play_intent = true;
        self.arm_watchdog(now);
    }

    fn arm_watchdog(&mut self, now: f64) {
        self.progress_at_check = self.progress;
        self.watchdog_due = Some(now + self.timing.stall_check_secs);
    }

    fn cancel_timers(&mut self) {
        self.watchdog_due = None;
        self.resume_due = None;
        self.play_intent = false;
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!(
                target: "playback",
                "Action {}: {} -> {}",
                self.request.action_id,
                self.phase,
                phase
            );
            self.phase = phase;
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}
