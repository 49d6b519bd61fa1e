use crate::config::{ConfigPoll, ConfigSnapshot, ConfigSync, KioskConfig};
use crate::error::{GateError, SelectError};
use crate::gate::ActionGate;
use crate::host::HostCommands;
use crate::idle::IdleSession;
use crate::path_resolver::{AssetCategory, PathResolver};
use crate::playback::{MediaSurface, PlaybackSession, PlaybackTiming, SessionOutcome, SessionRequest};
use crate::settings::TimingSettings;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Builds a fresh surface for each playback session.
pub type SurfaceFactory = Box<dyn FnMut() -> Box<dyn MediaSurface>>;

/// The kiosk screen: configuration, idle timer, at most one playback session
/// and at most one action gate, all advanced from [`tick`](Self::tick).
pub struct Kiosk {
    host: Arc<dyn HostCommands>,
    resolver: PathResolver,
    config: ConfigSync,
    snapshot: Option<Arc<ConfigSnapshot>>,
    idle: IdleSession,
    session: Option<PlaybackSession>,
    gate: Option<ActionGate>,
    make_surface: SurfaceFactory,
    timing: PlaybackTiming,
    shutdown_grace_secs: f64,
    notice: Option<String>,
    started: bool,
}

impl Kiosk {
    pub fn new(
        host: Arc<dyn HostCommands>,
        resolver: PathResolver,
        config: ConfigSync,
        make_surface: SurfaceFactory,
        timing: &TimingSettings,
    ) -> Self {
        let idle = IdleSession::new(host.clone(), timing.default_idle_timeout_minutes);
        Self {
            host,
            resolver,
            config,
            snapshot: None,
            idle,
            session: None,
            gate: None,
            make_surface,
            timing: timing.playback(),
            shutdown_grace_secs: timing.shutdown_grace_secs(),
            notice: None,
            started: false,
        }
    }

    pub fn config(&self) -> Option<&KioskConfig> {
        self.snapshot.as_deref().map(|s| &s.config)
    }

    pub fn snapshot(&self) -> Option<Arc<ConfigSnapshot>> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ConfigSnapshot>>> {
        self.config.subscribe()
    }

    pub fn assets_root(&self) -> &Path {
        self.config.assets_root()
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn idle(&self) -> &IdleSession {
        &self.idle
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn tick(&mut self, now: f64) {
        if !self.started {
            self.started = true;
            self.idle.start(now);
        }

        if let Some(Ok(ConfigPoll::Changed(snapshot))) = self.config.tick(now) {
            self.idle
                .set_timeout_minutes(snapshot.config.idle_timeout_minutes, now);
            self.snapshot = Some(snapshot);
        }

        if let Some(outcome) = self.session.as_mut().and_then(|s| s.tick(now)) {
            match outcome {
                SessionOutcome::Finished { plays } => {
                    info!("Session finished after {} play(s)", plays);
                }
                SessionOutcome::Failed(e) => {
                    warn!("Session failed: {}", e);
                    self.notice = Some(e.to_string());
                }
            }
            self.close_session(now);
        }

        self.idle.tick(now);

        if let Some(gate) = &mut self.gate {
            gate.tick(now);
        }
    }

    pub fn record_activity(&mut self, now: f64) {
        self.idle.record_activity(now);
    }

    /// Opens a session for action `id` using the configuration as it is now.
    pub fn select_action(&mut self, id: i64, now: f64) -> Result<(), SelectError> {
        let result = self.open_session(id, now);
        match &result {
            Ok(()) => self.notice = None,
            Err(SelectError::SessionOpen | SelectError::GateOpen) => {}
            Err(e) => {
                warn!("Action {} not started: {}", id, e);
                self.notice = Some(e.to_string());
            }
        }
        result
    }

    fn open_session(&mut self, id: i64, now: f64) -> Result<(), SelectError> {
        if self.session.is_some() {
            return Err(SelectError::SessionOpen);
        }
        if self.gate.is_some() {
            return Err(SelectError::GateOpen);
        }
        let snapshot = self.snapshot.clone().ok_or(SelectError::NoConfiguration)?;
        let action = snapshot
            .config
            .action(id)
            .ok_or(SelectError::UnknownAction(id))?;

        let root = self.config.assets_root().to_string_lossy();
        let url = self
            .resolver
            .resolve(&root, AssetCategory::Animations, &action.file)?;
        let request = SessionRequest {
            action_id: action.id,
            title: action.title.clone(),
            url,
            play_count: action.play_count,
        };

        let session = PlaybackSession::open((self.make_surface)(), request, self.timing)?;
        self.session = Some(session);
        self.idle.suppress_while_playing(true, now);
        Ok(())
    }

    pub fn toggle_pause(&mut self, now: f64) -> bool {
        match &mut self.session {
            Some(session) => session.toggle_pause(now),
            None => false,
        }
    }

    /// Ends the open session, if any, and lets the idle timer run again.
    pub fn close_session(&mut self, now: f64) {
        if let Some(mut session) = self.session.take() {
            session.close();
            self.idle.suppress_while_playing(false, now);
        }
    }

    pub fn open_gate(&mut self) {
        if self.gate.is_none() {
            self.gate = Some(ActionGate::new(self.host.clone(), self.shutdown_grace_secs));
        }
    }

    pub fn gate(&self) -> Option<&ActionGate> {
        self.gate.as_ref()
    }

    pub fn gate_mut(&mut self) -> Option<&mut ActionGate> {
        self.gate.as_mut()
    }

    /// Closes the gate unless a delayed exit is still pending.
    pub fn dismiss_gate(&mut self) {
        if self.gate.as_ref().is_some_and(ActionGate::is_exit_pending) {
            return;
        }
        self.gate = None;
    }

    pub fn submit_pin(&mut self, now: f64) -> Result<(), GateError> {
        let config = self.snapshot.as_deref().map(|s| &s.config);
        match &mut self.gate {
            Some(gate) => gate.submit(config, now),
            None => Ok(()),
        }
    }

    /// Stops polling, the idle timer, playback and the gate.
    pub fn teardown(&mut self) {
        info!("Tearing down kiosk");
        self.config.stop();
        self.idle.teardown();
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        self.gate = None;
    }
}
