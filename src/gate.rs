use crate::config::KioskConfig;
use crate::error::GateError;
use crate::host::HostCommands;
use log::{info, warn};
use std::sync::Arc;

pub const PIN_LENGTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardedAction {
    CloseApplication,
    PowerOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    ChoosingAction,
    EnteringPin(GuardedAction),
}

/// PIN-protected confirmation for closing the kiosk or powering off the host.
pub struct ActionGate {
    host: Arc<dyn HostCommands>,
    stage: GateStage,
    pin_input: String,
    error: Option<GateError>,
    shutdown_grace_secs: f64,
    exit_due: Option<f64>,
}

impl ActionGate {
    pub fn new(host: Arc<dyn HostCommands>, shutdown_grace_secs: f64) -> Self {
        Self {
            host,
            stage: GateStage::ChoosingAction,
            pin_input: String::new(),
            error: None,
            shutdown_grace_secs,
            exit_due: None,
        }
    }

    pub fn stage(&self) -> GateStage {
        self.stage
    }

    pub fn pin_input(&self) -> &str {
        &self.pin_input
    }

    pub fn error(&self) -> Option<&GateError> {
        self.error.as_ref()
    }

    pub fn is_exit_pending(&self) -> bool {
        self.exit_due.is_some()
    }

    pub fn choose(&mut self, action: GuardedAction) {
        self.stage = GateStage::EnteringPin(action);
        self.pin_input.clear();
        self.error = None;
    }

    /// Replaces the typed PIN, keeping at most [`PIN_LENGTH`] characters.
    pub fn set_pin_input(&mut self, input: &str) {
        self.pin_input = input.chars().take(PIN_LENGTH).collect();
        self.error = None;
    }

    pub fn push_char(&mut self, c: char) {
        if self.pin_input.chars().count() < PIN_LENGTH {
            self.pin_input.push(c);
        }
        self.error = None;
    }

    pub fn back(&mut self) {
        self.stage = GateStage::ChoosingAction;
        self.pin_input.clear();
        self.error = None;
    }

    /// Checks the typed PIN against `config` and runs the chosen action.
    ///
    /// The error is also kept for display until the input changes.
    pub fn submit(&mut self, config: Option<&KioskConfig>, now: f64) -> Result<(), GateError> {
        let action = match self.stage {
            GateStage::EnteringPin(action) => action,
            GateStage::ChoosingAction => return Ok(()),
        };
        if self.exit_due.is_some() {
            return Ok(());
        }

        let result = self.validate_and_run(action, config, now);
        if let Err(e) = &result {
            warn!("Action gate: {}", e);
            self.error = Some(e.clone());
        }
        result
    }

    fn validate_and_run(
        &mut self,
        action: GuardedAction,
        config: Option<&KioskConfig>,
        now: f64,
    ) -> Result<(), GateError> {
        let expected = config
            .and_then(KioskConfig::pin)
            .ok_or(GateError::ConfigurationMissing)?;

        if self.pin_input != expected {
            self.pin_input.clear();
            return Err(GateError::PinMismatch);
        }
        self.pin_input.clear();

        match action {
            GuardedAction::CloseApplication => {
                info!("PIN accepted, closing application");
                self.host.exit_application().map_err(GateError::CloseFailed)
            }
            GuardedAction::PowerOff => {
                info!("PIN accepted, powering off");
                self.host.shutdown().map_err(GateError::ShutdownFailed)?;
                self.exit_due = Some(now + self.shutdown_grace_secs);
                Ok(())
            }
        }
    }

    /// Exits once the shutdown grace period has elapsed. Returns `true` when
    /// the exit was attempted.
    pub fn tick(&mut self, now: f64) -> bool {
        match self.exit_due {
            Some(due) if now >= due => {}
            _ => return false,
        }
        self.exit_due = None;
        if let Err(e) = self.host.exit_application() {
            warn!("Exit after shutdown failed: {}", e);
            self.error = Some(GateError::CloseFailed(e));
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::fake::FakeHost;

    fn config_with_pin(pin: Option<&str>) -> KioskConfig {
        KioskConfig {
            idle_timeout_minutes: 10,
            background: None,
            actions: Vec::new(),
            pin: pin.map(str::to_string),
        }
    }

    fn gate() -> (ActionGate, Arc<FakeHost>) {
        let host = Arc::new(FakeHost::default());
        (ActionGate::new(host.clone(), 1.0), host)
    }

    #[test]
    fn test_choose_and_back() {
        let (mut gate, _host) = gate();
        assert_eq!(gate.stage(), GateStage::ChoosingAction);
        gate.choose(GuardedAction::PowerOff);
        assert_eq!(gate.stage(), GateStage::EnteringPin(GuardedAction::PowerOff));
        gate.set_pin_input("12");
        gate.back();
        assert_eq!(gate.stage(), GateStage::ChoosingAction);
        assert!(gate.pin_input().is_empty());
    }

    #[test]
    fn test_pin_input_limited_to_four_chars() {
        let (mut gate, _host) = gate();
        gate.choose(GuardedAction::CloseApplication);
        gate.set_pin_input("123456");
        assert_eq!(gate.pin_input(), "1234");
        gate.push_char('9');
        assert_eq!(gate.pin_input(), "1234");
    }

    #[test]
    fn test_correct_pin_closes_once() {
        let (mut gate, host) = gate();
        let config = config_with_pin(Some("1234"));
        gate.choose(GuardedAction::CloseApplication);
        gate.set_pin_input("1234");
        assert!(gate.submit(Some(&config), 0.0).is_ok());
        assert_eq!(host.calls(), vec!["exit_application"]);
        assert!(!gate.tick(10.0));
        assert_eq!(host.count("exit_application"), 1);
    }

    #[test]
    fn test_correct_pin_shuts_down_then_exits() {
        let (mut gate, host) = gate();
        let config = config_with_pin(Some("1234"));
        gate.choose(GuardedAction::PowerOff);
        gate.set_pin_input("1234");
        assert!(gate.submit(Some(&config), 5.0).is_ok());
        assert_eq!(host.calls(), vec!["shutdown"]);
        assert!(gate.is_exit_pending());

        assert!(!gate.tick(5.5));
        assert!(gate.tick(6.0));
        assert_eq!(host.calls(), vec!["shutdown", "exit_application"]);
        assert!(!gate.tick(7.0));
    }

    #[test]
    fn test_wrong_pin_clears_input() {
        let (mut gate, host) = gate();
        let config = config_with_pin(Some("1234"));
        gate.choose(GuardedAction::CloseApplication);
        for wrong in ["0000", "4321", "123", "abcd"] {
            gate.set_pin_input(wrong);
            assert_eq!(gate.submit(Some(&config), 0.0), Err(GateError::PinMismatch));
            assert!(gate.pin_input().is_empty());
            assert_eq!(gate.error(), Some(&GateError::PinMismatch));
        }
        assert!(host.calls().is_empty());
        assert!(!GateError::PinMismatch.to_string().contains("1234"));
    }

    #[test]
    fn test_missing_pin_fails_closed() {
        let (mut gate, host) = gate();
        gate.choose(GuardedAction::PowerOff);
        for config in [None, Some(config_with_pin(None)), Some(config_with_pin(Some("")))] {
            for attempt in ["", "1234", "0000"] {
                gate.set_pin_input(attempt);
                assert_eq!(
                    gate.submit(config.as_ref(), 0.0),
                    Err(GateError::ConfigurationMissing)
                );
            }
        }
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_shutdown_failure_is_visible() {
        let (mut gate, host) = gate();
        host.fail_on("shutdown");
        let config = config_with_pin(Some("1234"));
        gate.choose(GuardedAction::PowerOff);
        gate.set_pin_input("1234");
        let err = gate.submit(Some(&config), 0.0).unwrap_err();
        assert!(matches!(err, GateError::ShutdownFailed(_)));
        assert_eq!(err.to_string(), "Could not power off the computer");
        assert!(!gate.is_exit_pending());
        assert!(!gate.tick(10.0));
    }

    #[test]
    fn test_close_failure_is_visible() {
        let (mut gate, host) = gate();
        host.fail_on("exit_application");
        let config = config_with_pin(Some("1234"));
        gate.choose(GuardedAction::CloseApplication);
        gate.set_pin_input("1234");
        assert!(matches!(
            gate.submit(Some(&config), 0.0),
            Err(GateError::CloseFailed(_))
        ));
        assert!(gate.error().is_some());
    }

    #[test]
    fn test_typing_clears_error() {
        let (mut gate, _host) = gate();
        let config = config_with_pin(Some("1234"));
        gate.choose(GuardedAction::CloseApplication);
        gate.set_pin_input("9999");
        let _ = gate.submit(Some(&config), 0.0);
        assert!(gate.error().is_some());
        gate.push_char('1');
        assert!(gate.error().is_none());
    }
}
