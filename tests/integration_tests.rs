use anglewing_kiosk::config::{ConfigSync, FileConfigSource};
use anglewing_kiosk::error::{GateError, HostCommandError, MediaError, PlaybackError, SelectError};
use anglewing_kiosk::gate::{GateStage, GuardedAction};
use anglewing_kiosk::host::HostCommands;
use anglewing_kiosk::kiosk::{Kiosk, SurfaceFactory};
use anglewing_kiosk::path_resolver::{AssetCategory, PathResolver, UnixFileUrl};
use anglewing_kiosk::playback::{MediaEvent, MediaSurface, Phase};
use anglewing_kiosk::settings::TimingSettings;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SAMPLE_CONFIG: &str = r#"{
    "animations": [ { "id": 1, "title": "A", "file": "a.mp4", "playCount": 2 } ],
    "security": { "pin": "1234" }
}"#;

#[derive(Default)]
struct SurfaceLog {
    calls: Vec<String>,
    events: VecDeque<MediaEvent>,
    releases: u32,
}

#[derive(Clone, Default)]
struct TestSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl TestSurface {
    fn push(&self, event: MediaEvent) {
        self.log.lock().unwrap().events.push_back(event);
    }

    fn releases(&self) -> u32 {
        self.log.lock().unwrap().releases
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) {
        self.log.lock().unwrap().calls.push(call);
    }
}

impl MediaSurface for TestSurface {
    fn load(&mut self, url: &str) -> Result<(), MediaError> {
        self.record(format!("load {url}"));
        Ok(())
    }

    fn play(&mut self) -> Result<(), MediaError> {
        self.record("play".to_string());
        Ok(())
    }

    fn pause(&mut self) -> Result<(), MediaError> {
        self.record("pause".to_string());
        Ok(())
    }

    fn seek_to_start(&mut self) -> Result<(), MediaError> {
        self.record("seek".to_string());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        self.log.lock().unwrap().events.drain(..).collect()
    }

    fn release(&mut self) {
        self.record("release".to_string());
        self.log.lock().unwrap().releases += 1;
    }
}

#[derive(Default)]
struct RecordingHost {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingHost {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| **c == command).count()
    }

    fn record(&self, command: &'static str) -> Result<(), HostCommandError> {
        self.calls.lock().unwrap().push(command);
        Ok(())
    }
}

impl HostCommands for RecordingHost {
    fn public_assets_root(&self) -> Result<PathBuf, HostCommandError> {
        Err(HostCommandError::new("public_assets_root", "not used in tests"))
    }

    fn reset_idle_tracker(&self) -> Result<(), HostCommandError> {
        self.record("reset_idle_tracker")
    }

    fn sleep(&self) -> Result<(), HostCommandError> {
        self.record("sleep")
    }

    fn shutdown(&self) -> Result<(), HostCommandError> {
        self.record("shutdown")
    }

    fn exit_application(&self) -> Result<(), HostCommandError> {
        self.record("exit_application")
    }
}

struct Harness {
    _assets: TempDir,
    root: PathBuf,
    kiosk: Kiosk,
    host: Arc<RecordingHost>,
    surfaces: Arc<Mutex<Vec<TestSurface>>>,
}

impl Harness {
    fn new(config: Option<&str>) -> Self {
        let assets = TempDir::new().unwrap();
        let root = assets.path().to_path_buf();
        fs::create_dir_all(root.join("animations")).unwrap();
        fs::create_dir_all(root.join("backgrounds")).unwrap();
        if let Some(body) = config {
            write_config(&root, body);
        }

        let host = Arc::new(RecordingHost::default());
        let resolver = PathResolver::new(Arc::new(UnixFileUrl));
        let timing = TimingSettings::default();
        let sync = ConfigSync::new(
            Box::new(FileConfigSource::new(root.join("config.json"))),
            resolver.clone(),
            root.clone(),
            timing.config_poll_interval_secs(),
            timing.default_idle_timeout_minutes,
        );

        let surfaces: Arc<Mutex<Vec<TestSurface>>> = Arc::default();
        let created = surfaces.clone();
        let factory: SurfaceFactory = Box::new(move || {
            let surface = TestSurface::default();
            created.lock().unwrap().push(surface.clone());
            Box::new(surface)
        });

        let kiosk = Kiosk::new(host.clone(), resolver, sync, factory, &timing);
        Self {
            _assets: assets,
            root,
            kiosk,
            host,
            surfaces,
        }
    }

    fn surface(&self) -> TestSurface {
        self.surfaces.lock().unwrap().last().cloned().unwrap()
    }
}

fn write_config(root: &Path, body: &str) {
    fs::write(root.join("config.json"), body).unwrap();
}

#[test]
fn test_sample_scenario_plays_twice_and_closes_once() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);

    h.kiosk.select_action(1, 1.0).unwrap();
    let session = h.kiosk.session().unwrap();
    assert_eq!(session.target_plays(), 2);
    assert_eq!(session.title(), "A");

    let surface = h.surface();
    surface.push(MediaEvent::Ready);
    h.kiosk.tick(1.1);
    surface.push(MediaEvent::Progress);
    surface.push(MediaEvent::Ended);
    h.kiosk.tick(1.5);
    assert_eq!(h.kiosk.session().unwrap().completed_plays(), 1);

    surface.push(MediaEvent::Progress);
    surface.push(MediaEvent::Ended);
    h.kiosk.tick(2.0);

    assert!(h.kiosk.session().is_none());
    assert_eq!(surface.releases(), 1);
    // Closing rearmed a full ten minute idle timer.
    assert_eq!(h.kiosk.idle().deadline(), Some(602.0));
    assert!(!h.kiosk.idle().is_session_open());
}

#[test]
fn test_selected_url_points_into_animations() {
    let mut h = Harness::new(Some(
        r##"{ "animations": [ { "id": 7, "title": "Hash", "file": "clip #1.mp4", "playCount": 1 } ] }"##,
    ));
    h.kiosk.tick(0.0);
    h.kiosk.select_action(7, 0.5).unwrap();

    let expected = PathResolver::new(Arc::new(UnixFileUrl))
        .resolve(&h.root.to_string_lossy(), AssetCategory::Animations, "clip #1.mp4")
        .unwrap();
    assert!(expected.ends_with("/animations/clip%20%231.mp4"));
    assert_eq!(h.surface().calls()[0], format!("load {expected}"));
}

#[test]
fn test_selection_waits_for_configuration_file() {
    let mut h = Harness::new(None);
    h.kiosk.tick(0.0);
    assert_eq!(h.kiosk.select_action(1, 1.0), Err(SelectError::NoConfiguration));

    write_config(&h.root, SAMPLE_CONFIG);
    h.kiosk.tick(29.0);
    assert!(h.kiosk.config().is_none());
    h.kiosk.tick(30.0);
    assert!(h.kiosk.config().is_some());
    assert!(h.kiosk.select_action(1, 31.0).is_ok());
}

#[test]
fn test_broken_reload_keeps_last_good_configuration() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);
    write_config(&h.root, "{ \"animations\": [");
    h.kiosk.tick(30.0);
    assert_eq!(h.kiosk.config().unwrap().actions.len(), 1);

    write_config(
        &h.root,
        r#"{ "inactivity_timeout_in_minutes": 2, "animations": [] }"#,
    );
    h.kiosk.tick(60.0);
    assert!(h.kiosk.config().unwrap().actions.is_empty());
    assert_eq!(h.kiosk.idle().timeout_secs(), 120.0);
}

#[test]
fn test_idle_sleep_suppressed_until_session_closes() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);
    h.kiosk.select_action(1, 599.0).unwrap();
    let surface = h.surface();
    surface.push(MediaEvent::Ready);

    let mut now = 599.0;
    while now < 1300.0 {
        now += 0.5;
        surface.push(MediaEvent::Progress);
        h.kiosk.tick(now);
    }
    assert_eq!(h.host.count("sleep"), 0);

    h.kiosk.close_session(now);
    assert_eq!(h.kiosk.idle().deadline(), Some(now + 600.0));
    h.kiosk.tick(now + 599.0);
    assert_eq!(h.host.count("sleep"), 0);
    h.kiosk.tick(now + 600.0);
    assert_eq!(h.host.count("sleep"), 1);
}

#[test]
fn test_activity_keeps_host_awake() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);
    let mut now = 0.0;
    for _ in 0..10 {
        now += 500.0;
        h.kiosk.record_activity(now);
        h.kiosk.tick(now + 1.0);
    }
    assert_eq!(h.host.count("sleep"), 0);
    assert_eq!(h.host.count("reset_idle_tracker"), 10);
}

#[test]
fn test_four_stalls_end_session_with_error() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);
    h.kiosk.select_action(1, 0.0).unwrap();
    h.surface().push(MediaEvent::Ready);

    let mut now = 0.0;
    while now < 10.0 && h.kiosk.session().is_some() {
        now += 0.05;
        h.kiosk.tick(now);
    }

    assert!(h.kiosk.session().is_none());
    assert_eq!(h.surface().releases(), 1);
    assert_eq!(
        h.kiosk.notice(),
        Some(PlaybackError::StallTimeout { attempts: 3 }.to_string().as_str())
    );
}

#[test]
fn test_recovers_after_two_stalls_and_completes() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);
    h.kiosk.select_action(1, 0.0).unwrap();
    let surface = h.surface();
    surface.push(MediaEvent::Ready);

    let mut now = 0.0;
    while h.kiosk.session().unwrap().retry_count() < 2 {
        now += 0.05;
        h.kiosk.tick(now);
    }
    now += 0.1;
    surface.push(MediaEvent::Progress);
    h.kiosk.tick(now);
    assert_eq!(h.kiosk.session().unwrap().phase(), Phase::Playing);

    for _ in 0..2 {
        now += 0.5;
        surface.push(MediaEvent::Progress);
        surface.push(MediaEvent::Ended);
        h.kiosk.tick(now);
    }
    assert!(h.kiosk.session().is_none());
    assert!(h.kiosk.notice().is_none());
}

#[test]
fn test_pin_gate_close_and_power_off() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);

    h.kiosk.open_gate();
    let gate = h.kiosk.gate_mut().unwrap();
    gate.choose(GuardedAction::CloseApplication);
    gate.set_pin_input("9999");
    assert_eq!(h.kiosk.submit_pin(1.0), Err(GateError::PinMismatch));
    assert_eq!(h.kiosk.gate().unwrap().pin_input(), "");
    assert_eq!(
        h.kiosk.gate().unwrap().stage(),
        GateStage::EnteringPin(GuardedAction::CloseApplication)
    );

    h.kiosk.gate_mut().unwrap().set_pin_input("1234");
    h.kiosk.submit_pin(2.0).unwrap();
    assert_eq!(h.host.calls(), vec!["exit_application"]);

    h.kiosk.dismiss_gate();
    h.kiosk.open_gate();
    let gate = h.kiosk.gate_mut().unwrap();
    gate.choose(GuardedAction::PowerOff);
    gate.set_pin_input("1234");
    h.kiosk.submit_pin(3.0).unwrap();
    h.kiosk.tick(3.5);
    assert_eq!(h.host.calls(), vec!["exit_application", "shutdown"]);
    h.kiosk.tick(4.0);
    assert_eq!(
        h.host.calls(),
        vec!["exit_application", "shutdown", "exit_application"]
    );
}

#[test]
fn test_gate_without_pin_never_accepts() {
    let mut h = Harness::new(Some(r#"{ "animations": [] }"#));
    h.kiosk.tick(0.0);
    h.kiosk.open_gate();
    h.kiosk.gate_mut().unwrap().choose(GuardedAction::PowerOff);
    for attempt in ["0000", "1234", ""] {
        h.kiosk.gate_mut().unwrap().set_pin_input(attempt);
        assert_eq!(h.kiosk.submit_pin(1.0), Err(GateError::ConfigurationMissing));
    }
    assert!(h.host.calls().is_empty());
}

#[test]
fn test_teardown_stops_all_activity() {
    let mut h = Harness::new(Some(SAMPLE_CONFIG));
    h.kiosk.tick(0.0);
    h.kiosk.select_action(1, 1.0).unwrap();
    h.kiosk.teardown();
    assert_eq!(h.surface().releases(), 1);

    write_config(&h.root, r#"{ "animations": [] }"#);
    h.kiosk.tick(5000.0);
    assert_eq!(h.kiosk.config().unwrap().actions.len(), 1);
    assert!(h.host.calls().is_empty());
}

#[test]
fn test_media_backend_is_a_default_feature() {
    let manifest = fs::read_to_string(Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml")).unwrap();
    let manifest: toml::Value = toml::from_str(&manifest).unwrap();
    let defaults = manifest["features"]["default"].as_array().unwrap();
    assert!(defaults.iter().any(|f| f.as_str() == Some("gstreamer")));
}
