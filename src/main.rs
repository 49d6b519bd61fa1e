use anglewing_kiosk::app::KioskApp;
use anglewing_kiosk::assets::{self, CONFIG_FILE_NAME};
use anglewing_kiosk::config::{ConfigSync, FileConfigSource};
use anglewing_kiosk::host::{HostCommands, SystemHost};
use anglewing_kiosk::kiosk::{Kiosk, SurfaceFactory};
use anglewing_kiosk::logging::{setup_logging, trim_log};
use anglewing_kiosk::path_resolver::PathResolver;
use anglewing_kiosk::playback::MediaSurface;
use anglewing_kiosk::settings::{executable_dir, Settings, SETTINGS_FILE_NAME};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use eframe::egui;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "anglewing_kiosk", about = "Unattended animation kiosk", version)]
struct Cli {
    /// Settings file (defaults to kiosk.toml next to the executable)
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Public assets folder containing config.json, backgrounds/ and animations/
    #[arg(long, value_name = "PATH")]
    assets_root: Option<PathBuf>,

    /// Run in a normal window instead of full screen
    #[arg(long)]
    windowed: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let exe_dir = executable_dir()?;

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| exe_dir.join(SETTINGS_FILE_NAME));
    // The logger depends on the settings, so problems are reported after it is up.
    let loaded = Settings::load(&settings_path);
    let settings = loaded.as_ref().cloned().unwrap_or_default();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        settings.log_level()
    };
    let log_file = settings.log_file_path(&exe_dir);
    setup_logging(&log_file, level)?;
    trim_log(&log_file, settings.logging.max_lines);

    info!("Starting Anglewing kiosk");
    match &loaded {
        Ok(_) if settings_path.exists() => info!("Settings loaded from {}", settings_path.display()),
        Ok(_) => warn!("Settings file {} not found, using defaults", settings_path.display()),
        Err(e) => error!("{:#}, using defaults", e),
    }

    let assets_override = cli
        .assets_root
        .clone()
        .or_else(|| settings.assets.root.as_ref().map(PathBuf::from));
    let host = Arc::new(SystemHost::new(assets_override.clone()));
    let assets_root = match host.public_assets_root() {
        Ok(root) => root,
        Err(e) => {
            let exe = std::env::current_exe().context("Failed to locate executable")?;
            let fallback = assets_override.unwrap_or_else(|| assets::discover_public_root(&exe));
            error!("{}; waiting for {}", e, fallback.display());
            fallback
        }
    };
    assets::ensure_asset_layout(&assets_root);
    assets::check_asset_integrity(&assets_root);

    let resolver = PathResolver::detect();
    let timing = &settings.timing;
    let config = ConfigSync::new(
        Box::new(FileConfigSource::new(assets_root.join(CONFIG_FILE_NAME))),
        resolver.clone(),
        assets_root,
        timing.config_poll_interval_secs(),
        timing.default_idle_timeout_minutes,
    );

    let (frame_tx, frame_rx) = watch::channel(None);
    let make_surface = surface_factory(Arc::new(frame_tx))?;
    let kiosk = Kiosk::new(host, resolver, config, make_surface, timing);

    let kiosk_mode = settings.ui.kiosk_mode && !cli.windowed;
    let mut viewport = egui::ViewportBuilder::default()
        .with_title("Anglewing")
        .with_inner_size([settings.ui.window_width, settings.ui.window_height]);
    if kiosk_mode {
        viewport = viewport.with_fullscreen(true).with_decorations(false);
    }
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    eframe::run_native(
        "Anglewing",
        options,
        Box::new(move |_cc| Ok(Box::new(KioskApp::new(kiosk, frame_rx)))),
    )
    .map_err(|e| anyhow!("Window failed: {e}"))
}

#[cfg(feature = "gstreamer")]
fn surface_factory(
    frames: anglewing_kiosk::video_player::FrameSender,
) -> Result<SurfaceFactory> {
    use anglewing_kiosk::video_player::VideoPlayer;

    // Portable builds ship their plugins next to the executable.
    let plugin_path = executable_dir()?.join("lib").join("gstreamer-1.0");
    if plugin_path.exists() {
        info!("Found bundled GStreamer plugins at {}", plugin_path.display());
        std::env::set_var("GST_PLUGIN_PATH", plugin_path);
    } else {
        warn!("Bundled GStreamer plugins not found, relying on the system installation");
    }
    gstreamer::init().context("Failed to initialize GStreamer")?;

    Ok(Box::new(move || {
        Box::new(VideoPlayer::new(frames.clone())) as Box<dyn MediaSurface>
    }))
}

#[cfg(not(feature = "gstreamer"))]
fn surface_factory(
    _frames: Arc<watch::Sender<Option<egui::ColorImage>>>,
) -> Result<SurfaceFactory> {
    warn!("Built with --no-default-features; animations cannot play");
    Ok(Box::new(|| {
        Box::new(anglewing_kiosk::playback::UnavailableSurface) as Box<dyn MediaSurface>
    }))
}
