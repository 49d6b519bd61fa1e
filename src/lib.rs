pub mod app;
pub mod assets;
pub mod config;
pub mod error;
pub mod gate;
pub mod host;
pub mod idle;
pub mod kiosk;
pub mod logging;
pub mod path_resolver;
pub mod playback;
pub mod settings;
#[cfg(feature = "gstreamer")]
pub mod video_player;

pub use config::{Action, ConfigSnapshot, ConfigSource, ConfigSync, FileConfigSource, KioskConfig};
pub use error::{ConfigFetchError, GateError, HostCommandError, MediaError, PathResolutionError, PlaybackError, SelectError};
pub use host::{HostCommands, SystemHost};
pub use kiosk::{Kiosk, SurfaceFactory};
pub use path_resolver::{AssetCategory, PathResolver};
pub use playback::{MediaEvent, MediaSurface, PlaybackSession, PlaybackTiming, SessionOutcome};
pub use settings::Settings;
