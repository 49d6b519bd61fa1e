use crate::assets;
use crate::error::HostCommandError;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::process::{Child, Command};

/// Operations the kiosk asks the host machine to perform.
///
/// Implementations must not block the caller for longer than it takes to
/// hand the request to the operating system.
pub trait HostCommands: Send + Sync {
    fn public_assets_root(&self) -> Result<PathBuf, HostCommandError>;
    fn reset_idle_tracker(&self) -> Result<(), HostCommandError>;
    fn sleep(&self) -> Result<(), HostCommandError>;
    fn shutdown(&self) -> Result<(), HostCommandError>;
    fn exit_application(&self) -> Result<(), HostCommandError>;
}

/// The real host: spawns platform power commands and exits the process.
#[derive(Debug, Clone, Default)]
pub struct SystemHost {
    assets_root_override: Option<PathBuf>,
}

impl SystemHost {
    pub fn new(assets_root_override: Option<PathBuf>) -> Self {
        Self {
            assets_root_override,
        }
    }
}

impl HostCommands for SystemHost {
    fn public_assets_root(&self) -> Result<PathBuf, HostCommandError> {
        let candidate = match &self.assets_root_override {
            Some(root) => root.clone(),
            None => {
                let exe = std::env::current_exe().map_err(|e| {
                    HostCommandError::new("public_assets_root", format!("no executable path: {e}"))
                })?;
                assets::discover_public_root(&exe)
            }
        };
        assets::validate_root(&candidate)
    }

    fn reset_idle_tracker(&self) -> Result<(), HostCommandError> {
        // The operating system tracks input itself; nothing to forward.
        debug!("Idle tracker reset");
        Ok(())
    }

    fn sleep(&self) -> Result<(), HostCommandError> {
        info!("Requesting host sleep");
        spawn_power_command("sleep", sleep_commands())
    }

    fn shutdown(&self) -> Result<(), HostCommandError> {
        info!("Requesting host shutdown");
        spawn_power_command("shutdown", shutdown_commands())
    }

    fn exit_application(&self) -> Result<(), HostCommandError> {
        info!("Exiting application");
        log::logger().flush();
        std::process::exit(0)
    }
}

type CommandLine = (&'static str, &'static [&'static str]);

fn sleep_commands() -> &'static [CommandLine] {
    if cfg!(target_os = "macos") {
        &[("pmset", &["sleepnow"])]
    } else if cfg!(target_os = "windows") {
        &[("rundll32.exe", &["powrprof.dll,SetSuspendState", "0,1,0"])]
    } else if cfg!(target_os = "linux") {
        &[
            ("systemctl", &["suspend"]),
            (
                "dbus-send",
                &[
                    "--system",
                    "--print-reply",
                    "--dest=org.freedesktop.login1",
                    "/org/freedesktop/login1",
                    "org.freedesktop.login1.Manager.Suspend",
                    "boolean:true",
                ],
            ),
        ]
    } else {
        &[]
    }
}

fn shutdown_commands() -> &'static [CommandLine] {
    if cfg!(target_os = "macos") {
        &[("osascript", &["-e", "tell app \"System Events\" to shut down"])]
    } else if cfg!(target_os = "windows") {
        &[("shutdown", &["/s", "/t", "0"])]
    } else if cfg!(target_os = "linux") {
        &[
            ("systemctl", &["poweroff"]),
            (
                "dbus-send",
                &[
                    "--system",
                    "--print-reply",
                    "--dest=org.freedesktop.login1",
                    "/org/freedesktop/login1",
                    "org.freedesktop.login1.Manager.PowerOff",
                    "boolean:true",
                ],
            ),
        ]
    } else {
        &[]
    }
}

/// Spawns the first command that starts and reaps it on a helper thread.
fn spawn_power_command(
    command: &'static str,
    candidates: &[CommandLine],
) -> Result<(), HostCommandError> {
    if candidates.is_empty() {
        return Err(HostCommandError::new(command, "not supported on this platform"));
    }

    let mut last_error = String::new();
    for (program, args) in candidates {
        match Command::new(program).args(*args).spawn() {
            Ok(child) => {
                debug!("Spawned {} {:?}", program, args);
                reap(command, program, child);
                return Ok(());
            }
            Err(e) => {
                warn!("Could not spawn {}: {}", program, e);
                last_error = format!("{program}: {e}");
            }
        }
    }
    Err(HostCommandError::new(command, last_error))
}

fn reap(command: &'static str, program: &'static str, mut child: Child) {
    std::thread::spawn(move || match child.wait() {
        Ok(status) if status.success() => debug!("{} ({}) finished", command, program),
        Ok(status) => warn!("{} ({}) exited with {}", command, program, status),
        Err(e) => warn!("{} ({}) could not be awaited: {}", command, program, e),
    });
}
