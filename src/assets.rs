use crate::error::HostCommandError;
use crate::path_resolver::AssetCategory;
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.json";
const PUBLIC_DIR: &str = "public";
const UP_DIR: &str = "_up_";
const INSTALL_DIR_NAME: &str = "Anglewing";

/// Where the public assets folder should be for an executable at `exe`.
///
/// Returns the best candidate even if it does not exist; [`validate_root`]
/// decides whether it is usable.
pub fn discover_public_root(exe: &Path) -> PathBuf {
    let exe_dir = exe.parent().unwrap_or(exe);
    if cfg!(target_os = "macos") {
        macos_public_root(exe_dir)
    } else if cfg!(target_os = "windows") {
        windows_public_root(exe_dir)
    } else {
        unix_public_root(exe_dir)
    }
}

fn macos_public_root(exe_dir: &Path) -> PathBuf {
    // Contents/MacOS -> Contents -> Foo.app
    let bundle = exe_dir
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(exe_dir);
    let install_dir = Path::new("/Applications").join(INSTALL_DIR_NAME);
    if bundle.starts_with(&install_dir) {
        return install_dir.join(PUBLIC_DIR);
    }
    bundle
        .parent()
        .map(|p| p.join(PUBLIC_DIR))
        .unwrap_or_else(|| bundle.join(PUBLIC_DIR))
}

fn windows_public_root(exe_dir: &Path) -> PathBuf {
    let up_public = exe_dir
        .parent()
        .unwrap_or(exe_dir)
        .join(UP_DIR)
        .join(PUBLIC_DIR);

    let mut candidates = vec![up_public.clone(), exe_dir.join(PUBLIC_DIR)];
    for var in ["ProgramFiles", "ProgramFiles(x86)", "APPDATA"] {
        if let Ok(base) = std::env::var(var) {
            let install = Path::new(&base).join(INSTALL_DIR_NAME);
            candidates.push(install.join(UP_DIR).join(PUBLIC_DIR));
            candidates.push(install.join(PUBLIC_DIR));
        }
    }
    candidates.extend(
        exe_dir
            .ancestors()
            .skip(1)
            .take(5)
            .map(|dir| dir.join(UP_DIR).join(PUBLIC_DIR)),
    );

    match candidates.into_iter().find(|c| c.is_dir()) {
        Some(found) => found,
        None => {
            warn!(
                "No public directory found, falling back to {}",
                up_public.display()
            );
            up_public
        }
    }
}

fn unix_public_root(exe_dir: &Path) -> PathBuf {
    let packaged = Path::new("/usr/lib")
        .join(INSTALL_DIR_NAME)
        .join(UP_DIR)
        .join(PUBLIC_DIR);
    if packaged.is_dir() {
        return packaged;
    }
    let sibling = exe_dir.parent().map(|p| p.join(PUBLIC_DIR));
    match sibling {
        Some(dir) if dir.is_dir() => dir,
        _ => exe_dir.join(PUBLIC_DIR),
    }
}

/// Checks that `candidate` is an existing directory and canonicalizes it.
pub fn validate_root(candidate: &Path) -> Result<PathBuf, HostCommandError> {
    if !candidate.exists() {
        return Err(HostCommandError::new(
            "public_assets_root",
            format!("public directory does not exist: {}", candidate.display()),
        ));
    }
    if !candidate.is_dir() {
        return Err(HostCommandError::new(
            "public_assets_root",
            format!("not a directory: {}", candidate.display()),
        ));
    }
    let root = dunce::canonicalize(candidate).map_err(|e| {
        HostCommandError::new(
            "public_assets_root",
            format!("cannot canonicalize {}: {e}", candidate.display()),
        )
    })?;
    info!("Public assets root: {}", root.display());
    Ok(root)
}

/// Creates the `animations/` and `backgrounds/` folders under `root` when
/// they are missing. Returns the folders that were created; failures are
/// logged and skipped.
pub fn ensure_asset_layout(root: &Path) -> Vec<PathBuf> {
    let mut created = Vec::new();
    for category in [AssetCategory::Animations, AssetCategory::Backgrounds] {
        let dir = root.join(category.dir_name());
        if dir.is_dir() {
            continue;
        }
        match fs::create_dir_all(&dir) {
            Ok(()) => {
                info!("Created asset folder {}", dir.display());
                created.push(dir);
            }
            Err(e) => error!("Failed to create {}: {}", dir.display(), e),
        }
    }
    created
}

/// Logs what is missing from the asset layout and returns the missing entries.
pub fn check_asset_integrity(root: &Path) -> Vec<String> {
    let mut missing = Vec::new();

    if !root.join(CONFIG_FILE_NAME).is_file() {
        missing.push(CONFIG_FILE_NAME.to_string());
    }
    for category in [AssetCategory::Backgrounds, AssetCategory::Animations] {
        let dir = root.join(category.dir_name());
        if !dir.is_dir() {
            missing.push(category.dir_name().to_string());
            continue;
        }
        if let Ok(entries) = fs::read_dir(&dir) {
            let count = entries.filter_map(|e| e.ok()).count();
            debug!("{} contains {} entries", dir.display(), count);
        }
    }

    if missing.is_empty() {
        info!("Asset layout under {} is complete", root.display());
    } else {
        warn!("Missing assets under {}: {:?}", root.display(), missing);
    }
    missing
}
