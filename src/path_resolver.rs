use crate::error::PathResolutionError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const FILE_SCHEME: &str = "file://";

/// Asset subfolders under the public assets root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
    Backgrounds,
    Animations,
}

impl AssetCategory {
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetCategory::Backgrounds => "backgrounds",
            AssetCategory::Animations => "animations",
        }
    }
}

/// Platform capability turning a normalized, percent-encoded absolute path
/// into a URL the media surface can load.
pub trait FileUrlConverter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `encoded_path` always uses `/` separators and already has every
    /// segment percent-encoded.
    fn convert(&self, encoded_path: &str) -> Result<String, String>;
}

/// `file:///abs/path` for POSIX hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixFileUrl;

impl FileUrlConverter for UnixFileUrl {
    fn name(&self) -> &'static str {
        "unix-file-url"
    }

    fn convert(&self, encoded_path: &str) -> Result<String, String> {
        if !encoded_path.starts_with('/') {
            return Err("path is not absolute".to_string());
        }
        // POSIX leaves a leading `//` implementation-defined, treat it as `/`.
        let path = format!("/{}", encoded_path.trim_start_matches('/'));
        Ok(format!("{FILE_SCHEME}{path}"))
    }
}

/// `file:///C:/path` and `file://server/share/path` for Windows hosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsFileUrl;

impl FileUrlConverter for WindowsFileUrl {
    fn name(&self) -> &'static str {
        "windows-file-url"
    }

    fn convert(&self, encoded_path: &str) -> Result<String, String> {
        if let Some(unc) = encoded_path.strip_prefix("//") {
            if unc.is_empty() || unc.starts_with('/') {
                return Err("UNC path has no server name".to_string());
            }
            return Ok(format!("{FILE_SCHEME}{unc}"));
        }
        let first = encoded_path.split('/').next().unwrap_or_default();
        if is_drive_letter(first) {
            Ok(format!("{FILE_SCHEME}/{encoded_path}"))
        } else {
            Err("path has neither a drive letter nor a UNC prefix".to_string())
        }
    }
}

/// Converts asset references into loadable URLs.
///
/// Resolution is a pure string transform followed by one call into the
/// platform [`FileUrlConverter`]; it never touches the disk.
#[derive(Clone)]
pub struct PathResolver {
    converter: Arc<dyn FileUrlConverter>,
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("converter", &self.converter.name())
            .finish()
    }
}

impl PathResolver {
    pub fn new(converter: Arc<dyn FileUrlConverter>) -> Self {
        Self { converter }
    }

    /// Picks the converter for the platform this binary runs on.
    pub fn detect() -> Self {
        let converter: Arc<dyn FileUrlConverter> = if cfg!(windows) {
            Arc::new(WindowsFileUrl)
        } else {
            Arc::new(UnixFileUrl)
        };
        log::debug!("Path resolver using {}", converter.name());
        Self { converter }
    }

    pub fn converter_name(&self) -> &'static str {
        self.converter.name()
    }

    /// Resolves `filename` under `<assets_root>/<category>/` to a URL.
    ///
    /// A `filename` that is already a `file:` URL is only re-normalized, so
    /// resolving a resolved URL returns it unchanged.
    pub fn resolve(
        &self,
        assets_root: &str,
        category: AssetCategory,
        filename: &str,
    ) -> Result<String, PathResolutionError> {
        if filename.trim().is_empty() {
            return Err(PathResolutionError {
                input: filename.to_string(),
                reason: "empty file name".to_string(),
            });
        }

        if let Some(rest) = filename.strip_prefix(FILE_SCHEME) {
            return Ok(format!("{FILE_SCHEME}{}", encode_path(rest)));
        }

        let joined = format!(
            "{}/{}/{}",
            assets_root,
            category.dir_name(),
            filename.trim_start_matches(['/', '\\'])
        );
        let encoded = encode_path(&normalize_separators(&joined));

        self.converter
            .convert(&encoded)
            .map_err(|reason| PathResolutionError {
                input: joined,
                reason,
            })
    }

    /// Filesystem location of an asset, for consumers that read files directly.
    pub fn asset_path(assets_root: &Path, category: AssetCategory, filename: &str) -> PathBuf {
        let mut path = assets_root.join(category.dir_name());
        for segment in filename.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".") {
            path.push(segment);
        }
        path
    }
}

/// Collapses `\` and `/` runs into single `/`, drops `.` segments and
/// resolves `..` lexically. A leading `//` (UNC) survives.
fn normalize_separators(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let unc = unified.starts_with("//");
    let absolute = unified.starts_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    if unc {
        format!("//{body}")
    } else if absolute {
        format!("/{body}")
    } else {
        body
    }
}

/// Percent-encodes every segment after decoding it first, which keeps
/// already-encoded input stable.
fn encode_path(path: &str) -> String {
    path.split('/').map(encode_segment).collect::<Vec<_>>().join("/")
}

fn encode_segment(segment: &str) -> String {
    if segment.is_empty() || is_drive_letter(segment) {
        return segment.to_string();
    }
    let decoded = urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    urlencoding::encode(&decoded).into_owned()
}

fn is_drive_letter(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
