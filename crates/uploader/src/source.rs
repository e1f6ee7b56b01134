//! Item sources.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::trace;

/// Image extensions picked up by [`DirectorySource`] by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic"];

/// One candidate for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Identity used to avoid sending the same item twice.
    pub id: String,
    /// Display name (file name).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Where the item lives, reported in the payload marker.
    pub location: String,
}

/// Enumerates upload candidates.
///
/// Called from a blocking thread, so implementations may do synchronous I/O.
pub trait ItemSource: Send + Sync + 'static {
    /// Returns candidates, most recent first.
    fn items(&self) -> std::io::Result<Vec<MediaItem>>;
}

/// Regular files in one directory (not recursive), newest first.
pub struct DirectorySource {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectorySource {
    /// Creates a source over `dir` accepting [`DEFAULT_EXTENSIONS`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replaces the accepted extensions. An empty list accepts every file.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn accepts(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }
}

impl ItemSource for DirectorySource {
    fn items(&self) -> std::io::Result<Vec<MediaItem>> {
        let mut found: Vec<(SystemTime, MediaItem)> = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }

            let path = entry.path();
            if !self.accepts(&path) {
                continue;
            }
            // Names and paths end up on a line-based wire.
            let (Some(name), Some(location)) = (
                path.file_name().and_then(|n| n.to_str()),
                path.to_str(),
            ) else {
                trace!(?path, "skipping non UTF-8 path");
                continue;
            };
            if location.chars().any(char::is_control) {
                trace!(?path, "skipping path with control characters");
                continue;
            }
            if std::fs::File::open(&path).is_err() {
                trace!(?path, "skipping unreadable file");
                continue;
            }

            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((
                modified,
                MediaItem {
                    id: location.to_string(),
                    name: name.to_string(),
                    size: meta.len(),
                    location: location.to_string(),
                },
            ));
        }

        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, item)| item).collect())
    }
}
