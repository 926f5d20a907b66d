use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the application folder under the user's data directory
const APP_DIR: &str = "media-catalog";

/// Default bounding box for generated thumbnails
pub const DEFAULT_THUMBNAIL_SIZE: (u32, u32) = (320, 320);

/// Where the catalog keeps its files and how the asset pipeline behaves.
///
/// Every store receives the paths it owns from here at construction; nothing
/// in the crate reads a process-wide directory constant.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    /// Root folder holding everything below
    pub root: PathBuf,
    /// Managed copies of user-supplied images
    pub copies_dir: PathBuf,
    /// Derived JPEG thumbnails
    pub thumbnails_dir: PathBuf,
    /// Append-only operation trail
    pub log_path: PathBuf,
    /// The JSON catalog document
    pub db_path: PathBuf,
    /// Thumbnail bounding box (width, height)
    pub thumbnail_size: (u32, u32),
    /// Shortest core token allowed to drive a fuzzy cleanup match
    pub fuzzy_min_token_len: usize,
    /// How many times a stubborn file removal is attempted
    pub remove_attempts: u32,
    /// Pause between removal attempts
    pub remove_backoff: Duration,
    /// Threads available to background asset jobs
    pub worker_threads: usize,
}

impl CatalogConfig {
    /// Lay out the catalog under `root`:
    /// - `copies/`
    /// - `thumbnails/`
    /// - `deletion.log`
    /// - `catalog.json`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        CatalogConfig {
            copies_dir: root.join("copies"),
            thumbnails_dir: root.join("thumbnails"),
            log_path: root.join("deletion.log"),
            db_path: root.join("catalog.json"),
            root,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            fuzzy_min_token_len: 1,
            remove_attempts: 3,
            remove_backoff: Duration::from_millis(50),
            worker_threads: 2,
        }
    }

    /// Get the default catalog root
    ///
    /// - Linux: ~/.local/share/media-catalog
    /// - macOS: ~/Library/Application Support/media-catalog
    /// - Windows: %APPDATA%\media-catalog
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Create the root and both managed directories if they are missing
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.root, &self.copies_dir, &self.thumbnails_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig::with_root(CatalogConfig::default_root())
    }
}
