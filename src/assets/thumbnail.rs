use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, DynamicImage, ImageReader, RgbImage};
use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::copies::{list_files, remove_with_retry, sweep, ReconcileReport, RetryPolicy};
use super::naming::{absolute, asset_core_token, thumb_core_token, thumb_name};
use super::oplog::{Operation, OperationLog};
use crate::config::CatalogConfig;
use crate::error::AssetError;

/// JPEG quality for every generated thumbnail
pub const JPEG_QUALITY: u8 = 85;

/// Prefix of thumbnails being written; scans ignore dot-files
const RENDERING_PREFIX: &str = ".rendering-";

/// Outcome of a batch regeneration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegenerateReport {
    pub created: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// The directory of derived thumbnails.
///
/// Thumbnails are always baseline RGB JPEGs that fit inside the requested box,
/// named after the asset they were rendered from.
#[derive(Debug, Clone)]
pub struct ThumbnailStore {
    root: PathBuf,
    log: OperationLog,
    retry: RetryPolicy,
    fuzzy_min_token_len: usize,
}

impl ThumbnailStore {
    /// Open the store, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>, log: OperationLog) -> io::Result<Self> {
        let root = absolute(&root.into());
        fs::create_dir_all(&root)?;
        Ok(ThumbnailStore {
            root,
            log,
            retry: RetryPolicy::default(),
            fuzzy_min_token_len: 1,
        })
    }

    pub fn from_config(config: &CatalogConfig, log: OperationLog) -> io::Result<Self> {
        let mut store = ThumbnailStore::new(&config.thumbnails_dir, log)?;
        store.retry = RetryPolicy {
            attempts: config.remove_attempts,
            backoff: config.remove_backoff,
        };
        store.fuzzy_min_token_len = config.fuzzy_min_token_len.max(1);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the thumbnail path for an asset (doesn't generate, just returns the expected path)
    pub fn thumbnail_path(&self, asset: &Path) -> PathBuf {
        self.root.join(thumb_name(asset))
    }

    /// Check if a thumbnail exists for an asset
    pub fn thumbnail_exists(&self, asset: &Path) -> bool {
        self.thumbnail_path(asset).exists()
    }

    /// Return the thumbnail for `asset`, rendering it first if it is missing
    pub fn ensure_thumbnail(&self, asset: &Path, max: (u32, u32)) -> Result<PathBuf, AssetError> {
        if !asset.exists() {
            return Err(AssetError::MissingSource(asset.to_path_buf()));
        }

        let target = self.thumbnail_path(asset);
        if target.exists() {
            return Ok(target);
        }
        self.generate(asset, max)
    }

    /// Render the thumbnail for `asset`, replacing any existing one
    pub fn generate(&self, asset: &Path, max: (u32, u32)) -> Result<PathBuf, AssetError> {
        let target = self.thumbnail_path(asset);
        match self.render(asset, &target, max) {
            Ok(()) => {
                tracing::info!("📸 Generated thumbnail: {}", target.display());
                self.log.ok(Operation::Thumbnail, &target);
                Ok(target)
            }
            Err(e) => {
                self.log.failed(Operation::Thumbnail, asset, e.reason());
                Err(e)
            }
        }
    }

    /// Re-render the thumbnail of every path, recording per-path failures
    pub fn regenerate<I, P>(&self, paths: I, max: (u32, u32)) -> RegenerateReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut report = RegenerateReport::default();

        for path in paths {
            let path = path.as_ref();
            if path.as_os_str().is_empty() {
                report.failed.push((path.to_path_buf(), "missing".to_string()));
                continue;
            }
            match self.generate(path, max) {
                Ok(thumb) => report.created.push(thumb),
                Err(e) => {
                    tracing::warn!("⚠️  Thumbnail failed for {}: {}", path.display(), e);
                    report.failed.push((path.to_path_buf(), e.reason()));
                }
            }
        }

        report
    }

    /// Remove the thumbnails of `asset` and of any `aliases` (e.g. the copy a
    /// source was turned into).
    ///
    /// Exact names go first, then any thumbnail whose core token contains one
    /// of the assets' tokens. The `thumb_` prefix and digests never take part
    /// in the comparison.
    pub fn delete_best_match(&self, asset: &Path, aliases: &[PathBuf]) -> bool {
        self.delete_best_match_except(asset, aliases, &HashSet::new())
    }

    /// [`delete_best_match`](Self::delete_best_match) that never removes a
    /// thumbnail in `protected`
    pub fn delete_best_match_except(
        &self,
        asset: &Path,
        aliases: &[PathBuf],
        protected: &HashSet<PathBuf>,
    ) -> bool {
        if asset.as_os_str().is_empty() {
            return false;
        }

        let candidates: Vec<&Path> = std::iter::once(asset)
            .chain(aliases.iter().map(PathBuf::as_path))
            .collect();
        let mut removed_any = false;

        for candidate in &candidates {
            let exact = self.thumbnail_path(candidate);
            if exact.exists() && !protected.contains(&exact) && self.remove_logged(&exact) {
                removed_any = true;
            }
        }

        let tokens: HashSet<String> = candidates
            .iter()
            .map(|p| asset_core_token(p))
            .filter(|token| !token.is_empty() && token.len() >= self.fuzzy_min_token_len)
            .collect();
        if tokens.is_empty() {
            return removed_any;
        }

        for file in list_files(&self.root) {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if protected.contains(&file) {
                continue;
            }
            let file_token = thumb_core_token(&name);
            if tokens.iter().any(|t| file_token.contains(t.as_str())) && self.remove_logged(&file) {
                removed_any = true;
            }
        }

        removed_any
    }

    /// Delete every thumbnail not rendered from one of `live_assets`
    pub fn reconcile<I, P>(&self, live_assets: I) -> ReconcileReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let keep: HashSet<PathBuf> = live_assets
            .into_iter()
            .filter(|p| !p.as_ref().as_os_str().is_empty())
            .map(|p| self.thumbnail_path(p.as_ref()))
            .collect();

        sweep(&list_files(&self.root), &keep, &self.log, self.retry)
    }

    /// Decode, shrink into the box, drop alpha onto black and write a JPEG.
    /// The file appears under its final name only once fully written.
    fn render(&self, asset: &Path, target: &Path, max: (u32, u32)) -> Result<(), AssetError> {
        if !asset.exists() {
            return Err(AssetError::MissingSource(asset.to_path_buf()));
        }

        let img = ImageReader::open(asset)
            .map_err(|e| AssetError::denied(asset, e))?
            .with_guessed_format()
            .map_err(|e| AssetError::denied(asset, e))?
            .decode()
            .map_err(|source| AssetError::ImageDecodeFailure {
                path: asset.to_path_buf(),
                source,
            })?;

        let rgb = flatten_onto_black(&shrink_to_fit(img, max));

        fs::create_dir_all(&self.root).map_err(|e| AssetError::denied(&self.root, e))?;
        let staged = tempfile::Builder::new()
            .prefix(RENDERING_PREFIX)
            .suffix(".jpg")
            .tempfile_in(&self.root)
            .map_err(|e| AssetError::denied(&self.root, e))?;

        {
            let mut writer = BufWriter::new(staged.as_file());
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
                .encode_image(&rgb)
                .map_err(|source| AssetError::ImageEncodeFailure {
                    path: asset.to_path_buf(),
                    source,
                })?;
            writer.flush().map_err(|e| AssetError::denied(target, e))?;
        }

        staged
            .persist(target)
            .map_err(|e| AssetError::denied(target, e.error))?;
        Ok(())
    }

    fn remove_logged(&self, path: &Path) -> bool {
        match remove_with_retry(path, self.retry) {
            Ok(()) => {
                tracing::info!("🗑️  Removed thumbnail {}", path.display());
                self.log.ok(Operation::DeleteThumbnail, path);
                true
            }
            Err(e) => {
                tracing::warn!("⚠️  Could not remove thumbnail {}: {}", path.display(), e);
                self.log.failed(Operation::DeleteThumbnail, path, e.to_string());
                false
            }
        }
    }
}

/// Resize so neither side exceeds the box, keeping aspect ratio. Images that
/// already fit are left alone.
fn shrink_to_fit(img: DynamicImage, max: (u32, u32)) -> DynamicImage {
    let (max_w, max_h) = (max.0.max(1), max.1.max(1));
    if img.width() <= max_w && img.height() <= max_h {
        return img;
    }
    img.resize(max_w, max_h, FilterType::Lanczos3)
}

/// Composite any transparency over black
fn flatten_onto_black(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let scale = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        image::Rgb([scale(r), scale(g), scale(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, GenericImageView, ImageFormat, Rgba, RgbaImage};

    fn store(temp: &tempfile::TempDir) -> ThumbnailStore {
        ThumbnailStore::new(temp.path().join("thumbnails"), OperationLog::disabled()).unwrap()
    }

    fn png(path: &Path, w: u32, h: u32, pixel: [u8; 4]) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbaImage::from_pixel(w, h, Rgba(pixel)).save(path).unwrap();
        path.to_path_buf()
    }

    #[test]
    fn thumbnail_fits_box_and_has_no_alpha() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let source = png(&temp.path().join("src/wide.png"), 800, 400, [200, 10, 10, 255]);

        let thumb = store.ensure_thumbnail(&source, (320, 320)).unwrap();
        assert_eq!(thumb, store.thumbnail_path(&source));

        let reader = ImageReader::open(&thumb).unwrap().with_guessed_format().unwrap();
        assert_eq!(reader.format(), Some(ImageFormat::Jpeg));
        let decoded = reader.decode().unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!(decoded.dimensions(), (320, 160));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let source = png(&temp.path().join("src/tiny.png"), 40, 30, [0, 0, 255, 255]);

        let thumb = store.ensure_thumbnail(&source, (320, 320)).unwrap();
        assert_eq!(image::open(thumb).unwrap().dimensions(), (40, 30));
    }

    #[test]
    fn transparency_is_flattened_onto_black() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let source = png(&temp.path().join("src/ghost.png"), 64, 64, [255, 255, 255, 0]);

        let thumb = store.ensure_thumbnail(&source, (320, 320)).unwrap();
        let decoded = image::open(thumb).unwrap().to_rgb8();
        let [r, g, b] = decoded.get_pixel(32, 32).0;
        assert!(r < 16 && g < 16 && b < 16, "expected black, got {:?}", (r, g, b));
    }

    #[test]
    fn ensure_thumbnail_does_not_regenerate() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let source = png(&temp.path().join("src/a.png"), 50, 50, [1, 2, 3, 255]);

        let thumb = store.ensure_thumbnail(&source, (320, 320)).unwrap();
        fs::write(&thumb, b"sentinel").unwrap();
        let again = store.ensure_thumbnail(&source, (320, 320)).unwrap();
        assert_eq!(fs::read(again).unwrap(), b"sentinel");

        // regenerate is explicit
        let report = store.regenerate([source.as_path()], (320, 320));
        assert_eq!(report.created, vec![thumb.clone()]);
        assert_ne!(fs::read(&thumb).unwrap(), b"sentinel");
    }

    #[test]
    fn missing_and_corrupt_sources_are_typed() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);

        let missing = temp.path().join("nope.png");
        assert!(matches!(
            store.ensure_thumbnail(&missing, (320, 320)),
            Err(AssetError::MissingSource(_))
        ));

        let corrupt = temp.path().join("broken.png");
        fs::write(&corrupt, b"definitely not a png").unwrap();
        assert!(matches!(
            store.ensure_thumbnail(&corrupt, (320, 320)),
            Err(AssetError::ImageDecodeFailure { .. })
        ));
        assert!(!store.thumbnail_exists(&corrupt));
    }

    #[test]
    fn regenerate_reports_each_path() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let good = png(&temp.path().join("src/good.png"), 10, 10, [9, 9, 9, 255]);
        let missing = temp.path().join("src/missing.png");

        let report = store.regenerate([good.clone(), missing.clone()], (320, 320));
        assert_eq!(report.created, vec![store.thumbnail_path(&good)]);
        assert_eq!(report.failed, vec![(missing, "missing".to_string())]);
    }

    #[test]
    fn delete_best_match_removes_exact_and_alias_thumbnails() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let source = png(&temp.path().join("src/alpha.png"), 10, 10, [9, 9, 9, 255]);
        let alias = png(&temp.path().join("copies/copy_alpha_x.png"), 10, 10, [9, 9, 9, 255]);
        let other = png(&temp.path().join("src/bravo.png"), 10, 10, [9, 9, 9, 255]);

        let a = store.ensure_thumbnail(&source, (320, 320)).unwrap();
        let b = store.ensure_thumbnail(&alias, (320, 320)).unwrap();
        let c = store.ensure_thumbnail(&other, (320, 320)).unwrap();

        assert!(store.delete_best_match(&source, &[alias]));
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(c.exists());
        assert!(!store.delete_best_match(&source, &[]));
    }

    #[test]
    fn short_names_do_not_match_every_thumbnail() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let kept = png(&temp.path().join("src/alpha.png"), 10, 10, [9, 9, 9, 255]);
        let kept_copy = png(
            &temp.path().join("copies/copy_alpha_0123456789abcdef.png"),
            10,
            10,
            [9, 9, 9, 255],
        );
        let a = store.ensure_thumbnail(&kept, (320, 320)).unwrap();
        let b = store.ensure_thumbnail(&kept_copy, (320, 320)).unwrap();

        // Never rendered, and its name is a single hex letter
        assert!(!store.delete_best_match(&temp.path().join("src/b.png"), &[]));
        assert!(!store.delete_best_match(&temp.path().join("src/thumb.png"), &[]));
        assert!(a.exists());
        assert!(b.exists());
    }

    #[test]
    fn renamed_source_still_finds_its_thumbnail() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let original = png(&temp.path().join("old/My Poster.png"), 10, 10, [9, 9, 9, 255]);
        let thumb = store.ensure_thumbnail(&original, (320, 320)).unwrap();

        assert!(store.delete_best_match(&temp.path().join("new/My Poster.png"), &[]));
        assert!(!thumb.exists());
    }

    #[test]
    fn reconcile_keeps_live_thumbnails() {
        let temp = tempfile::tempdir().unwrap();
        let store = store(&temp);
        let live = png(&temp.path().join("src/alpha.png"), 10, 10, [9, 9, 9, 255]);
        let dead = png(&temp.path().join("src/bravo.png"), 10, 10, [9, 9, 9, 255]);
        let live_thumb = store.ensure_thumbnail(&live, (320, 320)).unwrap();
        let dead_thumb = store.ensure_thumbnail(&dead, (320, 320)).unwrap();

        let report = store.reconcile([live]);
        assert_eq!(report.kept, vec![live_thumb]);
        assert_eq!(report.removed, vec![dead_thumb]);
    }
}
