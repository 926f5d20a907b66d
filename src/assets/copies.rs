use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

use super::naming::{absolute, copy_name, core_token, tokens_overlap};
use super::oplog::{Operation, OperationLog};
use crate::config::CatalogConfig;
use crate::error::AssetError;

/// Prefix of in-flight copies; scans ignore dot-files
const INCOMING_PREFIX: &str = ".incoming-";

/// How hard to try before giving up on a removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Result of a garbage-collection pass over a managed directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// The directory of local copies of user-supplied images.
///
/// Owns everything inside `root`. Sources are never modified.
#[derive(Debug, Clone)]
pub struct LocalCopyStore {
    root: PathBuf,
    log: OperationLog,
    retry: RetryPolicy,
    fuzzy_min_token_len: usize,
}

impl LocalCopyStore {
    /// Open the store, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>, log: OperationLog) -> io::Result<Self> {
        let root = absolute(&root.into());
        fs::create_dir_all(&root)?;
        Ok(LocalCopyStore {
            root,
            log,
            retry: RetryPolicy::default(),
            fuzzy_min_token_len: 1,
        })
    }

    pub fn from_config(config: &CatalogConfig, log: OperationLog) -> io::Result<Self> {
        Ok(LocalCopyStore::new(&config.copies_dir, log)?
            .with_retry(RetryPolicy {
                attempts: config.remove_attempts,
                backoff: config.remove_backoff,
            })
            .with_fuzzy_min_token_len(config.fuzzy_min_token_len))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fuzzy cleanup only runs for source tokens at least this long.
    /// An empty token would match every file, so the floor is 1.
    pub fn with_fuzzy_min_token_len(mut self, len: usize) -> Self {
        self.fuzzy_min_token_len = len.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Is `path` already inside the copies directory?
    pub fn contains(&self, path: &Path) -> bool {
        absolute(path).starts_with(&self.root)
    }

    /// Where the copy of `source` lives (whether or not it exists yet)
    pub fn copy_path_for(&self, source: &Path) -> PathBuf {
        self.root.join(copy_name(source))
    }

    /// The path an entry should reference for `source`: the source itself when
    /// it is already local, else its expected copy
    pub fn managed_path_for(&self, source: &Path) -> PathBuf {
        if self.contains(source) {
            absolute(source)
        } else {
            self.copy_path_for(source)
        }
    }

    /// Copy `source` into the store unless a copy already exists.
    ///
    /// Returns the local path. Paths already inside the store come back
    /// unchanged.
    pub fn try_ensure_copy(&self, source: &Path) -> Result<PathBuf, AssetError> {
        if source.as_os_str().is_empty() || !source.exists() {
            return Err(AssetError::MissingSource(source.to_path_buf()));
        }
        if self.contains(source) {
            return Ok(source.to_path_buf());
        }

        let target = self.copy_path_for(source);
        if target.exists() {
            self.log.skipped(Operation::Copy, &target, "exists");
            return Ok(target);
        }

        fs::create_dir_all(&self.root).map_err(|e| AssetError::denied(&self.root, e))?;
        copy_preserving_metadata(source, &self.root, &target)?;

        tracing::info!("📁 Copied {} -> {}", source.display(), target.display());
        self.log.ok(Operation::Copy, &target);
        Ok(target)
    }

    /// Soft version of [`try_ensure_copy`](Self::try_ensure_copy): failures are
    /// logged and come back as `None`.
    pub fn ensure_copy(&self, source: &Path) -> Option<PathBuf> {
        if source.as_os_str().is_empty() {
            return None;
        }
        match self.try_ensure_copy(source) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("⚠️  Could not copy {}: {}", source.display(), e);
                self.log.failed(Operation::Copy, source, e.reason());
                None
            }
        }
    }

    /// Remove whatever copy belongs to `source`.
    ///
    /// 1. `source` is itself a copy: remove it and stop.
    /// 2. Remove the exact copy named after `source`.
    /// 3. Remove every copy whose core token overlaps the source's, which
    ///    catches copies of sources that were renamed or moved since. Short,
    ///    generic names can over-match here.
    ///
    /// Returns true if anything was removed.
    pub fn delete_best_match(&self, source: &Path) -> bool {
        self.delete_best_match_except(source, &HashSet::new())
    }

    /// [`delete_best_match`](Self::delete_best_match) that never removes a
    /// file in `protected`
    pub fn delete_best_match_except(&self, source: &Path, protected: &HashSet<PathBuf>) -> bool {
        if source.as_os_str().is_empty() {
            return false;
        }

        if self.contains(source) && source.exists() {
            if protected.contains(&absolute(source)) {
                return false;
            }
            return self.remove_logged(source);
        }

        let mut removed_any = false;

        let exact = self.copy_path_for(source);
        if exact.exists() && !protected.contains(&exact) && self.remove_logged(&exact) {
            removed_any = true;
        }

        let source_core = source_core_token(source);
        if source_core.len() < self.fuzzy_min_token_len {
            return removed_any;
        }

        for candidate in self.managed_files() {
            let Some(name) = candidate.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            if protected.contains(&candidate) {
                continue;
            }
            if tokens_overlap(&source_core, &core_token(&name)) && self.remove_logged(&candidate) {
                tracing::debug!("fuzzy match '{}' removed {}", source_core, candidate.display());
                removed_any = true;
            }
        }

        removed_any
    }

    /// Delete every copy not referenced by `live_sources`.
    ///
    /// Live paths may be sources (their expected copy is kept) or copies.
    pub fn reconcile<I, P>(&self, live_sources: I) -> ReconcileReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let keep: HashSet<PathBuf> = live_sources
            .into_iter()
            .filter(|p| !p.as_ref().as_os_str().is_empty())
            .map(|p| self.managed_path_for(p.as_ref()))
            .collect();

        sweep(&self.managed_files(), &keep, &self.log, self.retry)
    }

    /// Files currently in the store, skipping in-flight and hidden files
    pub fn managed_files(&self) -> Vec<PathBuf> {
        list_files(&self.root)
    }

    fn remove_logged(&self, path: &Path) -> bool {
        match remove_with_retry(path, self.retry) {
            Ok(()) => {
                tracing::info!("🗑️  Removed copy {}", path.display());
                self.log.ok(Operation::DeleteCopy, path);
                true
            }
            Err(e) => {
                tracing::warn!("⚠️  Could not remove copy {}: {}", path.display(), e);
                self.log.failed(Operation::DeleteCopy, path, e.to_string());
                false
            }
        }
    }
}

/// Copy bytes into a temp file next to `target`, carry over permissions and
/// modification time, then move it into place. A copy that lost the race to
/// another worker is discarded.
fn copy_preserving_metadata(source: &Path, dir: &Path, target: &Path) -> Result<(), AssetError> {
    let metadata = fs::metadata(source).map_err(|e| AssetError::denied(source, e))?;
    let mut input = fs::File::open(source).map_err(|e| AssetError::denied(source, e))?;

    let mut staged = tempfile::Builder::new()
        .prefix(INCOMING_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| AssetError::denied(dir, e))?;
    io::copy(&mut input, staged.as_file_mut()).map_err(|e| AssetError::denied(target, e))?;

    let file = staged.as_file();
    if let Ok(modified) = metadata.modified() {
        let _ = file.set_modified(modified);
    }
    let _ = file.set_permissions(metadata.permissions());

    match staged.persist_noclobber(target) {
        Ok(_) => Ok(()),
        Err(_) if target.exists() => Ok(()),
        Err(e) => Err(AssetError::denied(target, e.error)),
    }
}

/// Regular, non-hidden files directly inside `dir`
pub(crate) fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| absolute(e.path()))
        .collect()
}

/// Remove every file in `files` that is not in `keep`
pub(crate) fn sweep(
    files: &[PathBuf],
    keep: &HashSet<PathBuf>,
    log: &OperationLog,
    retry: RetryPolicy,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for file in files {
        if keep.contains(file) {
            report.kept.push(file.clone());
            continue;
        }
        match remove_with_retry(file, retry) {
            Ok(()) => {
                log.ok(Operation::Reconcile, file);
                report.removed.push(file.clone());
            }
            Err(e) => {
                log.failed(Operation::Reconcile, file, e.to_string());
                report.failed.push((file.clone(), e.to_string()));
            }
        }
    }

    if !report.removed.is_empty() {
        tracing::info!(
            "🧹 Reconciled {}: removed {}, kept {}, failed {}",
            files
                .first()
                .and_then(|f| f.parent())
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            report.removed.len(),
            report.kept.len(),
            report.failed.len()
        );
    }
    report
}

/// Remove a file, clearing a read-only flag and retrying with a short pause.
/// A file that is already gone counts as removed.
pub(crate) fn remove_with_retry(path: &Path, retry: RetryPolicy) -> io::Result<()> {
    let attempts = retry.attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                tracing::debug!(
                    "remove attempt {}/{} failed for {}: {}",
                    attempt + 1,
                    attempts,
                    path.display(),
                    e
                );
                last_error = Some(e);
                clear_readonly(path);
                if attempt + 1 < attempts {
                    thread::sleep(retry.backoff);
                }
            }
        }
    }

    if !path.exists() {
        return Ok(());
    }
    Err(last_error.unwrap_or_else(|| io::Error::other("remove failed")))
}

fn clear_readonly(path: &Path) {
    let Ok(metadata) = fs::metadata(path) else {
        return;
    };
    let mut permissions = metadata.permissions();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o600);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
    }

    let _ = fs::set_permissions(path, permissions);
}

/// Core token of a path's file name
pub fn source_core_token(source: &Path) -> String {
    source
        .file_name()
        .map(|n| core_token(&n.to_string_lossy()))
        .unwrap_or_default()
}
