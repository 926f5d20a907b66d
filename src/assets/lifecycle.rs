use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::copies::{LocalCopyStore, ReconcileReport};
use super::oplog::OperationLog;
use super::thumbnail::ThumbnailStore;
use super::worker::{AssetJob, AssetWorker, Completions};
use crate::config::CatalogConfig;
use crate::error::StoreError;
use crate::state::data::{Entry, EntryDraft, EntryPatch};
use crate::state::library::Library;

/// Per-asset result of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Assets for which at least one thumbnail was removed
    pub thumbnails_removed: Vec<PathBuf>,
    /// Assets for which at least one copy was removed
    pub copies_removed: Vec<PathBuf>,
    /// Assets for which nothing was found to remove
    pub untouched: Vec<PathBuf>,
    /// Assets left alone because another entry still references them
    pub shared: Vec<PathBuf>,
}

/// Result of deleting several entries at once
#[derive(Debug, Default)]
pub struct BulkDeleteReport {
    pub deleted: Vec<Entry>,
    pub failed: Vec<(String, StoreError)>,
    pub cleanup: CleanupReport,
}

/// Result of collection-wide garbage collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReconcile {
    pub copies: ReconcileReport,
    pub thumbnails: ReconcileReport,
}

/// Answer to a render request from the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailRequest {
    Ready(PathBuf),
    /// A render job was queued; show a placeholder until it completes
    Pending,
}

/// Keeps the copy and thumbnail stores in step with catalog mutations.
///
/// Holds no state of its own beyond handles to the stores and the worker.
/// Asset failures are logged and never stop the record from being saved or
/// removed.
pub struct AssetLifecycle {
    copies: Arc<LocalCopyStore>,
    thumbs: Arc<ThumbnailStore>,
    worker: AssetWorker,
}

impl AssetLifecycle {
    pub fn new(
        copies: Arc<LocalCopyStore>,
        thumbs: Arc<ThumbnailStore>,
        worker: AssetWorker,
    ) -> Self {
        AssetLifecycle {
            copies,
            thumbs,
            worker,
        }
    }

    /// Build both stores, the operation log and the worker pool from `config`.
    /// The returned [`Completions`] belong to the control thread.
    pub fn from_config(config: &CatalogConfig) -> io::Result<(Self, Completions)> {
        config.ensure_dirs()?;
        let log = OperationLog::new(&config.log_path);
        let copies = Arc::new(LocalCopyStore::from_config(config, log.clone())?);
        let thumbs = Arc::new(ThumbnailStore::from_config(config, log)?);
        let (worker, completions) =
            AssetWorker::spawn(Arc::clone(&thumbs), config.thumbnail_size, config.worker_threads)?;
        Ok((AssetLifecycle::new(copies, thumbs, worker), completions))
    }

    pub fn copies(&self) -> &LocalCopyStore {
        &self.copies
    }

    pub fn thumbnails(&self) -> &ThumbnailStore {
        &self.thumbs
    }

    /// Copy the draft's images into the store and point the draft at the
    /// copies. A source that cannot be copied is kept as given.
    pub fn localize(&self, draft: EntryDraft) -> EntryDraft {
        let localize_one = |path: String| -> String {
            if path.is_empty() {
                return path;
            }
            match self.copies.ensure_copy(Path::new(&path)) {
                Some(copy) => copy.to_string_lossy().into_owned(),
                None => path,
            }
        };

        EntryDraft {
            poster_path: localize_one(draft.poster_path),
            screenshots_paths: draft
                .screenshots_paths
                .into_iter()
                .map(localize_one)
                .collect(),
            ..draft
        }
    }

    /// Save a new entry with local copies of its images, then render its
    /// thumbnails in the background
    pub fn create(&self, library: &mut Library, draft: EntryDraft) -> Result<Entry, StoreError> {
        let draft = draft.normalized();
        if draft.title.is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        if library.find_by_title(&draft.title).is_some() {
            return Err(StoreError::DuplicateTitle(draft.title));
        }

        let entry = self.localize(draft).into_entry();
        library.add(entry.clone())?;

        tracing::info!("➕ Added '{}'", entry.title);
        self.schedule_regenerate(&entry);
        Ok(entry)
    }

    /// Replace the entry titled `title` with `draft`.
    ///
    /// Assets the entry no longer references lose their thumbnails and copies
    /// once the record is saved; the remaining ones are re-rendered.
    pub fn update(
        &self,
        library: &mut Library,
        title: &str,
        draft: EntryDraft,
    ) -> Result<Entry, StoreError> {
        let draft = draft.normalized();
        if draft.title.is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        let old = library
            .find_by_title(title)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(title.to_string()))?;
        if draft.title != old.title && library.find_by_title(&draft.title).is_some() {
            return Err(StoreError::DuplicateTitle(draft.title));
        }

        let localized = self.localize(draft);
        let new_assets: Vec<PathBuf> = std::iter::once(&localized.poster_path)
            .chain(localized.screenshots_paths.iter())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect();

        // Snapshot the diff before anything is deleted
        let orphans = orphaned_assets(&old.asset_paths(), &new_assets);

        let updated = library.update(title, EntryPatch::from_draft(localized))?;
        tracing::info!("✏️  Updated '{}' ({} orphaned assets)", updated.title, orphans.len());

        self.cleanup_assets(library, &orphans);
        self.schedule_regenerate(&updated);
        Ok(updated)
    }

    /// Remove an entry, then its thumbnails and copies
    pub fn delete(&self, library: &mut Library, title: &str) -> Result<Entry, StoreError> {
        let removed = library.delete(title)?;
        tracing::info!("🗑️  Deleted '{}'", removed.title);
        self.cleanup_assets(library, &removed.asset_paths());
        Ok(removed)
    }

    /// Delete several entries; one failing title does not stop the others
    pub fn delete_many(&self, library: &mut Library, titles: &[String]) -> BulkDeleteReport {
        let mut report = BulkDeleteReport::default();

        for title in titles {
            match library.delete(title) {
                Ok(entry) => report.deleted.push(entry),
                Err(e) => {
                    tracing::warn!("⚠️  Could not delete '{}': {}", title, e);
                    report.failed.push((title.clone(), e));
                }
            }
        }

        let assets: Vec<PathBuf> = report
            .deleted
            .iter()
            .flat_map(Entry::asset_paths)
            .collect();
        report.cleanup = self.cleanup_assets(library, &assets);
        report
    }

    /// Remove thumbnails, then copies, for each asset.
    ///
    /// Call this after the library change. Files that an entry still in
    /// `library` refers to are never removed, so two entries sharing a source
    /// keep their common copy until the last of them goes.
    pub fn cleanup_assets(&self, library: &Library, assets: &[PathBuf]) -> CleanupReport {
        let live = live_assets(library);
        let live_copies: HashSet<PathBuf> =
            live.iter().map(|p| self.copies.managed_path_for(p)).collect();
        let live_thumbs: HashSet<PathBuf> = self
            .rendered_from(&live)
            .iter()
            .map(|p| self.thumbs.thumbnail_path(p))
            .collect();

        let mut report = CleanupReport::default();

        for asset in assets {
            if live_copies.contains(&self.copies.managed_path_for(asset)) {
                tracing::debug!("{} is still referenced, keeping it", asset.display());
                report.shared.push(asset.clone());
                continue;
            }

            let aliases = if self.copies.contains(asset) {
                Vec::new()
            } else {
                vec![self.copies.copy_path_for(asset)]
            };

            let thumb_removed = self
                .thumbs
                .delete_best_match_except(asset, &aliases, &live_thumbs);
            let copy_removed = self.copies.delete_best_match_except(asset, &live_copies);

            if thumb_removed {
                report.thumbnails_removed.push(asset.clone());
            }
            if copy_removed {
                report.copies_removed.push(asset.clone());
            }
            if !thumb_removed && !copy_removed {
                report.untouched.push(asset.clone());
            }
        }

        report
    }

    /// Return the thumbnail for `asset` if it exists, otherwise queue a render
    pub fn request_thumbnail(&self, asset: &Path) -> ThumbnailRequest {
        let path = self.thumbs.thumbnail_path(asset);
        if path.exists() {
            return ThumbnailRequest::Ready(path);
        }
        self.worker.submit(AssetJob::Render {
            asset: asset.to_path_buf(),
        });
        ThumbnailRequest::Pending
    }

    /// Queue a re-render of every entry's thumbnails
    pub fn regenerate_all(&self, library: &Library) -> usize {
        for entry in library.all() {
            self.schedule_regenerate(entry);
        }
        library.len()
    }

    /// Delete copies and thumbnails no entry references any more
    pub fn reconcile(&self, library: &Library) -> CollectionReconcile {
        let live = live_assets(library);
        let copies = self.copies.reconcile(&live);
        let thumbnails = self.thumbs.reconcile(self.rendered_from(&live));
        CollectionReconcile { copies, thumbnails }
    }

    /// Every path a thumbnail may have been rendered from: the assets
    /// themselves plus the copies of those that are not local yet
    fn rendered_from(&self, live: &[PathBuf]) -> Vec<PathBuf> {
        let mut paths = live.to_vec();
        paths.extend(
            live.iter()
                .filter(|p| !self.copies.contains(p))
                .map(|p| self.copies.copy_path_for(p)),
        );
        paths
    }

    fn schedule_regenerate(&self, entry: &Entry) {
        let paths = entry.asset_paths();
        if paths.is_empty() {
            return;
        }
        self.worker.submit(AssetJob::Regenerate {
            title: entry.title.clone(),
            paths,
        });
    }
}

fn live_assets(library: &Library) -> Vec<PathBuf> {
    library.all().iter().flat_map(Entry::asset_paths).collect()
}

/// Assets in `old` that `new` no longer references, in `old`'s order
pub fn orphaned_assets(old: &[PathBuf], new: &[PathBuf]) -> Vec<PathBuf> {
    let keep: HashSet<&PathBuf> = new.iter().collect();
    let mut seen = HashSet::new();
    old.iter()
        .filter(|p| !keep.contains(p) && seen.insert(*p))
        .cloned()
        .collect()
}
