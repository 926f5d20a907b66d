/// Background asset jobs
///
/// Thumbnail rendering runs on a small tokio blocking pool so the control
/// thread never waits on image decoding. Each job reports back exactly once
/// through a channel that only the control thread reads.
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::thumbnail::{RegenerateReport, ThumbnailStore};
use crate::error::AssetError;

/// Work handed to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetJob {
    /// Re-render thumbnails for an entry's assets after a save
    Regenerate { title: String, paths: Vec<PathBuf> },
    /// Render one thumbnail the first time it is displayed
    Render { asset: PathBuf },
}

/// What a finished job reports
#[derive(Debug)]
pub enum Completion {
    Regenerated {
        title: String,
        report: RegenerateReport,
    },
    Rendered {
        asset: PathBuf,
        result: Result<PathBuf, AssetError>,
    },
    /// The job panicked; nothing was written for it
    Crashed { job: AssetJob, message: String },
}

/// Submitting side, owned by the coordinator
pub struct AssetWorker {
    runtime: Arc<Runtime>,
    thumbs: Arc<ThumbnailStore>,
    size: (u32, u32),
    sender: UnboundedSender<Completion>,
    pending: Arc<AtomicUsize>,
}

/// Receiving side, owned by the control thread
pub struct Completions {
    receiver: UnboundedReceiver<Completion>,
    pending: Arc<AtomicUsize>,
}

impl AssetWorker {
    /// Start a pool with `threads` blocking workers
    pub fn spawn(
        thumbs: Arc<ThumbnailStore>,
        size: (u32, u32),
        threads: usize,
    ) -> std::io::Result<(AssetWorker, Completions)> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads.max(1))
            .thread_name("asset-worker")
            .build()?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker = AssetWorker {
            runtime: Arc::new(runtime),
            thumbs,
            size,
            sender,
            pending: Arc::clone(&pending),
        };
        Ok((worker, Completions { receiver, pending }))
    }

    /// Queue a job. Fire-and-forget: the outcome arrives on [`Completions`].
    pub fn submit(&self, job: AssetJob) {
        self.pending.fetch_add(1, Ordering::SeqCst);

        let thumbs = Arc::clone(&self.thumbs);
        let sender = self.sender.clone();
        let size = self.size;

        self.runtime.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_job(&thumbs, &job, size)));
            let completion = match outcome {
                Ok(completion) => completion,
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "worker panicked".to_string());
                    tracing::error!("❌ Asset job panicked: {}", message);
                    Completion::Crashed { job, message }
                }
            };
            // The control thread may have gone away; nothing left to tell
            let _ = sender.send(completion);
        });
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

fn run_job(thumbs: &ThumbnailStore, job: &AssetJob, size: (u32, u32)) -> Completion {
    match job {
        AssetJob::Regenerate { title, paths } => {
            let report = thumbs.regenerate(paths, size);
            tracing::info!(
                "🖼️  Thumbnails for '{}': {} created, {} failed",
                title,
                report.created.len(),
                report.failed.len()
            );
            Completion::Regenerated {
                title: title.clone(),
                report,
            }
        }
        AssetJob::Render { asset } => Completion::Rendered {
            asset: asset.clone(),
            result: thumbs.ensure_thumbnail(asset, size),
        },
    }
}

impl Completions {
    /// Jobs submitted but not yet received
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Non-blocking poll, for a UI loop
    pub fn try_next(&mut self) -> Option<Completion> {
        match self.receiver.try_recv() {
            Ok(completion) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Some(completion)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the next job finishes. `None` when nothing is in flight.
    ///
    /// Must not be called from inside an async context.
    pub fn wait_next(&mut self) -> Option<Completion> {
        if self.pending() == 0 {
            return None;
        }
        let completion = self.receiver.blocking_recv()?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(completion)
    }

    /// Block until every submitted job has reported
    pub fn wait_idle(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        while let Some(completion) = self.wait_next() {
            done.push(completion);
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::oplog::OperationLog;
    use image::{Rgb, RgbImage};

    fn setup(temp: &tempfile::TempDir) -> (AssetWorker, Completions, Arc<ThumbnailStore>) {
        let thumbs = Arc::new(
            ThumbnailStore::new(temp.path().join("thumbnails"), OperationLog::disabled()).unwrap(),
        );
        let (worker, completions) = AssetWorker::spawn(Arc::clone(&thumbs), (320, 320), 2).unwrap();
        (worker, completions, thumbs)
    }

    #[test]
    fn idle_pool_reports_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let (_worker, mut completions, _) = setup(&temp);
        assert_eq!(completions.pending(), 0);
        assert!(completions.try_next().is_none());
        assert!(completions.wait_next().is_none());
    }

    #[test]
    fn every_job_reports_once() {
        let temp = tempfile::tempdir().unwrap();
        let (worker, mut completions, thumbs) = setup(&temp);

        let image = temp.path().join("cover.png");
        RgbImage::from_pixel(600, 900, Rgb([10, 200, 30])).save(&image).unwrap();

        worker.submit(AssetJob::Regenerate {
            title: "A".into(),
            paths: vec![image.clone(), temp.path().join("missing.png")],
        });
        worker.submit(AssetJob::Render {
            asset: image.clone(),
        });

        let done = completions.wait_idle();
        assert_eq!(done.len(), 2);
        assert_eq!(completions.pending(), 0);
        assert!(thumbs.thumbnail_exists(&image));

        for completion in done {
            match completion {
                Completion::Regenerated { title, report } => {
                    assert_eq!(title, "A");
                    assert_eq!(report.failed.len(), 1);
                }
                Completion::Rendered { asset, result } => {
                    assert_eq!(asset, image);
                    assert!(result.is_ok());
                }
                Completion::Crashed { message, .. } => panic!("job crashed: {}", message),
            }
        }
    }
}
