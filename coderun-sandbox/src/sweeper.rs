//! Background removal of expired persisted files

use crate::store::{Lifetime, TtlPolicy};
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Counts from one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub retained: usize,
}

/// Delete every regular file in `dir` whose age at `now` exceeds the TTL of
/// its tier. Files that vanish or refuse deletion are skipped.
pub async fn sweep_dir(dir: &Path, policy: &TtlPolicy, now: SystemTime) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        if !metadata.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let ttl = policy.ttl(Lifetime::of_filename(&name));
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age <= ttl {
            report.retained += 1;
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                tracing::debug!(file = %name, age_secs = age.as_secs(), "Removed expired file");
                report.removed += 1;
            }
            Err(e) => tracing::debug!(file = %name, "Could not remove expired file: {}", e),
        }
    }

    Ok(report)
}

/// Periodic sweeper over the persisted-file store
pub struct FileSweeper {
    dir: PathBuf,
    policy: TtlPolicy,
    interval: Duration,
}

impl FileSweeper {
    pub fn new(dir: impl Into<PathBuf>, policy: TtlPolicy, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            policy,
            interval,
        }
    }

    /// Start sweeping every interval. The first pass runs one interval from now.
    pub fn spawn(self) -> SweeperHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                dir = %self.dir.display(),
                interval_secs = self.interval.as_secs(),
                "File sweeper started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match sweep_dir(&self.dir, &self.policy, SystemTime::now()).await {
                            Ok(report) if report.removed > 0 => {
                                tracing::info!(removed = report.removed, retained = report.retained, "Swept expired files");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(dir = %self.dir.display(), "File sweep failed: {}", e),
                        }
                    }
                }
            }

            tracing::info!("File sweeper stopped");
        });

        SweeperHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Owner of the running sweeper task
pub struct SweeperHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Cancel the sweeper and wait until its task has exited
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("File sweeper task failed: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
