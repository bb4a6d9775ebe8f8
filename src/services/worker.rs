use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::sleep;

/// Periodically removes staging entries older than the retention threshold.
///
/// Workspaces are normally removed as soon as their request finishes; this
/// catches whatever a crash or a killed worker left behind.
pub struct StagingSweeper {
    root: PathBuf,
    retention: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StagingSweeper {
    pub fn new(
        root: PathBuf,
        retention: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            root,
            retention,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Staging sweeper started (retention {:?}, every {:?})",
            self.retention,
            self.interval
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Staging sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    tracing::info!("🧹 Sweeping stale staging entries...");
                    let removed = sweep_stale(&self.root, self.retention).await;
                    tracing::info!("✅ Sweep completed, removed {} entries", removed);
                }
            }
        }
    }
}

/// Removes direct children of `root` last modified more than `retention` ago.
/// Returns how many entries were removed. Errors are logged, never fatal.
pub async fn sweep_stale(root: &Path, retention: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Failed to read staging root {}: {}", root.display(), e);
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to list staging root: {}", e);
                break;
            }
        };

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < retention {
            continue;
        }

        let path = entry.path();
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Ok(()) => {
                tracing::info!("Removed stale staging entry {} (age {:?})", path.display(), age);
                removed += 1;
            }
            Err(e) => tracing::error!("Failed to remove {}: {}", path.display(), e),
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_respects_retention() {
        let root = tempfile::tempdir().unwrap();
        let job_dir = root.path().join("job-a");
        std::fs::create_dir(&job_dir).unwrap();
        std::fs::write(job_dir.join("input.pdf"), b"pdf").unwrap();
        std::fs::write(root.path().join("orphan.png"), b"png").unwrap();

        // Nothing is old enough yet
        assert_eq!(sweep_stale(root.path(), Duration::from_secs(3600)).await, 0);
        assert!(job_dir.exists());

        // Zero retention treats everything as stale
        assert_eq!(sweep_stale(root.path(), Duration::ZERO).await, 2);
        assert!(!job_dir.exists());
        assert!(!root.path().join("orphan.png").exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        assert_eq!(sweep_stale(&missing, Duration::ZERO).await, 0);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let (tx, rx) = watch::channel(false);
        let sweeper = StagingSweeper::new(
            root.path().to_path_buf(),
            Duration::from_secs(60),
            Duration::from_secs(3600),
            rx,
        );

        let handle = tokio::spawn(sweeper.run());
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
