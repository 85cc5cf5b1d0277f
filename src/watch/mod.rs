//! Segment store watching.
//!
//! The encoder owns every write into the session directory, so the filesystem
//! is the only source of truth. Readiness and retention are both polling
//! loops on a [`tokio::time::Interval`] that can be cancelled between ticks.
//!
//! A segment counts as complete once the manifest references a sequence
//! number at or above its own: the muxer only appends an entry after closing
//! the segment file.

use hlscast_common::SegmentLayout;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// The encoder did not produce a playable manifest in time.
#[derive(Debug, thiserror::Error)]
#[error("no manifest and segment appeared in {} within {timeout:?}", .dir.display())]
pub struct StartupTimeout {
    pub dir: PathBuf,
    pub timeout: Duration,
}

/// Polls one session directory.
#[derive(Debug, Clone)]
pub struct SegmentWatcher {
    dir: PathBuf,
    layout: SegmentLayout,
    poll_interval: Duration,
}

impl SegmentWatcher {
    pub fn new(dir: impl Into<PathBuf>, layout: SegmentLayout, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            layout,
            poll_interval: poll_interval.max(Duration::from_millis(10)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(&self.layout.manifest_name)
    }

    /// Whether the manifest exists and references at least one segment that
    /// is on disk and non-empty.
    pub async fn is_ready(&self) -> bool {
        let Some(manifest) = read_manifest(&self.dir, &self.layout).await else {
            return false;
        };

        for entry in self.layout.manifest_entries(&manifest) {
            if let Ok(meta) = tokio::fs::metadata(self.dir.join(&entry)).await {
                if meta.is_file() && meta.len() > 0 {
                    return true;
                }
            }
        }
        false
    }

    /// Block until [`is_ready`](Self::is_ready) holds, or fail after `timeout`.
    pub async fn wait_for_first_segment(&self, timeout: Duration) -> Result<(), StartupTimeout> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll = async {
            loop {
                ticker.tick().await;
                if self.is_ready().await {
                    return;
                }
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(()) => {
                tracing::debug!(dir = %self.dir.display(), "First segment available");
                Ok(())
            }
            Err(_) => Err(StartupTimeout {
                dir: self.dir.clone(),
                timeout,
            }),
        }
    }
}

async fn read_manifest(dir: &Path, layout: &SegmentLayout) -> Option<String> {
    tokio::fs::read_to_string(dir.join(&layout.manifest_name))
        .await
        .ok()
}

/// Whether segment `name` in `dir` is fully written and safe to serve.
pub async fn is_segment_complete(dir: &Path, layout: &SegmentLayout, name: &str) -> bool {
    let Some(sequence) = layout.parse_sequence(name) else {
        return false;
    };
    let Some(manifest) = read_manifest(dir, layout).await else {
        return false;
    };
    layout
        .max_referenced_sequence(&manifest)
        .is_some_and(|max| sequence <= max)
}

/// Delete segments outside the newest `window` that the manifest no longer
/// references. Returns how many files were removed.
pub async fn enforce_retention_once(
    dir: &Path,
    layout: &SegmentLayout,
    window: usize,
) -> io::Result<usize> {
    let mut segments: Vec<(u64, String)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(sequence) = layout.parse_sequence(&name) {
            segments.push((sequence, name));
        }
    }

    if segments.len() <= window {
        return Ok(0);
    }

    let referenced: HashSet<String> = read_manifest(dir, layout)
        .await
        .map(|m| layout.manifest_entries(&m).into_iter().collect())
        .unwrap_or_default();

    // Newest first
    segments.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, name) in segments.into_iter().skip(window) {
        if referenced.contains(&name) {
            continue;
        }
        match tokio::fs::remove_file(dir.join(&name)).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "Pruned stale segments");
    }
    Ok(removed)
}

/// Run [`enforce_retention_once`] every `interval` until `cancel` fires.
pub fn spawn_retention(
    dir: PathBuf,
    layout: SegmentLayout,
    window: usize,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = enforce_retention_once(&dir, &layout, window).await {
                        if e.kind() == io::ErrorKind::NotFound {
                            break;
                        }
                        tracing::warn!(dir = %dir.display(), "Retention pass failed: {}", e);
                    }
                }
            }
        }

        tracing::debug!(dir = %dir.display(), "Retention loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_segments(dir: &Path, layout: &SegmentLayout, range: std::ops::Range<u64>) {
        for seq in range {
            std::fs::write(dir.join(layout.segment_name(seq)), b"\x47\x40\x00\x10").unwrap();
        }
    }

    fn write_manifest(dir: &Path, layout: &SegmentLayout, range: std::ops::Range<u64>) {
        let mut text = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:2\n");
        for seq in range {
            text.push_str("#EXTINF:2.000000,\n");
            text.push_str(&layout.segment_name(seq));
            text.push('\n');
        }
        std::fs::write(dir.join(&layout.manifest_name), text).unwrap();
    }

    #[tokio::test]
    async fn test_not_ready_without_manifest() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        write_segments(dir.path(), &layout, 0..2);

        let watcher = SegmentWatcher::new(dir.path(), layout, Duration::from_millis(10));
        assert!(!watcher.is_ready().await);
    }

    #[tokio::test]
    async fn test_not_ready_with_empty_segment() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        std::fs::write(dir.path().join("segment000.ts"), b"").unwrap();
        write_manifest(dir.path(), &layout, 0..1);

        let watcher = SegmentWatcher::new(dir.path(), layout, Duration::from_millis(10));
        assert!(!watcher.is_ready().await);
    }

    #[tokio::test]
    async fn test_wait_for_first_segment_times_out() {
        let dir = tempdir().unwrap();
        let watcher = SegmentWatcher::new(
            dir.path(),
            SegmentLayout::default(),
            Duration::from_millis(10),
        );
        let result = watcher
            .wait_for_first_segment(Duration::from_millis(100))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_first_segment_sees_slow_writer() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        let watcher = SegmentWatcher::new(dir.path(), layout.clone(), Duration::from_millis(10));

        let path = dir.path().to_path_buf();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            write_segments(&path, &layout, 0..1);
            write_manifest(&path, &layout, 0..1);
        });

        watcher
            .wait_for_first_segment(Duration::from_secs(5))
            .await
            .unwrap();
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_segment_completeness_follows_manifest() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        write_segments(dir.path(), &layout, 0..3);
        write_manifest(dir.path(), &layout, 0..2);

        assert!(is_segment_complete(dir.path(), &layout, "segment000.ts").await);
        assert!(is_segment_complete(dir.path(), &layout, "segment001.ts").await);
        // Still being written
        assert!(!is_segment_complete(dir.path(), &layout, "segment002.ts").await);
        assert!(!is_segment_complete(dir.path(), &layout, "stream.m3u8").await);
    }

    #[tokio::test]
    async fn test_retention_keeps_window() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        write_segments(dir.path(), &layout, 0..12);
        write_manifest(dir.path(), &layout, 7..12);

        let removed = enforce_retention_once(dir.path(), &layout, 5).await.unwrap();
        assert_eq!(removed, 7);

        for seq in 0..7 {
            assert!(!dir.path().join(layout.segment_name(seq)).exists());
        }
        for seq in 7..12 {
            assert!(dir.path().join(layout.segment_name(seq)).exists());
        }
        assert!(dir.path().join("stream.m3u8").exists());
    }

    #[tokio::test]
    async fn test_retention_spares_referenced_segments() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        // segment010 is still being written and not yet listed
        write_segments(dir.path(), &layout, 0..11);
        write_manifest(dir.path(), &layout, 5..10);

        let removed = enforce_retention_once(dir.path(), &layout, 5).await.unwrap();
        assert_eq!(removed, 5);
        assert!(dir.path().join("segment005.ts").exists());
        assert!(dir.path().join("segment010.ts").exists());
        assert!(!dir.path().join("segment004.ts").exists());
    }

    #[tokio::test]
    async fn test_retention_below_window_is_noop() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        write_segments(dir.path(), &layout, 0..3);

        let removed = enforce_retention_once(dir.path(), &layout, 5).await.unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_retention_loop_prunes_and_stops() {
        let dir = tempdir().unwrap();
        let layout = SegmentLayout::default();
        write_segments(dir.path(), &layout, 0..8);

        let cancel = CancellationToken::new();
        let handle = spawn_retention(
            dir.path().to_path_buf(),
            layout.clone(),
            3,
            Duration::from_millis(20),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 3);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
