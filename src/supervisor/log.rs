//! Bounded capture of encoder output.
//!
//! The capture tasks append while status and diagnostics callers read, so all
//! state sits behind one mutex. Memory is bounded by a line ring; the optional
//! disk file is bounded by rotating to `<name>.1` once it passes its size cap.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Concurrency-safe, size-bounded log of encoder output lines.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<LogInner>>,
}

struct LogInner {
    lines: VecDeque<String>,
    capacity: usize,
    total: u64,
    file: Option<RotatingFile>,
}

struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
}

impl RotatingFile {
    fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
        })
    }

    fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let len = line.len() as u64 + 1;
        if self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.written += len;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        std::fs::rename(&self.path, self.rotated_path())?;
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl LogSink {
    /// In-memory sink keeping the last `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogInner {
                lines: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                total: 0,
                file: None,
            })),
        }
    }

    /// Sink that also appends to `path`, rotating it past `max_bytes`.
    pub fn with_file(capacity: usize, path: &Path, max_bytes: u64) -> io::Result<Self> {
        let sink = Self::new(capacity);
        sink.inner.lock().file = Some(RotatingFile::open(path, max_bytes.max(1))?);
        Ok(sink)
    }

    /// Append one line.
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        let mut inner = self.inner.lock();

        if let Some(file) = inner.file.as_mut() {
            if let Err(e) = file.write_line(&line) {
                tracing::warn!(path = %file.path.display(), "Disabling encoder log file: {}", e);
                inner.file = None;
            }
        }

        if inner.lines.len() == inner.capacity {
            inner.lines.pop_front();
        }
        inner.lines.push_back(line);
        inner.total += 1;
    }

    /// Append from async code. Disk-backed sinks write on the blocking pool.
    pub async fn append(&self, line: impl Into<String>) {
        let line = line.into();
        if !self.has_file() {
            self.push(line);
            return;
        }

        let sink = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || sink.push(line)).await {
            tracing::warn!("Encoder log append failed: {}", e);
        }
    }

    /// Whether pushes also write to disk.
    pub fn has_file(&self) -> bool {
        self.inner.lock().file.is_some()
    }

    /// Snapshot of the buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().lines.iter().cloned().collect()
    }

    /// The last `n` buffered lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock();
        let skip = inner.lines.len().saturating_sub(n);
        inner.lines.iter().skip(skip).cloned().collect()
    }

    /// Lines currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lines.is_empty()
    }

    /// Lines pushed over the sink's lifetime, including evicted ones.
    pub fn total_lines(&self) -> u64 {
        self.inner.lock().total
    }

    /// Path of the disk log, if one is attached.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.inner.lock().file.as_ref().map(|f| f.path.clone())
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LogSink")
            .field("buffered", &inner.lines.len())
            .field("capacity", &inner.capacity)
            .field("total", &inner.total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ring_evicts_oldest() {
        let sink = LogSink::new(3);
        for i in 0..5 {
            sink.push(format!("line {i}"));
        }
        assert_eq!(sink.lines(), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(sink.total_lines(), 5);
        assert_eq!(sink.tail(2), vec!["line 3", "line 4"]);
        assert_eq!(sink.tail(10).len(), 3);
    }

    #[test]
    fn test_file_rotates_past_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encoder.log");
        let sink = LogSink::with_file(10, &path, 32).unwrap();

        for i in 0..10 {
            sink.push(format!("frame={i:04} fps=25"));
        }

        let rotated = dir.path().join("encoder.log.1");
        assert!(rotated.exists());
        assert!(std::fs::metadata(&path).unwrap().len() <= 32);
        assert!(std::fs::metadata(&rotated).unwrap().len() <= 32);
        assert_eq!(sink.file_path(), Some(path));
    }

    #[tokio::test]
    async fn test_async_append_reaches_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("encoder.log");
        let sink = LogSink::with_file(10, &path, 1024).unwrap();
        assert!(sink.has_file());

        sink.append("Input #0, matroska,webm").await;
        sink.append("Stream mapping:").await;

        assert_eq!(sink.lines(), vec!["Input #0, matroska,webm", "Stream mapping:"]);
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Input #0, matroska,webm\nStream mapping:\n");

        let memory = LogSink::new(10);
        assert!(!memory.has_file());
        memory.append("frame=1").await;
        assert_eq!(memory.lines(), vec!["frame=1"]);
    }

    #[test]
    fn test_concurrent_appends() {
        let sink = LogSink::new(10_000);
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        sink.push(format!("{t}:{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.len(), 1000);
        assert_eq!(sink.total_lines(), 1000);
    }
}
