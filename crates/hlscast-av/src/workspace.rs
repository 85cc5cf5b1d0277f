//! Per-session scratch directories.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A uniquely named directory owned by one casting session.
///
/// The encoder writes its manifest and segments here and the HTTP server
/// serves from it. Dropping the workspace deletes the directory; prefer
/// [`SessionWorkspace::remove`] when the caller wants to see the error.
///
/// # Example
///
/// ```no_run
/// use hlscast_av::SessionWorkspace;
///
/// let workspace = SessionWorkspace::create(None, "3f2a9c1b")?;
/// let manifest = workspace.file("stream.m3u8");
/// assert!(manifest.starts_with(workspace.path()));
/// workspace.remove()?;
/// # Ok::<(), hlscast_av::Error>(())
/// ```
#[derive(Debug)]
pub struct SessionWorkspace {
    dir: TempDir,
}

impl SessionWorkspace {
    /// Create a fresh directory under `root`, or under the system temp dir
    /// when `root` is `None`. `label` becomes part of the directory name.
    pub fn create(root: Option<&Path>, label: &str) -> Result<Self> {
        let prefix = format!("hlscast-{label}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| {
                    Error::Workspace(format!("Failed to create {}: {}", root.display(), e))
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| Error::Workspace(e.to_string()))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %dir.path().display(), "Created session workspace");

        Ok(Self { dir })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Delete the directory and everything in it.
    pub fn remove(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            Error::Workspace(format!("Failed to remove {}: {}", path.display(), e))
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "Removed session workspace");

        Ok(())
    }
}
