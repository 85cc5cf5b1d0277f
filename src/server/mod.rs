//! HLS HTTP server.
//!
//! One [`HlsServer`] lives for exactly the `Live` window of one session. It
//! serves the session directory read-only and statelessly, so concurrent
//! clients never contend on anything but the filesystem.

mod routes;

pub use routes::create_router;

use hlscast_common::SegmentLayout;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long shutdown waits for in-flight responses before dropping them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Errors binding the HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot serve {}: {source}", .root.display())]
    Root {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BindError {
    /// Whether retrying on another port could help.
    pub fn is_address_conflict(&self) -> bool {
        matches!(
            self,
            BindError::Bind { source, .. }
                if matches!(source.kind(), io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied)
        )
    }
}

/// A running HTTP listener scoped to one directory.
pub struct HlsServer {
    root: PathBuf,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl HlsServer {
    /// Bind `host:port` (port 0 picks a free port) and start serving `root`.
    pub async fn bind(
        root: &Path,
        layout: SegmentLayout,
        host: &str,
        port: u16,
    ) -> Result<Self, BindError> {
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| BindError::Root {
                root: root.to_path_buf(),
                source: e,
            })?;

        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| BindError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr().map_err(|e| BindError::Bind {
            addr,
            source: e,
        })?;

        let app = create_router(root.clone(), layout);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!(addr = %local_addr, root = %root.display(), "HLS server listening");

        Ok(Self {
            root,
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop accepting connections and release the port. Waits briefly for
    /// in-flight responses, then drops them.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
                Ok(Ok(Err(e))) => tracing::warn!("HLS server exited with error: {}", e),
                Ok(_) => {}
                Err(_) => {
                    tracing::debug!(addr = %self.local_addr, "Dropping lingering HLS connections");
                    task.abort();
                    let _ = task.await;
                }
            }
        }

        tracing::info!(addr = %self.local_addr, "HLS server stopped");
    }
}

impl Drop for HlsServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for HlsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HlsServer")
            .field("root", &self.root)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Address of the interface that routes to the wider network.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick a
/// source address.
pub fn lan_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// URL a remote client should use for the manifest.
pub fn stream_url(bound: SocketAddr, advertise_host: Option<&str>, manifest: &str) -> String {
    let host = match advertise_host {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => {
            let ip = if bound.ip().is_unspecified() {
                lan_address().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
            } else {
                bound.ip()
            };
            match ip {
                IpAddr::V6(v6) => format!("[{}]", v6),
                IpAddr::V4(v4) => v4.to_string(),
            }
        }
    };
    format!("http://{}:{}/{}", host, bound.port(), manifest)
}
