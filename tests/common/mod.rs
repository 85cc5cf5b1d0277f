//! Shared test harness for integration tests.
//!
//! [`CastHarness`] writes a fake encoder script into a temp directory and
//! builds a [`Config`] that points the controller at it, so the whole
//! casting lifecycle runs without ffmpeg.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hlscast::config::Config;
use hlscast::{CastController, CastState, CastStatus};
use tempfile::TempDir;

/// Behaviour of the fake encoder.
#[derive(Debug, Clone, Copy)]
pub enum FakeEncoder {
    /// Writes a new segment every 100ms and a five-entry sliding manifest.
    /// Like ffmpeg, exits 1 when its `-i` input cannot be read from its
    /// working directory.
    Streaming,
    /// Like `Streaming`, but exits immediately when asked to use NVENC.
    FailsOnNvenc,
    /// Runs but never writes anything.
    Silent,
    /// Exits with status 1 straight away.
    Broken,
}

const STREAMING_SCRIPT: &str = r##"#!/bin/sh
manifest=""
input=""
prev=""
for arg in "$@"; do
  if [ "$arg" = "__FAIL_ENCODER__" ]; then
    echo "Unknown encoder '$arg'" >&2
    exit 1
  fi
  if [ "$prev" = "-i" ]; then
    input="$arg"
  fi
  prev="$arg"
  manifest="$arg"
done
if [ ! -r "$input" ]; then
  echo "$input: No such file or directory" >&2
  exit 1
fi
dir=$(dirname "$manifest")
trap 'exit 0' TERM
echo "fake encoder writing to $dir" >&2
seq=0
while true; do
  printf 'fake-ts-%d' "$seq" > "$dir/$(printf 'segment%03d.ts' "$seq")"
  first=$((seq - 4))
  if [ "$first" -lt 0 ]; then first=0; fi
  {
    echo "#EXTM3U"
    echo "#EXT-X-VERSION:3"
    echo "#EXT-X-TARGETDURATION:2"
    echo "#EXT-X-MEDIA-SEQUENCE:$first"
    i=$first
    while [ "$i" -le "$seq" ]; do
      echo "#EXTINF:2.000000,"
      printf 'segment%03d.ts\n' "$i"
      i=$((i + 1))
    done
  } > "$manifest.tmp"
  mv "$manifest.tmp" "$manifest"
  seq=$((seq + 1))
  sleep 0.1
done
"##;

const SILENT_SCRIPT: &str = "#!/bin/sh\nexec sleep 30\n";

const BROKEN_SCRIPT: &str = "#!/bin/sh\necho 'Conversion failed!' >&2\nexit 1\n";

/// A temp directory holding a fake encoder, a source file and the session
/// work root.
pub struct CastHarness {
    pub dir: TempDir,
    pub source: PathBuf,
    pub config: Config,
}

impl CastHarness {
    pub fn new(encoder: FakeEncoder) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let script = match encoder {
            FakeEncoder::Streaming => STREAMING_SCRIPT.replace("__FAIL_ENCODER__", "__none__"),
            FakeEncoder::FailsOnNvenc => STREAMING_SCRIPT.replace("__FAIL_ENCODER__", "h264_nvenc"),
            FakeEncoder::Silent => SILENT_SCRIPT.to_string(),
            FakeEncoder::Broken => BROKEN_SCRIPT.to_string(),
        };
        let program = dir.path().join("fake-ffmpeg");
        std::fs::write(&program, script).expect("failed to write fake encoder");
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
            .expect("failed to chmod fake encoder");

        let source = dir.path().join("sample.mp4");
        std::fs::write(&source, b"not really a movie").expect("failed to write source");

        let work_root = dir.path().join("sessions");
        std::fs::create_dir_all(&work_root).expect("failed to create work root");

        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.encoder.program = program;
        config.session.work_root = Some(work_root);
        config.session.launch_probe_ms = 200;
        config.session.startup_timeout_secs = 5;
        config.session.grace_timeout_secs = 1;
        config.session.poll_interval_ms = 20;
        config.session.retention_interval_ms = 50;

        Self {
            dir,
            source,
            config,
        }
    }

    pub fn controller(&self) -> CastController {
        CastController::new(self.config.clone())
    }

    pub fn work_root(&self) -> &Path {
        self.config
            .session
            .work_root
            .as_deref()
            .expect("work root configured")
    }

    /// Session directories currently under the work root.
    pub fn session_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.work_root())
            .expect("work root readable")
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect()
    }

    /// Write a second source file next to the first.
    pub fn extra_source(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"another movie").expect("failed to write source");
        path
    }
}

/// Poll `status()` until `state` is reached or `timeout` passes.
pub async fn wait_for_state(
    controller: &CastController,
    state: CastState,
    timeout: Duration,
) -> CastStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = controller.status();
        if status.state == state || tokio::time::Instant::now() >= deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Whether a process with this pid still exists.
pub fn process_exists(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Whether something is listening on this local port.
pub fn port_in_use(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_err()
}
