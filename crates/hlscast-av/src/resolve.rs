//! Encoder parameter resolution.
//!
//! [`resolve`] is the only place that knows ffmpeg's command line. Everything
//! downstream treats the result as an opaque program plus argument list that
//! writes an HLS manifest and segments into one directory.

use crate::{EncoderBackend, Error, HardwareProfile, Result};
use hlscast_common::SegmentLayout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Encoding and packaging settings, usually loaded from the `[encoder]`
/// config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Encoder program (default: ffmpeg, looked up on PATH).
    pub program: PathBuf,
    /// Segment duration in seconds (default: 2).
    pub segment_duration_secs: u32,
    /// Segments kept in the live manifest (default: 5).
    pub window_size: usize,
    /// Output height, aspect preserved; 0 disables scaling (default: 1080).
    pub target_height: u32,
    /// Quality target (default: 21).
    pub crf: u32,
    /// x264 preset (default: veryfast).
    pub preset: String,
    /// H.264 profile (default: high).
    pub profile: String,
    /// H.264 level (default: 4.1).
    pub level: String,
    /// Peak bitrate cap (default: 6000k).
    pub maxrate: Option<String>,
    /// VBV buffer size (default: 12000k).
    pub bufsize: Option<String>,
    /// AAC bitrate (default: 192k).
    pub audio_bitrate: String,
    /// Audio channels (default: 2).
    pub audio_channels: u32,
    /// Read input at native frame rate (default: true).
    pub realtime: bool,
    /// Loop the input forever (default: true).
    pub loop_input: bool,
    /// Manifest file name (default: stream.m3u8).
    pub manifest_name: String,
    /// Segment file prefix (default: segment).
    pub segment_prefix: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            segment_duration_secs: 2,
            window_size: 5,
            target_height: 1080,
            crf: 21,
            preset: "veryfast".to_string(),
            profile: "high".to_string(),
            level: "4.1".to_string(),
            maxrate: Some("6000k".to_string()),
            bufsize: Some("12000k".to_string()),
            audio_bitrate: "192k".to_string(),
            audio_channels: 2,
            realtime: true,
            loop_input: true,
            manifest_name: "stream.m3u8".to_string(),
            segment_prefix: "segment".to_string(),
        }
    }
}

impl EncoderSettings {
    /// The segment layout these settings produce.
    pub fn layout(&self) -> SegmentLayout {
        SegmentLayout::new(self.manifest_name.clone(), self.segment_prefix.clone())
    }
}

/// Per-session options from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Already-materialized subtitle file to burn in.
    #[serde(default)]
    pub subtitle_path: Option<PathBuf>,
    /// Resolution ceiling; the lower of this and the configured height wins.
    #[serde(default)]
    pub max_height: Option<u32>,
    /// Bitrate ceiling; replaces the configured maxrate.
    #[serde(default)]
    pub max_bitrate: Option<String>,
}

/// A fully resolved encoder invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSpec {
    /// Program to execute.
    pub program: PathBuf,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Backend the arguments target.
    pub backend: EncoderBackend,
    /// ffmpeg encoder name (e.g. libx264).
    pub video_encoder: String,
    /// Manifest and segment naming.
    pub layout: SegmentLayout,
    /// Target segment duration.
    pub segment_duration: Duration,
    /// Segments in the sliding window.
    pub window_size: usize,
    /// Directory the encoder writes into.
    pub working_dir: PathBuf,
    /// Source media.
    pub source: PathBuf,
    /// Burned-in subtitle file, if any.
    pub subtitle: Option<PathBuf>,
}

impl EncoderSpec {
    /// Absolute path of the manifest the encoder will write.
    pub fn manifest_path(&self) -> PathBuf {
        self.working_dir.join(&self.layout.manifest_name)
    }

    /// Segment filename pattern (e.g. `segment%03d.ts`).
    pub fn segment_pattern(&self) -> String {
        self.layout.pattern()
    }

    /// Command line as a single string, for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Resolve the encoder invocation for a source file.
///
/// Picks the highest ranked backend in `profile` that is not in `excluded`.
/// Pure apart from checking that the source and subtitle files can be read.
///
/// # Errors
///
/// - [`Error::InvalidSource`] if the source is missing, not a file, or unreadable
/// - [`Error::InvalidSubtitle`] if a subtitle path was given but cannot be read
/// - [`Error::NoEncoderAvailable`] if every ranked backend is excluded
pub fn resolve(
    source: impl AsRef<Path>,
    options: &ResolveOptions,
    profile: &HardwareProfile,
    excluded: &[EncoderBackend],
    settings: &EncoderSettings,
    working_dir: impl AsRef<Path>,
) -> Result<EncoderSpec> {
    // The encoder runs inside the working directory, so relative paths
    // would resolve against the wrong place
    let source = absolute(source.as_ref())
        .map_err(|e| Error::invalid_source(source.as_ref(), format!("cannot resolve: {e}")))?;
    let working_dir = absolute(working_dir.as_ref())?;
    let source = source.as_path();
    let working_dir = working_dir.as_path();

    check_source(source)?;

    let subtitle = match &options.subtitle_path {
        Some(path) => Some(check_subtitle(path)?),
        None => None,
    };

    if settings.segment_duration_secs == 0 {
        return Err(Error::InvalidInput(
            "segment duration must be positive".to_string(),
        ));
    }
    if settings.window_size == 0 {
        return Err(Error::InvalidInput("window size must be positive".to_string()));
    }

    let backend = profile
        .select(excluded)
        .ok_or_else(|| Error::NoEncoderAvailable {
            excluded: excluded.iter().map(|b| b.name().to_string()).collect(),
        })?;

    let layout = settings.layout();
    let args = build_args(
        source,
        subtitle.as_deref(),
        options,
        profile,
        backend,
        settings,
        working_dir,
        &layout,
    );

    #[cfg(feature = "tracing")]
    tracing::debug!(
        backend = %backend,
        source = %source.display(),
        "Resolved encoder arguments: {:?}",
        args
    );

    Ok(EncoderSpec {
        program: settings.program.clone(),
        args,
        backend,
        video_encoder: backend.video_encoder().to_string(),
        layout,
        segment_duration: Duration::from_secs(u64::from(settings.segment_duration_secs)),
        window_size: settings.window_size,
        working_dir: working_dir.to_path_buf(),
        source: source.to_path_buf(),
        subtitle,
    })
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn check_source(source: &Path) -> Result<()> {
    let metadata = std::fs::metadata(source)
        .map_err(|e| Error::invalid_source(source, format!("cannot stat: {e}")))?;
    if !metadata.is_file() {
        return Err(Error::invalid_source(source, "not a regular file"));
    }
    File::open(source).map_err(|e| Error::invalid_source(source, format!("unreadable: {e}")))?;
    Ok(())
}

fn check_subtitle(path: &Path) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(path)
        .map_err(|e| Error::invalid_subtitle(path, format!("cannot resolve: {e}")))?;
    if !resolved.is_file() {
        return Err(Error::invalid_subtitle(path, "not a regular file"));
    }
    File::open(&resolved)
        .map_err(|e| Error::invalid_subtitle(path, format!("unreadable: {e}")))?;
    Ok(resolved)
}

/// Build the ffmpeg `subtitles=` filter for a file, escaping the characters
/// the filtergraph parser treats specially.
pub fn subtitle_filter(path: &Path) -> String {
    let mut escaped = String::new();
    for ch in path.to_string_lossy().chars() {
        if matches!(ch, '\\' | ':' | ',' | '\'' | '[' | ']' | '(' | ')' | ' ') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("subtitles={escaped}")
}

fn output_height(settings: &EncoderSettings, options: &ResolveOptions) -> Option<u32> {
    let configured = Some(settings.target_height).filter(|h| *h > 0);
    match (configured, options.max_height.filter(|h| *h > 0)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_args(
    source: &Path,
    subtitle: Option<&Path>,
    options: &ResolveOptions,
    profile: &HardwareProfile,
    backend: EncoderBackend,
    settings: &EncoderSettings,
    working_dir: &Path,
    layout: &SegmentLayout,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostdin".into()];

    if settings.realtime {
        args.push("-re".into());
    }
    if settings.loop_input {
        args.extend(["-stream_loop".into(), "-1".into()]);
    }

    // Hardware decode
    match backend {
        EncoderBackend::Vaapi => {
            let device = profile
                .vaapi_device
                .clone()
                .unwrap_or_else(|| "/dev/dri/renderD128".to_string());
            args.extend(["-vaapi_device".into(), device]);
        }
        other => {
            if let Some(hwaccel) = other.hwaccel() {
                args.extend(["-hwaccel".into(), hwaccel.into()]);
            }
        }
    }

    args.extend(["-i".into(), source.to_string_lossy().to_string()]);

    // Filter chain: burn-in first so subtitles scale with the picture
    let mut filters: Vec<String> = Vec::new();
    if let Some(subtitle) = subtitle {
        filters.push(subtitle_filter(subtitle));
    }
    if let Some(height) = output_height(settings, options) {
        filters.push(format!("scale=-2:{height}"));
    }
    match backend {
        EncoderBackend::Vaapi => filters.push("format=nv12,hwupload".into()),
        EncoderBackend::Qsv => filters.push("format=nv12".into()),
        _ => filters.push("format=yuv420p".into()),
    }
    args.extend(["-vf".into(), filters.join(",")]);

    args.extend(["-c:v".into(), backend.video_encoder().into()]);

    let crf = settings.crf.to_string();
    match backend {
        EncoderBackend::Software => {
            args.extend(["-preset".into(), settings.preset.clone()]);
            args.extend(["-crf".into(), crf]);
            args.extend(["-threads".into(), profile.threads.to_string()]);
        }
        EncoderBackend::Nvenc => {
            args.extend(["-preset".into(), "p4".into()]);
            args.extend(["-rc".into(), "vbr".into()]);
            args.extend(["-cq".into(), crf]);
            args.extend(["-gpu".into(), profile.gpu_index.to_string()]);
        }
        EncoderBackend::Qsv => {
            args.extend(["-preset".into(), "veryfast".into()]);
            args.extend(["-global_quality".into(), crf]);
        }
        EncoderBackend::Vaapi => {
            args.extend(["-qp".into(), crf]);
        }
        EncoderBackend::VideoToolbox => {
            let bitrate = options
                .max_bitrate
                .clone()
                .or_else(|| settings.maxrate.clone())
                .unwrap_or_else(|| "6000k".to_string());
            args.extend(["-b:v".into(), bitrate]);
        }
    }

    args.extend(["-profile:v".into(), settings.profile.clone()]);
    if backend != EncoderBackend::Vaapi {
        args.extend(["-level:v".into(), settings.level.clone()]);
    }
    if matches!(
        backend,
        EncoderBackend::Software | EncoderBackend::Nvenc | EncoderBackend::VideoToolbox
    ) {
        args.extend(["-pix_fmt".into(), "yuv420p".into()]);
    }

    if let Some(maxrate) = options.max_bitrate.clone().or_else(|| settings.maxrate.clone()) {
        args.extend(["-maxrate".into(), maxrate]);
    }
    if let Some(bufsize) = profile.buffer_size.clone().or_else(|| settings.bufsize.clone()) {
        args.extend(["-bufsize".into(), bufsize]);
    }

    // Keyframe on every segment boundary so each segment decodes on its own
    args.extend([
        "-force_key_frames".into(),
        format!("expr:gte(t,n_forced*{})", settings.segment_duration_secs),
    ]);

    args.extend([
        "-c:a".into(),
        "aac".into(),
        "-ac".into(),
        settings.audio_channels.to_string(),
        "-b:a".into(),
        settings.audio_bitrate.clone(),
    ]);

    args.extend([
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        settings.segment_duration_secs.to_string(),
        "-hls_list_size".into(),
        settings.window_size.to_string(),
        "-hls_flags".into(),
        "delete_segments+append_list".into(),
        "-hls_segment_filename".into(),
        working_dir.join(layout.pattern()).to_string_lossy().to_string(),
        working_dir
            .join(&layout.manifest_name)
            .to_string_lossy()
            .to_string(),
    ]);

    args
}
