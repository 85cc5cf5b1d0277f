//! Locating the encoder binary and asking it what it supports.

use crate::{EncoderBackend, Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// What was found for one external program.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    /// Resolved executable, if any.
    pub path: Option<PathBuf>,
    /// First line of the version banner.
    pub version: Option<String>,
}

impl ToolInfo {
    pub fn available(&self) -> bool {
        self.path.is_some() && self.version.is_some()
    }
}

/// Look up `program` and read its `-version` banner.
///
/// # Example
///
/// ```no_run
/// use hlscast_av::check_tool;
/// use std::path::Path;
///
/// let info = check_tool(Path::new("ffmpeg"));
/// if info.available() {
///     println!("{}", info.version.unwrap_or_default());
/// }
/// ```
pub fn check_tool(program: &Path) -> ToolInfo {
    let name = program.display().to_string();
    let Ok(path) = resolve_program(program) else {
        return ToolInfo {
            name,
            path: None,
            version: None,
        };
    };

    let version = Command::new(&path)
        .arg("-version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| {
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(str::to_string)
        });

    ToolInfo {
        name,
        path: Some(path),
        version,
    }
}

/// The encoder and its companion probe, as `check-tools` reports them.
///
/// `ffprobe` is looked up next to `program` when that is a path.
pub fn check_tools(program: &Path) -> Vec<ToolInfo> {
    let probe = match program.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.join("ffprobe"),
        None => PathBuf::from("ffprobe"),
    };
    vec![check_tool(program), check_tool(&probe)]
}

/// Backends whose H.264 encoder is compiled into `program`.
///
/// This only reads `-encoders`; a listed backend can still fail at launch
/// when the device or driver is missing.
pub fn compiled_backends(program: &Path) -> Result<Vec<EncoderBackend>> {
    let path = resolve_program(program)?;
    let output = Command::new(&path)
        .args(["-hide_banner", "-encoders"])
        .output()?;
    if !output.status.success() {
        return Err(Error::InvalidInput(format!(
            "{} -encoders exited with {}",
            path.display(),
            output.status
        )));
    }
    Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Pick the backends out of an `ffmpeg -encoders` listing, hardware first.
fn parse_encoder_list(listing: &str) -> Vec<EncoderBackend> {
    // Lines look like ` V....D h264_nvenc   NVIDIA NVENC H.264 encoder`
    let names: Vec<&str> = listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();

    [
        EncoderBackend::Nvenc,
        EncoderBackend::Qsv,
        EncoderBackend::Vaapi,
        EncoderBackend::VideoToolbox,
        EncoderBackend::Software,
    ]
    .into_iter()
    .filter(|backend| names.contains(&backend.video_encoder()))
    .collect()
}

/// Require that a tool is on `PATH`, returning its path.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Resolve a configured program to an executable path.
///
/// Paths with more than one component must exist as given and come back
/// absolute, since the encoder runs from its session directory. Bare names
/// are looked up on `PATH`.
pub fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 {
        if program.is_file() {
            if program.is_absolute() {
                return Ok(program.to_path_buf());
            }
            return Ok(std::env::current_dir()?.join(program));
        }
        return Err(Error::tool_not_found(program.display().to_string()));
    }

    require_tool(&program.to_string_lossy())
}
