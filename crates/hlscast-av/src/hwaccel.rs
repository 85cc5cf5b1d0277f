//! Hardware encoder backends and the ranked profile a host supplies.
//!
//! Detection is the host's job. The profile only says which backends the
//! host believes are usable and in what order; the resolver walks that list
//! and the controller excludes backends that fail to launch.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An H.264 encoder path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderBackend {
    /// libx264 on the CPU. Always available.
    #[serde(alias = "sw", alias = "cpu", alias = "libx264")]
    Software,
    /// NVIDIA NVENC.
    #[serde(alias = "nvidia", alias = "cuda")]
    Nvenc,
    /// Intel Quick Sync.
    #[serde(alias = "intel", alias = "quicksync")]
    Qsv,
    /// VAAPI (Linux, AMD/Intel).
    #[serde(alias = "amd")]
    Vaapi,
    /// Apple VideoToolbox.
    #[serde(alias = "vt", alias = "apple")]
    VideoToolbox,
}

impl EncoderBackend {
    /// Short lowercase name used in config and logs.
    pub fn name(&self) -> &'static str {
        match self {
            EncoderBackend::Software => "software",
            EncoderBackend::Nvenc => "nvenc",
            EncoderBackend::Qsv => "qsv",
            EncoderBackend::Vaapi => "vaapi",
            EncoderBackend::VideoToolbox => "videotoolbox",
        }
    }

    /// The ffmpeg video encoder for this backend.
    pub fn video_encoder(&self) -> &'static str {
        match self {
            EncoderBackend::Software => "libx264",
            EncoderBackend::Nvenc => "h264_nvenc",
            EncoderBackend::Qsv => "h264_qsv",
            EncoderBackend::Vaapi => "h264_vaapi",
            EncoderBackend::VideoToolbox => "h264_videotoolbox",
        }
    }

    /// The `-hwaccel` decode method paired with this encoder, if any.
    pub fn hwaccel(&self) -> Option<&'static str> {
        match self {
            EncoderBackend::Software | EncoderBackend::Vaapi => None,
            EncoderBackend::Nvenc => Some("cuda"),
            EncoderBackend::Qsv => Some("qsv"),
            EncoderBackend::VideoToolbox => Some("videotoolbox"),
        }
    }

    /// Whether this backend needs a GPU or media engine.
    pub fn is_hardware(&self) -> bool {
        !matches!(self, EncoderBackend::Software)
    }
}

impl fmt::Display for EncoderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncoderBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "software" | "sw" | "cpu" | "libx264" => Ok(EncoderBackend::Software),
            "nvenc" | "nvidia" | "cuda" => Ok(EncoderBackend::Nvenc),
            "qsv" | "intel" | "quicksync" => Ok(EncoderBackend::Qsv),
            "vaapi" | "amd" => Ok(EncoderBackend::Vaapi),
            "videotoolbox" | "vt" | "apple" => Ok(EncoderBackend::VideoToolbox),
            other => Err(Error::UnknownBackend(other.to_string())),
        }
    }
}

fn default_backends() -> Vec<EncoderBackend> {
    vec![EncoderBackend::Software]
}

/// Ranked encoder capabilities supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Backends in order of preference.
    #[serde(default = "default_backends")]
    pub backends: Vec<EncoderBackend>,

    /// Encoder threads for software encoding (0 = let the encoder decide).
    #[serde(default)]
    pub threads: u32,

    /// VBV buffer size override (e.g. `8M`).
    #[serde(default)]
    pub buffer_size: Option<String>,

    /// Render node for VAAPI.
    #[serde(default)]
    pub vaapi_device: Option<String>,

    /// GPU index for NVENC.
    #[serde(default)]
    pub gpu_index: u32,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self::software_only()
    }
}

impl HardwareProfile {
    /// A profile that only lists software encoding.
    pub fn software_only() -> Self {
        Self {
            backends: default_backends(),
            threads: 0,
            buffer_size: None,
            vaapi_device: None,
            gpu_index: 0,
        }
    }

    /// A profile with the given backends, in order of preference.
    pub fn with_backends(backends: impl IntoIterator<Item = EncoderBackend>) -> Self {
        Self {
            backends: backends.into_iter().collect(),
            ..Self::software_only()
        }
    }

    /// Parse a comma separated backend list such as `nvenc,software`.
    pub fn parse_backends(list: &str) -> Result<Vec<EncoderBackend>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(EncoderBackend::from_str)
            .collect()
    }

    /// Deduplicated backends in preference order, with software appended
    /// when the host did not list it.
    pub fn ranked(&self) -> Vec<EncoderBackend> {
        let mut ranked: Vec<EncoderBackend> = Vec::with_capacity(self.backends.len() + 1);
        for backend in &self.backends {
            if !ranked.contains(backend) {
                ranked.push(*backend);
            }
        }
        if !ranked.contains(&EncoderBackend::Software) {
            ranked.push(EncoderBackend::Software);
        }
        ranked
    }

    /// Highest ranked backend not in `excluded`.
    pub fn select(&self, excluded: &[EncoderBackend]) -> Option<EncoderBackend> {
        self.ranked()
            .into_iter()
            .find(|backend| !excluded.contains(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_always_ranked_last_when_missing() {
        let profile = HardwareProfile::with_backends([EncoderBackend::Nvenc]);
        assert_eq!(
            profile.ranked(),
            vec![EncoderBackend::Nvenc, EncoderBackend::Software]
        );
    }

    #[test]
    fn test_ranked_deduplicates_and_keeps_order() {
        let profile = HardwareProfile::with_backends([
            EncoderBackend::Software,
            EncoderBackend::Qsv,
            EncoderBackend::Software,
        ]);
        assert_eq!(
            profile.ranked(),
            vec![EncoderBackend::Software, EncoderBackend::Qsv]
        );
    }

    #[test]
    fn test_select_skips_excluded() {
        let profile =
            HardwareProfile::with_backends([EncoderBackend::Nvenc, EncoderBackend::Vaapi]);
        assert_eq!(profile.select(&[]), Some(EncoderBackend::Nvenc));
        assert_eq!(
            profile.select(&[EncoderBackend::Nvenc]),
            Some(EncoderBackend::Vaapi)
        );
        assert_eq!(
            profile.select(&[EncoderBackend::Nvenc, EncoderBackend::Vaapi]),
            Some(EncoderBackend::Software)
        );
        assert_eq!(
            profile.select(&[
                EncoderBackend::Nvenc,
                EncoderBackend::Vaapi,
                EncoderBackend::Software
            ]),
            None
        );
    }

    #[test]
    fn test_parse_backends_with_aliases() {
        let parsed = HardwareProfile::parse_backends("cuda, intel ,sw").unwrap();
        assert_eq!(
            parsed,
            vec![
                EncoderBackend::Nvenc,
                EncoderBackend::Qsv,
                EncoderBackend::Software
            ]
        );
        assert!(HardwareProfile::parse_backends("nvenc,quantum").is_err());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let profile: HardwareProfile =
            toml::from_str("backends = [\"nvidia\", \"videotoolbox\"]\nthreads = 4\n").unwrap();
        assert_eq!(
            profile.backends,
            vec![EncoderBackend::Nvenc, EncoderBackend::VideoToolbox]
        );
        assert_eq!(profile.threads, 4);
        assert!(profile.buffer_size.is_none());
    }

    #[test]
    fn test_encoder_names() {
        assert_eq!(EncoderBackend::Software.video_encoder(), "libx264");
        assert_eq!(EncoderBackend::Nvenc.video_encoder(), "h264_nvenc");
        assert_eq!(EncoderBackend::Nvenc.hwaccel(), Some("cuda"));
        assert!(EncoderBackend::Vaapi.hwaccel().is_none());
        assert!(!EncoderBackend::Software.is_hardware());
    }
}
