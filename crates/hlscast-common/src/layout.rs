//! Naming rules for the files an HLS encoder writes into a session directory.
//!
//! The encoder owns the writes; everything here is pure string handling so the
//! resolver, watcher, and HTTP server agree on which files are which.

use serde::{Deserialize, Serialize};

/// Manifest and segment naming for one session directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentLayout {
    /// Manifest file name (e.g. `stream.m3u8`).
    pub manifest_name: String,
    /// Segment file prefix (e.g. `segment`).
    pub segment_prefix: String,
    /// Segment extension without the dot (e.g. `ts`).
    pub segment_extension: String,
    /// Minimum zero-padded width of the sequence number.
    pub digits: usize,
}

impl Default for SegmentLayout {
    fn default() -> Self {
        Self {
            manifest_name: "stream.m3u8".to_string(),
            segment_prefix: "segment".to_string(),
            segment_extension: "ts".to_string(),
            digits: 3,
        }
    }
}

impl SegmentLayout {
    /// Create a layout with a custom manifest name and segment prefix.
    pub fn new(manifest_name: impl Into<String>, segment_prefix: impl Into<String>) -> Self {
        Self {
            manifest_name: manifest_name.into(),
            segment_prefix: segment_prefix.into(),
            ..Self::default()
        }
    }

    /// printf-style pattern handed to the encoder (`segment%03d.ts`).
    pub fn pattern(&self) -> String {
        format!(
            "{}%0{}d.{}",
            self.segment_prefix, self.digits, self.segment_extension
        )
    }

    /// File name of the segment with the given sequence number.
    pub fn segment_name(&self, sequence: u64) -> String {
        format!(
            "{}{:0width$}.{}",
            self.segment_prefix,
            sequence,
            self.segment_extension,
            width = self.digits
        )
    }

    /// Sequence number of a segment file name, or `None` if the name does
    /// not follow this layout.
    pub fn parse_sequence(&self, name: &str) -> Option<u64> {
        let rest = name.strip_prefix(self.segment_prefix.as_str())?;
        let digits = rest
            .strip_suffix(self.segment_extension.as_str())?
            .strip_suffix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Whether `name` is this layout's manifest.
    pub fn is_manifest(&self, name: &str) -> bool {
        name == self.manifest_name
    }

    /// Whether `name` is a segment of this layout.
    pub fn is_segment(&self, name: &str) -> bool {
        self.parse_sequence(name).is_some()
    }

    /// File names of the segments a manifest references, in order.
    ///
    /// URIs are reduced to their last path component; tags and blank lines
    /// are skipped.
    pub fn manifest_entries(&self, manifest: &str) -> Vec<String> {
        manifest
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|uri| {
                let uri = uri.split(['?', '#']).next().unwrap_or(uri);
                uri.rsplit('/').next().map(str::to_string)
            })
            .filter(|name| self.is_segment(name))
            .collect()
    }

    /// Highest segment sequence number a manifest references.
    pub fn max_referenced_sequence(&self, manifest: &str) -> Option<u64> {
        self.manifest_entries(manifest)
            .iter()
            .filter_map(|name| self.parse_sequence(name))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:4\n#EXTINF:2.000000,\nsegment004.ts\n#EXTINF:2.000000,\nsegment005.ts\n";

    #[test]
    fn test_pattern_and_names() {
        let layout = SegmentLayout::default();
        assert_eq!(layout.pattern(), "segment%03d.ts");
        assert_eq!(layout.segment_name(0), "segment000.ts");
        assert_eq!(layout.segment_name(1234), "segment1234.ts");
    }

    #[test]
    fn test_parse_sequence() {
        let layout = SegmentLayout::default();
        assert_eq!(layout.parse_sequence("segment007.ts"), Some(7));
        assert_eq!(layout.parse_sequence("segment1000.ts"), Some(1000));
        assert_eq!(layout.parse_sequence("segment.ts"), None);
        assert_eq!(layout.parse_sequence("segment00a.ts"), None);
        assert_eq!(layout.parse_sequence("segment001.m3u8"), None);
        assert_eq!(layout.parse_sequence("other001.ts"), None);
        assert_eq!(layout.parse_sequence("segment001ts"), None);
    }

    #[test]
    fn test_manifest_entries() {
        let layout = SegmentLayout::default();
        assert_eq!(
            layout.manifest_entries(MANIFEST),
            vec!["segment004.ts".to_string(), "segment005.ts".to_string()]
        );
        assert_eq!(layout.max_referenced_sequence(MANIFEST), Some(5));
    }

    #[test]
    fn test_manifest_entries_strip_paths_and_queries() {
        let layout = SegmentLayout::default();
        let manifest = "#EXTM3U\n/tmp/x/segment010.ts?v=1\nhttp://host/segment011.ts\n";
        assert_eq!(layout.max_referenced_sequence(manifest), Some(11));
    }

    #[test]
    fn test_empty_manifest() {
        let layout = SegmentLayout::default();
        assert!(layout.manifest_entries("#EXTM3U\n").is_empty());
        assert_eq!(layout.max_referenced_sequence(""), None);
    }
}
