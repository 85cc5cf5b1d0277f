//! Path utilities for classifying the files a session serves.

use std::path::Path;

/// Content type for HLS manifests.
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Content type for MPEG transport stream segments.
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

/// Manifest file extensions.
const MANIFEST_EXTENSIONS: &[&str] = &["m3u8"];

/// Segment file extensions.
const SEGMENT_EXTENSIONS: &[&str] = &["ts"];

/// List of supported subtitle file extensions.
const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub", "vtt"];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Content type for an HLS artifact, independent of any system MIME table.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use hlscast_common::paths::content_type_for;
///
/// assert_eq!(content_type_for(Path::new("segment001.ts")), Some("video/mp2t"));
/// assert_eq!(content_type_for(Path::new("notes.txt")), None);
/// ```
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = extension(path)?;
    if MANIFEST_EXTENSIONS.contains(&ext.as_str()) {
        Some(MANIFEST_CONTENT_TYPE)
    } else if SEGMENT_EXTENSIONS.contains(&ext.as_str()) {
        Some(SEGMENT_CONTENT_TYPE)
    } else {
        None
    }
}

/// Check if a path has a manifest extension.
pub fn is_manifest_file(path: &Path) -> bool {
    extension(path)
        .map(|ext| MANIFEST_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check if a path has a segment extension.
pub fn is_segment_file(path: &Path) -> bool {
    extension(path)
        .map(|ext| SEGMENT_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Check if a path has a subtitle file extension.
pub fn is_subtitle_file(path: &Path) -> bool {
    extension(path)
        .map(|ext| SUBTITLE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(
            content_type_for(Path::new("stream.m3u8")),
            Some(MANIFEST_CONTENT_TYPE)
        );
        assert_eq!(
            content_type_for(Path::new("STREAM.M3U8")),
            Some(MANIFEST_CONTENT_TYPE)
        );
        assert_eq!(
            content_type_for(Path::new("segment000.ts")),
            Some(SEGMENT_CONTENT_TYPE)
        );
        assert_eq!(content_type_for(Path::new("encoder.log")), None);
        assert_eq!(content_type_for(Path::new("noext")), None);
    }

    #[test]
    fn test_classifiers() {
        assert!(is_manifest_file(Path::new("/a/b/stream.m3u8")));
        assert!(!is_manifest_file(Path::new("segment.ts")));
        assert!(is_segment_file(Path::new("segment.ts")));
        assert!(is_subtitle_file(Path::new("movie.srt")));
        assert!(!is_subtitle_file(Path::new("movie.mkv")));
    }
}
