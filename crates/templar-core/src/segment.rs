//! Content segmenter.
//!
//! Splits a single text blob into the ordered contents of a template's
//! chunks. Chunks are separated by a marker line, `---` by default,
//! which is the Markdown horizontal rule an editor shows between them.
//!
//! # Algorithm
//!
//! 1. Walk the blob line by line. A line whose trimmed text equals the
//!    marker is a delimiter.
//! 2. Everything between two delimiters (or the blob edges) is a part.
//! 3. Trim each part and drop the ones that end up empty.
//! 4. If nothing is left, return a single empty segment.
//!
//! # Example
//!
//! ```rust
//! use templar_core::segment::Segmenter;
//!
//! let segmenter = Segmenter::default();
//! let parts = segmenter.split("PRODUCER\n[Name]\n\n---\n\nINSURED\n[Company]");
//! assert_eq!(parts, vec!["PRODUCER\n[Name]", "INSURED\n[Company]"]);
//! assert_eq!(segmenter.split(segmenter.join(&parts).as_str()), parts);
//! ```

use anyhow::{bail, Result};

/// Marker used when none is configured.
pub const DEFAULT_MARKER: &str = "---";

/// Splits and joins template content on a marker line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmenter {
    marker: String,
}

impl Segmenter {
    /// Create a segmenter for `marker`.
    ///
    /// The marker is trimmed and must be a non-empty single line.
    pub fn new(marker: &str) -> Result<Self> {
        let marker = marker.trim();
        if marker.is_empty() {
            bail!("segment marker must not be empty");
        }
        if marker.contains('\n') || marker.contains('\r') {
            bail!("segment marker must be a single line");
        }
        Ok(Self {
            marker: marker.to_string(),
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Split `blob` into trimmed, non-empty segments.
    ///
    /// # Guarantees
    ///
    /// - At least one segment is always returned. Blank input yields `[""]`.
    /// - Segments appear in source order.
    /// - Text inside a segment is kept byte for byte, line endings included.
    /// - `split(join(segments)) == segments` for trimmed, non-empty segments
    ///   that contain no marker line of their own.
    pub fn split(&self, blob: &str) -> Vec<String> {
        let mut parts: Vec<&str> = Vec::new();
        let mut start = 0;
        let mut offset = 0;

        for line in blob.split_inclusive('\n') {
            if self.is_delimiter(line) {
                parts.push(&blob[start..offset]);
                start = offset + line.len();
            }
            offset += line.len();
        }
        parts.push(&blob[start..]);

        let segments: Vec<String> = parts
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            vec![String::new()]
        } else {
            segments
        }
    }

    /// Join segments into one blob, separated by a blank-line-padded marker.
    ///
    /// Segments are trimmed and empty ones are skipped.
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let separator = format!("\n\n{}\n\n", self.marker);
        segments
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(&separator)
    }

    fn is_delimiter(&self, line: &str) -> bool {
        line.trim() == self.marker
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}
