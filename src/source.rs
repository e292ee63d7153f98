use ndarray::Array1;
use std::collections::HashMap;

use crate::types::{AlignmentError, SegmentTimestamps};

/// Provides native timestamps and a nominal clock rate for a recording segment.
///
/// Implementations resolve a segment reference (typically a file path or a
/// discovery key) to the ordered frame timestamps recorded by the capture
/// system. Returned timestamps must be in native, pre-alignment units and
/// non-decreasing within one segment.
///
/// Decoding any particular on-disk format is the implementor's concern; the
/// alignment engine only consumes the resolved arrays. Readers that fail
/// should return [`AlignmentError::UnresolvedSegment`] for unknown references
/// and propagate I/O errors through [`AlignmentError::Io`].
pub trait TimestampSource {
    /// Resolves one segment reference to its timestamps and clock rate.
    fn read(&self, segment_ref: &str) -> Result<SegmentTimestamps, AlignmentError>;
}

/// In-memory timestamp source backed by a map from reference to data.
///
/// Useful for tests, for demos, and for callers that have already loaded
/// timestamp arrays through their own readers.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use session_aligner::{MemorySource, TimestampSource};
///
/// let mut source = MemorySource::new();
/// source.insert("run1_cam1", array![0.0, 0.033, 0.066], 30.0);
///
/// let segment = source.read("run1_cam1").unwrap();
/// assert_eq!(segment.timestamps.len(), 3);
/// assert!(source.read("missing").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    segments: HashMap<String, SegmentTimestamps>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        MemorySource::default()
    }

    /// Registers one segment's timestamps under a reference.
    ///
    /// An existing entry with the same reference is replaced.
    pub fn insert(&mut self, reference: impl Into<String>, timestamps: Array1<f64>, clock_rate: f64) {
        self.segments.insert(
            reference.into(),
            SegmentTimestamps {
                timestamps,
                clock_rate,
            },
        );
    }

    /// Number of registered segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when no segments are registered.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl TimestampSource for MemorySource {
    fn read(&self, segment_ref: &str) -> Result<SegmentTimestamps, AlignmentError> {
        self.segments
            .get(segment_ref)
            .cloned()
            .ok_or_else(|| AlignmentError::UnresolvedSegment(segment_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlignmentError;
    use ndarray::array;

    #[test]
    fn read_returns_registered_segment() {
        let mut source = MemorySource::new();
        source.insert("e1_s1", array![1.0, 2.0, 3.0], 25.0);
        let segment = source.read("e1_s1").unwrap();
        assert_eq!(segment.timestamps, array![1.0, 2.0, 3.0]);
        assert_eq!(segment.clock_rate, 25.0);
    }

    #[test]
    fn read_unknown_reference_is_unresolved() {
        let source = MemorySource::new();
        let err = source.read("nope").unwrap_err();
        assert!(matches!(err, AlignmentError::UnresolvedSegment(reference) if reference == "nope"));
    }

    #[test]
    fn insert_replaces_existing_reference() {
        let mut source = MemorySource::new();
        source.insert("e1_s1", array![1.0], 25.0);
        source.insert("e1_s1", array![2.0, 3.0], 30.0);
        assert_eq!(source.len(), 1);
        assert_eq!(source.read("e1_s1").unwrap().timestamps.len(), 2);
    }
}
