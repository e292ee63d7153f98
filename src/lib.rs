//! Temporal alignment of multi-stream neuroscience recording sessions.
//!
//! Recording subsystems (cameras, pose estimation, behavioral event logs) are
//! independently clocked and only loosely synchronized. This library
//! reconciles their timestamps into one monotonic session timeline: it detects
//! uncommanded clock resets between epochs, computes the cumulative time shift
//! each segment needs, assigns per-segment frame offsets, converts dependent
//! streams into aligned session seconds, and reports every span whose
//! temporal accuracy is degraded as an explicit invalid interval.

mod aligner;
mod source;
mod streams;
pub mod types;

// Re-export the public surface
pub use aligner::{
    align_session, build_epochs, compute_time_shifts, detect_clock_resets,
    merge_invalid_intervals, starting_frames,
};
pub use source::{MemorySource, TimestampSource};
pub use streams::{frame_events_to_seconds, reconcile_row_count, shift_timestamps, RowReconciliation};
pub use types::*;

/// Aligns one session's segments into a monotonic timeline.
///
/// Resolves every segment reference through `source`, detects clock resets,
/// computes time shifts and frame offsets, and returns the complete
/// [`AlignedSession`]. Derived streams (pose-estimation rows, frame-indexed
/// behavioral events) are aligned afterwards through the returned session.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use session_aligner::{align, AlignmentConfig, EpochGroup, MemorySource};
///
/// let mut source = MemorySource::new();
/// source.insert("run1_cam1", array![0.0, 0.1, 0.2], 30.0);
///
/// let groups = vec![EpochGroup {
///     name: "run1".into(),
///     segment_refs: vec!["run1_cam1".into()],
/// }];
///
/// let session = align(&source, &groups, &AlignmentConfig::default()).unwrap();
/// assert_eq!(session.time_shifts, vec![0.0]);
/// assert!(session.invalid_intervals().is_empty());
/// ```
pub fn align(
    source: &dyn TimestampSource,
    groups: &[EpochGroup],
    config: &AlignmentConfig,
) -> Result<AlignedSession, AlignmentError> {
    aligner::align_session(source, groups, config)
}
