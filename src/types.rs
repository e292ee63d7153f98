use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Default value for [`AlignmentConfig::inter_epoch_interval`], in seconds.
///
/// Observed typical gap between epochs in the recordings this library was
/// written for. Used only to manufacture the approximate post-reset gap.
pub const DEFAULT_INTER_EPOCH_INTERVAL: f64 = 1800.0;

/// One epoch's worth of segment references, as discovered by the caller.
///
/// Session discovery (filename conventions, directory layout) happens upstream;
/// this type only carries the result. References within a group, and groups
/// within a session, must be sorted in the order the data was recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochGroup {
    /// Name of the epoch (typically a task or condition label)
    pub name: String,
    /// Segment references in acquisition order, resolvable by a
    /// [`TimestampSource`](crate::TimestampSource)
    pub segment_refs: Vec<String>,
}

/// Timestamps and clock rate for one recording segment, as returned by a
/// [`TimestampSource`](crate::TimestampSource).
#[derive(Debug, Clone)]
pub struct SegmentTimestamps {
    /// Frame/event timestamps in native (pre-alignment) seconds, non-decreasing
    pub timestamps: Array1<f64>,
    /// Nominal clock rate of the capture system (frames per second)
    pub clock_rate: f64,
}

/// One physically recorded chunk of video frames.
///
/// Created by the segment/epoch index from resolved references and immutable
/// once read. `timestamps` stays in native units; aligned copies live in the
/// [`AlignedSession`] produced by the alignment run.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Order within the owning epoch (0-based)
    pub segment_index: usize,
    /// The reference this segment was resolved from, kept for diagnostics
    pub reference: String,
    /// Native frame timestamps (seconds on the segment's own clock)
    pub timestamps: Array1<f64>,
    /// Nominal clock rate (frames per second), used to convert frame-indexed
    /// event logs to seconds
    pub clock_rate: f64,
    /// First native timestamp
    pub raw_start: f64,
    /// Last native timestamp
    pub raw_stop: f64,
}

impl Segment {
    /// Number of frames recorded in this segment.
    pub fn num_frames(&self) -> usize {
        self.timestamps.len()
    }
}

/// An ordered, non-empty list of segments sharing one experimental condition.
///
/// Segments within an epoch are contiguous in acquisition order; only the last
/// segment of one epoch may be followed by a clock reset before the first
/// segment of the next.
#[derive(Debug, Clone)]
pub struct Epoch {
    /// Name of the epoch
    pub epoch_name: String,
    /// Segments in acquisition order
    pub segments: Vec<Segment>,
}

impl Epoch {
    /// Total number of frames across all segments of this epoch.
    pub fn num_frames(&self) -> usize {
        self.segments.iter().map(Segment::num_frames).sum()
    }
}

/// Marks that one segment started before its predecessor stopped.
///
/// This is the signature of an uncommanded clock reset: the capture program
/// was restarted between epochs and its clock silently started over. A reset
/// is an expected, handled condition, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockReset {
    /// Position of the resetting segment in the flattened, acquisition-ordered
    /// segment list
    pub reset_index: usize,
    /// Native stop time of the segment immediately before the reset
    pub gap_start: f64,
    /// Nominal duration assigned to the gap. The true elapsed time across a
    /// reset is unrecoverable from the data; this is a configured
    /// approximation, not a measurement.
    pub gap_duration: f64,
}

/// A span of session time whose temporal accuracy is degraded.
///
/// Two origins: the approximated gap at a clock reset, and the tail of a
/// derived stream whose row count stopped matching its source stream's frame
/// count. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidInterval {
    /// Start of the degraded span (aligned session seconds)
    pub start_time: f64,
    /// End of the degraded span (aligned session seconds)
    pub stop_time: f64,
    /// Human-readable explanation with enough context to diagnose after the fact
    pub reason: String,
}

/// Kind of dependent data stream, determining how native values are converted
/// to aligned session seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    /// Native values are already seconds on the segment's clock
    /// (video frames, pose-estimation rows)
    FrameTimestamped,
    /// Native values are video-frame counts, to be divided by the clock rate
    /// (discrete behavioral event logs)
    FrameIndexedEvent,
}

/// Tunable constants for session alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Typical gap between epochs (seconds), used to approximate the
    /// unmeasurable gap after a clock reset
    pub inter_epoch_interval: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        AlignmentConfig {
            inter_epoch_interval: DEFAULT_INTER_EPOCH_INTERVAL,
        }
    }
}

/// Alignment results for one epoch.
#[derive(Debug, Clone)]
pub struct EpochAlignment {
    /// Name of the epoch
    pub epoch_name: String,
    /// Aligned timestamps, one array per segment in acquisition order
    pub aligned_timestamps: Vec<Array1<f64>>,
    /// Starting output-frame index of each segment within the epoch's
    /// virtually concatenated frame sequence
    pub starting_frames: Vec<usize>,
    /// Cumulative time shift of the epoch's first segment (seconds). Paired
    /// with `clock_rate` to convert frame-indexed event logs for this epoch.
    pub time_shift: f64,
    /// Clock rate of the epoch's first segment (frames per second)
    pub clock_rate: f64,
    /// First aligned timestamp across all segments of the epoch
    pub start_time: f64,
    /// Last aligned timestamp across all segments of the epoch
    pub stop_time: f64,
}

/// Complete alignment result for one session.
///
/// This is the top-level struct returned by [`align`](crate::align). It owns
/// the per-epoch results, the flattened per-segment time shifts, the detected
/// clock resets, and the growable list of invalid intervals that later stream
/// reconciliation appends to.
#[derive(Debug, Clone)]
pub struct AlignedSession {
    /// Per-epoch alignment results, in acquisition order
    pub epochs: Vec<EpochAlignment>,
    /// Cumulative time shift per segment, flattened in acquisition order.
    /// Non-negative and non-decreasing; all zeros before the first reset.
    pub time_shifts: Vec<f64>,
    /// Clock resets detected in this session
    pub clock_resets: Vec<ClockReset>,
    pub(crate) invalid_intervals: Vec<InvalidInterval>,
}

impl AlignedSession {
    /// All spans whose temporal accuracy is degraded, in insertion order:
    /// reset gaps first, then row-count mismatches as they were reconciled.
    ///
    /// Empty when the session aligned cleanly. Downstream writers skip their
    /// "invalid time intervals" section in that case.
    pub fn invalid_intervals(&self) -> &[InvalidInterval] {
        &self.invalid_intervals
    }

    /// Total number of segments across all epochs.
    pub fn num_segments(&self) -> usize {
        self.time_shifts.len()
    }

    /// Total number of video frames across all epochs.
    pub fn num_frames(&self) -> usize {
        self.epochs
            .iter()
            .flat_map(|epoch| epoch.aligned_timestamps.iter())
            .map(Array1::len)
            .sum()
    }

    /// Duration of the aligned session in seconds, including approximated
    /// inter-epoch gaps.
    ///
    /// If the session contains no epochs, returns 0.0.
    pub fn duration(&self) -> f64 {
        match (self.epochs.first(), self.epochs.last()) {
            (Some(first), Some(last)) => last.stop_time - first.start_time,
            _ => 0.0,
        }
    }
}

/// Error conditions that abort alignment of a session.
///
/// Everything else degrades gracefully: clock resets are corrected and
/// disclosed, and row-count mismatches are truncated and disclosed, so one
/// anomalous epoch does not block conversion of an otherwise-healthy session.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// An epoch group contained no segment references
    #[error("epoch group '{0}' contains no segment references")]
    EmptyEpochGroup(String),
    /// A segment reference could not be resolved by the timestamp source
    #[error("could not resolve segment reference '{0}'")]
    UnresolvedSegment(String),
    /// A resolved segment contained no timestamps
    #[error("segment '{0}' contains no timestamps")]
    EmptySegment(String),
    /// Parallel lists the caller was required to keep in sync had different lengths
    #[error("mismatched {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// An epoch index was out of range for this session
    #[error("no epoch at index {0}")]
    EpochOutOfRange(usize),
    /// A segment index was out of range for its epoch
    #[error("no segment at index {segment_index} of epoch {epoch_index}")]
    SegmentOutOfRange {
        epoch_index: usize,
        segment_index: usize,
    },
    /// An I/O error from a timestamp source implementation
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// A general error with a custom message
    #[error("{0}")]
    Other(String),
}
