use ndarray::{s, Array1};
use tracing::warn;

use crate::types::{AlignedSession, AlignmentError, InvalidInterval, StreamKind};

/// Applies a cumulative time shift to a frame-timestamped stream.
///
/// Pure elementwise addition; the identity when `shift` is zero.
pub fn shift_timestamps(native: &Array1<f64>, shift: f64) -> Array1<f64> {
    native + shift
}

/// Converts a frame-indexed discrete-event stream to aligned session seconds.
///
/// Behavioral event logs record integer video-frame counts rather than
/// seconds; dividing by the camera clock rate puts them on the segment's
/// clock before the shift is applied.
pub fn frame_events_to_seconds(native: &Array1<f64>, clock_rate: f64, shift: f64) -> Array1<f64> {
    native / clock_rate + shift
}

impl StreamKind {
    /// Converts one stream's native values to aligned session seconds.
    ///
    /// `clock_rate` is ignored for frame-timestamped streams.
    pub fn apply(&self, native: &Array1<f64>, clock_rate: f64, shift: f64) -> Array1<f64> {
        match self {
            StreamKind::FrameTimestamped => shift_timestamps(native, shift),
            StreamKind::FrameIndexedEvent => frame_events_to_seconds(native, clock_rate, shift),
        }
    }
}

/// Result of assigning aligned video timestamps to a derived stream's rows.
#[derive(Debug, Clone)]
pub struct RowReconciliation {
    /// Timestamps assigned to the derived stream, one per assignable row
    pub timestamps: Array1<f64>,
    /// Present when the row count did not match the video frame count,
    /// covering the span of the positional assignment
    pub mismatch: Option<InvalidInterval>,
}

/// Reconciles a derived stream's row count against its source video's
/// aligned timestamps.
///
/// When the counts match, timestamps are assigned 1:1 in order. When they
/// differ, this is a recoverable condition, not an error: the aligned
/// timestamps are truncated to the row count (never padded), a warning is
/// emitted with the expected and actual counts, and an [`InvalidInterval`]
/// covering the assigned span is returned so downstream consumers can flag
/// that span rather than silently trusting misaligned data. Which rows were
/// dropped (start, end, or interspersed) is not determined by this algorithm;
/// the ambiguity is surfaced, not resolved.
pub fn reconcile_row_count(
    aligned: &Array1<f64>,
    row_count: usize,
    stream_label: &str,
) -> RowReconciliation {
    if row_count == aligned.len() {
        return RowReconciliation {
            timestamps: aligned.clone(),
            mismatch: None,
        };
    }

    // Nothing to assign and nothing to bound an interval with. Segments
    // produced by this library always carry at least one timestamp.
    if aligned.is_empty() {
        warn!(
            stream = stream_label,
            rows = row_count,
            "no aligned timestamps to assign"
        );
        return RowReconciliation {
            timestamps: aligned.clone(),
            mismatch: None,
        };
    }

    warn!(
        stream = stream_label,
        rows = row_count,
        timestamps = aligned.len(),
        "row count does not match aligned timestamps, truncating"
    );

    let assigned = row_count.min(aligned.len());
    let timestamps = aligned.slice(s![..assigned]).to_owned();
    // A rowless stream leaves nothing to assign; the whole span is suspect.
    let stop_index = if assigned == 0 {
        aligned.len() - 1
    } else {
        assigned - 1
    };
    let reason = format!(
        "For {stream_label}, the stream has {row_count} rows but {num_timestamps} aligned video \
         timestamps. The stream was assigned the first {assigned} video timestamps, so temporal \
         alignment within this interval should be treated with caution with respect to other \
         data streams.",
        num_timestamps = aligned.len(),
    );
    RowReconciliation {
        timestamps,
        mismatch: Some(InvalidInterval {
            start_time: aligned[0],
            stop_time: aligned[stop_index],
            reason,
        }),
    }
}

impl AlignedSession {
    /// Aligns a derived pose-estimation stream against one segment's video.
    ///
    /// Returns the timestamps to assign to the stream's rows, truncated when
    /// `row_count` disagrees with the segment's frame count. Any mismatch
    /// interval is appended to this session's invalid intervals.
    /// `stream_label` identifies the stream (typically its file name) in
    /// warnings and in the interval's reason text.
    pub fn align_pose_rows(
        &mut self,
        epoch_index: usize,
        segment_index: usize,
        row_count: usize,
        stream_label: &str,
    ) -> Result<Array1<f64>, AlignmentError> {
        let epoch = self
            .epochs
            .get(epoch_index)
            .ok_or(AlignmentError::EpochOutOfRange(epoch_index))?;
        let aligned = epoch.aligned_timestamps.get(segment_index).ok_or(
            AlignmentError::SegmentOutOfRange {
                epoch_index,
                segment_index,
            },
        )?;
        let reconciliation = reconcile_row_count(aligned, row_count, stream_label);
        if let Some(interval) = reconciliation.mismatch {
            self.invalid_intervals.push(interval);
        }
        Ok(reconciliation.timestamps)
    }

    /// Aligns one epoch's pose-estimation streams, one per segment.
    ///
    /// `row_counts` and `stream_labels` run parallel to the epoch's segments
    /// in acquisition order; mismatched lengths are a configuration error.
    pub fn align_pose_epoch(
        &mut self,
        epoch_index: usize,
        row_counts: &[usize],
        stream_labels: &[&str],
    ) -> Result<Vec<Array1<f64>>, AlignmentError> {
        let num_segments = self
            .epochs
            .get(epoch_index)
            .ok_or(AlignmentError::EpochOutOfRange(epoch_index))?
            .aligned_timestamps
            .len();
        if row_counts.len() != num_segments {
            return Err(AlignmentError::LengthMismatch {
                what: "row counts",
                expected: num_segments,
                actual: row_counts.len(),
            });
        }
        if stream_labels.len() != num_segments {
            return Err(AlignmentError::LengthMismatch {
                what: "stream labels",
                expected: num_segments,
                actual: stream_labels.len(),
            });
        }
        let mut assigned = Vec::with_capacity(num_segments);
        for (segment_index, (&row_count, stream_label)) in
            row_counts.iter().zip(stream_labels).enumerate()
        {
            assigned.push(self.align_pose_rows(
                epoch_index,
                segment_index,
                row_count,
                stream_label,
            )?);
        }
        Ok(assigned)
    }

    /// Converts a frame-indexed behavioral event stream to aligned session
    /// seconds using the epoch's time shift and clock rate.
    pub fn align_frame_events(
        &self,
        epoch_index: usize,
        native: &Array1<f64>,
    ) -> Result<Array1<f64>, AlignmentError> {
        let epoch = self
            .epochs
            .get(epoch_index)
            .ok_or(AlignmentError::EpochOutOfRange(epoch_index))?;
        Ok(frame_events_to_seconds(native, epoch.clock_rate, epoch.time_shift))
    }
}
