use tracing::{debug, info};

use crate::source::TimestampSource;
use crate::streams;
use crate::types::{
    AlignedSession, AlignmentConfig, AlignmentError, ClockReset, Epoch, EpochAlignment,
    EpochGroup, InvalidInterval, Segment, SegmentTimestamps,
};

/// Resolves epoch groups into [`Epoch`]s through a timestamp source.
///
/// Fails with a configuration error if any group is empty, a reference cannot
/// be resolved, or a resolved segment has no timestamps.
pub fn build_epochs(
    source: &dyn TimestampSource,
    groups: &[EpochGroup],
) -> Result<Vec<Epoch>, AlignmentError> {
    let mut epochs = Vec::with_capacity(groups.len());
    for group in groups {
        if group.segment_refs.is_empty() {
            return Err(AlignmentError::EmptyEpochGroup(group.name.clone()));
        }
        let mut segments = Vec::with_capacity(group.segment_refs.len());
        for (segment_index, reference) in group.segment_refs.iter().enumerate() {
            let SegmentTimestamps {
                timestamps,
                clock_rate,
            } = source.read(reference)?;
            if timestamps.is_empty() {
                return Err(AlignmentError::EmptySegment(reference.clone()));
            }
            let raw_start = timestamps[0];
            let raw_stop = timestamps[timestamps.len() - 1];
            segments.push(Segment {
                segment_index,
                reference: reference.clone(),
                timestamps,
                clock_rate,
                raw_start,
                raw_stop,
            });
        }
        debug!(
            epoch = %group.name,
            segments = segments.len(),
            "indexed epoch"
        );
        epochs.push(Epoch {
            epoch_name: group.name.clone(),
            segments,
        });
    }
    Ok(epochs)
}

/// Scans acquisition-ordered segments for uncommanded clock resets.
///
/// A segment whose native start time is earlier than its immediate
/// predecessor's native stop time marks a reset. The comparison baseline
/// advances unconditionally, so each reset is evaluated independently against
/// its immediate predecessor. Single left-to-right scan, no backtracking.
pub fn detect_clock_resets(segments: &[&Segment], gap_duration: f64) -> Vec<ClockReset> {
    let mut resets = Vec::new();
    let mut prev_stop = match segments.first() {
        Some(first) => first.raw_stop,
        None => return resets,
    };
    for (i, segment) in segments.iter().enumerate().skip(1) {
        if segment.raw_start < prev_stop {
            info!(
                index = i,
                reference = %segment.reference,
                gap_start = prev_stop,
                "detected clock reset"
            );
            resets.push(ClockReset {
                reset_index: i,
                gap_start: prev_stop,
                gap_duration,
            });
        }
        prev_stop = segment.raw_stop;
    }
    resets
}

/// Computes one cumulative time shift per segment, plus one invalid interval
/// per reset.
///
/// Every reset at or before a segment contributes the pre-reset native stop
/// time plus the configured inter-epoch interval to that segment's shift, so
/// shifts form a non-decreasing step function over acquisition order. Each
/// reset's interval starts at the predecessor's native stop plus the shift
/// accumulated strictly before the reset, and spans the approximated gap.
pub fn compute_time_shifts(
    segments: &[&Segment],
    resets: &[ClockReset],
    inter_epoch_interval: f64,
) -> (Vec<f64>, Vec<InvalidInterval>) {
    let mut shifts = Vec::with_capacity(segments.len());
    let mut cumulative = 0.0;
    let mut pending = resets.iter().peekable();
    for i in 0..segments.len() {
        while let Some(reset) = pending.peek() {
            if reset.reset_index > i {
                break;
            }
            // gap_start is the pre-reset segment's native stop time.
            cumulative += reset.gap_start + inter_epoch_interval;
            pending.next();
        }
        shifts.push(cumulative);
    }

    let mut intervals = Vec::with_capacity(resets.len());
    let mut accumulated = 0.0;
    for reset in resets {
        let start_time = reset.gap_start + accumulated;
        let stop_time = start_time + inter_epoch_interval;
        intervals.push(InvalidInterval {
            start_time,
            stop_time,
            reason: format!(
                "Between epochs the program used to acquire data was closed, causing the clock \
                 to reset. The interval between epochs was approximated as {inter_epoch_interval} \
                 seconds. Due to the inherent uncertainty, this inter-epoch interval should be \
                 considered invalid."
            ),
        });
        accumulated += reset.gap_start + inter_epoch_interval;
    }

    (shifts, intervals)
}

/// Computes the starting output-frame index of each segment in an epoch.
///
/// Consumers that index a virtually concatenated frame sequence add this
/// offset to a segment-local frame index to get the epoch-global frame index.
pub fn starting_frames(epoch: &Epoch) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(epoch.segments.len());
    let mut next = 0;
    for segment in &epoch.segments {
        offsets.push(next);
        next += segment.num_frames();
    }
    offsets
}

/// Concatenates invalid-interval lists, preserving insertion order.
///
/// Returns an empty list when all inputs are empty; downstream attachment of
/// an invalid-intervals section is itself skipped in that case.
pub fn merge_invalid_intervals<I>(lists: I) -> Vec<InvalidInterval>
where
    I: IntoIterator<Item = Vec<InvalidInterval>>,
{
    lists.into_iter().flatten().collect()
}

/// Runs the full alignment pass for one session.
///
/// A single forward pass with no backward transitions: epochs are indexed,
/// clock resets detected, time shifts computed, every segment's timestamps
/// shifted, and per-epoch frame offsets and boundaries assembled. Derived
/// streams (pose rows, behavioral event logs) are aligned afterwards through
/// the returned [`AlignedSession`].
pub fn align_session(
    source: &dyn TimestampSource,
    groups: &[EpochGroup],
    config: &AlignmentConfig,
) -> Result<AlignedSession, AlignmentError> {
    let epochs = build_epochs(source, groups)?;
    let flattened: Vec<&Segment> = epochs.iter().flat_map(|e| e.segments.iter()).collect();

    let clock_resets = detect_clock_resets(&flattened, config.inter_epoch_interval);
    let (time_shifts, invalid_intervals) =
        compute_time_shifts(&flattened, &clock_resets, config.inter_epoch_interval);

    let mut epoch_alignments = Vec::with_capacity(epochs.len());
    let mut flat_index = 0;
    for epoch in &epochs {
        let epoch_first_index = flat_index;
        let mut aligned_timestamps = Vec::with_capacity(epoch.segments.len());
        for segment in &epoch.segments {
            aligned_timestamps.push(streams::shift_timestamps(
                &segment.timestamps,
                time_shifts[flat_index],
            ));
            flat_index += 1;
        }

        let start_time = aligned_timestamps[0][0];
        let last = &aligned_timestamps[aligned_timestamps.len() - 1];
        let stop_time = last[last.len() - 1];
        debug!(
            epoch = %epoch.epoch_name,
            start_time,
            stop_time,
            time_shift = time_shifts[epoch_first_index],
            "aligned epoch"
        );

        epoch_alignments.push(EpochAlignment {
            epoch_name: epoch.epoch_name.clone(),
            aligned_timestamps,
            starting_frames: starting_frames(epoch),
            time_shift: time_shifts[epoch_first_index],
            clock_rate: epoch.segments[0].clock_rate,
            start_time,
            stop_time,
        });
    }

    info!(
        epochs = epoch_alignments.len(),
        segments = flattened.len(),
        resets = clock_resets.len(),
        "session aligned"
    );

    Ok(AlignedSession {
        epochs: epoch_alignments,
        time_shifts,
        clock_resets,
        invalid_intervals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::types::AlignmentError;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    fn segment(index: usize, timestamps: Array1<f64>) -> Segment {
        let raw_start = timestamps[0];
        let raw_stop = timestamps[timestamps.len() - 1];
        Segment {
            segment_index: index,
            reference: format!("seg{index}"),
            timestamps,
            clock_rate: 30.0,
            raw_start,
            raw_stop,
        }
    }

    #[test]
    fn no_resets_in_monotonic_session() {
        let a = segment(0, array![0.0, 50.0, 100.0]);
        let b = segment(0, array![160.0, 200.0]);
        assert!(detect_clock_resets(&[&a, &b], 1800.0).is_empty());
    }

    #[test]
    fn reset_detected_against_immediate_predecessor() {
        let a = segment(0, array![0.0, 100.0]);
        let b = segment(0, array![10.0, 90.0]);
        let resets = detect_clock_resets(&[&a, &b], 1800.0);
        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].reset_index, 1);
        assert_abs_diff_eq!(resets[0].gap_start, 100.0);
        assert_abs_diff_eq!(resets[0].gap_duration, 1800.0);
    }

    #[test]
    fn baseline_advances_unconditionally_past_resets() {
        // b resets relative to a, but c continues cleanly after b.
        let a = segment(0, array![0.0, 100.0]);
        let b = segment(0, array![10.0, 90.0]);
        let c = segment(1, array![95.0, 120.0]);
        let resets = detect_clock_resets(&[&a, &b, &c], 1800.0);
        assert_eq!(resets.len(), 1);
        assert_eq!(resets[0].reset_index, 1);
    }

    #[test]
    fn shifts_are_zero_without_resets() {
        let a = segment(0, array![0.0, 100.0]);
        let b = segment(0, array![150.0, 250.0]);
        let (shifts, intervals) = compute_time_shifts(&[&a, &b], &[], 1800.0);
        assert_eq!(shifts, vec![0.0, 0.0]);
        assert!(intervals.is_empty());
    }

    #[test]
    fn single_reset_shift_and_interval() {
        let a = segment(0, array![0.0, 100.0]);
        let b = segment(0, array![10.0, 90.0]);
        let flattened = [&a, &b];
        let resets = detect_clock_resets(&flattened, 1800.0);
        let (shifts, intervals) = compute_time_shifts(&flattened, &resets, 1800.0);
        assert_eq!(shifts, vec![0.0, 1900.0]);
        assert_eq!(intervals.len(), 1);
        assert_abs_diff_eq!(intervals[0].start_time, 100.0);
        assert_abs_diff_eq!(intervals[0].stop_time, 1900.0);
    }

    #[test]
    fn multi_reset_shifts_accumulate_from_native_stops() {
        // Three resets, each evaluated against its own predecessor's native stop.
        let a = segment(0, array![0.0, 100.0]);
        let b = segment(0, array![10.0, 80.0]);
        let c = segment(0, array![5.0, 60.0]);
        let d = segment(0, array![2.0, 50.0]);
        let flattened = [&a, &b, &c, &d];
        let resets = detect_clock_resets(&flattened, 1800.0);
        assert_eq!(resets.len(), 3);

        let (shifts, intervals) = compute_time_shifts(&flattened, &resets, 1800.0);
        // Contributions: 100 + 1800, then 80 + 1800, then 60 + 1800.
        assert_eq!(shifts, vec![0.0, 1900.0, 3780.0, 5640.0]);
        assert!(shifts.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(intervals.len(), 3);
        assert_abs_diff_eq!(intervals[0].start_time, 100.0);
        assert_abs_diff_eq!(intervals[0].stop_time, 1900.0);
        assert_abs_diff_eq!(intervals[1].start_time, 80.0 + 1900.0);
        assert_abs_diff_eq!(intervals[1].stop_time, 80.0 + 1900.0 + 1800.0);
        assert_abs_diff_eq!(intervals[2].start_time, 60.0 + 3780.0);
        assert_abs_diff_eq!(intervals[2].stop_time, 60.0 + 3780.0 + 1800.0);
    }

    #[test]
    fn frame_offsets_accumulate_segment_lengths() {
        let epoch = Epoch {
            epoch_name: "run1".into(),
            segments: vec![
                segment(0, Array1::linspace(0.0, 4.0, 5)),
                segment(1, Array1::linspace(5.0, 7.0, 3)),
                segment(2, Array1::linspace(8.0, 14.0, 7)),
            ],
        };
        assert_eq!(starting_frames(&epoch), vec![0, 5, 8]);
    }

    #[test]
    fn merge_preserves_insertion_order() {
        let first = vec![InvalidInterval {
            start_time: 0.0,
            stop_time: 1.0,
            reason: "a".into(),
        }];
        let second = vec![
            InvalidInterval {
                start_time: 5.0,
                stop_time: 6.0,
                reason: "b".into(),
            },
            InvalidInterval {
                start_time: 2.0,
                stop_time: 3.0,
                reason: "c".into(),
            },
        ];
        let merged = merge_invalid_intervals([first, second]);
        let reasons: Vec<&str> = merged.iter().map(|i| i.reason.as_str()).collect();
        assert_eq!(reasons, vec!["a", "b", "c"]);
    }

    #[test]
    fn merge_of_empty_lists_is_empty() {
        assert!(merge_invalid_intervals([Vec::new(), Vec::new()]).is_empty());
    }

    #[test]
    fn empty_epoch_group_is_config_error() {
        let source = MemorySource::new();
        let groups = [EpochGroup {
            name: "run1".into(),
            segment_refs: vec![],
        }];
        let err = build_epochs(&source, &groups).unwrap_err();
        assert!(matches!(err, AlignmentError::EmptyEpochGroup(name) if name == "run1"));
    }

    #[test]
    fn unresolved_reference_is_config_error() {
        let source = MemorySource::new();
        let groups = [EpochGroup {
            name: "run1".into(),
            segment_refs: vec!["missing".into()],
        }];
        let err = build_epochs(&source, &groups).unwrap_err();
        assert!(matches!(err, AlignmentError::UnresolvedSegment(_)));
    }

    #[test]
    fn empty_segment_is_config_error() {
        let mut source = MemorySource::new();
        source.insert("empty", Array1::zeros(0), 30.0);
        let groups = [EpochGroup {
            name: "run1".into(),
            segment_refs: vec!["empty".into()],
        }];
        let err = build_epochs(&source, &groups).unwrap_err();
        assert!(matches!(err, AlignmentError::EmptySegment(_)));
    }

    #[test]
    fn aligned_session_is_monotonic_at_segment_boundaries() {
        let mut source = MemorySource::new();
        source.insert("e1_s1", array![0.0, 100.0], 30.0);
        source.insert("e1_s2", array![101.0, 200.0], 30.0);
        source.insert("e2_s1", array![10.0, 50.0], 30.0); // reset
        let groups = [
            EpochGroup {
                name: "e1".into(),
                segment_refs: vec!["e1_s1".into(), "e1_s2".into()],
            },
            EpochGroup {
                name: "e2".into(),
                segment_refs: vec!["e2_s1".into()],
            },
        ];
        let session = align_session(&source, &groups, &AlignmentConfig::default()).unwrap();

        let mut prev_stop = f64::NEG_INFINITY;
        for epoch in &session.epochs {
            for timestamps in &epoch.aligned_timestamps {
                assert!(timestamps[0] >= prev_stop);
                prev_stop = timestamps[timestamps.len() - 1];
            }
        }
        assert_eq!(session.clock_resets.len(), 1);
        assert_eq!(session.invalid_intervals().len(), 1);
    }

    #[test]
    fn epoch_alignment_carries_first_segment_shift_and_rate() {
        let mut source = MemorySource::new();
        source.insert("e1_s1", array![0.0, 100.0], 30.0);
        source.insert("e2_s1", array![10.0, 20.0], 25.0);
        source.insert("e2_s2", array![21.0, 40.0], 25.0);
        let groups = [
            EpochGroup {
                name: "e1".into(),
                segment_refs: vec!["e1_s1".into()],
            },
            EpochGroup {
                name: "e2".into(),
                segment_refs: vec!["e2_s1".into(), "e2_s2".into()],
            },
        ];
        let session = align_session(&source, &groups, &AlignmentConfig::default()).unwrap();

        let e2 = &session.epochs[1];
        assert_abs_diff_eq!(e2.time_shift, 1900.0);
        assert_abs_diff_eq!(e2.clock_rate, 25.0);
        assert_abs_diff_eq!(e2.start_time, 10.0 + 1900.0);
        assert_abs_diff_eq!(e2.stop_time, 40.0 + 1900.0);
        assert_eq!(e2.starting_frames, vec![0, 2]);
    }

    #[test]
    fn empty_session_aligns_to_nothing() {
        let source = MemorySource::new();
        let session = align_session(&source, &[], &AlignmentConfig::default()).unwrap();
        assert!(session.epochs.is_empty());
        assert_eq!(session.num_segments(), 0);
        assert_abs_diff_eq!(session.duration(), 0.0);
        assert!(session.invalid_intervals().is_empty());
    }
}
