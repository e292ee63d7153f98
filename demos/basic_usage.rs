use ndarray::{array, Array1};
use session_aligner::{align, AlignmentConfig, EpochGroup, MemorySource};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // A small synthetic session: a sleep epoch, a two-segment task epoch, and
    // a final epoch recorded after the capture program was restarted (so its
    // clock starts over).
    let mut source = MemorySource::new();
    source.insert("sleep1", Array1::linspace(0.0, 599.0, 600), 30.0);
    source.insert("task1a", Array1::linspace(610.0, 1209.0, 600), 30.0);
    source.insert("task1b", Array1::linspace(1210.0, 1509.0, 300), 30.0);
    source.insert("sleep2", Array1::linspace(5.0, 604.0, 600), 30.0);

    let groups = vec![
        EpochGroup {
            name: "sleep1".into(),
            segment_refs: vec!["sleep1".into()],
        },
        EpochGroup {
            name: "task1".into(),
            segment_refs: vec!["task1a".into(), "task1b".into()],
        },
        EpochGroup {
            name: "sleep2".into(),
            segment_refs: vec!["sleep2".into()],
        },
    ];

    let mut session = align(&source, &groups, &AlignmentConfig::default())?;

    // Print basic session information
    println!("Number of epochs: {}", session.epochs.len());
    println!("Number of segments: {}", session.num_segments());
    println!("Number of frames: {}", session.num_frames());
    println!("Session duration: {:.1} seconds", session.duration());

    println!("\nEpochs:");
    for epoch in &session.epochs {
        println!(
            "  {}: {:.1} to {:.1} s (shift {:.1} s, {} fps)",
            epoch.epoch_name, epoch.start_time, epoch.stop_time, epoch.time_shift, epoch.clock_rate
        );
        if epoch.starting_frames.len() > 1 {
            println!("    starting frames: {:?}", epoch.starting_frames);
        }
    }

    // Detected clock resets
    if !session.clock_resets.is_empty() {
        println!("\nClock resets:");
        for reset in &session.clock_resets {
            println!(
                "  segment {}: gap starts at {:.1} s, approximated as {:.0} s",
                reset.reset_index, reset.gap_start, reset.gap_duration
            );
        }
    }

    // Align dependent streams: behavioral events logged as frame counts for
    // the post-reset epoch, and a pose track that came back two rows short.
    let events = session.align_frame_events(2, &array![150.0, 3000.0, 9000.0])?;
    println!("\nBehavioral events (epoch sleep2): {:?}", events.to_vec());

    let pose = session.align_pose_rows(1, 1, 298, "task1b_pose.h5")?;
    println!("Pose rows assigned for task1b: {}", pose.len());

    // Every span whose temporal accuracy is degraded
    if !session.invalid_intervals().is_empty() {
        println!("\nInvalid time intervals:");
        for interval in session.invalid_intervals() {
            println!(
                "  {:.1} to {:.1} s: {}",
                interval.start_time, interval.stop_time, interval.reason
            );
        }
    }

    Ok(())
}
