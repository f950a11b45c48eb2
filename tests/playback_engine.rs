mod common;

use common::demo_timeline;
use replay_viewer::playback::{FrameTick, Playback, StepDirection};
use replay_viewer::timeline::Timeline;
use std::sync::Arc;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn loaded() -> Playback {
    let mut pb = Playback::new(ms(30));
    pb.load(Arc::new(demo_timeline()));
    pb
}

#[test]
fn load_selects_first_non_empty_round_at_tick_zero() {
    let mut pb = Playback::new(ms(30));
    assert_eq!(pb.load(Arc::new(demo_timeline())), Some(2));
    assert_eq!(pb.round_number(), Some(2));
    assert_eq!(pb.current_tick(), 0);
    assert_eq!(pb.max_tick(), 2);
    assert!(!pb.is_playing());
    assert_eq!(pb.tick_label(), "Tick: 0");
}

#[test]
fn play_without_round_is_a_no_op() {
    let mut pb = Playback::new(ms(30));
    assert!(!pb.play());
    assert!(!pb.is_playing());
    assert_eq!(pb.on_frame(ms(100)), FrameTick::Stopped);

    assert_eq!(pb.load(Arc::new(Timeline::default())), None);
    assert!(!pb.play());
}

#[test]
fn first_frame_anchors_then_one_tick_per_duration() {
    let mut pb = loaded();
    assert!(pb.play());
    assert_eq!(pb.on_frame(ms(0)), FrameTick::Held);
    assert_eq!(pb.on_frame(ms(16)), FrameTick::Held);
    assert_eq!(pb.on_frame(ms(30)), FrameTick::Advanced);
    assert_eq!(pb.current_tick(), 1);
    assert_eq!(pb.on_frame(ms(45)), FrameTick::Held);
    assert_eq!(pb.current_tick(), 1);
}

#[test]
fn long_frame_gap_advances_a_single_tick() {
    let mut pb = loaded();
    pb.play();
    pb.on_frame(ms(0));
    assert_eq!(pb.on_frame(ms(5_000)), FrameTick::Advanced);
    assert_eq!(pb.current_tick(), 1);
}

#[test]
fn playback_pauses_itself_at_max_tick() {
    let mut pb = loaded();
    pb.play();
    pb.on_frame(ms(0));
    assert_eq!(pb.on_frame(ms(30)), FrameTick::Advanced);
    assert_eq!(pb.on_frame(ms(60)), FrameTick::Advanced);
    assert_eq!(pb.current_tick(), 2);
    assert_eq!(pb.on_frame(ms(90)), FrameTick::ReachedEnd);
    assert!(!pb.is_playing());
    assert_eq!(pb.current_tick(), 2);
    assert_eq!(pb.on_frame(ms(120)), FrameTick::Stopped);
}

#[test]
fn pause_stops_frames_and_toggle_resumes() {
    let mut pb = loaded();
    assert!(pb.toggle());
    pb.on_frame(ms(0));
    assert!(!pb.toggle());
    assert_eq!(pb.on_frame(ms(100)), FrameTick::Stopped);
    assert_eq!(pb.current_tick(), 0);

    // resuming re-anchors instead of jumping
    pb.toggle();
    assert_eq!(pb.on_frame(ms(500)), FrameTick::Held);
    assert_eq!(pb.on_frame(ms(530)), FrameTick::Advanced);
}

#[test]
fn steps_and_seeks_are_clamped() {
    let mut pb = loaded();
    assert_eq!(pb.step(StepDirection::Backward), 0);
    assert_eq!(pb.step(StepDirection::Forward), 1);
    assert_eq!(pb.step(StepDirection::Forward), 2);
    assert_eq!(pb.step(StepDirection::Forward), 2);
    assert_eq!(pb.seek(99), 2);
    assert_eq!(pb.seek(1), 1);
    assert_eq!(pb.tick_label(), "Tick: 1");
}

#[test]
fn selecting_a_round_resets_tick_and_unknown_rounds_change_nothing() {
    let mut pb = loaded();
    pb.seek(2);
    assert!(!pb.select_round(42));
    assert_eq!(pb.round_number(), Some(2));
    assert_eq!(pb.current_tick(), 2);

    assert!(pb.select_round(1));
    assert_eq!(pb.current_tick(), 0);
    assert_eq!(pb.max_tick(), 0);
    assert!(pb.current_round().is_some_and(|r| r.number == 1));
}

#[test]
fn loading_a_new_timeline_pauses_and_resets() {
    let mut pb = loaded();
    pb.play();
    pb.seek(2);
    pb.load(Arc::new(demo_timeline()));
    assert!(!pb.is_playing());
    assert_eq!(pb.current_tick(), 0);
}
