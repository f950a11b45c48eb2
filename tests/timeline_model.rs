mod common;

use common::demo_timeline;
use replay_viewer::timeline::{Bounds, PlayerTrack, Position, Round, Timeline};

fn track(id: &str, points: &[(f64, f64)]) -> PlayerTrack {
    PlayerTrack {
        id: id.to_string(),
        name: None,
        color: None,
        positions: points.iter().map(|&(x, y)| Position { x, y }).collect(),
    }
}

#[test]
fn parses_ids_of_any_json_kind() {
    let timeline = Timeline::from_json(
        br#"{"rounds":[{"round":3,"players":[
            {"id":12,"positions":[]},
            {"id":"abc","positions":[]},
            {"id":4.5,"positions":[]}
        ]}]}"#,
    )
    .expect("parse");
    let ids: Vec<&str> = timeline.rounds[0]
        .players
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(ids, ["12", "abc", "4.5"]);
    assert_eq!(timeline.map_name(), None);
}

#[test]
fn label_prefers_name_over_id() {
    let timeline = demo_timeline();
    let round = timeline.round(2).expect("round 2");
    assert_eq!(round.players[0].label(), "alpha");
    assert_eq!(round.players[1].label(), "b");
}

#[test]
fn max_tick_is_longest_track_minus_one() {
    let timeline = demo_timeline();
    assert_eq!(timeline.round(2).map(Round::max_tick), Some(2));
    assert_eq!(timeline.round(1).map(Round::max_tick), Some(0));
    assert_eq!(Round::new(9, vec![]).max_tick(), 0);
}

#[test]
fn position_holds_last_sample_after_track_ends() {
    let p = track("a", &[(1.0, 1.0), (2.0, 3.0)]);
    assert_eq!(p.position_at(0), Some(Position { x: 1.0, y: 1.0 }));
    assert_eq!(p.position_at(1), Some(Position { x: 2.0, y: 3.0 }));
    assert_eq!(p.position_at(50), Some(Position { x: 2.0, y: 3.0 }));
    assert_eq!(track("e", &[]).position_at(0), None);
}

#[test]
fn trail_includes_current_tick_and_stops_at_track_end() {
    let p = track("a", &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
    assert_eq!(p.trail(0).len(), 1);
    assert_eq!(p.trail(1).len(), 2);
    assert_eq!(p.trail(10).len(), 3);
    assert!(track("e", &[]).trail(3).is_empty());
}

#[test]
fn bounds_cover_every_player_and_are_absent_for_empty_rounds() {
    let round = Round::new(
        1,
        vec![
            track("a", &[(-5.0, 2.0), (3.0, 8.0)]),
            track("b", &[(10.0, -1.0)]),
        ],
    );
    assert_eq!(
        round.bounds(),
        Some(Bounds {
            min_x: -5.0,
            max_x: 10.0,
            min_y: -1.0,
            max_y: 8.0,
        })
    );
    assert_eq!(Round::new(2, vec![track("a", &[])]).bounds(), None);
}

#[test]
fn initial_round_skips_empty_rounds() {
    let timeline = demo_timeline();
    assert_eq!(timeline.round_numbers(), vec![1, 2]);
    assert_eq!(timeline.initial_round(), Some(2));
    assert!(timeline.has_positions());
    assert_eq!(timeline.map_name(), Some("de_dust2"));
}

#[test]
fn initial_round_falls_back_to_first_when_all_empty() {
    let timeline = Timeline::from_json(
        br#"{"map":"  ","rounds":[{"round":4,"players":[]},{"round":5,"players":[]}]}"#,
    )
    .expect("parse");
    assert_eq!(timeline.initial_round(), Some(4));
    assert!(!timeline.has_positions());
    assert_eq!(timeline.map_name(), None);
    assert_eq!(Timeline::default().initial_round(), None);
}
