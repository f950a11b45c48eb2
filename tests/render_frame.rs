mod common;

use common::{demo_timeline, png_bytes};
use replay_viewer::config::Config;
use replay_viewer::render::{Background, Projection, Renderer, parse_color};
use replay_viewer::timeline::{Bounds, PlayerTrack, Position, Round};
use tiny_skia::Color;

const BG: [u8; 4] = [0x11, 0x11, 0x11, 0xff];

fn small_config() -> Config {
    let mut cfg = Config::default();
    cfg.canvas.width = 100;
    cfg.canvas.height = 100;
    cfg.canvas.padding = 10.0;
    cfg
}

fn renderer(cfg: &Config) -> Renderer {
    Renderer::with_label_font(cfg, None)
}

fn player(id: &str, color: Option<&str>, points: &[(f64, f64)]) -> PlayerTrack {
    PlayerTrack {
        id: id.to_string(),
        name: None,
        color: color.map(String::from),
        positions: points.iter().map(|&(x, y)| Position { x, y }).collect(),
    }
}

#[test]
fn no_round_draws_grid_only() {
    let cfg = small_config();
    let r = renderer(&cfg);
    let mut canvas = r.new_canvas().expect("canvas");
    let stats = r.draw(&mut canvas, None, 0, None);

    assert_eq!(stats.markers, 0);
    assert!(!stats.background_image);
    assert_eq!(canvas.pixel(0, 0), Some(BG));
    assert_ne!(canvas.pixel(10, 50), Some(BG), "left grid line");
    assert_eq!(canvas.pixel(15, 15), Some(BG), "inside a cell");
}

#[test]
fn empty_round_draws_no_markers() {
    let cfg = small_config();
    let r = renderer(&cfg);
    let mut canvas = r.new_canvas().expect("canvas");
    let round = Round::new(1, vec![player("a", None, &[])]);
    let stats = r.draw(&mut canvas, Some(&round), 5, None);
    assert_eq!((stats.markers, stats.trails, stats.labels), (0, 0, 0));
}

#[test]
fn markers_are_projected_into_the_padded_area() {
    let cfg = small_config();
    let r = renderer(&cfg);
    let mut canvas = r.new_canvas().expect("canvas");
    let round = Round::new(1, vec![player("a", Some("#00ff00"), &[(0.0, 0.0), (10.0, 10.0)])]);

    let stats = r.draw(&mut canvas, Some(&round), 0, None);
    assert_eq!((stats.markers, stats.trails), (1, 0));
    assert_eq!(canvas.pixel(10, 10), Some([0, 255, 0, 255]));
    assert_ne!(canvas.pixel(89, 89), Some([0, 255, 0, 255]));

    let stats = r.draw(&mut canvas, Some(&round), 1, None);
    assert_eq!((stats.markers, stats.trails), (1, 1));
    assert_eq!(canvas.pixel(89, 89), Some([0, 255, 0, 255]));
}

#[test]
fn finished_tracks_hold_their_last_position() {
    let cfg = small_config();
    let r = renderer(&cfg);
    let mut canvas = r.new_canvas().expect("canvas");
    let timeline = demo_timeline();
    let round = timeline.round(2).expect("round 2");

    let stats = r.draw(&mut canvas, Some(round), round.max_tick(), None);
    assert_eq!(stats.markers, 2);
    let stats = r.draw(&mut canvas, Some(round), 100, None);
    assert_eq!(stats.markers, 2);
    assert_eq!(stats.labels, 0, "no font loaded");
}

#[test]
fn degenerate_bounds_project_to_the_padding_corner() {
    let bounds = Bounds {
        min_x: 3.0,
        max_x: 3.0,
        min_y: -2.0,
        max_y: -2.0,
    };
    let p = Projection::new(bounds, 100, 100, 10.0);
    assert_eq!(p.project(Position { x: 3.0, y: -2.0 }), (10.0, 10.0));

    let cfg = small_config();
    let r = renderer(&cfg);
    let mut canvas = r.new_canvas().expect("canvas");
    let round = Round::new(1, vec![player("a", None, &[(3.0, -2.0), (3.0, -2.0)])]);
    assert_eq!(r.draw(&mut canvas, Some(&round), 1, None).markers, 1);
}

#[test]
fn palette_cycles_by_player_index_unless_color_is_explicit() {
    let cfg = Config::default();
    let r = renderer(&cfg);
    let first = parse_color(&cfg.canvas.palette[0]).expect("palette color");
    let second = parse_color(&cfg.canvas.palette[1]).expect("palette color");

    assert_eq!(r.player_color(0, None), first);
    assert_eq!(r.player_color(1, None), second);
    assert_eq!(r.player_color(cfg.canvas.palette.len(), None), first);
    assert_eq!(
        r.player_color(0, Some("#123456")),
        Color::from_rgba8(0x12, 0x34, 0x56, 0xff)
    );
    assert_eq!(r.player_color(1, Some("teal")), second);
}

#[test]
fn parses_short_long_and_alpha_hex_colors() {
    assert_eq!(parse_color("#fff"), Some(Color::WHITE));
    assert_eq!(
        parse_color("#ff000080"),
        Some(Color::from_rgba8(255, 0, 0, 0x80))
    );
    assert_eq!(parse_color("#12345"), None);
    assert_eq!(parse_color("red"), None);
    assert_eq!(parse_color("#ggg"), None);
}

#[test]
fn background_image_replaces_grid() {
    let cfg = small_config();
    let r = renderer(&cfg);
    let mut canvas = r.new_canvas().expect("canvas");
    let bg = Background::decode("/maps/x.png", &png_bytes(8, 8, [255, 0, 0, 255])).expect("decode");

    let stats = r.draw(&mut canvas, None, 0, Some(&bg));
    assert!(stats.background_image);
    for (x, y) in [(50, 50), (10, 50)] {
        let [red, green, blue, alpha] = canvas.pixel(x, y).expect("pixel");
        assert!(red > 200 && green < 50 && blue < 50 && alpha == 255, "({x},{y})");
    }
}
