use replay_viewer::config::Config;
use std::time::Duration;

#[test]
fn parse_example_config() {
    let raw = include_str!("../replay-viewer.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.job.poll_interval(), Duration::from_millis(500));
    assert_eq!(cfg.playback.tick_duration(), Duration::from_millis(30));
    assert_eq!(cfg.canvas.grid_cells, 10);
    assert_eq!(cfg.canvas.palette.len(), 8);
    assert!(!cfg.maps.fallback_dirs.is_empty());
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[server]\nbase_url = \"http://example:8080\"\nuser_agent = \"x\"\n")
        .expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.server.base_url, "http://example:8080");
    assert_eq!(cfg.job.default_every_n, 1);
    assert_eq!((cfg.canvas.width, cfg.canvas.height), (900, 900));
    assert_eq!(cfg.maps.extensions, vec!["png", "jpg", "webp"]);
}

#[test]
fn validate_rejects_unusable_values() {
    let mut cfg = Config::default();
    cfg.job.default_every_n = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.playback.tick_duration_ms = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.canvas.palette.clear();
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.job.completion_message_pattern = "(unclosed".into();
    assert!(cfg.validate().is_err());
}
