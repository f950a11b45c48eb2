use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub job: Job,
    #[serde(default)]
    pub playback: Playback,
    #[serde(default)]
    pub canvas: Canvas,
    #[serde(default)]
    pub maps: Maps,
    #[serde(default)]
    pub fonts: Fonts,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.job.default_every_n == 0 {
            bail!("job.default_every_n must be >= 1");
        }
        if self.job.poll_interval_ms == 0 {
            bail!("job.poll_interval_ms must be > 0");
        }
        if self.playback.tick_duration_ms == 0 || self.playback.frame_interval_ms == 0 {
            bail!("playback durations must be > 0");
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            bail!(
                "canvas size must be non-zero: {}x{}",
                self.canvas.width,
                self.canvas.height
            );
        }
        if self.canvas.palette.is_empty() {
            bail!("canvas.palette must not be empty");
        }
        regex::Regex::new(&self.job.completion_message_pattern)
            .with_context(|| "job.completion_message_pattern")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub base_url: String,
    pub user_agent: String,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/".into(),
            user_agent: concat!("replay-viewer/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub poll_interval_ms: u64,
    pub default_every_n: u32,
    pub result_fetch_retries: u32,
    pub completion_message_pattern: String,
}
impl Default for Job {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            default_every_n: 1,
            result_fetch_retries: 1,
            completion_message_pattern: "(?i)conclu|complete".into(),
        }
    }
}
impl Job {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playback {
    pub tick_duration_ms: u64,
    pub frame_interval_ms: u64,
}
impl Default for Playback {
    fn default() -> Self {
        Self {
            tick_duration_ms: 30,
            frame_interval_ms: 16,
        }
    }
}
impl Playback {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.tick_duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub padding: f32,
    pub grid_cells: u32,
    pub marker_radius: f32,
    pub trail_width: f32,
    pub label_size: f32,
    pub label_offset: f32,
    pub background: String,
    pub grid_color: String,
    pub label_color: String,
    pub palette: Vec<String>,
}
impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 900,
            height: 900,
            padding: 40.0,
            grid_cells: 10,
            marker_radius: 8.0,
            trail_width: 2.0,
            label_size: 10.0,
            label_offset: 14.0,
            background: "#111111".into(),
            grid_color: "#222222".into(),
            label_color: "#ffffff".into(),
            palette: [
                "#ff5555", "#55aaff", "#ffaa00", "#66dd66", "#ff66cc", "#cccc66", "#66cccc",
                "#aa66ff",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maps {
    pub fallback_dirs: Vec<String>,
    pub extensions: Vec<String>,
    pub max_name_len: usize,
}
impl Default for Maps {
    fn default() -> Self {
        Self {
            fallback_dirs: vec!["/assets/maps".into(), "/maps".into()],
            extensions: vec!["png".into(), "jpg".into(), "webp".into()],
            max_name_len: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fonts {
    pub paths: Vec<String>,
}
impl Default for Fonts {
    fn default() -> Self {
        Self {
            paths: vec![
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".into(),
                "/usr/share/fonts/TTF/DejaVuSans.ttf".into(),
                "/usr/share/fonts/dejavu/DejaVuSans.ttf".into(),
                "/System/Library/Fonts/Supplemental/Arial.ttf".into(),
                "C:\\Windows\\Fonts\\arial.ttf".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub out_dir: String,
    pub canvas_path: String,
    pub write_timeline_json: bool,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            canvas_path: "out/canvas.png".into(),
            write_timeline_json: true,
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
