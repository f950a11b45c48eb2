use crate::backend::Backend;
use crate::config::Config;
use crate::map_resolver::MapResolver;
use crate::poller::JobPoller;
use crate::render::Renderer;
use crate::timeline::Timeline;
use crate::util::{ensure_dir, format_elapsed, now_rfc3339, sha256_hex};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Where a timeline comes from.
#[derive(Debug, Clone)]
pub enum TimelineSource {
    /// Submit a parse job for a server-side demo.
    Demo { name: String, every_n: u32 },
    /// Read a previously saved result document.
    File(PathBuf),
}

impl TimelineSource {
    /// Stable identity used to name the output directory.
    pub fn export_id(&self) -> String {
        let key = match self {
            TimelineSource::Demo { name, every_n } => format!("demo:{name}:{every_n}"),
            TimelineSource::File(path) => format!("file:{}", path.display()),
        };
        sha256_hex(key.as_bytes())
    }

    pub fn describe(&self) -> String {
        match self {
            TimelineSource::Demo { name, every_n } => format!("{name} (every_n={every_n})"),
            TimelineSource::File(path) => path.display().to_string(),
        }
    }
}

/// Submits a job and waits for it, or loads the file.
pub async fn fetch_timeline<B: Backend>(
    cfg: &Config,
    backend: &B,
    source: &TimelineSource,
) -> Result<Arc<Timeline>> {
    match source {
        TimelineSource::File(path) => Ok(Arc::new(Timeline::load(path)?)),
        TimelineSource::Demo { name, every_n } => {
            let mut poller = JobPoller::new(cfg, backend.clone())?;
            let id = poller.start(name, *every_n).await?;
            info!("waiting for job {id}");
            let mut last_percent = None;
            let timeline = poller
                .run_to_completion(|job| {
                    if last_percent != Some(job.percent) {
                        last_percent = Some(job.percent);
                        info!("{}% {}", job.percent, job.progress_text());
                    }
                })
                .await?;
            if let Some(elapsed) = poller.elapsed() {
                info!("job {id} finished in {}", format_elapsed(elapsed));
            }
            Ok(timeline)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub dir: PathBuf,
    pub round: Option<i64>,
    pub frames: usize,
    pub map: Option<String>,
    pub background_image: bool,
}

/// Renders every tick of one round to `frame_NNNNN.png` under
/// `out_root/<export id>/`.
pub async fn export<B: Backend>(
    cfg: &Config,
    backend: &B,
    renderer: &Renderer,
    source: &TimelineSource,
    round: Option<i64>,
    out_root: &Path,
) -> Result<ExportSummary> {
    let started = now_rfc3339();
    let timeline = fetch_timeline(cfg, backend, source).await?;

    let round_number = match round {
        Some(n) => Some(n),
        None => timeline.initial_round(),
    };
    let selected = match round_number {
        Some(n) => Some(
            timeline
                .round(n)
                .ok_or_else(|| anyhow!("round {n} is not in the timeline"))?,
        ),
        None => None,
    };
    if !timeline.has_positions() {
        warn!("timeline has no positions; frames will be empty");
    }

    let mut maps = MapResolver::new(&cfg.maps);
    let background = match timeline.map_name() {
        Some(name) => maps.resolve(backend, name).await,
        None => None,
    };

    let dir = out_root.join(source.export_id());
    ensure_dir(&dir)?;
    info!("exporting {} to {}", source.describe(), dir.display());

    let mut canvas = renderer.new_canvas()?;
    let last_tick = selected.map(|r| r.max_tick()).unwrap_or(0);
    let mut frame_files = Vec::with_capacity(last_tick + 1);
    for tick in 0..=last_tick {
        let name = format!("frame_{tick:05}.png");
        renderer.draw(&mut canvas, selected, tick, background.as_deref());
        canvas.save_png(&dir.join(&name))?;
        frame_files.push(name);
    }

    if cfg.output.write_timeline_json {
        std::fs::write(
            dir.join("timeline.json"),
            serde_json::to_string_pretty(timeline.as_ref())?,
        )
        .with_context(|| format!("writing timeline.json in {}", dir.display()))?;
    }

    let summary = ExportSummary {
        dir: dir.clone(),
        round: round_number,
        frames: frame_files.len(),
        map: maps.desired().map(String::from),
        background_image: background.is_some(),
    };

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "source": source.describe(),
            "started": started,
            "finished": now_rfc3339(),
            "round": summary.round,
            "rounds": timeline.round_numbers(),
            "max_tick": last_tick,
            "frames": frame_files,
            "map": summary.map,
            "background_image": summary.background_image,
        });
        std::fs::write(dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    }

    Ok(summary)
}
