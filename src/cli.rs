use crate::{
    backend::{Backend, HttpBackend},
    config::Config,
    export::{self, TimelineSource},
    render::Renderer,
    session::{Command as SessionCommand, PngSurface, Session},
    timeline::Timeline,
    util::{ensure_dir, now_rfc3339},
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "replay-viewer")]
#[command(about = "Replay movement viewer (parse-job client + timeline playback renderer)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./replay-viewer.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override server.base_url.
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check config, server reachability and label font.
    Doctor {},
    /// List demos the server can parse.
    Demos {},
    /// Run one parse job and save the resulting timeline.
    Parse {
        #[arg(long)]
        demo: String,
        #[arg(long)]
        every_n: Option<u32>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Interactive playback driven by commands on stdin.
    View {
        #[arg(long, conflicts_with = "timeline")]
        demo: Option<String>,
        /// Saved timeline JSON instead of a server job.
        #[arg(long)]
        timeline: Option<PathBuf>,
        #[arg(long)]
        every_n: Option<u32>,
        #[arg(long)]
        round: Option<i64>,
        /// Where each frame is written; defaults to output.canvas_path.
        #[arg(long)]
        canvas: Option<PathBuf>,
    },
    /// Render every tick of a round to PNG frames.
    Export {
        #[arg(long, conflicts_with = "timeline", required_unless_present = "timeline")]
        demo: Option<String>,
        #[arg(long)]
        timeline: Option<PathBuf>,
        #[arg(long)]
        every_n: Option<u32>,
        #[arg(long)]
        round: Option<i64>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let mut cfg = match &cfg_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(url) = &args.base_url {
        cfg.server.base_url = url.clone();
    }

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
    match &cfg_path {
        Some(path) => info!("config {}", path.display()),
        None => info!("no config file found; using defaults"),
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .with_context(|| "building tokio runtime")?;
    runtime.block_on(run(&args, &cfg, cfg_path.as_deref()))
}

async fn run(args: &Args, cfg: &Config, cfg_path: Option<&Path>) -> Result<()> {
    let backend = HttpBackend::new(cfg)?;
    match &args.cmd {
        Command::Doctor {} => doctor(cfg, cfg_path, &backend).await,
        Command::Demos {} => demos(&backend).await,
        Command::Parse { demo, every_n, out } => {
            parse(cfg, &backend, demo, every_n.unwrap_or(cfg.job.default_every_n), out.as_deref())
                .await
        }
        Command::View {
            demo,
            timeline,
            every_n,
            round,
            canvas,
        } => {
            let canvas_path = canvas
                .clone()
                .unwrap_or_else(|| PathBuf::from(&cfg.output.canvas_path));
            let renderer = Renderer::new(cfg);
            let surface = PngSurface::new(&canvas_path)?;
            let mut session = Session::new(cfg, backend, renderer, surface)?;
            if let Some(n) = every_n {
                session.set_every_n(*n)?;
            }
            info!("frames are written to {}", canvas_path.display());

            if let Some(path) = timeline {
                session.apply_timeline(Arc::new(Timeline::load(path)?));
            } else if let Some(demo) = demo {
                session.select_demo(demo.clone());
                session.start_job().await;
            }
            if let Some(n) = round {
                session.handle(SessionCommand::Round(*n)).await;
            }
            session.run(BufReader::new(tokio::io::stdin())).await
        }
        Command::Export {
            demo,
            timeline,
            every_n,
            round,
            out_dir,
        } => {
            let source = match (demo, timeline) {
                (_, Some(path)) => TimelineSource::File(path.clone()),
                (Some(name), None) => TimelineSource::Demo {
                    name: name.clone(),
                    every_n: every_n.unwrap_or(cfg.job.default_every_n),
                },
                (None, None) => bail!("export needs --demo or --timeline"),
            };
            let out_root = out_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&cfg.output.out_dir));
            let renderer = Renderer::new(cfg);
            let summary =
                export::export(cfg, &backend, &renderer, &source, *round, &out_root).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["replay-viewer.toml", "replay-viewer.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output and frame readouts
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.output.out_dir).join("replay-viewer.log"))
}

async fn doctor(cfg: &Config, cfg_path: Option<&Path>, backend: &HttpBackend) -> Result<()> {
    let server = match backend.list_demos().await {
        Ok(demos) => serde_json::json!({ "reachable": true, "demos": demos.len() }),
        Err(err) => {
            warn!("server check failed: {err}");
            serde_json::json!({ "reachable": false, "error": err.to_string() })
        }
    };
    let renderer = Renderer::new(cfg);
    let diag = serde_json::json!({
        "config": cfg_path,
        "base_url": backend.base_url().as_str(),
        "server": server,
        "label_font": renderer.label_font().map(|f| f.path().display().to_string()),
        "canvas": { "width": cfg.canvas.width, "height": cfg.canvas.height },
        "map_fallback_dirs": cfg.maps.fallback_dirs,
    });
    println!("{}", serde_json::to_string_pretty(&diag)?);
    Ok(())
}

async fn demos(backend: &HttpBackend) -> Result<()> {
    let demos = backend.list_demos().await?;
    if demos.is_empty() {
        println!("no demos on server");
    }
    for demo in demos {
        println!("{demo}");
    }
    Ok(())
}

async fn parse(
    cfg: &Config,
    backend: &HttpBackend,
    demo: &str,
    every_n: u32,
    out: Option<&Path>,
) -> Result<()> {
    let source = TimelineSource::Demo {
        name: demo.to_string(),
        every_n,
    };
    let started = now_rfc3339();
    let timeline = export::fetch_timeline(cfg, backend, &source).await?;

    let out = out.map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(&cfg.output.out_dir)
            .join(source.export_id())
            .join("timeline.json")
    });
    crate::util::ensure_parent(&out)?;
    std::fs::write(&out, serde_json::to_string_pretty(timeline.as_ref())?)
        .with_context(|| format!("writing {}", out.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "demo": demo,
            "every_n": every_n,
            "started": started,
            "finished": now_rfc3339(),
            "map": timeline.map_name(),
            "rounds": timeline.round_numbers(),
            "has_positions": timeline.has_positions(),
            "timeline": out,
        }))?
    );
    Ok(())
}
