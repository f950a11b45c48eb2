use crate::backend::Backend;
use crate::config::Config;
use crate::map_resolver::{self, MapRequest, MapResolver, ResolvedMap};
use crate::playback::{FrameTick, Playback, StepDirection};
use crate::poller::{JobError, JobPoller, PollOutcome, poll_ticker, validate_every_n};
use crate::render::{Canvas, FrameStats, Renderer};
use crate::timeline::Timeline;
use crate::util::{ensure_parent, format_elapsed};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Where rendered frames go.
pub trait Surface {
    fn present(&mut self, canvas: &Canvas) -> Result<()>;
}

/// Overwrites a PNG file with every presented frame.
pub struct PngSurface {
    path: PathBuf,
}

impl PngSurface {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        Ok(Self { path })
    }
}

impl Surface for PngSurface {
    fn present(&mut self, canvas: &Canvas) -> Result<()> {
        canvas.save_png(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Demos,
    Load {
        demo: Option<String>,
        every_n: Option<String>,
    },
    EveryN(String),
    Rounds,
    Round(i64),
    Play,
    Pause,
    Toggle,
    Step(StepDirection),
    Seek(usize),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "commands: demos | load [demo] [every_n] | every <n> | rounds | round <n> | \
play | pause | space | left | right | seek <tick> | status | quit";

impl Command {
    /// Parses one input line. Blank lines are ignored; a bare space is the
    /// play/pause key and raw arrow-key escape sequences step one tick.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        match line {
            " " => return Ok(Some(Command::Toggle)),
            "\u{1b}[C" => return Ok(Some(Command::Step(StepDirection::Forward))),
            "\u{1b}[D" => return Ok(Some(Command::Step(StepDirection::Backward))),
            _ => {}
        }

        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        let cmd = match head.to_ascii_lowercase().as_str() {
            "demos" => Command::Demos,
            "load" => Command::Load {
                demo: arg.map(String::from),
                every_n: words.next().map(String::from),
            },
            "every" | "every_n" => Command::EveryN(
                arg.ok_or_else(|| "usage: every <n>".to_string())?
                    .to_string(),
            ),
            "rounds" => Command::Rounds,
            "round" => Command::Round(
                arg.and_then(|a| a.parse().ok())
                    .ok_or_else(|| "usage: round <number>".to_string())?,
            ),
            "play" => Command::Play,
            "pause" => Command::Pause,
            "space" | "toggle" => Command::Toggle,
            "right" | "next" => Command::Step(StepDirection::Forward),
            "left" | "prev" => Command::Step(StepDirection::Backward),
            "seek" => Command::Seek(
                arg.and_then(|a| a.parse().ok())
                    .ok_or_else(|| "usage: seek <tick>".to_string())?,
            ),
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command {other:?}; {HELP}")),
        };
        Ok(Some(cmd))
    }
}

/// Notices kept for `Session::notices`.
pub const MAX_NOTICES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Application state for the interactive viewer: one job poller, one
/// playback cursor, one map resolver, one canvas.
pub struct Session<B: Backend, S: Surface> {
    backend: B,
    poller: JobPoller<B>,
    playback: Playback,
    renderer: Renderer,
    canvas: Canvas,
    maps: MapResolver,
    surface: S,
    demo: Option<String>,
    every_n: u32,
    status: String,
    notices: Vec<String>,
    demos: Vec<String>,
    pending_round: Option<i64>,
    last_frame: FrameStats,
    poll_timer: Option<Interval>,
    frame_timer: Option<Interval>,
    frame_interval: Duration,
    clock_origin: Instant,
    map_tx: mpsc::UnboundedSender<ResolvedMap>,
    map_rx: mpsc::UnboundedReceiver<ResolvedMap>,
}

impl<B: Backend, S: Surface> Session<B, S> {
    pub fn new(cfg: &Config, backend: B, renderer: Renderer, surface: S) -> Result<Self> {
        let poller = JobPoller::new(cfg, backend.clone())?;
        let canvas = renderer.new_canvas()?;
        let (map_tx, map_rx) = mpsc::unbounded_channel();
        Ok(Self {
            backend,
            poller,
            playback: Playback::new(cfg.playback.tick_duration()),
            renderer,
            canvas,
            maps: MapResolver::new(&cfg.maps),
            surface,
            demo: None,
            every_n: cfg.job.default_every_n.max(1),
            status: String::new(),
            notices: Vec::new(),
            demos: Vec::new(),
            pending_round: None,
            last_frame: FrameStats::default(),
            poll_timer: None,
            frame_timer: None,
            frame_interval: cfg.playback.frame_interval(),
            clock_origin: Instant::now(),
            map_tx,
            map_rx,
        })
    }

    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    pub fn poller(&self) -> &JobPoller<B> {
        &self.poller
    }

    pub fn maps(&self) -> &MapResolver {
        &self.maps
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Most recent notices, oldest first; at most `MAX_NOTICES`.
    pub fn notices(&self) -> &[String] {
        &self.notices
    }

    /// Demo names from the last successful listing.
    pub fn demos(&self) -> &[String] {
        &self.demos
    }

    pub fn pending_round(&self) -> Option<i64> {
        self.pending_round
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    pub fn every_n(&self) -> u32 {
        self.every_n
    }

    pub fn is_polling(&self) -> bool {
        self.poll_timer.is_some()
    }

    pub fn is_animating(&self) -> bool {
        self.frame_timer.is_some()
    }

    pub fn select_demo(&mut self, demo: impl Into<String>) {
        self.demo = Some(demo.into());
    }

    pub fn set_every_n(&mut self, every_n: u32) -> Result<(), JobError> {
        if every_n == 0 {
            return Err(JobError::input("every_n must be an integer >= 1, got 0"));
        }
        self.every_n = every_n;
        Ok(())
    }

    /// `Round 2 | Tick: 14/120 | paused | <status>`
    pub fn readout(&self) -> String {
        let round = self
            .playback
            .round_number()
            .map(|n| format!("Round {n}"))
            .unwrap_or_else(|| "no round".to_string());
        let state = if self.playback.is_playing() {
            "playing"
        } else {
            "paused"
        };
        format!(
            "{round} | {}/{} | {state} | {}",
            self.playback.tick_label(),
            self.playback.max_tick(),
            self.status
        )
    }

    /// Event loop: stdin commands, poll ticks, frame ticks and map loads.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<()> {
        let mut lines = input.lines();
        self.redraw();
        println!("{HELP}");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.with_context(|| "reading commands")? else {
                        break;
                    };
                    match Command::parse(&line) {
                        Ok(Some(cmd)) => {
                            if self.handle(cmd).await == Flow::Quit {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(msg) => self.notice(msg),
                    }
                }
                _ = next_tick(&mut self.poll_timer) => self.on_poll_tick().await,
                now = next_tick(&mut self.frame_timer) => self.on_frame(now),
                Some(resolved) = self.map_rx.recv() => self.on_map_loaded(resolved),
            }
        }
        info!("session closed");
        Ok(())
    }

    pub async fn handle(&mut self, cmd: Command) -> Flow {
        debug!(?cmd, "command");
        match cmd {
            Command::Demos => self.list_demos().await,
            Command::Load { demo, every_n } => {
                let every_n = match every_n.as_deref().map(validate_every_n).transpose() {
                    Ok(n) => n,
                    Err(err) => {
                        self.notice(err.to_string());
                        return Flow::Continue;
                    }
                };
                if let Some(demo) = demo {
                    self.demo = Some(demo);
                }
                if let Some(n) = every_n {
                    self.every_n = n;
                }
                self.start_job().await;
            }
            Command::EveryN(raw) => match validate_every_n(&raw) {
                Ok(n) => {
                    self.every_n = n;
                    self.say(format!("every_n = {n}"));
                }
                Err(err) => self.notice(err.to_string()),
            },
            Command::Rounds => {
                let rounds = self
                    .playback
                    .timeline()
                    .map(|t| t.round_numbers())
                    .unwrap_or_default();
                if rounds.is_empty() {
                    self.say("no rounds loaded".to_string());
                }
                for n in rounds {
                    self.say(format!("Round {n}"));
                }
            }
            Command::Round(n) if self.playback.timeline().is_none() && self.is_polling() => {
                self.pending_round = Some(n);
                self.say(format!("Round {n} will be shown once the demo is processed"));
            }
            Command::Round(n) => {
                if self.playback.select_round(n) {
                    self.redraw();
                    self.say(self.readout());
                } else {
                    self.notice(format!("round {n} is not in the loaded timeline"));
                }
            }
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Toggle => {
                if self.playback.is_playing() {
                    self.pause();
                } else {
                    self.play();
                }
            }
            Command::Step(dir) => {
                self.playback.step(dir);
                self.redraw();
                self.say(self.playback.tick_label());
            }
            Command::Seek(tick) => {
                self.playback.seek(tick);
                self.redraw();
                self.say(self.playback.tick_label());
            }
            Command::Status => self.say(self.readout()),
            Command::Help => self.say(HELP.to_string()),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Fetches the server's demo list. Failures become a notice.
    pub async fn list_demos(&mut self) {
        match self.backend.list_demos().await {
            Ok(demos) => {
                if demos.is_empty() {
                    self.say("no demos on server".to_string());
                }
                for demo in &demos {
                    self.say(demo.clone());
                }
                self.demos = demos;
            }
            Err(err) => self.notice(format!("could not list demos: {err}")),
        }
    }

    /// Submits a job for the selected demo, replacing any running one.
    pub async fn start_job(&mut self) {
        let demo = self.demo.clone().unwrap_or_default();
        match self.poller.start(&demo, self.every_n).await {
            Ok(id) => {
                self.poll_timer = Some(poll_ticker(self.poller.interval()));
                self.status = "0/? rounds · starting...".to_string();
                self.say(format!("processing {demo} (job {id})"));
            }
            Err(err @ JobError::Input(_)) => self.notice(err.to_string()),
            Err(err) => {
                self.poll_timer = None;
                self.status = "failed to start".to_string();
                self.notice(err.to_string());
            }
        }
    }

    pub async fn on_poll_tick(&mut self) {
        let step = self.poller.poll_once().await;
        if let Some(job) = &step.progress {
            let elapsed = self.poller.elapsed().map(format_elapsed).unwrap_or_default();
            self.status = format!("{}% {} {}", job.percent, job.progress_text(), elapsed)
                .trim_end()
                .to_string();
            self.say(self.status.clone());
        }
        match step.outcome {
            PollOutcome::Pending => {}
            PollOutcome::Done(timeline) => {
                self.poll_timer = None;
                self.status = "demo processed".to_string();
                self.apply_timeline(timeline);
            }
            PollOutcome::Failed(err) => {
                self.poll_timer = None;
                self.status = err.to_string();
                self.notice(err.to_string());
            }
            PollOutcome::Idle => self.poll_timer = None,
        }
    }

    /// Installs a new timeline wholesale and shows the round requested
    /// while it was loading, else its initial round.
    pub fn apply_timeline(&mut self, timeline: Arc<Timeline>) {
        self.frame_timer = None;
        let mut selected = self.playback.load(Arc::clone(&timeline));
        if let Some(n) = self.pending_round.take() {
            if self.playback.select_round(n) {
                selected = Some(n);
            } else {
                self.notice(format!("round {n} is not in the loaded timeline"));
            }
        }
        if !timeline.rounds.is_empty() && !timeline.has_positions() {
            self.notice(
                "the demo was processed but no positions were found; try a smaller every_n"
                    .to_string(),
            );
        }

        match timeline.map_name() {
            Some(raw) => match self.maps.request(raw) {
                MapRequest::Load(name) => self.spawn_map_load(name),
                MapRequest::Current(_) | MapRequest::Invalid => {}
            },
            None => self.maps.clear(),
        }

        self.redraw();
        match selected {
            Some(n) => self.say(format!(
                "{} rounds loaded; showing Round {n}",
                timeline.rounds.len()
            )),
            None => self.say("timeline has no rounds".to_string()),
        }
    }

    fn spawn_map_load(&self, name: String) {
        let backend = self.backend.clone();
        let maps = self.maps.maps().clone();
        let tx = self.map_tx.clone();
        tokio::spawn(async move {
            let resolved = map_resolver::load(&backend, &maps, name).await;
            let _ = tx.send(resolved);
        });
    }

    pub fn on_map_loaded(&mut self, resolved: ResolvedMap) {
        if self.maps.apply(resolved) {
            self.redraw();
        }
    }

    /// Waits for and applies the next finished map load.
    pub async fn next_map_load(&mut self) {
        if let Some(resolved) = self.map_rx.recv().await {
            self.on_map_loaded(resolved);
        }
    }

    pub fn on_frame(&mut self, now: Instant) {
        let t = now.saturating_duration_since(self.clock_origin);
        match self.playback.on_frame(t) {
            FrameTick::Advanced => {
                self.redraw();
                self.tick_readout();
            }
            FrameTick::Held => {}
            FrameTick::ReachedEnd => {
                self.frame_timer = None;
                println!();
                self.say(format!("end of round; {}", self.playback.tick_label()));
            }
            FrameTick::Stopped => self.frame_timer = None,
        }
    }

    fn play(&mut self) {
        if self.playback.play() {
            let mut timer = tokio::time::interval(self.frame_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.frame_timer = Some(timer);
        } else {
            self.notice("nothing to play; load a demo first".to_string());
        }
    }

    fn pause(&mut self) {
        self.playback.pause();
        self.frame_timer = None;
        self.say(self.playback.tick_label());
    }

    fn redraw(&mut self) {
        let background = self.maps.background();
        self.last_frame = self.renderer.draw(
            &mut self.canvas,
            self.playback.current_round(),
            self.playback.current_tick(),
            background.as_deref(),
        );
        if let Err(err) = self.surface.present(&self.canvas) {
            warn!("present frame: {err:#}");
        }
    }

    /// Rewrites the tick label in place while playing.
    fn tick_readout(&self) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{}    ", self.playback.tick_label());
        let _ = out.flush();
    }

    fn say(&self, msg: String) {
        println!("{msg}");
    }

    fn notice(&mut self, msg: String) {
        println!("! {msg}");
        if self.notices.len() >= MAX_NOTICES {
            self.notices.remove(0);
        }
        self.notices.push(msg);
    }
}

async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(t) => t.tick().await,
        None => std::future::pending().await,
    }
}
