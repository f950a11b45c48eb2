use crate::timeline::{Round, Timeline};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Backward,
}

/// What a frame callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTick {
    /// Not playing; the caller should stop scheduling frames.
    Stopped,
    /// Less than one tick duration elapsed; nothing to redraw.
    Held,
    /// Moved forward one tick; redraw.
    Advanced,
    /// Already at the last tick; playback paused itself.
    ReachedEnd,
}

/// Tick cursor over the selected round of the current timeline.
#[derive(Debug)]
pub struct Playback {
    timeline: Option<Arc<Timeline>>,
    round: Option<i64>,
    current_tick: usize,
    max_tick: usize,
    playing: bool,
    tick_duration: Duration,
    last_advance: Option<Duration>,
}

impl Playback {
    pub fn new(tick_duration: Duration) -> Self {
        Self {
            timeline: None,
            round: None,
            current_tick: 0,
            max_tick: 0,
            playing: false,
            tick_duration,
            last_advance: None,
        }
    }

    /// Replaces the timeline wholesale and selects its initial round
    /// (first non-empty, else first). Returns the selected round number.
    pub fn load(&mut self, timeline: Arc<Timeline>) -> Option<i64> {
        self.pause();
        self.round = None;
        self.current_tick = 0;
        self.max_tick = 0;
        let initial = timeline.initial_round();
        self.timeline = Some(timeline);
        if let Some(number) = initial {
            self.select_round(number);
        }
        initial
    }

    pub fn timeline(&self) -> Option<&Arc<Timeline>> {
        self.timeline.as_ref()
    }

    /// Selects a round by number. Unknown numbers leave the state untouched.
    pub fn select_round(&mut self, number: i64) -> bool {
        let Some(round) = self.timeline.as_ref().and_then(|t| t.round(number)) else {
            debug!("round {number} not in timeline");
            return false;
        };
        self.max_tick = round.max_tick();
        self.round = Some(number);
        self.current_tick = 0;
        self.last_advance = None;
        true
    }

    pub fn current_round(&self) -> Option<&Round> {
        let number = self.round?;
        self.timeline.as_ref()?.round(number)
    }

    pub fn round_number(&self) -> Option<i64> {
        self.round
    }

    pub fn current_tick(&self) -> usize {
        self.current_tick
    }

    pub fn max_tick(&self) -> usize {
        self.max_tick
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Starts playback. No-op without a selected round.
    pub fn play(&mut self) -> bool {
        if self.round.is_none() {
            return false;
        }
        self.playing = true;
        self.last_advance = None;
        true
    }

    pub fn pause(&mut self) {
        self.playing = false;
        self.last_advance = None;
    }

    pub fn toggle(&mut self) -> bool {
        if self.playing {
            self.pause();
            false
        } else {
            self.play()
        }
    }

    /// Manual single-tick move clamped to `[0, max_tick]`.
    pub fn step(&mut self, dir: StepDirection) -> usize {
        self.current_tick = match dir {
            StepDirection::Forward => (self.current_tick + 1).min(self.max_tick),
            StepDirection::Backward => self.current_tick.saturating_sub(1),
        };
        self.current_tick
    }

    /// Scrubber position, clamped to the round.
    pub fn seek(&mut self, tick: usize) -> usize {
        self.current_tick = tick.min(self.max_tick);
        self.current_tick
    }

    /// Frame callback. `now` is a monotonic timestamp; exactly one tick is
    /// advanced once `tick_duration` has elapsed since the previous advance.
    /// The first frame after `play` only anchors the clock.
    pub fn on_frame(&mut self, now: Duration) -> FrameTick {
        if !self.playing {
            return FrameTick::Stopped;
        }
        let Some(last) = self.last_advance else {
            self.last_advance = Some(now);
            return FrameTick::Held;
        };
        if now.saturating_sub(last) < self.tick_duration {
            return FrameTick::Held;
        }
        self.last_advance = Some(now);
        if self.current_tick < self.max_tick {
            self.current_tick += 1;
            FrameTick::Advanced
        } else {
            self.playing = false;
            self.last_advance = None;
            FrameTick::ReachedEnd
        }
    }

    pub fn tick_label(&self) -> String {
        format!("Tick: {}", self.current_tick)
    }
}
