use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// A sampled world-space position. Extra fields sent by the backend (such as
/// the source `tick`) are ignored; the index in the sequence is the tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerTrack {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub positions: Vec<Position>,
}

impl PlayerTrack {
    /// Display label: the name when present, else the id.
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.id,
        }
    }

    /// Position at `tick`, holding the last known sample once the track ends.
    pub fn position_at(&self, tick: usize) -> Option<Position> {
        let last = self.positions.len().checked_sub(1)?;
        self.positions.get(tick.min(last)).copied()
    }

    /// Samples from round start up to and including `tick`.
    pub fn trail(&self, tick: usize) -> &[Position] {
        let end = tick.saturating_add(1).min(self.positions.len());
        &self.positions[..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn enclosing<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Bounds> {
        let mut it = positions.into_iter();
        let first = it.next()?;
        let init = Bounds {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        Some(it.fold(init, |b, p| Bounds {
            min_x: b.min_x.min(p.x),
            max_x: b.max_x.max(p.x),
            min_y: b.min_y.min(p.y),
            max_y: b.max_y.max(p.y),
        }))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    #[serde(rename = "round")]
    pub number: i64,
    #[serde(default)]
    pub players: Vec<PlayerTrack>,
    #[serde(skip)]
    bounds: OnceLock<Option<Bounds>>,
}

impl Round {
    pub fn new(number: i64, players: Vec<PlayerTrack>) -> Self {
        Self {
            number,
            players,
            bounds: OnceLock::new(),
        }
    }

    /// Last valid tick index: longest track length minus one, floored at zero.
    pub fn max_tick(&self) -> usize {
        self.players
            .iter()
            .map(|p| p.positions.len())
            .max()
            .unwrap_or(0)
            .saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.players.iter().all(|p| p.positions.is_empty())
    }

    /// Bounds over every position in the round. Computed on first use and
    /// cached for the lifetime of the round; `None` for an empty round.
    pub fn bounds(&self) -> Option<Bounds> {
        *self.bounds.get_or_init(|| {
            Bounds::enclosing(self.players.iter().flat_map(|p| p.positions.iter()))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(rename = "map", default)]
    pub map_name: Option<String>,
    #[serde(default)]
    pub rounds: Vec<Round>,
}

impl Timeline {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).with_context(|| "parsing timeline JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("reading timeline: {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn round(&self, number: i64) -> Option<&Round> {
        self.rounds.iter().find(|r| r.number == number)
    }

    pub fn round_numbers(&self) -> Vec<i64> {
        self.rounds.iter().map(|r| r.number).collect()
    }

    /// True when at least one player in any round has a sample.
    pub fn has_positions(&self) -> bool {
        self.rounds.iter().any(|r| !r.is_empty())
    }

    /// Round to show first: the first non-empty round, else the first round.
    pub fn initial_round(&self) -> Option<i64> {
        self.rounds
            .iter()
            .find(|r| !r.is_empty())
            .or_else(|| self.rounds.first())
            .map(|r| r.number)
    }

    /// Map name when the result carries a non-blank one.
    pub fn map_name(&self) -> Option<&str> {
        self.map_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

fn id_from_any<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(de)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
        RawId::Float(f) => f.to_string(),
    })
}
