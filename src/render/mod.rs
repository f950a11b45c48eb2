pub mod label;

use crate::config::Config;
use crate::timeline::{Bounds, Position, Round};
use anyhow::{Context, Result};
use std::path::Path;
use tiny_skia::{
    Color, ColorU8, FillRule, FilterQuality, IntSize, LineCap, LineJoin, Paint, PathBuilder,
    Pixmap, PixmapPaint, Stroke, Transform,
};
use tracing::{debug, warn};

pub use label::LabelFont;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },

    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has no pixels")]
    EmptyImage,
}

/// The drawing surface: an RGBA pixmap.
#[derive(Debug, Clone)]
pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        Pixmap::new(width, height)
            .map(|pixmap| Self { pixmap })
            .ok_or(RenderError::Canvas { width, height })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Premultiplied RGBA at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixmap
            .pixel(x, y)
            .map(|p| [p.red(), p.green(), p.blue(), p.alpha()])
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.pixmap
            .save_png(path)
            .with_context(|| format!("writing canvas: {}", path.display()))
    }
}

/// A decoded map image, ready to be stretched over the canvas.
#[derive(Debug, Clone)]
pub struct Background {
    pub url: String,
    pixmap: Pixmap,
}

impl Background {
    pub fn decode(url: &str, bytes: &[u8]) -> Result<Self, RenderError> {
        let rgba = image::load_from_memory(bytes)?.into_rgba8();
        let (w, h) = rgba.dimensions();
        let size = IntSize::from_wh(w, h).ok_or(RenderError::EmptyImage)?;
        let mut data = rgba.into_raw();
        for px in data.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            for c in &mut px[..3] {
                *c = ((u16::from(*c) * a + 127) / 255) as u8;
            }
        }
        let pixmap = Pixmap::from_vec(data, size).ok_or(RenderError::EmptyImage)?;
        Ok(Self {
            url: url.to_string(),
            pixmap,
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }
}

/// Affine map from world coordinates into the padded canvas area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    min_x: f64,
    min_y: f64,
    scale_x: f64,
    scale_y: f64,
    pad: f64,
}

impl Projection {
    pub fn new(bounds: Bounds, width: u32, height: u32, pad: f32) -> Self {
        let pad = f64::from(pad);
        // a zero span collapses the axis instead of dividing by zero
        let span = |s: f64| if s == 0.0 || !s.is_finite() { 1.0 } else { s };
        Self {
            min_x: bounds.min_x,
            min_y: bounds.min_y,
            scale_x: (f64::from(width) - 2.0 * pad) / span(bounds.width()),
            scale_y: (f64::from(height) - 2.0 * pad) / span(bounds.height()),
            pad,
        }
    }

    pub fn project(&self, p: Position) -> (f32, f32) {
        (
            (self.pad + (p.x - self.min_x) * self.scale_x) as f32,
            (self.pad + (p.y - self.min_y) * self.scale_y) as f32,
        )
    }
}

/// What one draw call put on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub background_image: bool,
    pub trails: usize,
    pub markers: usize,
    pub labels: usize,
}

/// Parses `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(raw: &str) -> Option<Color> {
    let hex = raw.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
    let (r, g, b, a) = match hex.len() {
        3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
        6 => (byte(0)?, byte(2)?, byte(4)?, 255),
        8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
        _ => return None,
    };
    Some(Color::from_rgba8(r, g, b, a))
}

/// Draws one tick of a round. Holds no per-frame state.
#[derive(Debug)]
pub struct Renderer {
    cfg: crate::config::Canvas,
    background: Color,
    grid: Color,
    label_color: ColorU8,
    palette: Vec<Color>,
    labels: Option<LabelFont>,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        let labels = LabelFont::discover(&cfg.fonts.paths, cfg.canvas.label_size);
        Self::with_label_font(cfg, labels)
    }

    pub fn with_label_font(cfg: &Config, labels: Option<LabelFont>) -> Self {
        let canvas = &cfg.canvas;
        let color_or = |raw: &str, fallback: Color| {
            parse_color(raw).unwrap_or_else(|| {
                warn!("invalid color {raw:?} in config; using fallback");
                fallback
            })
        };
        let mut palette: Vec<Color> = canvas
            .palette
            .iter()
            .filter_map(|c| parse_color(c))
            .collect();
        if palette.is_empty() {
            palette.push(Color::WHITE);
        }
        Self {
            cfg: canvas.clone(),
            background: color_or(&canvas.background, Color::BLACK),
            grid: color_or(&canvas.grid_color, Color::from_rgba8(0x22, 0x22, 0x22, 0xff)),
            label_color: color_or(&canvas.label_color, Color::WHITE).to_color_u8(),
            palette,
            labels,
        }
    }

    pub fn label_font(&self) -> Option<&LabelFont> {
        self.labels.as_ref()
    }

    pub fn new_canvas(&self) -> Result<Canvas, RenderError> {
        Canvas::new(self.cfg.width, self.cfg.height)
    }

    /// Explicit track color when it parses, else the palette entry for the
    /// player's index in the round.
    pub fn player_color(&self, index: usize, explicit: Option<&str>) -> Color {
        explicit
            .and_then(parse_color)
            .unwrap_or(self.palette[index % self.palette.len()])
    }

    pub fn draw(
        &self,
        canvas: &mut Canvas,
        round: Option<&Round>,
        tick: usize,
        background: Option<&Background>,
    ) -> FrameStats {
        let mut stats = FrameStats::default();
        canvas.pixmap.fill(self.background);

        match background {
            Some(bg) => {
                self.draw_background(&mut canvas.pixmap, bg);
                stats.background_image = true;
            }
            None => self.draw_grid(&mut canvas.pixmap),
        }

        let Some(round) = round else {
            return stats;
        };
        let Some(bounds) = round.bounds() else {
            debug!("round {} has no positions; nothing to draw", round.number);
            return stats;
        };
        let projection = Projection::new(bounds, canvas.width(), canvas.height(), self.cfg.padding);

        for (idx, player) in round.players.iter().enumerate() {
            let Some(current) = player.position_at(tick) else {
                continue;
            };
            let color = self.player_color(idx, player.color.as_deref());

            if self.draw_trail(&mut canvas.pixmap, &projection, player.trail(tick), color) {
                stats.trails += 1;
            }

            let (x, y) = projection.project(current);
            if !x.is_finite() || !y.is_finite() {
                continue;
            }
            if let Some(marker) = PathBuilder::from_circle(x, y, self.cfg.marker_radius) {
                canvas.pixmap.fill_path(
                    &marker,
                    &paint(color),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
                stats.markers += 1;
            }

            if let Some(font) = &self.labels {
                font.draw_centered(
                    &mut canvas.pixmap,
                    player.label(),
                    x,
                    y - self.cfg.label_offset,
                    self.label_color,
                );
                stats.labels += 1;
            }
        }
        stats
    }

    fn draw_background(&self, pixmap: &mut Pixmap, bg: &Background) {
        let sx = pixmap.width() as f32 / bg.width() as f32;
        let sy = pixmap.height() as f32 / bg.height() as f32;
        pixmap.draw_pixmap(
            0,
            0,
            bg.pixmap.as_ref(),
            &PixmapPaint {
                quality: FilterQuality::Bilinear,
                ..PixmapPaint::default()
            },
            Transform::from_scale(sx, sy),
            None,
        );
    }

    fn draw_grid(&self, pixmap: &mut Pixmap) {
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let pad = self.cfg.padding;
        let cells = self.cfg.grid_cells.max(1);

        let mut pb = PathBuilder::new();
        for i in 0..=cells {
            let t = i as f32 / cells as f32;
            let x = pad + t * (w - 2.0 * pad);
            pb.move_to(x, pad);
            pb.line_to(x, h - pad);
            let y = pad + t * (h - 2.0 * pad);
            pb.move_to(pad, y);
            pb.line_to(w - pad, y);
        }
        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width: 1.0,
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &paint(self.grid), &stroke, Transform::identity(), None);
        }
    }

    fn draw_trail(
        &self,
        pixmap: &mut Pixmap,
        projection: &Projection,
        trail: &[Position],
        color: Color,
    ) -> bool {
        if trail.len() < 2 {
            return false;
        }
        let mut pb = PathBuilder::new();
        for (i, p) in trail.iter().enumerate() {
            let (x, y) = projection.project(*p);
            if i == 0 {
                pb.move_to(x, y);
            } else {
                pb.line_to(x, y);
            }
        }
        let Some(path) = pb.finish() else {
            return false;
        };
        let stroke = Stroke {
            width: self.cfg.trail_width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint(color), &stroke, Transform::identity(), None);
        true
    }
}

fn paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    paint
}
