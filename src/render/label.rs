use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use std::path::{Path, PathBuf};
use tiny_skia::{ColorU8, Pixmap, PremultipliedColorU8};
use tracing::{debug, info, warn};

/// Outline font used for player labels.
pub struct LabelFont {
    font: FontVec,
    size: f32,
    path: PathBuf,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish()
    }
}

impl LabelFont {
    pub fn load(path: &Path, size: f32) -> Option<Self> {
        let bytes = std::fs::read(path).ok()?;
        match FontVec::try_from_vec(bytes) {
            Ok(font) => Some(Self {
                font,
                size,
                path: path.to_path_buf(),
            }),
            Err(err) => {
                debug!("font {} rejected: {err}", path.display());
                None
            }
        }
    }

    /// First loadable font among `paths`.
    pub fn discover(paths: &[String], size: f32) -> Option<Self> {
        let found = paths
            .iter()
            .find_map(|p| Self::load(Path::new(p), size));
        match &found {
            Some(font) => info!("label font {}", font.path.display()),
            None => warn!("no usable label font in fonts.paths; player labels disabled"),
        }
        found
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Draws `text` horizontally centred on `cx` with its baseline at `baseline`.
    pub fn draw_centered(
        &self,
        pixmap: &mut Pixmap,
        text: &str,
        cx: f32,
        baseline: f32,
        color: ColorU8,
    ) {
        let scale = PxScale::from(self.size);
        let scaled = self.font.as_scaled(scale);

        let mut glyphs = Vec::with_capacity(text.len());
        let mut caret = 0.0f32;
        let mut prev = None;
        for ch in text.chars().filter(|c| !c.is_control()) {
            let id = scaled.glyph_id(ch);
            if let Some(prev) = prev {
                caret += scaled.kern(prev, id);
            }
            glyphs.push(id.with_scale_and_position(scale, point(caret, 0.0)));
            caret += scaled.h_advance(id);
            prev = Some(id);
        }

        let origin_x = cx - caret / 2.0;
        let width = pixmap.width() as i32;
        let height = pixmap.height() as i32;
        let pixels = pixmap.pixels_mut();

        for mut glyph in glyphs {
            glyph.position.x += origin_x;
            glyph.position.y += baseline;
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i32 + gx as i32;
                let y = bounds.min.y as i32 + gy as i32;
                if x < 0 || y < 0 || x >= width || y >= height {
                    return;
                }
                let idx = (y * width + x) as usize;
                if let Some(px) = pixels.get_mut(idx) {
                    *px = blend(*px, color, coverage);
                }
            });
        }
    }
}

fn blend(dst: PremultipliedColorU8, src: ColorU8, coverage: f32) -> PremultipliedColorU8 {
    let c = coverage.clamp(0.0, 1.0) * (src.alpha() as f32 / 255.0);
    let inv = 1.0 - c;
    let mix = |s: u8, d: u8| (s as f32 * c + d as f32 * inv).round() as u8;
    let a = (255.0 * c + dst.alpha() as f32 * inv).round() as u8;
    PremultipliedColorU8::from_rgba(
        mix(src.red(), dst.red()),
        mix(src.green(), dst.green()),
        mix(src.blue(), dst.blue()),
        a,
    )
    .unwrap_or(dst)
}
