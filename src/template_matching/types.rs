/// Template matching data types
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("No frame available (link not streaming or nothing decoded yet)")]
    NoFrame,

    #[error("Invalid search region: {reason}")]
    InvalidRegion { reason: String },

    #[error("Template '{name}' not found")]
    TemplateNotFound { name: String },

    #[error("Template '{name}' could not be decoded: {source}")]
    TemplateDecode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Region {id} not found")]
    RegionNotFound { id: String },

    #[error("Region import failed: {source}")]
    RegionImport {
        #[from]
        source: serde_json::Error,
    },

    #[error("Region file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rectangle in normalized `[0, 1]` frame coordinates, corners inclusive of
/// `(x0, y0)` and exclusive of `(x1, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// Integer rectangle in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl NormRect {
    pub const FULL: NormRect = NormRect {
        x0: 0.0,
        y0: 0.0,
        x1: 1.0,
        y1: 1.0,
    };

    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        let coords = [self.x0, self.y0, self.x1, self.y1];
        if coords.iter().any(|c| !c.is_finite() || !(0.0..=1.0).contains(c)) {
            return Err(MatchError::InvalidRegion {
                reason: format!("coordinates {coords:?} outside [0,1]"),
            });
        }
        if self.x1 <= self.x0 || self.y1 <= self.y0 {
            return Err(MatchError::InvalidRegion {
                reason: format!("empty rectangle {coords:?}"),
            });
        }
        Ok(())
    }

    /// Maps onto a `width`x`height` frame. The result is clamped inside the
    /// frame and is at least one pixel wide and tall.
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let (w, h) = (width as f64, height as f64);
        let x0 = ((self.x0 * w) as u32).min(width.saturating_sub(1));
        let y0 = ((self.y0 * h) as u32).min(height.saturating_sub(1));
        let x1 = ((self.x1 * w) as u32).min(width).max(x0 + 1);
        let y1 = ((self.y1 * h) as u32).min(height).max(y0 + 1);
        PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    /// Parses a search rectangle embedded in a template file name:
    /// `button-[0.1,0.8,0.3,0.95].png`
    pub fn parse_from_name(name: &str) -> Option<NormRect> {
        if let Some(start) = name.find('[')
            && let Some(end) = name.find(']')
            && end > start
        {
            let parts: Vec<f64> = name[start + 1..end]
                .split(',')
                .map(|p| p.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .ok()?;
            if let [x0, y0, x1, y1] = parts[..] {
                let rect = NormRect::new(x0, y0, x1, y1);
                return rect.validate().is_ok().then_some(rect);
            }
        }
        None
    }
}

impl Default for NormRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// Result of one `find_image` call. Coordinates are the normalized center of
/// the best-scoring location, reported even when `found` is false.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub found: bool,
    pub x: f64,
    pub y: f64,
    pub confidence: f32,
}

impl MatchOutcome {
    pub fn not_found() -> Self {
        Self {
            found: false,
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}
