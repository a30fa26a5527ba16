/// Template matching implementation
///
/// Normalized cross-correlation of a grayscale template against the
/// grayscale crop of a frame; the best-scoring offset wins.

use super::regions::{MatchRegion, RegionSet};
use super::templates::TemplateStore;
use super::types::{MatchError, MatchOutcome, NormRect, PixelRect};
use crate::video::Frame;
use image::{DynamicImage, GrayImage, RgbaImage};
use imageproc::template_matching::{MatchTemplateMethod, match_template};
use log::debug;
use std::sync::RwLock;

/// Finds `template` inside `region` of `frame`.
///
/// `found` is set only when the best score reaches `threshold`. A template
/// that does not fit inside the region is an `InvalidRegion` error.
pub fn find_image(
    frame: &Frame,
    region: &NormRect,
    template: &GrayImage,
    threshold: f32,
) -> Result<MatchOutcome, MatchError> {
    region.validate()?;
    if frame.width() == 0 || frame.height() == 0 {
        return Err(MatchError::NoFrame);
    }
    let area = region.to_pixels(frame.width(), frame.height());
    if template.width() == 0 || template.height() == 0 {
        return Err(MatchError::InvalidRegion {
            reason: "template is empty".to_string(),
        });
    }
    if template.width() > area.width || template.height() > area.height {
        return Err(MatchError::InvalidRegion {
            reason: format!(
                "template {}x{} larger than search area {}x{}",
                template.width(),
                template.height(),
                area.width,
                area.height
            ),
        });
    }

    let search = grayscale_crop(frame, area)?;
    let scores = match_template(
        &search,
        template,
        MatchTemplateMethod::CrossCorrelationNormalized,
    );

    // Flat (all black) windows produce 0/0; those scores are skipped.
    let mut best: Option<(u32, u32, f32)> = None;
    for (x, y, pixel) in scores.enumerate_pixels() {
        let score = pixel[0];
        if !score.is_finite() {
            continue;
        }
        if best.is_none_or(|(_, _, b)| score > b) {
            best = Some((x, y, score));
        }
    }
    let Some((bx, by, score)) = best else {
        return Ok(MatchOutcome::not_found());
    };

    let center_x = area.x + bx + template.width() / 2;
    let center_y = area.y + by + template.height() / 2;
    let confidence = score.clamp(0.0, 1.0);
    Ok(MatchOutcome {
        found: confidence >= threshold,
        x: center_x as f64 / frame.width() as f64,
        y: center_y as f64 / frame.height() as f64,
        confidence,
    })
}

fn grayscale_crop(frame: &Frame, area: PixelRect) -> Result<GrayImage, MatchError> {
    let stride = frame.width() as usize * 4;
    let pixels = frame.pixels();
    if pixels.len() < stride * frame.height() as usize {
        return Err(MatchError::NoFrame);
    }
    let row_len = area.width as usize * 4;
    let mut crop = Vec::with_capacity(row_len * area.height as usize);
    for row in area.y..area.y + area.height {
        let start = row as usize * stride + area.x as usize * 4;
        crop.extend_from_slice(&pixels[start..start + row_len]);
    }
    let crop = RgbaImage::from_raw(area.width, area.height, crop).ok_or(MatchError::NoFrame)?;
    Ok(DynamicImage::ImageRgba8(crop).into_luma8())
}

/// Template store plus imported regions, the lookup side of the
/// `findImage` primitives.
#[derive(Debug, Default)]
pub struct ImageMatcher {
    templates: TemplateStore,
    regions: RwLock<RegionSet>,
}

impl ImageMatcher {
    pub fn new(templates: TemplateStore) -> Self {
        Self {
            templates,
            regions: RwLock::default(),
        }
    }

    pub fn with_regions(self, regions: RegionSet) -> Self {
        self.set_regions(regions);
        self
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn set_regions(&self, regions: RegionSet) {
        *self.regions.write().unwrap_or_else(|e| e.into_inner()) = regions;
    }

    pub fn import_regions(&self, json: &str) -> Result<usize, MatchError> {
        self.regions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .import_json(json)
    }

    pub fn region(&self, key: &str) -> Result<MatchRegion, MatchError> {
        self.regions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .lookup(key)
            .cloned()
    }

    /// Matches a named template. Without an explicit region the search area
    /// is the one encoded in the template's file name, else the whole frame.
    pub fn find(
        &self,
        frame: Option<&Frame>,
        template: &str,
        region: Option<NormRect>,
        threshold: f32,
    ) -> Result<MatchOutcome, MatchError> {
        let frame = frame.ok_or(MatchError::NoFrame)?;
        let template = self.templates.get(template)?;
        let region = region
            .or(template.default_region)
            .unwrap_or(NormRect::FULL);
        let outcome = find_image(frame, &region, &template.image, threshold)?;
        debug!(
            "🔍 '{}' in {:?}: found={} conf={:.3} at ({:.3},{:.3})",
            template.name, region, outcome.found, outcome.confidence, outcome.x, outcome.y
        );
        Ok(outcome)
    }

    /// Matches inside an imported region. `template` falls back to the
    /// template the region was saved with.
    pub fn find_in_region(
        &self,
        frame: Option<&Frame>,
        template: Option<&str>,
        region_key: &str,
        threshold: f32,
    ) -> Result<MatchOutcome, MatchError> {
        let region = self.region(region_key)?;
        let name = template
            .map(str::to_string)
            .or_else(|| region.template.clone())
            .ok_or_else(|| MatchError::TemplateNotFound {
                name: format!("<none for region '{}'>", region.name),
            })?;
        self.find(frame, &name, Some(region.rect()), threshold)
    }
}
