// Template matching module - locate reference images inside video frames
//
// Frames are matched as grayscale with normalized cross-correlation over a
// normalized search rectangle. Templates come from an images directory
// (cached) and named search rectangles from a JSON region export.

pub mod matcher;
pub mod regions;
pub mod templates;
pub mod types;

#[cfg(test)]
mod tests;

pub use matcher::{ImageMatcher, find_image};
pub use regions::{MatchRegion, RegionSet};
pub use templates::{Template, TemplateStore};
pub use types::{MatchError, MatchOutcome, NormRect, PixelRect};
