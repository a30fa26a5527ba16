use super::*;
use crate::video::{Frame, FramePool};
use image::{GrayImage, Luma};

const FRAME_W: u32 = 64;
const FRAME_H: u32 = 48;
// Where the marker sits in the synthetic frame
const MARK_X: u32 = 40;
const MARK_Y: u32 = 10;
const MARK: u32 = 8;

fn checker(x: u32, y: u32) -> u8 {
    if (x / 2 + y / 2) % 2 == 0 { 255 } else { 0 }
}

fn gray_frame(f: impl Fn(u32, u32) -> u8) -> Frame {
    let pool = FramePool::new(2);
    let mut buf = pool.try_acquire().unwrap();
    let pixels = buf.prepare(FRAME_W, FRAME_H);
    for y in 0..FRAME_H {
        for x in 0..FRAME_W {
            let v = f(x, y);
            let i = ((y * FRAME_W + x) * 4) as usize;
            pixels[i..i + 4].copy_from_slice(&[v, v, v, 255]);
        }
    }
    buf.publish(0, 1)
}

/// Mid-gray frame with a checkerboard marker at (MARK_X, MARK_Y).
fn marked_frame() -> Frame {
    gray_frame(|x, y| {
        if (MARK_X..MARK_X + MARK).contains(&x) && (MARK_Y..MARK_Y + MARK).contains(&y) {
            checker(x - MARK_X, y - MARK_Y)
        } else {
            128
        }
    })
}

fn marker_template() -> GrayImage {
    GrayImage::from_fn(MARK, MARK, |x, y| Luma([checker(x, y)]))
}

// ============================================================
// find_image
// ============================================================

#[test]
fn test_find_image_locates_marker_center() {
    let frame = marked_frame();
    let outcome = find_image(&frame, &NormRect::FULL, &marker_template(), 0.95).unwrap();

    assert!(outcome.found, "marker should be found: {outcome:?}");
    assert!(outcome.confidence > 0.99);
    let expected_x = (MARK_X + MARK / 2) as f64 / FRAME_W as f64;
    let expected_y = (MARK_Y + MARK / 2) as f64 / FRAME_H as f64;
    assert!((outcome.x - expected_x).abs() < 1e-9, "x={}", outcome.x);
    assert!((outcome.y - expected_y).abs() < 1e-9, "y={}", outcome.y);
}

#[test]
fn test_find_image_respects_region() {
    let frame = marked_frame();
    // Right half contains the marker, left half does not.
    let right = NormRect::new(0.5, 0.0, 1.0, 1.0);
    let left = NormRect::new(0.0, 0.0, 0.5, 1.0);

    let hit = find_image(&frame, &right, &marker_template(), 0.95).unwrap();
    assert!(hit.found);
    let miss = find_image(&frame, &left, &marker_template(), 0.95).unwrap();
    assert!(!miss.found, "left half has no marker: {miss:?}");
    assert!(miss.confidence < 0.95);
}

#[test]
fn test_find_image_in_offset_region_maps_back_to_frame() {
    let frame = marked_frame();
    // Search window starts away from the origin on both axes.
    let window = NormRect::new(0.5, 0.125, 0.9, 0.75);
    let outcome = find_image(&frame, &window, &marker_template(), 0.95).unwrap();

    assert!(outcome.found, "{outcome:?}");
    assert!(outcome.confidence > 0.99);
    let expected_x = (MARK_X + MARK / 2) as f64 / FRAME_W as f64;
    let expected_y = (MARK_Y + MARK / 2) as f64 / FRAME_H as f64;
    assert!((outcome.x - expected_x).abs() < 1e-9, "x={}", outcome.x);
    assert!((outcome.y - expected_y).abs() < 1e-9, "y={}", outcome.y);
}

#[test]
fn test_find_image_below_threshold_reports_not_found() {
    let frame = gray_frame(|_, _| 128);
    let outcome = find_image(&frame, &NormRect::FULL, &marker_template(), 0.9).unwrap();
    assert!(!outcome.found);
    // A flat window against a half-on checkerboard scores 1/sqrt(2).
    assert!((outcome.confidence - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
}

#[test]
fn test_template_larger_than_region_is_invalid_region() {
    let frame = marked_frame();
    let tiny = NormRect::new(0.0, 0.0, 0.05, 0.05);
    let err = find_image(&frame, &tiny, &marker_template(), 0.5).unwrap_err();
    assert!(matches!(err, MatchError::InvalidRegion { .. }), "got {err:?}");
}

#[test]
fn test_inverted_region_is_invalid() {
    let frame = marked_frame();
    let inverted = NormRect::new(0.8, 0.0, 0.2, 1.0);
    assert!(matches!(
        find_image(&frame, &inverted, &marker_template(), 0.5),
        Err(MatchError::InvalidRegion { .. })
    ));
}

// ============================================================
// NormRect
// ============================================================

#[test]
fn test_region_to_pixels_clamps_and_keeps_one_pixel() {
    let r = NormRect::new(0.25, 0.5, 0.75, 1.0).to_pixels(100, 10);
    assert_eq!(r, PixelRect { x: 25, y: 5, width: 50, height: 5 });

    let sliver = NormRect::new(0.999, 0.999, 1.0, 1.0).to_pixels(10, 10);
    assert_eq!((sliver.width, sliver.height), (1, 1));
}

#[test]
fn test_region_parsed_from_template_name() {
    let rect = NormRect::parse_from_name("start-[0.1,0.8,0.3,0.95].png").unwrap();
    assert_eq!(rect, NormRect::new(0.1, 0.8, 0.3, 0.95));
    assert!(NormRect::parse_from_name("start.png").is_none());
    assert!(NormRect::parse_from_name("bad-[0.5,0.5,0.1,0.9].png").is_none());
    assert!(NormRect::parse_from_name("short-[0.1,0.2].png").is_none());
}

// ============================================================
// RegionSet
// ============================================================

#[test]
fn test_region_import_renames_and_renumbers_duplicates() {
    let mut set = RegionSet::from_json(
        r#"[{"id": 1, "name": "map", "x0": 0.8, "y0": 0.0, "x1": 1.0, "y1": 0.2}]"#,
    )
    .unwrap();
    let added = set
        .import_json(
            r#"[
                {"id": 1, "name": "map", "x0": 0.0, "y0": 0.0, "x1": 0.2, "y1": 0.2},
                {"id": 7, "name": "chat", "x0": 0.0, "y0": 0.5, "template": "bubble.png"},
                {"id": 8, "name": "broken", "x0": 0.9, "y0": 0.0, "x1": 0.1, "y1": 1.0}
            ]"#,
        )
        .unwrap();

    assert_eq!(added, 2, "invalid rectangle is skipped");
    assert_eq!(set.len(), 3);
    let renamed = set.by_name("map_1").expect("clashing name gets a suffix");
    assert_eq!(renamed.id, 2);
    let chat = set.lookup("7").unwrap();
    assert_eq!(chat.rect(), NormRect::new(0.0, 0.5, 1.0, 1.0));
    assert_eq!(chat.template.as_deref(), Some("bubble.png"));
    assert!(matches!(
        set.lookup("nope"),
        Err(MatchError::RegionNotFound { .. })
    ));
}

#[test]
fn test_region_import_rejects_malformed_json() {
    assert!(matches!(
        RegionSet::from_json("{not json"),
        Err(MatchError::RegionImport { .. })
    ));
}

// ============================================================
// ImageMatcher
// ============================================================

#[test]
fn test_matcher_without_frame_is_no_frame() {
    let matcher = ImageMatcher::new(TemplateStore::in_memory());
    matcher.templates().insert("marker", marker_template());
    let err = matcher.find(None, "marker", None, 0.9).unwrap_err();
    assert!(matches!(err, MatchError::NoFrame));
}

#[test]
fn test_matcher_unknown_template() {
    let matcher = ImageMatcher::new(TemplateStore::in_memory());
    let frame = marked_frame();
    assert!(matches!(
        matcher.find(Some(&frame), "missing", None, 0.9),
        Err(MatchError::TemplateNotFound { .. })
    ));
}

#[test]
fn test_matcher_uses_region_template_and_name_region() {
    let matcher = ImageMatcher::new(TemplateStore::in_memory());
    matcher.templates().insert("marker", marker_template());
    // Name-encoded region covering only the left half: no marker there.
    matcher
        .templates()
        .insert("marker-[0.0,0.0,0.5,1.0]", marker_template());
    matcher
        .import_regions(
            r#"[{"id": 3, "name": "right", "x0": 0.5, "y0": 0.0, "x1": 1.0, "y1": 1.0,
                 "template": "marker"}]"#,
        )
        .unwrap();
    let frame = marked_frame();

    let by_region = matcher.find_in_region(Some(&frame), None, "3", 0.95).unwrap();
    assert!(by_region.found);

    let by_name_region = matcher
        .find(Some(&frame), "marker-[0.0,0.0,0.5,1.0]", None, 0.95)
        .unwrap();
    assert!(!by_name_region.found);
}

#[test]
fn test_template_store_loads_png_from_directory() {
    let dir = std::env::temp_dir().join(format!("amr-templates-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    marker_template().save(dir.join("marker.png")).unwrap();

    let store = TemplateStore::new(&dir);
    let template = store.get("marker").unwrap();
    assert_eq!((template.width(), template.height()), (MARK, MARK));
    assert_eq!(store.len(), 1);
    assert!(matches!(
        store.get("absent"),
        Err(MatchError::TemplateNotFound { .. })
    ));

    let _ = std::fs::remove_dir_all(&dir);
}
