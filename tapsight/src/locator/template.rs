//! Two-stage template localization: coarse feature matching narrows the
//! frame down to a search region, then normalized cross-correlation inside
//! that region produces the position and the confidence gate.

use crate::errors::AutomationError;
use crate::frame::FrameStore;
use crate::locator::{Location, Point};
use crate::templates::TemplateStore;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Half-width of the square intensity patch described around each keypoint.
const PATCH_RADIUS: u32 = 4;

/// Tuning for the two-stage matcher.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Pixels at or below this intensity are zeroed before matching.
    pub brightness_cutoff: u8,
    /// Sigma of the mild blur applied after thresholding.
    pub blur_sigma: f32,
    /// FAST corner detection threshold.
    pub corner_threshold: u8,
    /// Minimum correlation score for a match to count as found.
    pub score_threshold: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            brightness_cutoff: 100,
            blur_sigma: 0.8,
            corner_threshold: 20,
            score_threshold: 0.75,
        }
    }
}

/// Resolves a named reference image to its position on the current frame.
#[derive(Clone)]
pub struct TemplateLocator {
    templates: Arc<TemplateStore>,
    frames: Arc<FrameStore>,
    config: MatchConfig,
}

impl TemplateLocator {
    pub fn new(templates: Arc<TemplateStore>, frames: Arc<FrameStore>, config: MatchConfig) -> Self {
        Self {
            templates,
            frames,
            config,
        }
    }

    /// One-shot localization of the template keyed by `name`.
    ///
    /// A missing template key is an error; an unreadable frame or an absent
    /// target is a plain miss.
    #[instrument(level = "debug", skip(self))]
    pub fn locate(&self, name: &str) -> Result<Location, AutomationError> {
        let reference = self.templates.load(name)?;
        let Some(frame) = self.frames.latest() else {
            debug!("no frame available for template search");
            return Ok(Location::NotFound);
        };

        let tpl = preprocess(&reference, &self.config);
        let scene = preprocess(&frame.image, &self.config);

        let tpl_descriptors = keypoint_descriptors(&tpl, &self.config);
        let scene_descriptors = keypoint_descriptors(&scene, &self.config);
        if tpl_descriptors.is_empty() || scene_descriptors.is_empty() {
            debug!("no usable keypoints on template or frame");
            return Ok(Location::NotFound);
        }

        let matches = match_descriptors(&tpl_descriptors, &scene_descriptors);
        if matches.len() < 2 {
            debug!(matches = matches.len(), "not enough feature matches");
            return Ok(Location::NotFound);
        }

        let roi = search_region(
            &matches,
            &scene_descriptors,
            tpl.dimensions(),
            scene.dimensions(),
        );
        Ok(self.refine(&scene, &tpl, roi))
    }

    /// Correlate the reference against the reduced search region and gate on
    /// confidence. Coordinates translate back from region-local to
    /// frame-global space.
    fn refine(&self, scene: &GrayImage, tpl: &GrayImage, roi: (u32, u32, u32, u32)) -> Location {
        let (x0, y0, width, height) = roi;
        if tpl.width() > width || tpl.height() > height {
            debug!("reference larger than the search region");
            return Location::NotFound;
        }

        let region = image::imageops::crop_imm(scene, x0, y0, width, height).to_image();
        let scores = match_template(&region, tpl, MatchTemplateMethod::CrossCorrelationNormalized);
        let extremes = find_extremes(&scores);
        // All-dark windows correlate to NaN; they fail the gate like any
        // other non-match.
        if !extremes.max_value.is_finite() || extremes.max_value < self.config.score_threshold {
            debug!(
                score = extremes.max_value as f64,
                "best match below confidence gate"
            );
            return Location::NotFound;
        }

        let (mx, my) = extremes.max_value_location;
        let center = Point::new(
            (x0 + mx + tpl.width() / 2) as i32,
            (y0 + my + tpl.height() / 2) as i32,
        );
        debug!(
            score = extremes.max_value as f64,
            x = center.x,
            y = center.y,
            "template located"
        );
        Location::Found(center)
    }
}

/// Grayscale, zero everything at or below the brightness cutoff, mild blur.
/// Applied identically to reference and frame so their intensities stay
/// comparable.
fn preprocess(image: &DynamicImage, config: &MatchConfig) -> GrayImage {
    let gray = image.to_luma8();
    let cutoff = config.brightness_cutoff;
    let bright = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Luma([if v > cutoff { v } else { 0 }])
    });
    gaussian_blur_f32(&bright, config.blur_sigma)
}

/// A keypoint with a mean/contrast-normalized intensity patch around it.
struct Descriptor {
    x: u32,
    y: u32,
    patch: Vec<f32>,
}

fn keypoint_descriptors(image: &GrayImage, config: &MatchConfig) -> Vec<Descriptor> {
    let (width, height) = image.dimensions();
    if width <= 2 * PATCH_RADIUS || height <= 2 * PATCH_RADIUS {
        return Vec::new();
    }
    corners_fast9(image, config.corner_threshold)
        .into_iter()
        .filter(|c| {
            c.x >= PATCH_RADIUS
                && c.y >= PATCH_RADIUS
                && c.x + PATCH_RADIUS < width
                && c.y + PATCH_RADIUS < height
        })
        .filter_map(|c| patch_descriptor(image, c.x, c.y))
        .collect()
}

fn patch_descriptor(image: &GrayImage, cx: u32, cy: u32) -> Option<Descriptor> {
    let side = 2 * PATCH_RADIUS + 1;
    let mut patch = Vec::with_capacity((side * side) as usize);
    for dy in 0..side {
        for dx in 0..side {
            let x = cx + dx - PATCH_RADIUS;
            let y = cy + dy - PATCH_RADIUS;
            patch.push(image.get_pixel(x, y).0[0] as f32);
        }
    }

    let mean = patch.iter().sum::<f32>() / patch.len() as f32;
    for v in &mut patch {
        *v -= mean;
    }
    let norm = patch.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        // Flat patch, carries no signal.
        return None;
    }
    for v in &mut patch {
        *v /= norm;
    }

    Some(Descriptor {
        x: cx,
        y: cy,
        patch,
    })
}

fn distance(a: &Descriptor, b: &Descriptor) -> f32 {
    a.patch
        .iter()
        .zip(&b.patch)
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

fn nearest_neighbors(from: &[Descriptor], to: &[Descriptor]) -> Vec<Option<(usize, f32)>> {
    from.iter()
        .map(|d| {
            let mut best: Option<(usize, f32)> = None;
            for (j, other) in to.iter().enumerate() {
                let dist = distance(d, other);
                if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                    best = Some((j, dist));
                }
            }
            best
        })
        .collect()
}

/// Nearest-neighbor matching with mutual-consistency filtering, sorted by
/// ascending distance with a stable index tie-break. Returns
/// `(reference index, scene index, distance)` triples.
fn match_descriptors(
    reference: &[Descriptor],
    scene: &[Descriptor],
) -> Vec<(usize, usize, f32)> {
    let forward = nearest_neighbors(reference, scene);
    let backward = nearest_neighbors(scene, reference);

    let mut matches: Vec<(usize, usize, f32)> = forward
        .iter()
        .enumerate()
        .filter_map(|(i, hit)| {
            let (j, dist) = (*hit)?;
            let mutual = backward[j].map(|(back, _)| back) == Some(i);
            mutual.then_some((i, j, dist))
        })
        .collect();

    matches.sort_by(|a, b| {
        a.2.partial_cmp(&b.2)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    matches
}

/// Bounding box of the matched scene keypoints, expanded by half the
/// reference dimensions and clipped to the frame.
fn search_region(
    matches: &[(usize, usize, f32)],
    scene_descriptors: &[Descriptor],
    (tpl_width, tpl_height): (u32, u32),
    (scene_width, scene_height): (u32, u32),
) -> (u32, u32, u32, u32) {
    let mut x_min = u32::MAX;
    let mut y_min = u32::MAX;
    let mut x_max = 0;
    let mut y_max = 0;
    for &(_, j, _) in matches {
        let d = &scene_descriptors[j];
        x_min = x_min.min(d.x);
        y_min = y_min.min(d.y);
        x_max = x_max.max(d.x);
        y_max = y_max.max(d.y);
    }

    let margin_x = tpl_width / 2;
    let margin_y = tpl_height / 2;
    let x0 = x_min.saturating_sub(margin_x);
    let y0 = y_min.saturating_sub(margin_y);
    let x1 = (x_max + margin_x).min(scene_width);
    let y1 = (y_max + margin_y).min(scene_height);
    (x0, y0, x1 - x0, y1 - y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameStore;

    /// 20x20 dark reference with a bright 12x12 square, corner-rich enough
    /// for the coarse stage.
    fn reference_image() -> GrayImage {
        let mut img = GrayImage::from_pixel(20, 20, Luma([0u8]));
        for y in 4..16 {
            for x in 4..16 {
                img.put_pixel(x, y, Luma([220u8]));
            }
        }
        img
    }

    fn scene_with_reference_at(x: i64, y: i64) -> GrayImage {
        let mut scene = GrayImage::from_pixel(200, 200, Luma([0u8]));
        image::imageops::replace(&mut scene, &reference_image(), x, y);
        scene
    }

    fn locator_with(
        scene: GrayImage,
        config: MatchConfig,
    ) -> (TemplateLocator, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        reference_image()
            .save(dir.path().join("target.png"))
            .expect("save template");

        let frames = Arc::new(FrameStore::new());
        frames.publish(DynamicImage::ImageLuma8(scene));
        let templates = Arc::new(TemplateStore::new(dir.path()));
        (TemplateLocator::new(templates, frames, config), dir)
    }

    #[test]
    fn preprocess_zeroes_dim_pixels() {
        let mut img = GrayImage::from_pixel(30, 30, Luma([50u8]));
        for y in 10..20 {
            for x in 10..20 {
                img.put_pixel(x, y, Luma([220u8]));
            }
        }
        let config = MatchConfig::default();
        let out = preprocess(&DynamicImage::ImageLuma8(img), &config);
        assert_eq!(out.get_pixel(2, 2).0[0], 0);
        assert!(out.get_pixel(15, 15).0[0] > 100);
    }

    #[test]
    fn locates_embedded_reference() {
        let (locator, _dir) = locator_with(scene_with_reference_at(60, 40), MatchConfig::default());
        let location = locator.locate("target").expect("locate");
        let point = location.point().expect("reference embedded in scene");
        // Center of the 20x20 reference embedded at (60, 40).
        assert!((point.x - 70).abs() <= 3, "x off: {point:?}");
        assert!((point.y - 50).abs() <= 3, "y off: {point:?}");
    }

    #[test]
    fn misses_when_reference_absent() {
        // A small bright dot: something on screen, but not the reference.
        let mut scene = GrayImage::from_pixel(200, 200, Luma([0u8]));
        for y in 100..104 {
            for x in 100..104 {
                scene.put_pixel(x, y, Luma([200u8]));
            }
        }
        let (locator, _dir) = locator_with(scene, MatchConfig::default());
        assert_eq!(locator.locate("target").expect("locate"), Location::NotFound);
    }

    #[test]
    fn misses_on_blank_scene() {
        let scene = GrayImage::from_pixel(200, 200, Luma([0u8]));
        let (locator, _dir) = locator_with(scene, MatchConfig::default());
        assert_eq!(locator.locate("target").expect("locate"), Location::NotFound);
    }

    #[test]
    fn confidence_gate_rejects_sub_threshold_scores() {
        let config = MatchConfig {
            // Unreachable gate: even a pixel-exact embedding must be rejected.
            score_threshold: 1.01,
            ..MatchConfig::default()
        };
        let (locator, _dir) = locator_with(scene_with_reference_at(60, 40), config);
        assert_eq!(locator.locate("target").expect("locate"), Location::NotFound);
    }

    #[test]
    fn localization_is_deterministic() {
        let (locator, _dir) = locator_with(scene_with_reference_at(60, 40), MatchConfig::default());
        let first = locator.locate("target").expect("locate");
        let second = locator.locate("target").expect("locate");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_frame_is_a_miss_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        reference_image()
            .save(dir.path().join("target.png"))
            .expect("save template");
        let locator = TemplateLocator::new(
            Arc::new(TemplateStore::new(dir.path())),
            Arc::new(FrameStore::new()),
            MatchConfig::default(),
        );
        assert_eq!(locator.locate("target").expect("locate"), Location::NotFound);
    }

    #[test]
    fn mutual_consistency_filters_one_sided_matches() {
        let a = Descriptor {
            x: 0,
            y: 0,
            patch: vec![1.0, 0.0, 0.0],
        };
        let b = Descriptor {
            x: 1,
            y: 0,
            patch: vec![0.9, 0.1, 0.0],
        };
        let c = Descriptor {
            x: 2,
            y: 0,
            patch: vec![0.0, 1.0, 0.0],
        };
        // Both reference descriptors prefer the single scene descriptor;
        // only the closer pair survives the cross-check.
        let reference = [a, b];
        let scene = [c];
        let matches = match_descriptors(&reference, &scene);
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].0, matches[0].1), (1, 0));
    }
}
