//! Text localization: recognize what is on screen, pick the first line
//! matching a goal pattern, and map its center back to full-frame pixels.

use crate::errors::AutomationError;
use crate::frame::FrameStore;
use crate::locator::{Location, Point, Rect};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One recognized line of text with its bounding box, in the pixel space of
/// the image handed to the recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    pub bounds: Rect,
}

/// Black-box recognition backend. Line order is the backend's reading order
/// and is preserved by the locator.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<RecognizedLine>, AutomationError>;
}

/// Rectangle blanked out before recognition, in full-frame pixels. Used to
/// exclude known UI chrome from matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

/// Tuning for text localization.
#[derive(Debug, Clone)]
pub struct TextConfig {
    /// Uniform downscale applied before recognition to bound latency.
    pub downscale: f32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self { downscale: 0.5 }
    }
}

/// Resolves a goal pattern to the position of the first recognized line
/// matching it.
#[derive(Clone)]
pub struct TextLocator {
    frames: Arc<FrameStore>,
    recognizer: Arc<dyn TextRecognizer>,
    config: TextConfig,
}

impl TextLocator {
    pub fn new(
        frames: Arc<FrameStore>,
        recognizer: Arc<dyn TextRecognizer>,
        config: TextConfig,
    ) -> Self {
        Self {
            frames,
            recognizer,
            config,
        }
    }

    /// One-shot localization of `pattern` (a regular expression) on the
    /// current frame. First matching line wins; there is no ranking by
    /// confidence or position.
    #[instrument(level = "debug", skip(self))]
    pub fn locate(
        &self,
        pattern: &str,
        mask: Option<MaskRect>,
    ) -> Result<Location, AutomationError> {
        let matcher = Regex::new(pattern).map_err(|e| {
            AutomationError::InvalidArgument(format!("invalid goal pattern {pattern:?}: {e}"))
        })?;

        let Some(frame) = self.frames.latest() else {
            debug!("no frame available for text search");
            return Ok(Location::NotFound);
        };

        let mut image = frame.image.clone();
        if let Some(mask) = mask {
            blank_rect(&mut image, mask);
        }
        let scaled = downscale(&image, self.config.downscale);

        let lines = self.recognizer.recognize(&scaled)?;
        for line in &lines {
            if matcher.is_match(&line.text) {
                let (cx, cy) = line.bounds.center();
                let point = Point::new(
                    (cx as f32 / self.config.downscale).round() as i32,
                    (cy as f32 / self.config.downscale).round() as i32,
                );
                debug!(text = %line.text, x = point.x, y = point.y, "goal text located");
                return Ok(Location::Found(point));
            }
        }

        debug!(lines = lines.len(), "no recognized line matched the goal");
        Ok(Location::NotFound)
    }
}

/// Overwrite the mask rectangle with black pixels, clipped to the image. A
/// rectangle fully outside the image is ignored.
fn blank_rect(image: &mut DynamicImage, mask: MaskRect) {
    let (width, height) = (image.width(), image.height());
    let x1 = mask.x1.min(width);
    let y1 = mask.y1.min(height);
    if mask.x0 >= x1 || mask.y0 >= y1 {
        return;
    }

    let mut rgba = image.to_rgba8();
    for y in mask.y0..y1 {
        for x in mask.x0..x1 {
            rgba.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    *image = DynamicImage::ImageRgba8(rgba);
}

fn downscale(image: &DynamicImage, factor: f32) -> DynamicImage {
    let width = ((image.width() as f32 * factor) as u32).max(1);
    let height = ((image.height() as f32 * factor) as u32).max(1);
    image.resize_exact(width, height, FilterType::Triangle)
}
