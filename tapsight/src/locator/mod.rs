//! Resolving named visual targets to screen coordinates.

use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub mod template;
pub mod text;

pub use template::{MatchConfig, TemplateLocator};
pub use text::{MaskRect, RecognizedLine, TextConfig, TextLocator, TextRecognizer};

/// A coordinate in full-frame pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned pixel rectangle, used for recognized-text bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Outcome of one localization attempt.
///
/// A miss is a value of its own rather than a sentinel coordinate, so a
/// target legitimately located at the origin stays distinguishable from
/// "nothing found".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Found(Point),
    NotFound,
}

impl Location {
    pub fn is_found(&self) -> bool {
        matches!(self, Location::Found(_))
    }

    pub fn point(&self) -> Option<Point> {
        match self {
            Location::Found(p) => Some(*p),
            Location::NotFound => None,
        }
    }
}

/// Re-invoke a locator until it produces a hit.
///
/// The loop is bounded: it gives up with `Timeout` once `timeout` has
/// elapsed, and honors the cancellation token at the top of every iteration.
/// Locator errors (missing template, bad pattern) abort the poll immediately.
///
/// This runs synchronously and is meant to be called from a blocking thread;
/// the locate step itself is CPU-bound.
pub(crate) fn poll_until_found<F>(
    mut locate: F,
    target: &str,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Point, AutomationError>
where
    F: FnMut() -> Result<Location, AutomationError>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(AutomationError::Cancelled(format!(
                "poll for {target} cancelled"
            )));
        }

        match locate()? {
            Location::Found(point) => {
                debug!(target, x = point.x, y = point.y, "target became visible");
                return Ok(point);
            }
            Location::NotFound => trace!(target, "target not visible yet"),
        }

        if Instant::now() + interval >= deadline {
            return Err(AutomationError::Timeout(format!(
                "{target} did not become visible within {timeout:?}"
            )));
        }
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_center() {
        assert_eq!(Rect::new(10, 20, 30, 40).center(), (25, 40));
    }

    #[test]
    fn location_accessors() {
        assert!(Location::Found(Point::new(0, 0)).is_found());
        assert_eq!(
            Location::Found(Point::new(3, 4)).point(),
            Some(Point::new(3, 4))
        );
        assert_eq!(Location::NotFound.point(), None);
    }

    #[test]
    fn origin_hit_is_not_a_miss() {
        // A target at the origin is a legitimate hit, never a miss marker.
        let origin = Location::Found(Point::new(0, 0));
        assert!(origin.is_found());
        assert_ne!(origin, Location::NotFound);
    }

    #[test]
    fn poll_returns_first_hit() {
        let mut attempts = 0;
        let cancel = CancellationToken::new();
        let result = poll_until_found(
            || {
                attempts += 1;
                if attempts < 3 {
                    Ok(Location::NotFound)
                } else {
                    Ok(Location::Found(Point::new(7, 9)))
                }
            },
            "test target",
            Duration::from_millis(1),
            Duration::from_secs(1),
            &cancel,
        );
        assert_eq!(result.expect("hit before deadline"), Point::new(7, 9));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn poll_times_out_on_persistent_miss() {
        let cancel = CancellationToken::new();
        let result = poll_until_found(
            || Ok(Location::NotFound),
            "test target",
            Duration::from_millis(5),
            Duration::from_millis(30),
            &cancel,
        );
        match result {
            Err(AutomationError::Timeout(msg)) => assert!(msg.contains("test target")),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn poll_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = poll_until_found(
            || Ok(Location::NotFound),
            "test target",
            Duration::from_millis(5),
            Duration::from_secs(10),
            &cancel,
        );
        assert!(matches!(result, Err(AutomationError::Cancelled(_))));
    }

    #[test]
    fn poll_propagates_locator_errors() {
        let cancel = CancellationToken::new();
        let result = poll_until_found(
            || Err(AutomationError::TemplateNotFound("missing".into())),
            "test target",
            Duration::from_millis(5),
            Duration::from_secs(10),
            &cancel,
        );
        assert!(matches!(result, Err(AutomationError::TemplateNotFound(_))));
    }
}
