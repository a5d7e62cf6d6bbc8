//! Boundary to the device-control service.

use crate::errors::AutomationError;
use async_trait::async_trait;

/// The capability surface of the device gateway.
///
/// Each operation either succeeds with a short status message or fails with a
/// transport/device error. Implementations are expected to be remote (e.g. an
/// HTTP bridge in front of `adb`), so every call is async I/O from the
/// caller's point of view.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    async fn tap(&self, x: i32, y: i32) -> Result<String, AutomationError>;

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
    ) -> Result<String, AutomationError>;

    async fn type_text(&self, text: &str) -> Result<String, AutomationError>;

    async fn long_press(&self, x: i32, y: i32, duration_ms: u64)
        -> Result<String, AutomationError>;

    async fn double_tap(&self, x: i32, y: i32) -> Result<String, AutomationError>;

    async fn press_home(&self) -> Result<String, AutomationError>;

    async fn press_back(&self) -> Result<String, AutomationError>;

    async fn open_url(&self, url: &str) -> Result<String, AutomationError>;
}
