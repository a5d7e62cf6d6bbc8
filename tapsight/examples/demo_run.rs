//! Minimal end-to-end wiring: a logging gateway stub, a synthetic frame and
//! a canned recognizer, driving a short script.
//!
//! Run with `RUST_LOG=debug cargo run --example demo_run`.

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use std::sync::Arc;
use tapsight::{
    AutomationError, DeviceGateway, EngineConfig, FrameStore, RecognizedLine, Rect, ScriptEngine,
    TemplateStore, TextRecognizer,
};

struct LoggingGateway;

#[async_trait]
impl DeviceGateway for LoggingGateway {
    async fn tap(&self, x: i32, y: i32) -> Result<String, AutomationError> {
        tracing::info!(x, y, "tap");
        Ok(format!("tapped ({x},{y})"))
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
    ) -> Result<String, AutomationError> {
        tracing::info!(x1, y1, x2, y2, duration_ms, "swipe");
        Ok("swiped".to_string())
    }

    async fn type_text(&self, text: &str) -> Result<String, AutomationError> {
        tracing::info!(text, "type");
        Ok("typed".to_string())
    }

    async fn long_press(
        &self,
        x: i32,
        y: i32,
        duration_ms: u64,
    ) -> Result<String, AutomationError> {
        tracing::info!(x, y, duration_ms, "long press");
        Ok("pressed".to_string())
    }

    async fn double_tap(&self, x: i32, y: i32) -> Result<String, AutomationError> {
        tracing::info!(x, y, "double tap");
        Ok("double tapped".to_string())
    }

    async fn press_home(&self) -> Result<String, AutomationError> {
        tracing::info!("home");
        Ok("home".to_string())
    }

    async fn press_back(&self) -> Result<String, AutomationError> {
        tracing::info!("back");
        Ok("back".to_string())
    }

    async fn open_url(&self, url: &str) -> Result<String, AutomationError> {
        tracing::info!(url, "open url");
        Ok("opened".to_string())
    }
}

struct CannedRecognizer;

impl TextRecognizer for CannedRecognizer {
    fn recognize(&self, _image: &DynamicImage) -> Result<Vec<RecognizedLine>, AutomationError> {
        Ok(vec![RecognizedLine {
            text: "Settings".to_string(),
            bounds: Rect::new(100, 200, 80, 20),
        }])
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let frames = Arc::new(FrameStore::new());
    frames.publish(DynamicImage::ImageLuma8(GrayImage::from_pixel(
        1080,
        1920,
        Luma([0u8]),
    )));

    let engine = ScriptEngine::new(
        Arc::new(LoggingGateway),
        Arc::new(TemplateStore::new("templates")),
        frames,
        Arc::new(CannedRecognizer),
        EngineConfig::default(),
    );

    let script = r#"
        find_text("Sett");
        click_object("text");
        wait(200);
        press_home();
    "#;

    let report = engine.run(script).await;
    println!(
        "success: {} ({}/{} calls)",
        report.success, report.successful_calls, report.total_calls
    );
    for outcome in &report.outcomes {
        println!(
            "  {} -> {}",
            outcome.name,
            outcome
                .value
                .as_deref()
                .or(outcome.error.as_deref())
                .unwrap_or("")
        );
    }
}
