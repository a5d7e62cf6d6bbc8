//! Script execution: dispatching parsed calls to the device gateway and the
//! visual locators, with per-run session state.

use crate::errors::AutomationError;
use crate::frame::FrameStore;
use crate::gateway::DeviceGateway;
use crate::locator::{
    poll_until_found, Location, MaskRect, MatchConfig, Point, TemplateLocator, TextConfig,
    TextLocator, TextRecognizer,
};
use crate::script::{parse_script, ActionCall, ArgValue};
use crate::session::{ExecutionReport, ExecutionSession};
use crate::templates::TemplateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine-wide tuning. The poll settings bound every `check_*` wait.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub matching: MatchConfig,
    pub text: TextConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            matching: MatchConfig::default(),
            text: TextConfig::default(),
        }
    }
}

/// Executes action scripts against a device.
///
/// One engine can serve many runs; all per-run state lives in the
/// [`ExecutionSession`] created for each script, so concurrent runs cannot
/// interfere through shared positions.
pub struct ScriptEngine {
    gateway: Arc<dyn DeviceGateway>,
    template_locator: TemplateLocator,
    text_locator: TextLocator,
    config: EngineConfig,
}

impl ScriptEngine {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        templates: Arc<TemplateStore>,
        frames: Arc<FrameStore>,
        recognizer: Arc<dyn TextRecognizer>,
        config: EngineConfig,
    ) -> Self {
        let template_locator =
            TemplateLocator::new(templates, frames.clone(), config.matching.clone());
        let text_locator = TextLocator::new(frames, recognizer, config.text.clone());
        Self {
            gateway,
            template_locator,
            text_locator,
            config,
        }
    }

    /// Run a script to completion and report every call's outcome.
    pub async fn run(&self, script: &str) -> ExecutionReport {
        self.run_with_cancellation(script, CancellationToken::new())
            .await
    }

    /// Run a script with a caller-supplied cancellation token. The token is
    /// honored between calls, during waits, and on every poll iteration;
    /// calls already executed keep their outcomes.
    #[instrument(skip(self, script, cancel))]
    pub async fn run_with_cancellation(
        &self,
        script: &str,
        cancel: CancellationToken,
    ) -> ExecutionReport {
        let parsed = parse_script(script);
        for skipped in &parsed.skipped {
            warn!(reason = ?skipped.reason, statement = %skipped.text, "statement dropped from script");
        }
        info!(calls = parsed.calls.len(), "executing script");

        let mut session = ExecutionSession::new(parsed.calls.len());
        for call in &parsed.calls {
            if cancel.is_cancelled() {
                info!("run cancelled, skipping remaining calls");
                break;
            }
            match self.dispatch(call, &mut session, &cancel).await {
                Ok(value) => {
                    debug!(name = %call.name, %value, "call succeeded");
                    session.record_success(call, value);
                }
                Err(e) => {
                    error!(name = %call.name, error = %e, "call failed, run continues");
                    session.record_failure(call, &e);
                }
            }
        }
        session.into_report()
    }

    async fn dispatch(
        &self,
        call: &ActionCall,
        session: &mut ExecutionSession,
        cancel: &CancellationToken,
    ) -> Result<String, AutomationError> {
        let args = &call.args;
        match call.name.as_str() {
            "click" => {
                self.gateway
                    .tap(int_arg(args, 0, 0) as i32, int_arg(args, 1, 0) as i32)
                    .await
            }
            "slide" => {
                self.gateway
                    .swipe(
                        int_arg(args, 0, 0) as i32,
                        int_arg(args, 1, 0) as i32,
                        int_arg(args, 2, 0) as i32,
                        int_arg(args, 3, 0) as i32,
                        int_arg(args, 4, 300).max(0) as u64,
                    )
                    .await
            }
            "text" => self.gateway.type_text(&string_arg(args, 0)).await,
            "wait" => {
                let ms = int_arg(args, 0, 1000).max(0) as u64;
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(format!("Waited {ms}ms")),
                    _ = cancel.cancelled() => {
                        Err(AutomationError::Cancelled("wait interrupted".to_string()))
                    }
                }
            }
            "go_url" => self.gateway.open_url(&string_arg(args, 0)).await,
            "press_home" => self.gateway.press_home().await,
            "press_back" => self.gateway.press_back().await,
            "long_press" => {
                self.gateway
                    .long_press(
                        int_arg(args, 0, 0) as i32,
                        int_arg(args, 1, 0) as i32,
                        int_arg(args, 2, 1000).max(0) as u64,
                    )
                    .await
            }
            "double_tap" => {
                self.gateway
                    .double_tap(int_arg(args, 0, 0) as i32, int_arg(args, 1, 0) as i32)
                    .await
            }
            "find_template" => {
                let name = required_string_arg(args, 0, "find_template")?;
                match self.locate_template(name.clone()).await? {
                    Location::Found(point) => {
                        session.set_last_template(point);
                        Ok(format!("pos at x:{} y:{}", point.x, point.y))
                    }
                    Location::NotFound => Ok(format!("template {name} not visible")),
                }
            }
            "find_text" => {
                let goal = required_string_arg(args, 0, "find_text")?;
                let mask = mask_from_args(args);
                match self.locate_text(goal.clone(), mask).await? {
                    Location::Found(point) => {
                        session.set_last_text(point);
                        Ok(format!("text {goal} at x:{} y:{}", point.x, point.y))
                    }
                    Location::NotFound => Ok(format!("text {goal} not visible")),
                }
            }
            "check_template" => {
                let name = required_string_arg(args, 0, "check_template")?;
                let point = self.wait_for_template(name, cancel.clone()).await?;
                session.set_last_template(point);
                Ok(format!("pos at x:{} y:{}", point.x, point.y))
            }
            "check_text" => {
                let goal = required_string_arg(args, 0, "check_text")?;
                let point = self.wait_for_text(goal, cancel.clone()).await?;
                session.set_last_text(point);
                Ok(format!("pos at x:{} y:{}", point.x, point.y))
            }
            "click_object" => self.click_object(args, session).await,
            other => Err(AutomationError::UnknownAction(other.to_string())),
        }
    }

    /// Tap the most recently located object, or one of the fixed navigation
    /// shortcuts. Before anything was located this is a no-op status, not an
    /// error and not a tap.
    async fn click_object(
        &self,
        args: &[ArgValue],
        session: &ExecutionSession,
    ) -> Result<String, AutomationError> {
        let kind = required_string_arg(args, 0, "click_object")?;
        match kind.as_str() {
            "template" => match session.last_template() {
                Some(point) => self.gateway.tap(point.x, point.y).await,
                None => Ok("no template located yet".to_string()),
            },
            "text" => match session.last_text() {
                Some(point) => self.gateway.tap(point.x, point.y).await,
                None => Ok("no text located yet".to_string()),
            },
            "home" => self.gateway.press_home().await,
            "last_page" => self.gateway.press_back().await,
            other => Ok(format!("nothing to do for object kind {other:?}")),
        }
    }

    // Localization is CPU-bound; it runs on a blocking thread so the runtime
    // keeps serving other tasks while this run is busy.

    async fn locate_template(&self, name: String) -> Result<Location, AutomationError> {
        let locator = self.template_locator.clone();
        task::spawn_blocking(move || locator.locate(&name))
            .await
            .map_err(|e| AutomationError::Internal(format!("locate task join error: {e}")))?
    }

    async fn locate_text(
        &self,
        goal: String,
        mask: Option<MaskRect>,
    ) -> Result<Location, AutomationError> {
        let locator = self.text_locator.clone();
        task::spawn_blocking(move || locator.locate(&goal, mask))
            .await
            .map_err(|e| AutomationError::Internal(format!("locate task join error: {e}")))?
    }

    async fn wait_for_template(
        &self,
        name: String,
        cancel: CancellationToken,
    ) -> Result<Point, AutomationError> {
        let locator = self.template_locator.clone();
        let interval = self.config.poll_interval;
        let timeout = self.config.poll_timeout;
        task::spawn_blocking(move || {
            let target = format!("template {name:?}");
            poll_until_found(|| locator.locate(&name), &target, interval, timeout, &cancel)
        })
        .await
        .map_err(|e| AutomationError::Internal(format!("poll task join error: {e}")))?
    }

    async fn wait_for_text(
        &self,
        goal: String,
        cancel: CancellationToken,
    ) -> Result<Point, AutomationError> {
        let locator = self.text_locator.clone();
        let interval = self.config.poll_interval;
        let timeout = self.config.poll_timeout;
        task::spawn_blocking(move || {
            let target = format!("text {goal:?}");
            poll_until_found(
                || locator.locate(&goal, None),
                &target,
                interval,
                timeout,
                &cancel,
            )
        })
        .await
        .map_err(|e| AutomationError::Internal(format!("poll task join error: {e}")))?
    }
}

fn int_arg(args: &[ArgValue], index: usize, default: i64) -> i64 {
    args.get(index).and_then(ArgValue::as_i64).unwrap_or(default)
}

/// Stringified view of a positional argument, empty when absent. Numbers are
/// accepted where text is expected, the way dynamic scripts pass them.
fn string_arg(args: &[ArgValue], index: usize) -> String {
    args.get(index).map(|v| v.to_string()).unwrap_or_default()
}

fn required_string_arg(
    args: &[ArgValue],
    index: usize,
    action: &str,
) -> Result<String, AutomationError> {
    args.get(index).map(|v| v.to_string()).ok_or_else(|| {
        AutomationError::InvalidArgument(format!("{action} requires a target argument"))
    })
}

/// `find_text(goal, x0, y0, x1, y1)` carries an optional mask rectangle in
/// the trailing arguments; anything short of all four coordinates means no
/// mask.
fn mask_from_args(args: &[ArgValue]) -> Option<MaskRect> {
    if args.len() < 5 {
        return None;
    }
    let coord = |index: usize| int_arg(args, index, 0).max(0) as u32;
    Some(MaskRect {
        x0: coord(1),
        y0: coord(2),
        x1: coord(3),
        y1: coord(4),
    })
}
