//! Script-driven visual automation for mobile devices.
//!
//! An action script is a flat sequence of calls (taps, swipes, waits) whose
//! coordinates can be resolved visually: by matching a stored reference image
//! against the current screen frame, or by recognizing on-screen text and
//! searching it with a pattern. The [`ScriptEngine`] executes one script per
//! run, carrying the most recently located positions in an
//! [`ExecutionSession`] and aggregating every call's outcome into an
//! [`ExecutionReport`].
//!
//! Device control, screen capture, and text recognition are external
//! collaborators behind the [`DeviceGateway`], [`FrameStore`] and
//! [`TextRecognizer`] boundaries.

pub mod engine;
pub mod errors;
pub mod frame;
pub mod gateway;
pub mod locator;
pub mod script;
pub mod session;
pub mod templates;

pub use engine::{EngineConfig, ScriptEngine};
pub use errors::AutomationError;
pub use frame::{Frame, FrameStore};
pub use gateway::DeviceGateway;
pub use locator::{
    Location, MaskRect, MatchConfig, Point, RecognizedLine, Rect, TemplateLocator, TextConfig,
    TextLocator, TextRecognizer,
};
pub use script::{parse_script, ActionCall, ArgValue, ParsedScript, SkipReason, SkippedStatement};
pub use session::{CallOutcome, ExecutionReport, ExecutionSession};
pub use templates::TemplateStore;
