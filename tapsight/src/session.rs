//! Per-run execution state and result aggregation.

use crate::errors::AutomationError;
use crate::locator::Point;
use crate::script::{ActionCall, ArgValue};
use serde::Serialize;

/// Record of one dispatched call.
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome {
    pub name: String,
    pub args: Vec<ArgValue>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of one script run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub outcomes: Vec<CallOutcome>,
    pub total_calls: usize,
    pub successful_calls: usize,
    pub errors: Vec<String>,
}

/// Mutable state for one script run.
///
/// Carries the most recently located template/text positions between calls
/// (`None` until a locator succeeds) and the append-only outcome list. One
/// session belongs to exactly one run; it is never shared.
pub struct ExecutionSession {
    total_calls: usize,
    last_template: Option<Point>,
    last_text: Option<Point>,
    outcomes: Vec<CallOutcome>,
    errors: Vec<String>,
}

impl ExecutionSession {
    pub fn new(total_calls: usize) -> Self {
        Self {
            total_calls,
            last_template: None,
            last_text: None,
            outcomes: Vec::with_capacity(total_calls),
            errors: Vec::new(),
        }
    }

    pub fn last_template(&self) -> Option<Point> {
        self.last_template
    }

    pub fn last_text(&self) -> Option<Point> {
        self.last_text
    }

    pub fn set_last_template(&mut self, point: Point) {
        self.last_template = Some(point);
    }

    pub fn set_last_text(&mut self, point: Point) {
        self.last_text = Some(point);
    }

    pub fn record_success(&mut self, call: &ActionCall, value: String) {
        self.outcomes.push(CallOutcome {
            name: call.name.clone(),
            args: call.args.clone(),
            success: true,
            value: Some(value),
            error: None,
        });
    }

    pub fn record_failure(&mut self, call: &ActionCall, error: &AutomationError) {
        self.errors.push(format!(
            "Call {}({}) failed: {error}",
            call.name,
            format_args_list(&call.args)
        ));
        self.outcomes.push(CallOutcome {
            name: call.name.clone(),
            args: call.args.clone(),
            success: false,
            value: None,
            error: Some(error.to_string()),
        });
    }

    pub fn into_report(self) -> ExecutionReport {
        let successful_calls = self.outcomes.iter().filter(|o| o.success).count();
        ExecutionReport {
            success: self.errors.is_empty(),
            outcomes: self.outcomes,
            total_calls: self.total_calls,
            successful_calls,
            errors: self.errors,
        }
    }
}

fn format_args_list(args: &[ArgValue]) -> String {
    args.iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
