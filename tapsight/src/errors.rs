use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Template not found in store: {0}")]
    TemplateNotFound(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Text recognition failed: {0}")]
    Recognition(String),

    #[error("Device gateway error: {0}")]
    Gateway(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
