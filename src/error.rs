use thiserror::Error;

/// Failures from the planning boundary. These are terminal for a run whether
/// they come from the initial `plan` call or a recovery `refine` call; the
/// orchestrator never retries planning itself.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planner request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("planner API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("planner response contained no content")]
    MissingContent,

    /// The reply was not a valid plan: not JSON, an unknown action kind, or a
    /// step missing a required field for its kind.
    #[error("planner returned an invalid plan: {0}")]
    InvalidPlan(String),
}

/// Failures raised while executing a single step. Each one is captured as a
/// `failed` event and handed to the orchestrator for a retry decision; none
/// of them abort the run directly.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("element not found within timeout: {selector}")]
    ElementNotFound { selector: String },

    #[error("element not clickable within timeout: {selector}")]
    ElementNotClickable { selector: String },

    #[error("no browser session available")]
    BrowserUnavailable,

    #[error("browser error: {0}")]
    Browser(String),

    #[error("screenshot capture failed: {0}")]
    Screenshot(String),
}
