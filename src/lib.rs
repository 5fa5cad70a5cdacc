//! AI-planned browser automation: a planner turns a natural-language
//! instruction into an ordered action plan, the executor runs it against a
//! live Chrome session while emitting a per-step event stream, and the
//! orchestrator retries with AI-revised plans when a step fails.

pub mod brain;
pub mod config;
pub mod error;
pub mod executor;
pub mod hands;
pub mod monitor;
pub mod orchestrator;
pub mod reporter;
pub mod types;

pub use brain::{Brain, Planner};
pub use config::Config;
pub use error::{ExecError, PlanError};
pub use executor::PlanExecutor;
pub use hands::{BrowserControl, BrowserSession};
pub use monitor::{ExecutionStatus, ObserverId, RuntimeMonitor, console_observer};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use reporter::{ExecutionReporter, ReportFormat, Summary};
pub use types::{Action, ActionKind, Plan, StepEvent, StepStatus};
