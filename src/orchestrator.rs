use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::brain::Planner;
use crate::executor::PlanExecutor;
use crate::monitor::{ExecutionStatus, RuntimeMonitor};
use crate::reporter::{ExecutionReporter, ReportFormat, Summary};
use crate::types::{DOM_SAMPLE_MAX_CHARS, Plan, StepEvent, StepStatus};

/// Terminal state of one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        self == RunOutcome::Succeeded
    }
}

/// Drives one task end to end: plan, execute, and on execution failure ask
/// the planner for a complete replacement plan, bounded by the retry budget.
///
/// Planning and refinement failures are terminal immediately; recovery only
/// exists for execution failures. A revised plan always restarts from its own
/// step 0 against the same browser session.
pub struct Orchestrator {
    monitor: Arc<RuntimeMonitor>,
    planner: Box<dyn Planner>,
    executor: Arc<Mutex<PlanExecutor>>,
    auto_retry: bool,
    max_retries: u32,
}

impl Orchestrator {
    pub fn new(
        planner: Box<dyn Planner>,
        executor: PlanExecutor,
        monitor: Arc<RuntimeMonitor>,
        auto_retry: bool,
        max_retries: u32,
    ) -> Self {
        Self {
            monitor,
            planner,
            executor: Arc::new(Mutex::new(executor)),
            auto_retry,
            max_retries,
        }
    }

    /// Run one instruction to a terminal outcome. Performs at most
    /// `max_retries + 1` execution attempts.
    pub async fn execute_task(&mut self, instruction: &str) -> RunOutcome {
        info!(task = instruction, "planning");
        let mut plan = match self.planner.plan(instruction).await {
            Ok(plan) => plan,
            Err(err) => {
                error!(%err, "planning failed");
                return RunOutcome::Failed;
            }
        };
        info!(steps = plan.len(), "plan generated");
        log_plan(&plan);

        let mut retry_count: u32 = 0;
        loop {
            let success = self.run_plan(plan.clone()).await;

            if success {
                info!("task completed successfully");
                self.log_summary();
                return RunOutcome::Succeeded;
            }

            if !self.auto_retry || retry_count >= self.max_retries {
                warn!("task failed");
                self.log_summary();
                return RunOutcome::Failed;
            }

            info!(
                retry = retry_count + 1,
                max_retries = self.max_retries,
                "attempting recovery"
            );

            let Some(failure) = self.last_failure() else {
                // Execution reported failure without a failed event; nothing
                // to refine against, so retry the same plan.
                warn!("no failed event recorded, retrying unchanged plan");
                retry_count += 1;
                continue;
            };

            let dom_sample = self
                .executor
                .lock()
                .unwrap()
                .page_source()
                .map(|source| source.chars().take(DOM_SAMPLE_MAX_CHARS).collect::<String>());

            let refined = self
                .planner
                .refine(
                    &plan,
                    failure.step_index,
                    failure.error.as_deref().unwrap_or("unknown error"),
                    dom_sample.as_deref(),
                )
                .await;

            match refined {
                Ok(revised) => {
                    info!(steps = revised.len(), "planner proposed a revised plan");
                    plan = revised;
                }
                Err(err) => {
                    error!(%err, "recovery planning failed");
                    return RunOutcome::Failed;
                }
            }

            retry_count += 1;
        }
    }

    /// Run the executor off the async runtime; browser calls block.
    async fn run_plan(&self, plan: Plan) -> bool {
        let executor = Arc::clone(&self.executor);
        match tokio::task::spawn_blocking(move || executor.lock().unwrap().execute(&plan)).await {
            Ok(success) => success,
            Err(err) => {
                error!(%err, "execution task panicked");
                false
            }
        }
    }

    fn last_failure(&self) -> Option<StepEvent> {
        self.monitor
            .log()
            .into_iter()
            .rev()
            .find(|event| event.status == StepStatus::Failed)
    }

    fn log_summary(&self) {
        if let ExecutionStatus::Active {
            total_steps,
            completed,
            failed,
            ..
        } = self.monitor.status()
        {
            let rate = if total_steps > 0 {
                completed as f64 / total_steps as f64 * 100.0
            } else {
                0.0
            };
            info!(
                total_steps,
                completed,
                failed,
                success_rate = %format!("{rate:.1}%"),
                "execution summary"
            );
        }
    }

    /// Snapshot of the cumulative event log across all attempts.
    pub fn log(&self) -> Vec<StepEvent> {
        self.monitor.log()
    }

    pub fn save_log(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.log())?;
        info!(path = %path.display(), "execution log saved");
        Ok(())
    }

    pub fn summary(&self) -> Summary {
        ExecutionReporter::new(self.log()).summary()
    }

    /// Render and persist a report for the current log.
    pub fn generate_report(
        &self,
        format: ReportFormat,
        output_dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        ExecutionReporter::new(self.log()).write(format, output_dir)
    }

    /// Release the browser session.
    pub fn cleanup(&self) {
        self.executor.lock().unwrap().close();
    }
}

fn log_plan(plan: &Plan) {
    for (index, action) in plan.steps.iter().enumerate() {
        info!("  {index}. {:<12} {}", action.kind().to_string(), action.describe());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::PlanError;
    use crate::hands::mock::MockScript;
    use crate::types::Action;

    /// Planner that serves a queue of canned answers: the first for `plan`,
    /// the rest for successive `refine` calls.
    struct ScriptedPlanner {
        replies: Mutex<VecDeque<Result<Plan, PlanError>>>,
        refine_calls: Arc<AtomicUsize>,
    }

    impl ScriptedPlanner {
        fn new(replies: Vec<Result<Plan, PlanError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                refine_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn next_reply(&self) -> Result<Plan, PlanError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PlanError::MissingContent))
        }
    }

    #[async_trait]
    impl Planner for ScriptedPlanner {
        async fn plan(&self, _instruction: &str) -> Result<Plan, PlanError> {
            self.next_reply()
        }

        async fn refine(
            &self,
            _prior: &Plan,
            _failed_step: usize,
            _error: &str,
            _dom_sample: Option<&str>,
        ) -> Result<Plan, PlanError> {
            self.refine_calls.fetch_add(1, Ordering::SeqCst);
            self.next_reply()
        }
    }

    fn click_plan(selector: &str) -> Plan {
        Plan {
            steps: vec![Action::Click {
                selector: selector.into(),
            }],
        }
    }

    fn orchestrator_with(
        script: &MockScript,
        planner: ScriptedPlanner,
        monitor: &Arc<RuntimeMonitor>,
        auto_retry: bool,
        max_retries: u32,
    ) -> Orchestrator {
        let executor = PlanExecutor::new(
            Arc::clone(monitor),
            Box::new(script.browser()),
            std::env::temp_dir().join("webpilot-tests"),
            Duration::from_millis(10),
        )
        .nav_settle(Duration::ZERO);
        Orchestrator::new(Box::new(planner), executor, Arc::clone(monitor), auto_retry, max_retries)
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_refinement() {
        let script = MockScript::default();
        let monitor = Arc::new(RuntimeMonitor::new());
        let planner = ScriptedPlanner::new(vec![Ok(click_plan("#ok"))]);
        let mut orchestrator = orchestrator_with(&script, planner, &monitor, true, 2);

        let outcome = orchestrator.execute_task("click the button").await;

        assert_eq!(outcome, RunOutcome::Succeeded);
        let log = monitor.log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].status, StepStatus::Success);
    }

    #[tokio::test]
    async fn retry_budget_bounds_execution_attempts() {
        let script = MockScript::failing("#broken");
        let monitor = Arc::new(RuntimeMonitor::new());
        // Every attempt gets the same failing plan back.
        let planner = ScriptedPlanner::new(vec![
            Ok(click_plan("#broken")),
            Ok(click_plan("#broken")),
            Ok(click_plan("#broken")),
        ]);
        let mut orchestrator = orchestrator_with(&script, planner, &monitor, true, 2);

        let outcome = orchestrator.execute_task("click the broken button").await;

        assert_eq!(outcome, RunOutcome::Failed);
        let failed = monitor
            .log()
            .iter()
            .filter(|e| e.status == StepStatus::Failed)
            .count();
        // max_retries = 2 means at most 3 execution attempts.
        assert_eq!(failed, 3);
    }

    #[tokio::test]
    async fn recovery_replaces_the_plan_and_succeeds() {
        let script = MockScript::failing("#broken");
        let monitor = Arc::new(RuntimeMonitor::new());
        let planner = ScriptedPlanner::new(vec![
            Ok(click_plan("#broken")),
            Ok(click_plan("#fixed")),
        ]);
        let mut orchestrator = orchestrator_with(&script, planner, &monitor, true, 2);

        let outcome = orchestrator.execute_task("click the button").await;

        assert_eq!(outcome, RunOutcome::Succeeded);
        let log = monitor.log();
        // First attempt's pair is still in the log; retries append.
        assert_eq!(log.len(), 4);
        assert_eq!(log[1].status, StepStatus::Failed);
        assert_eq!(log[2].step_index, 0);
        assert_eq!(log[3].status, StepStatus::Success);
        assert_eq!(log[3].selector.as_deref(), Some("#fixed"));
    }

    #[tokio::test]
    async fn planning_failure_is_terminal_with_no_execution() {
        let script = MockScript::default();
        let monitor = Arc::new(RuntimeMonitor::new());
        let planner = ScriptedPlanner::new(vec![Err(PlanError::InvalidPlan("not json".into()))]);
        let mut orchestrator = orchestrator_with(&script, planner, &monitor, true, 2);

        let outcome = orchestrator.execute_task("do something").await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert!(monitor.log().is_empty());
        assert!(script.calls().is_empty());
    }

    #[tokio::test]
    async fn refinement_failure_aborts_the_run() {
        let script = MockScript::failing("#broken");
        let monitor = Arc::new(RuntimeMonitor::new());
        let planner = ScriptedPlanner::new(vec![
            Ok(click_plan("#broken")),
            Err(PlanError::MissingContent),
        ]);
        let mut orchestrator = orchestrator_with(&script, planner, &monitor, true, 5);

        let outcome = orchestrator.execute_task("click the button").await;

        assert_eq!(outcome, RunOutcome::Failed);
        let failed = monitor
            .log()
            .iter()
            .filter(|e| e.status == StepStatus::Failed)
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn auto_retry_disabled_fails_after_one_attempt() {
        let script = MockScript::failing("#broken");
        let monitor = Arc::new(RuntimeMonitor::new());
        let planner = ScriptedPlanner::new(vec![Ok(click_plan("#broken"))]);
        let refine_calls = Arc::clone(&planner.refine_calls);
        let mut orchestrator = orchestrator_with(&script, planner, &monitor, false, 5);

        let outcome = orchestrator.execute_task("click the button").await;

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(monitor.log().len(), 2);
        // The planner was never asked to refine.
        assert_eq!(refine_calls.load(Ordering::SeqCst), 0);
    }
}
