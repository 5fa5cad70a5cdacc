use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, warn};

use crate::error::ExecError;
use crate::hands::BrowserControl;
use crate::monitor::RuntimeMonitor;
use crate::types::{Action, NAV_SETTLE_MS, Plan, StepEvent};

/// Executes plans against the browser session it owns, one action at a time,
/// in index order. Emits exactly one `started` and one terminal event per
/// step attempt and halts the plan on the first failure.
///
/// The session outlives any single `execute` call: a revised plan from
/// recovery runs against the same browser, not a fresh one.
pub struct PlanExecutor {
    monitor: Arc<RuntimeMonitor>,
    browser: Option<Box<dyn BrowserControl + Send>>,
    screenshot_dir: PathBuf,
    element_timeout: Duration,
    nav_settle: Duration,
}

impl PlanExecutor {
    pub fn new(
        monitor: Arc<RuntimeMonitor>,
        browser: Box<dyn BrowserControl + Send>,
        screenshot_dir: impl Into<PathBuf>,
        element_timeout: Duration,
    ) -> Self {
        let screenshot_dir = screenshot_dir.into();
        if let Err(err) = std::fs::create_dir_all(&screenshot_dir) {
            warn!(%err, dir = %screenshot_dir.display(), "could not create screenshot directory");
        }
        Self {
            monitor,
            browser: Some(browser),
            screenshot_dir,
            element_timeout,
            nav_settle: Duration::from_millis(NAV_SETTLE_MS),
        }
    }

    /// Override the post-navigation settle delay.
    pub fn nav_settle(mut self, delay: Duration) -> Self {
        self.nav_settle = delay;
        self
    }

    /// Execute every step of the plan in order. Returns true only if all
    /// steps succeeded; stops at the first failure without attempting the
    /// rest.
    pub fn execute(&mut self, plan: &Plan) -> bool {
        for (index, action) in plan.steps.iter().enumerate() {
            let url = self.current_url();
            self.monitor.emit(StepEvent::started(index, action, url));

            match self.dispatch(index, action) {
                Ok(screenshot_path) => {
                    let url = self.current_url();
                    self.monitor
                        .emit(StepEvent::succeeded(index, action, url, screenshot_path));
                }
                Err(err) => {
                    let screenshot_path = self.capture_failure_screenshot(index);
                    let url = self.current_url();
                    self.monitor.emit(StepEvent::failed(
                        index,
                        action,
                        url,
                        err.to_string(),
                        screenshot_path,
                    ));
                    return false;
                }
            }
        }
        true
    }

    /// Run one action against the browser. Returns the screenshot path for
    /// the screenshot action, which is attached to the success event.
    fn dispatch(&mut self, index: usize, action: &Action) -> Result<Option<String>, ExecError> {
        let browser = self
            .browser
            .as_deref_mut()
            .ok_or(ExecError::BrowserUnavailable)?;

        match action {
            Action::Open { url } => {
                browser.navigate(url)?;
                // Initial page load has no completion signal; give it a head
                // start before the next step looks for elements.
                thread::sleep(self.nav_settle);
                Ok(None)
            }
            Action::Type { selector, value } => {
                browser.find_and_type(selector, value, self.element_timeout)?;
                Ok(None)
            }
            Action::Click { selector } => {
                browser.find_and_click(selector, self.element_timeout)?;
                Ok(None)
            }
            Action::Wait { seconds } => {
                thread::sleep(Duration::from_secs(*seconds));
                Ok(None)
            }
            Action::Screenshot => {
                let path = screenshot_file(&self.screenshot_dir, &format!("step_{index}"));
                browser.screenshot(&path)?;
                Ok(Some(path.display().to_string()))
            }
        }
    }

    fn capture_failure_screenshot(&mut self, index: usize) -> Option<String> {
        let path = screenshot_file(&self.screenshot_dir, &format!("error_step_{index}"));
        match self.browser.as_deref_mut() {
            Some(browser) => match browser.screenshot(&path) {
                Ok(()) => Some(path.display().to_string()),
                Err(err) => {
                    warn!(%err, "could not capture failure screenshot");
                    None
                }
            },
            None => None,
        }
    }

    /// Current browser URL, for diagnostics and event records.
    pub fn current_url(&self) -> Option<String> {
        self.browser.as_ref().and_then(|b| b.current_url())
    }

    /// Current page HTML, sampled by the orchestrator for recovery context.
    pub fn page_source(&self) -> Option<String> {
        self.browser.as_ref().and_then(|b| b.page_source())
    }

    /// Drop the browser session. Subsequent steps fail with
    /// `BrowserUnavailable`.
    pub fn close(&mut self) {
        if self.browser.take().is_some() {
            debug!("browser session closed");
        }
    }
}

fn screenshot_file(dir: &Path, name: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{name}_{timestamp}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hands::mock::MockScript;
    use crate::types::{ActionKind, StepStatus};

    fn executor_with(script: &MockScript, monitor: &Arc<RuntimeMonitor>) -> PlanExecutor {
        PlanExecutor::new(
            Arc::clone(monitor),
            Box::new(script.browser()),
            std::env::temp_dir().join("webpilot-tests"),
            Duration::from_millis(10),
        )
        .nav_settle(Duration::ZERO)
    }

    fn three_step_plan() -> Plan {
        Plan {
            steps: vec![
                Action::Open {
                    url: "https://a.test".into(),
                },
                Action::Type {
                    selector: "#q".into(),
                    value: "rust".into(),
                },
                Action::Click {
                    selector: "#go".into(),
                },
            ],
        }
    }

    #[test]
    fn full_success_emits_started_success_pairs_in_order() {
        let script = MockScript::default();
        let monitor = Arc::new(RuntimeMonitor::new());
        let mut executor = executor_with(&script, &monitor);

        assert!(executor.execute(&three_step_plan()));

        let log = monitor.log();
        assert_eq!(log.len(), 6);
        for (i, pair) in log.chunks(2).enumerate() {
            assert_eq!(pair[0].step_index, i);
            assert_eq!(pair[0].status, StepStatus::Started);
            assert_eq!(pair[1].step_index, i);
            assert_eq!(pair[1].status, StepStatus::Success);
        }
    }

    #[test]
    fn failure_halts_the_plan_and_emits_one_failed_event() {
        let script = MockScript::failing("#q");
        let monitor = Arc::new(RuntimeMonitor::new());
        let mut executor = executor_with(&script, &monitor);

        assert!(!executor.execute(&three_step_plan()));

        let log = monitor.log();
        // open started/success, then type started/failed; click never runs.
        assert_eq!(log.len(), 4);
        assert_eq!(log[2].status, StepStatus::Started);
        assert_eq!(log[3].status, StepStatus::Failed);
        assert_eq!(log[3].step_index, 1);
        assert!(log[3].error.as_deref().unwrap().contains("#q"));
        assert!(log[3].screenshot_path.is_some());
        assert!(!log.iter().any(|e| e.step_index == 2));
        assert!(!script.calls().iter().any(|c| c.starts_with("click")));
    }

    #[test]
    fn started_event_carries_action_fields_and_browser_url() {
        let script = MockScript::default();
        let monitor = Arc::new(RuntimeMonitor::new());
        let mut executor = executor_with(&script, &monitor);

        executor.execute(&three_step_plan());

        let log = monitor.log();
        // Before the first navigation there is no URL yet.
        assert_eq!(log[0].url, None);
        // The type step starts on the page the open step landed on.
        assert_eq!(log[2].url.as_deref(), Some("https://a.test"));
        assert_eq!(log[2].selector.as_deref(), Some("#q"));
        assert_eq!(log[2].value.as_deref(), Some("rust"));
    }

    #[test]
    fn screenshot_action_attaches_path_to_success_event() {
        let script = MockScript::default();
        let monitor = Arc::new(RuntimeMonitor::new());
        let mut executor = executor_with(&script, &monitor);

        let plan = Plan {
            steps: vec![Action::Screenshot],
        };
        assert!(executor.execute(&plan));

        let log = monitor.log();
        assert_eq!(log[1].status, StepStatus::Success);
        assert_eq!(log[1].action, ActionKind::Screenshot);
        assert!(
            log[1]
                .screenshot_path
                .as_deref()
                .unwrap()
                .contains("step_0")
        );
    }

    #[test]
    fn browser_state_persists_across_execute_calls() {
        let script = MockScript::default();
        let monitor = Arc::new(RuntimeMonitor::new());
        let mut executor = executor_with(&script, &monitor);

        let first = Plan {
            steps: vec![Action::Open {
                url: "https://a.test".into(),
            }],
        };
        assert!(executor.execute(&first));

        let second = Plan {
            steps: vec![Action::Click {
                selector: "#go".into(),
            }],
        };
        assert!(executor.execute(&second));

        // The second run started on the URL the first run navigated to.
        let log = monitor.log();
        assert_eq!(log[2].url.as_deref(), Some("https://a.test"));
    }

    #[test]
    fn missing_browser_fails_the_first_step() {
        let script = MockScript::default();
        let monitor = Arc::new(RuntimeMonitor::new());
        let mut executor = executor_with(&script, &monitor);
        executor.close();

        assert!(!executor.execute(&three_step_plan()));

        let log = monitor.log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].status, StepStatus::Failed);
        assert!(
            log[1]
                .error
                .as_deref()
                .unwrap()
                .contains("no browser session")
        );
        // No session means no screenshot either.
        assert!(log[1].screenshot_path.is_none());
    }
}
