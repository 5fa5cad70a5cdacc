use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::types::{StepEvent, StepStatus};

/// Callback invoked synchronously for every emitted event.
pub type ObserverFn = Arc<dyn Fn(&StepEvent) + Send + Sync>;

/// Handle returned by `subscribe`, used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Point-in-time rollup over the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    NotStarted,
    Active {
        total_steps: usize,
        completed: usize,
        failed: usize,
        current_step: usize,
    },
}

/// Append-only event log plus a synchronous observer bus.
///
/// `emit` first appends, then notifies; a panicking observer is caught and
/// logged so it can neither lose the event nor starve later observers.
#[derive(Default)]
pub struct RuntimeMonitor {
    state: Mutex<MonitorState>,
    observers: Mutex<HashMap<ObserverId, ObserverFn>>,
    next_observer: AtomicU64,
}

#[derive(Default)]
struct MonitorState {
    events: Vec<StepEvent>,
    current_step: Option<usize>,
}

impl RuntimeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&StepEvent) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().unwrap().insert(id, Arc::new(observer));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.observers.lock().unwrap().remove(&id);
    }

    /// Append an event and notify every observer with it.
    pub fn emit(&self, event: StepEvent) {
        {
            let mut state = self.state.lock().unwrap();
            state.current_step = Some(event.step_index);
            state.events.push(event.clone());
        }

        // Snapshot the callbacks so none of them runs under the observers
        // lock; an observer may subscribe or unsubscribe reentrantly.
        let callbacks: Vec<(ObserverId, ObserverFn)> = {
            let observers = self.observers.lock().unwrap();
            observers
                .iter()
                .map(|(id, observer)| (*id, Arc::clone(observer)))
                .collect()
        };
        for (id, observer) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                warn!(observer = id.0, "observer panicked during emit, continuing");
            }
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        let state = self.state.lock().unwrap();
        if state.events.is_empty() {
            return ExecutionStatus::NotStarted;
        }

        let total_steps = state
            .events
            .iter()
            .map(|e| e.step_index)
            .max()
            .unwrap_or(0)
            + 1;
        let completed = state
            .events
            .iter()
            .filter(|e| e.status == StepStatus::Success)
            .count();
        let failed = state
            .events
            .iter()
            .filter(|e| e.status == StepStatus::Failed)
            .count();

        ExecutionStatus::Active {
            total_steps,
            completed,
            failed,
            current_step: state.current_step.unwrap_or(0),
        }
    }

    /// Snapshot of the full ordered event sequence.
    pub fn log(&self) -> Vec<StepEvent> {
        self.state.lock().unwrap().events.clone()
    }
}

/// Default observer: writes each event to the log output with a status symbol.
pub fn console_observer(event: &StepEvent) {
    let symbol = match event.status {
        StepStatus::Started => "⏳",
        StepStatus::Success => "✓",
        StepStatus::Failed => "✗",
    };

    let mut line = format!("{symbol} Step {}: {}", event.step_index, event.action);
    if let Some(selector) = &event.selector {
        line.push_str(&format!(" ({selector})"));
    }

    match (&event.status, &event.error) {
        (StepStatus::Failed, Some(error)) => warn!("{line} - {error}"),
        (StepStatus::Failed, None) => warn!("{line}"),
        _ => info!("{line}"),
    }
}
