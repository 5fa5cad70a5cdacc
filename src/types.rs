use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single atomic browser action within a plan.
///
/// The tag/field layout matches what the planner is prompted to produce, so
/// deserialization doubles as plan validation: an unknown action kind or a
/// missing required field is rejected before execution ever starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Open { url: String },
    Type { selector: String, value: String },
    Click { selector: String },
    Wait { seconds: u64 },
    Screenshot,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Open { .. } => ActionKind::Open,
            Action::Type { .. } => ActionKind::Type,
            Action::Click { .. } => ActionKind::Click,
            Action::Wait { .. } => ActionKind::Wait,
            Action::Screenshot => ActionKind::Screenshot,
        }
    }

    pub fn selector(&self) -> Option<&str> {
        match self {
            Action::Type { selector, .. } | Action::Click { selector } => Some(selector),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Action::Type { value, .. } => Some(value),
            _ => None,
        }
    }

    /// One-line description used when logging a plan.
    pub fn describe(&self) -> String {
        match self {
            Action::Open { url } => format!("url={url}"),
            Action::Type { selector, value } => {
                let preview: String = value.chars().take(20).collect();
                format!("selector={selector}, value={preview}...")
            }
            Action::Click { selector } => format!("selector={selector}"),
            Action::Wait { seconds } => format!("seconds={seconds}"),
            Action::Screenshot => String::new(),
        }
    }
}

/// The kind of an action, without its payload. Used for event records and
/// report rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Open,
    Type,
    Click,
    Wait,
    Screenshot,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::Open => "open",
            ActionKind::Type => "type",
            ActionKind::Click => "click",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
        };
        f.write_str(name)
    }
}

/// An ordered sequence of actions produced by the planner for one instruction.
/// The step index is the execution order and the correlation key for events.
/// Recovery replaces a plan wholesale; plans are never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Action>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Lifecycle phase of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Started,
    Success,
    Failed,
}

/// One immutable lifecycle record for one step attempt. Every attempt emits
/// exactly one `started` and one terminal (`success` or `failed`) event; the
/// log is append-only, so a retried step index shows up more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub step_index: usize,
    pub action: ActionKind,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
}

impl StepEvent {
    /// Record the start of a step attempt. `url` is the browser's current
    /// URL before dispatch, when a session exists.
    pub fn started(step_index: usize, action: &Action, url: Option<String>) -> Self {
        Self {
            step_index,
            action: action.kind(),
            status: StepStatus::Started,
            timestamp: Utc::now(),
            selector: action.selector().map(String::from),
            url,
            value: action.value().map(String::from),
            error: None,
            screenshot_path: None,
        }
    }

    pub fn succeeded(
        step_index: usize,
        action: &Action,
        url: Option<String>,
        screenshot_path: Option<String>,
    ) -> Self {
        Self {
            step_index,
            action: action.kind(),
            status: StepStatus::Success,
            timestamp: Utc::now(),
            selector: action.selector().map(String::from),
            url,
            value: None,
            error: None,
            screenshot_path,
        }
    }

    pub fn failed(
        step_index: usize,
        action: &Action,
        url: Option<String>,
        error: String,
        screenshot_path: Option<String>,
    ) -> Self {
        Self {
            step_index,
            action: action.kind(),
            status: StepStatus::Failed,
            timestamp: Utc::now(),
            selector: action.selector().map(String::from),
            url,
            value: None,
            error: Some(error),
            screenshot_path,
        }
    }
}

/// Settle delay after navigation. The browser capability has no reliable
/// navigation-complete signal, so a short unconditional pause bridges the gap.
pub const NAV_SETTLE_MS: u64 = 1000;

/// Upper bound on the page-source sample handed to the planner during
/// recovery.
pub const DOM_SAMPLE_MAX_CHARS: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_deserializes_from_tagged_json() {
        let action: Action =
            serde_json::from_str(r##"{"action":"type","selector":"#q","value":"rust"}"##).unwrap();
        assert_eq!(
            action,
            Action::Type {
                selector: "#q".into(),
                value: "rust".into()
            }
        );
        assert_eq!(action.kind(), ActionKind::Type);
        assert_eq!(action.selector(), Some("#q"));
        assert_eq!(action.value(), Some("rust"));
    }

    #[test]
    fn unknown_action_kind_is_rejected() {
        let result: Result<Action, _> =
            serde_json::from_str(r##"{"action":"hover","selector":"#q"}"##);
        assert!(result.is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result: Result<Action, _> = serde_json::from_str(r#"{"action":"open"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn screenshot_needs_no_fields() {
        let action: Action = serde_json::from_str(r#"{"action":"screenshot"}"#).unwrap();
        assert_eq!(action, Action::Screenshot);
    }

    #[test]
    fn event_serialization_omits_empty_fields() {
        let event = StepEvent::started(0, &Action::Screenshot, None);
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("selector").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "started");
        assert_eq!(json["action"], "screenshot");
    }
}
