use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::json;

use crate::types::{ActionKind, StepEvent, StepStatus};

/// Output format for persisted reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Html,
    Json,
    Text,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
            ReportFormat::Text => "txt",
        }
    }
}

/// Overall run status derived from the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// One failed step, as surfaced in summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub step: usize,
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
}

/// Stateless aggregation over an execution log. Recomputed on demand and
/// never persisted as authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub duration: String,
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub success_rate: f64,
    pub urls_visited: Vec<String>,
    pub errors: Vec<FailureRecord>,
    pub status: RunStatus,
}

/// Renders a log snapshot into a summary and three serializations of it.
/// Every format derives from the same `Summary`, so the numbers can never
/// disagree between them.
#[derive(Debug)]
pub struct ExecutionReporter {
    events: Vec<StepEvent>,
}

impl ExecutionReporter {
    pub fn new(events: Vec<StepEvent>) -> Self {
        Self { events }
    }

    /// Rebuild a reporter from a persisted execution log, so reports can be
    /// regenerated long after the run without a browser or an API key.
    pub fn from_log_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read execution log: {}", path.display()))?;
        let events: Vec<StepEvent> = serde_json::from_str(&raw)
            .with_context(|| format!("not a valid execution log: {}", path.display()))?;
        Ok(Self::new(events))
    }

    pub fn summary(&self) -> Summary {
        let total_steps = self.count(StepStatus::Started);
        let successful_steps = self.count(StepStatus::Success);
        let failed_steps = self.count(StepStatus::Failed);

        let success_rate = if total_steps > 0 {
            let rate = successful_steps as f64 / total_steps as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };

        // Distinct URLs from successful events, in first-seen order.
        let mut urls_visited: Vec<String> = Vec::new();
        for event in &self.events {
            if event.status == StepStatus::Success {
                if let Some(url) = &event.url {
                    if !urls_visited.iter().any(|seen| seen == url) {
                        urls_visited.push(url.clone());
                    }
                }
            }
        }

        let errors = self
            .events
            .iter()
            .filter(|e| e.status == StepStatus::Failed)
            .map(|e| FailureRecord {
                step: e.step_index,
                action: e.action,
                error: e.error.clone(),
                screenshot: e.screenshot_path.clone(),
            })
            .collect();

        let start = self.events.first().map(|e| e.timestamp);

        Summary {
            execution_id: self.execution_id(start),
            timestamp: start,
            duration: self.duration(),
            total_steps,
            successful_steps,
            failed_steps,
            success_rate,
            urls_visited,
            errors,
            status: if failed_steps == 0 {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            },
        }
    }

    fn count(&self, status: StepStatus) -> usize {
        self.events.iter().filter(|e| e.status == status).count()
    }

    fn duration(&self) -> String {
        let (Some(first), Some(last)) = (self.events.first(), self.events.last()) else {
            return "N/A".to_string();
        };

        let seconds = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
        if seconds < 60.0 {
            format!("{seconds:.1}s")
        } else if seconds < 3600.0 {
            format!("{:.1}m", seconds / 60.0)
        } else {
            format!("{:.1}h", seconds / 3600.0)
        }
    }

    /// Deterministic for a given log: derived from the first event timestamp,
    /// so re-rendering the same log yields the same id. Falls back to the
    /// wall clock only for an empty log.
    fn execution_id(&self, start: Option<DateTime<Utc>>) -> String {
        match start {
            Some(ts) => format!("exec_{}", ts.format("%Y%m%dT%H%M%S")),
            None => format!("exec_{}", Utc::now().format("%Y%m%d%H%M%S")),
        }
    }

    pub fn render_json(&self) -> String {
        let report = json!({
            "summary": self.summary(),
            "detailed_steps": self.events,
            "metadata": {
                "report_generated": Utc::now().to_rfc3339(),
                "format": "json",
                "version": "1.0",
            },
        });
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn render_text(&self) -> String {
        let summary = self.summary();
        let rule = "-".repeat(70);
        let banner = "=".repeat(70);

        let mut lines = vec![
            banner.clone(),
            "EXECUTION REPORT".to_string(),
            banner.clone(),
            String::new(),
            format!("Execution ID: {}", summary.execution_id),
            format!("Duration: {}", summary.duration),
            String::new(),
            "SUMMARY".to_string(),
            rule.clone(),
            format!("Total Steps:      {}", summary.total_steps),
            format!("Successful Steps: {}", summary.successful_steps),
            format!("Failed Steps:     {}", summary.failed_steps),
            format!("Success Rate:     {}%", summary.success_rate),
            format!(
                "Status:           {}",
                format!("{:?}", summary.status).to_uppercase()
            ),
            String::new(),
            "EXECUTION STEPS".to_string(),
            rule.clone(),
        ];

        for event in &self.events {
            if event.status == StepStatus::Started {
                continue;
            }
            let symbol = if event.status == StepStatus::Success {
                "✓"
            } else {
                "✗"
            };
            let mut line = format!("{symbol} Step {}: {}", event.step_index, event.action);
            if let Some(selector) = &event.selector {
                line.push_str(&format!(" ({selector})"));
            }
            lines.push(line);
            if event.status == StepStatus::Failed {
                if let Some(error) = &event.error {
                    lines.push(format!("  Error: {error}"));
                }
            }
        }

        if !summary.errors.is_empty() {
            lines.push(String::new());
            lines.push("ERRORS".to_string());
            lines.push(rule.clone());
            for failure in &summary.errors {
                lines.push(format!("Step {}: {}", failure.step, failure.action));
                if let Some(error) = &failure.error {
                    lines.push(format!("  Error: {error}"));
                }
                if let Some(screenshot) = &failure.screenshot {
                    lines.push(format!("  Screenshot: {screenshot}"));
                }
                lines.push(String::new());
            }
        }

        if !summary.urls_visited.is_empty() {
            lines.push("URLS VISITED".to_string());
            lines.push(rule.clone());
            for url in &summary.urls_visited {
                lines.push(format!("  - {url}"));
            }
        }

        lines.push(String::new());
        lines.push(banner);
        lines.join("\n")
    }

    pub fn render_html(&self) -> String {
        let summary = self.summary();

        let status_card = format!("{:?}", summary.status).to_uppercase();
        let mut html = format!(
            r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Execution Report - {id}</title>
<style>
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  body {{
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    background: #f5f5f5;
    padding: 20px;
    line-height: 1.6;
  }}
  .container {{
    max-width: 1200px;
    margin: 0 auto;
    background: white;
    border-radius: 8px;
    box-shadow: 0 2px 4px rgba(0,0,0,0.1);
    overflow: hidden;
  }}
  .header {{
    background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
    color: white;
    padding: 30px;
  }}
  .header h1 {{ font-size: 28px; margin-bottom: 10px; }}
  .header p {{ opacity: 0.9; font-size: 14px; }}
  .summary {{
    display: grid;
    grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
    gap: 20px;
    padding: 30px;
    background: #f9fafb;
  }}
  .stat-card {{
    background: white;
    padding: 20px;
    border-radius: 8px;
    border-left: 4px solid #667eea;
  }}
  .stat-card.success {{ border-left-color: #10b981; }}
  .stat-card.failed {{ border-left-color: #ef4444; }}
  .stat-card h3 {{ font-size: 14px; color: #6b7280; margin-bottom: 8px; }}
  .stat-card .value {{ font-size: 32px; font-weight: 700; color: #1f2937; }}
  .stat-card.success .value {{ color: #10b981; }}
  .stat-card.failed .value {{ color: #ef4444; }}
  .section {{ padding: 30px; }}
  .section h2 {{
    font-size: 20px;
    margin-bottom: 20px;
    border-bottom: 2px solid #e5e7eb;
    padding-bottom: 10px;
  }}
  .step {{
    padding: 15px;
    margin-bottom: 10px;
    background: #f9fafb;
    border-radius: 6px;
    border-left: 3px solid #e5e7eb;
  }}
  .step.success {{ border-left-color: #10b981; background: #f0fdf4; }}
  .step.failed {{ border-left-color: #ef4444; background: #fef2f2; }}
  .step-title {{ font-weight: 600; }}
  .step-details {{ font-size: 14px; color: #6b7280; }}
  .error-text {{
    color: #991b1b;
    font-size: 13px;
    font-family: 'Courier New', monospace;
    margin-top: 8px;
  }}
  .url-list {{ list-style: none; }}
  .url-list li {{
    padding: 10px;
    background: #f9fafb;
    margin-bottom: 8px;
    border-radius: 4px;
    font-size: 14px;
  }}
  .footer {{
    text-align: center;
    padding: 20px;
    background: #f9fafb;
    color: #6b7280;
    font-size: 14px;
  }}
</style>
</head>
<body>
<div class="container">
  <div class="header">
    <h1>Execution Report</h1>
    <p>Execution ID: {id}</p>
    <p>Duration: {duration}</p>
  </div>
  <div class="summary">
    <div class="stat-card"><h3>Total Steps</h3><div class="value">{total}</div></div>
    <div class="stat-card success"><h3>Successful</h3><div class="value">{successful}</div></div>
    <div class="stat-card failed"><h3>Failed</h3><div class="value">{failed}</div></div>
    <div class="stat-card"><h3>Success Rate</h3><div class="value">{rate}%</div></div>
    <div class="stat-card"><h3>Status</h3><div class="value" style="font-size: 20px;">{status}</div></div>
  </div>
  <div class="section">
    <h2>Execution Steps</h2>
"##,
            id = summary.execution_id,
            duration = summary.duration,
            total = summary.total_steps,
            successful = summary.successful_steps,
            failed = summary.failed_steps,
            rate = summary.success_rate,
            status = status_card,
        );

        for event in &self.events {
            if event.status == StepStatus::Started {
                continue;
            }
            let class = if event.status == StepStatus::Success {
                "success"
            } else {
                "failed"
            };
            html.push_str(&format!(
                r#"    <div class="step {class}"><div class="step-title">Step {}: {}</div><div class="step-details">"#,
                event.step_index,
                event.action.to_string().to_uppercase(),
            ));
            if let Some(selector) = &event.selector {
                html.push_str(&format!("<p><strong>Selector:</strong> {}</p>", escape(selector)));
            }
            if let Some(url) = &event.url {
                html.push_str(&format!("<p><strong>URL:</strong> {}</p>", escape(url)));
            }
            if event.status == StepStatus::Failed {
                if let Some(error) = &event.error {
                    html.push_str(&format!(r#"<div class="error-text">{}</div>"#, escape(error)));
                }
            }
            html.push_str("</div></div>\n");
        }
        html.push_str("  </div>\n");

        if !summary.errors.is_empty() {
            html.push_str(&format!(
                "  <div class=\"section\">\n    <h2>Errors ({})</h2>\n",
                summary.errors.len()
            ));
            for failure in &summary.errors {
                html.push_str(&format!(
                    r#"    <div class="step failed"><div class="step-title">Step {}: {}</div>"#,
                    failure.step,
                    failure.action.to_string().to_uppercase(),
                ));
                if let Some(error) = &failure.error {
                    html.push_str(&format!(r#"<div class="error-text">{}</div>"#, escape(error)));
                }
                if let Some(screenshot) = &failure.screenshot {
                    html.push_str(&format!(
                        "<p class=\"step-details\">Screenshot: {}</p>",
                        escape(screenshot)
                    ));
                }
                html.push_str("</div>\n");
            }
            html.push_str("  </div>\n");
        }

        if !summary.urls_visited.is_empty() {
            html.push_str(&format!(
                "  <div class=\"section\">\n    <h2>URLs Visited ({})</h2>\n    <ul class=\"url-list\">\n",
                summary.urls_visited.len()
            ));
            for url in &summary.urls_visited {
                html.push_str(&format!("      <li>{}</li>\n", escape(url)));
            }
            html.push_str("    </ul>\n  </div>\n");
        }

        html.push_str(
            "  <div class=\"footer\"><p>AI Browser Automation Report</p></div>\n</div>\n</body>\n</html>\n",
        );
        html
    }

    /// Render and persist one report into `output_dir`, named by wall-clock
    /// time and the format's extension. Returns the written path.
    pub fn write(&self, format: ReportFormat, output_dir: &Path) -> Result<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = output_dir.join(format!("report_{timestamp}.{}", format.extension()));
        match format {
            ReportFormat::Html => self.write_html(&path)?,
            ReportFormat::Json => self.write_json(&path)?,
            ReportFormat::Text => self.write_text(&path)?,
        }
        Ok(path)
    }

    pub fn write_html(&self, path: &Path) -> Result<()> {
        write_report(path, &self.render_html())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_report(path, &self.render_json())
    }

    pub fn write_text(&self, path: &Path) -> Result<()> {
        write_report(path, &self.render_text())
    }
}

fn write_report(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
