use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use webpilot::{
    Brain, BrowserSession, Config, ExecutionReporter, Orchestrator, PlanExecutor, ReportFormat,
    RuntimeMonitor, console_observer,
};

#[derive(Parser)]
#[command(
    name = "webpilot",
    about = "AI-planned browser automation with self-healing retries"
)]
struct Cli {
    /// Execute a single task and exit
    #[arg(long)]
    task: Option<String>,

    /// Run Chrome headless
    #[arg(long)]
    headless: bool,

    /// Report format(s) written after each task
    #[arg(long, value_enum, default_value = "html")]
    report_format: ReportArg,

    /// Regenerate reports from a saved execution log and exit
    #[arg(long, value_name = "FILE")]
    from_log: Option<PathBuf>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    show_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportArg {
    Html,
    Json,
    Text,
    All,
}

impl ReportArg {
    fn formats(self) -> Vec<ReportFormat> {
        match self {
            ReportArg::Html => vec![ReportFormat::Html],
            ReportArg::Json => vec![ReportFormat::Json],
            ReportArg::Text => vec![ReportFormat::Text],
            ReportArg::All => vec![ReportFormat::Html, ReportFormat::Json, ReportFormat::Text],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Regeneration works on a saved log; no browser, no API key.
    if let Some(log_path) = &cli.from_log {
        let reporter = ExecutionReporter::from_log_file(log_path)?;
        let report_dir = Config::report_dir_from_env();
        for format in cli.report_format.formats() {
            let path = reporter.write(format, &report_dir)?;
            info!(path = %path.display(), "report written");
        }
        return Ok(());
    }

    let mut config = Config::from_env()?;
    if cli.headless {
        config.headless = true;
    }

    if cli.show_config {
        config.log_settings();
        return Ok(());
    }

    // Chrome can take a while; launch off the runtime.
    let headless = config.headless;
    let session = tokio::task::spawn_blocking(move || BrowserSession::launch(headless))
        .await
        .map_err(|e| anyhow::anyhow!("browser launch panicked: {e}"))??;

    let monitor = Arc::new(RuntimeMonitor::new());
    monitor.subscribe(console_observer);

    let executor = PlanExecutor::new(
        Arc::clone(&monitor),
        Box::new(session),
        &config.screenshot_dir,
        config.element_timeout,
    );
    let planner = Brain::new(config.api_key.clone(), config.model.clone());
    let mut orchestrator = Orchestrator::new(
        Box::new(planner),
        executor,
        Arc::clone(&monitor),
        config.auto_retry,
        config.max_retries,
    );

    let success = match cli.task.as_deref() {
        Some(task) => run_task(&mut orchestrator, &config, cli.report_format, task).await,
        None => {
            run_interactive(&mut orchestrator, &config, cli.report_format).await?;
            true
        }
    };

    orchestrator.cleanup();

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_task(
    orchestrator: &mut Orchestrator,
    config: &Config,
    report_format: ReportArg,
    task: &str,
) -> bool {
    let outcome = orchestrator.execute_task(task).await;

    for format in report_format.formats() {
        match orchestrator.generate_report(format, &config.report_dir) {
            Ok(path) => info!(path = %path.display(), "report written"),
            Err(err) => warn!(%err, "report generation failed"),
        }
    }

    if config.save_logs {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = config.log_dir.join(format!("execution_{timestamp}.json"));
        if let Err(err) = orchestrator.save_log(&path) {
            warn!(%err, "could not save execution log");
        }
    }

    outcome.is_success()
}

async fn run_interactive(
    orchestrator: &mut Orchestrator,
    config: &Config,
    report_format: ReportArg,
) -> Result<()> {
    println!("Type automation tasks in natural language. 'quit' to stop.");

    let stdin = std::io::stdin();
    loop {
        print!("\nTask: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let task = line.trim();

        if matches!(task, "quit" | "exit" | "q") {
            break;
        }
        if task.is_empty() {
            continue;
        }

        run_task(orchestrator, config, report_format, task).await;
    }

    Ok(())
}
