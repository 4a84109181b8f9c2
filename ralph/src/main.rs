use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ralph::backend::CliBackend;
use ralph::bridge::{BridgeEvent, StreamingEventBridge};
use ralph::config::RalphFileConfig;
use ralph::executor::{ExecutorConfig, InterruptFlag, PhaseExecutor, WorkflowResult};
use ralph::session::{SessionStore, TaskBoard};
use ralph::ui::ChannelUi;

/// Autonomous multi-step coding workflows on pluggable agent back-ends
#[derive(Parser)]
#[command(name = "ralph", version, about)]
struct Cli {
    /// Freeform prompt describing the work to perform
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,

    /// Reopen a paused session instead of starting a new one
    #[arg(long, value_name = "SESSION_UUID")]
    resume: Option<String>,

    /// Start without a pre-existing feature list
    #[arg(long)]
    yolo: bool,

    /// Override the default feature-list source
    #[arg(long, value_name = "PATH")]
    feature_list: Option<PathBuf>,

    /// Cap Implementation <-> Review retries (0 = unbounded)
    #[arg(long, value_name = "N")]
    max_iterations: Option<u32>,

    /// Sessions root directory
    #[arg(long, env = "RALPH_SESSIONS_DIR", value_name = "DIR")]
    sessions_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = RalphFileConfig::load()?;

    let sessions_root = cli
        .sessions_dir
        .unwrap_or_else(|| config.session.resolve_root());
    std::fs::create_dir_all(&sessions_root)
        .with_context(|| format!("creating sessions root {}", sessions_root.display()))?;

    let prompt = cli.prompt.join(" ");
    let store = match &cli.resume {
        Some(id) => SessionStore::resume(&sessions_root, id)?,
        None => {
            if prompt.trim().is_empty() {
                anyhow::bail!("a prompt is required to start a new session");
            }
            SessionStore::create(&sessions_root)?
        }
    };
    let session_id = store.session_id();

    let feature_list = if cli.yolo {
        None
    } else {
        let path = cli
            .feature_list
            .unwrap_or_else(|| config.workflow.feature_list.clone());
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "feature list unavailable; planning from the prompt alone"
                );
                None
            }
        }
    };

    let backend = Arc::new(CliBackend::from_config(&config.backend));
    let (bridge, mut handles) = StreamingEventBridge::new(Duration::from_millis(
        config.bridge.dispatch_delay_ms,
    ));

    // Front-end side: render bridge events as they arrive.
    tokio::spawn(async move {
        while let Some(event) = handles.events.recv().await {
            render(event);
        }
    });

    // A keyboard interrupt pauses the run; state stays resumable by id.
    let interrupt = InterruptFlag::new();
    {
        let flag = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; pausing the workflow");
                flag.set();
            }
        });
    }

    let board = TaskBoard::open(store)?;
    let ui = Arc::new(ChannelUi::new(bridge.clone()));
    let executor = PhaseExecutor::new(
        backend,
        bridge,
        board,
        ui,
        ExecutorConfig {
            max_iterations: cli
                .max_iterations
                .unwrap_or(config.workflow.max_review_iterations),
            feature_list,
        },
        interrupt,
    );

    let result = executor.run(&prompt).await;
    print_summary(&result);
    println!("session: {session_id} (resume with --resume {session_id})");

    if result.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn render(event: BridgeEvent) {
    match event {
        BridgeEvent::TurnStarted { .. } => println!("· streaming…"),
        BridgeEvent::TurnEnded => println!("· turn complete"),
        BridgeEvent::Text { content } => println!("{content}"),
        BridgeEvent::TaskSnapshot { tasks } => {
            for task in &tasks {
                let id = task.normalized_id().unwrap_or_else(|| "-".to_string());
                println!("  {} [{}] {}", id, task.status, task.content);
            }
        }
        BridgeEvent::PhaseUpdate { phase } => {
            println!("» {}: {}", phase.phase_name, phase.message);
        }
        BridgeEvent::ToolStatus { execution } => {
            println!("  ({:?}) {}", execution.state, execution.label);
        }
        BridgeEvent::QuestionSurfaced { text, .. } => {
            println!("? {text}");
        }
    }
}

fn print_summary(result: &WorkflowResult) {
    println!("\n{}", "─".repeat(60));
    for phase in &result.workflow_phases {
        println!(
            "  {:<20} {:<10} {:>7}ms  {} events",
            phase.phase_name,
            match phase.status {
                ralph::phase::PhaseStatus::Running => "running",
                ralph::phase::PhaseStatus::Completed => "completed",
                ralph::phase::PhaseStatus::Failed => "failed",
            },
            phase.duration_ms.unwrap_or(0),
            phase.events.len()
        );
    }
    println!("{}", "─".repeat(60));
    println!(
        "  workflow {}",
        if result.success { "succeeded" } else { "failed" }
    );
}
