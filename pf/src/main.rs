//! PlanForge - staged LLM planning pipeline
//!
//! CLI entry point: run the relay, drive a planning session, or poke at saved
//! model output.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use planforge::cli::{Cli, Command, OutputFormat, generate_after_help, get_log_path};
use planforge::config::Config;
use planforge::events::{EventBus, PipelineEvent};
use planforge::extract::extract_json;
use planforge::pipeline::{HttpTransport, Orchestrator, StageReport};
use planforge::present::{render, render_stage};
use planforge::relay;
use planforge::stage::StageKind;

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogTarget {
    /// The relay logs to stderr like any server
    Stderr,
    /// Interactive commands keep stdout clean for streamed text
    File,
}

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, target: LogTarget) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogTarget::File => {
            let log_path = get_log_path();
            if let Some(log_dir) = log_path.parent() {
                fs::create_dir_all(log_dir).context("Failed to create log directory")?;
            }
            let log_file = fs::File::create(&log_path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let target = match cli.command {
        Command::Serve { .. } => LogTarget::Stderr,
        _ => LogTarget::File,
    };
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), target)
        .context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(model = %config.llm.model, base_url = %config.llm.base_url, "PlanForge loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { bind } => {
            debug!(?bind, "main: matched Serve command");
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            relay::serve(&config).await
        }
        Command::Run {
            intent,
            answers,
            out,
            relay,
        } => {
            debug!(%intent, ?answers, ?out, "main: matched Run command");
            let relay_url = relay.unwrap_or_else(|| config.client.relay_url.clone());
            cmd_run(&relay_url, &intent, answers.as_deref(), out.as_deref()).await
        }
        Command::Extract { diagram, file } => {
            debug!(diagram, ?file, "main: matched Extract command");
            cmd_extract(&file, diagram)
        }
        Command::Health { relay, format } => {
            debug!(?format, "main: matched Health command");
            let relay_url = relay.unwrap_or_else(|| config.client.relay_url.clone());
            cmd_health(&relay_url, format).await
        }
    }
}

/// Answers file: a plain list of strings, by question position
fn load_answers(path: &Path) -> Result<Vec<String>> {
    debug!(?path, "load_answers: called");
    let content = fs::read_to_string(path).context(format!("Failed to read answers file {}", path.display()))?;
    serde_yaml::from_str(&content).context("Answers file must be a list of strings")
}

/// Print streamed text and stage transitions until the bus closes
async fn print_events(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::StageStarted { stage, .. }) => {
                println!("\n{} {}", "==>".cyan().bold(), stage.to_string().bold());
            }
            Ok(PipelineEvent::ChunkApplied { content, .. }) => {
                print!("{}", content);
                let _ = std::io::stdout().flush();
            }
            Ok(PipelineEvent::StageCompleted { stage, content_len, .. }) => {
                println!("\n{} {} ({} chars)", "\u{2714}".green(), stage, content_len);
            }
            Ok(PipelineEvent::StageFailed { stage, kind, message, .. }) => {
                println!("\n{} {} failed ({:?}): {}", "\u{2718}".red(), stage, kind, message.red());
            }
            Ok(PipelineEvent::StageRejected { stage, reason, .. }) => {
                println!("{} {} not started: {}", "!".yellow(), stage, reason);
            }
            Ok(PipelineEvent::PlanFolded { phase_count, .. }) => {
                println!("{} plan has {} phases", "\u{2714}".green(), phase_count);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "print_events: lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Drive a whole session against the relay
async fn cmd_run(relay_url: &str, intent: &str, answers: Option<&Path>, out: Option<&Path>) -> Result<()> {
    debug!(%relay_url, "cmd_run: called");
    let answers = answers.map(load_answers).transpose()?.unwrap_or_default();

    let bus = EventBus::with_default_capacity();
    let printer = tokio::spawn(print_events(bus.subscribe()));
    let session_id = uuid::Uuid::now_v7().to_string();
    let orchestrator = Orchestrator::new(Arc::new(HttpTransport::new(relay_url)), bus.emitter_for(session_id));

    orchestrator.submit_intent(intent).await?;
    let mut reports = vec![orchestrator.run_stage(StageKind::Clarify).await?];
    if reports[0].is_completed() {
        let questions = orchestrator.snapshot().await.clarifications;
        for (index, question) in questions.iter().enumerate() {
            let answer = answers.get(index).map(String::as_str).unwrap_or("");
            println!("  Q{}: {}", index + 1, question.question);
            if !answer.is_empty() {
                println!("  A{}: {}", index + 1, answer.dimmed());
                orchestrator.answer(index, answer).await?;
            }
        }
        reports.extend(orchestrator.run_from(StageKind::Architecture).await?);
    }

    let state = orchestrator.snapshot().await;
    drop(orchestrator);
    drop(bus);
    let _ = printer.await;

    if let Some(architecture) = state.stream(StageKind::Architecture).filter(|s| s.is_done()) {
        let rendered = render_stage(StageKind::Architecture, &architecture.content);
        if let Some(diagram) = rendered.diagram {
            println!("\n{}\n{}", "Architecture diagram:".bold(), diagram);
        }
    }

    match reports.last() {
        Some(StageReport::Completed {
            stage: StageKind::Blueprint,
            ..
        }) => {
            let plan = state.plan.ok_or_else(|| eyre!("Pipeline completed without a plan"))?;
            let json = serde_json::to_string_pretty(&plan)?;
            match out {
                Some(path) => {
                    fs::write(path, json).context(format!("Failed to write plan to {}", path.display()))?;
                    println!("\n{} plan written to {}", "\u{2714}".green(), path.display());
                }
                None => println!("\n{}", json),
            }
            Ok(())
        }
        Some(StageReport::Failed { stage, message, .. }) => Err(eyre!("Stage {} failed: {}", stage, message)),
        Some(StageReport::Superseded { stage }) => Err(eyre!("Stage {} was superseded", stage)),
        _ => Err(eyre!("Pipeline stopped before the blueprint")),
    }
}

fn cmd_extract(file: &Path, diagram: bool) -> Result<()> {
    debug!(?file, diagram, "cmd_extract: called");
    let raw = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;

    if diagram {
        let rendered = render(&raw);
        let diagram = rendered
            .diagram
            .ok_or_else(|| eyre!("No mermaid diagram found in {}", file.display()))?;
        println!("{}", diagram);
        return Ok(());
    }

    let value: serde_json::Value = extract_json(&raw)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn cmd_health(relay_url: &str, format: OutputFormat) -> Result<()> {
    debug!(%relay_url, ?format, "cmd_health: called");
    let health = HttpTransport::new(relay_url)
        .health()
        .await
        .context(format!("Relay at {} is not reachable", relay_url))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&health)?),
        OutputFormat::Text => {
            let status = health["status"].as_str().unwrap_or("unknown");
            let icon = if status == "ok" { "\u{2705}" } else { "\u{274C}" };
            println!("{} {} {}", icon, relay_url.bold(), status);
            if let Some(version) = health["version"].as_str() {
                println!("   version  {}", version);
            }
            if let Some(features) = health["features"].as_array() {
                let names: Vec<&str> = features.iter().filter_map(|f| f.as_str()).collect();
                println!("   features {}", names.join(", "));
            }
        }
    }
    Ok(())
}
