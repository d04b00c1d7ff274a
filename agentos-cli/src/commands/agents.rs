use agentos_core::{
    AgentOsConfig, AgentSession, AssumeYes, CommandOutcome, Confirm, ConnectionState,
    ControlPlane, CreateAgentRequest, HttpControlPlane, StatusBadge, ViewModel,
};
use anyhow::Context;
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::sync::Arc;
use tracing::debug;

use super::render::{badge, print_view};

/// Reads a yes/no answer from the terminal.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        eprint!("{} {} ", prompt.yellow().bold(), "[y/N]".dimmed());
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        parse_answer(&answer)
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn control_plane(config: &AgentOsConfig) -> anyhow::Result<Arc<dyn ControlPlane>> {
    let plane: Arc<dyn ControlPlane> = Arc::new(HttpControlPlane::new(&config.api)?);
    Ok(plane)
}

async fn mount(config: &AgentOsConfig, agent_id: &str) -> anyhow::Result<AgentSession> {
    let session = AgentSession::mount(control_plane(config)?, agent_id, config).await?;
    Ok(session)
}

pub async fn cmd_start(
    config: &AgentOsConfig,
    task: String,
    provider: Option<String>,
    model: Option<String>,
    max_cost: Option<f64>,
    watch: bool,
) -> anyhow::Result<()> {
    let plane = control_plane(config)?;
    let request = CreateAgentRequest {
        task,
        provider,
        model,
        max_cost_usd: max_cost,
    };

    let created = plane.create_agent(&request).await?;

    println!("{} Agent started: {}", "✓".green(), created.id.bold());
    if let Some(score) = created.confidence_score {
        println!("  {:<14} {}%", "Confidence:".bold(), score);
    }
    if let (Some(min), Some(max)) = (created.estimated_cost_min, created.estimated_cost_max) {
        println!(
            "  {:<14} ${:.*} - ${:.*}",
            "Estimate:".bold(),
            config.display.estimate_precision,
            min,
            config.display.estimate_precision,
            max
        );
    }

    if watch {
        println!();
        cmd_watch(config, &created.id).await?;
    } else {
        println!();
        println!("  Follow it with: agentos watch {}", created.id);
    }

    Ok(())
}

pub async fn cmd_show(config: &AgentOsConfig, agent_id: &str, format: &str) -> anyhow::Result<()> {
    let session = mount(config, agent_id).await?;
    let view = session.view();
    session.teardown().await;

    let view = view.context("agent snapshot was not loaded")?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    Ok(())
}

pub async fn cmd_watch(config: &AgentOsConfig, agent_id: &str) -> anyhow::Result<()> {
    let session = mount(config, agent_id).await?;
    let mut views = session.subscribe();
    let clear = std::io::stdout().is_terminal();

    loop {
        let latest = views.borrow_and_update().clone();
        let finished = match latest {
            Some(view) => {
                if clear {
                    print!("\x1B[2J\x1B[H");
                }
                print_view(&view);
                watch_finished(&view)
            }
            None => false,
        };
        if finished {
            debug!(agent_id = %agent_id, "Agent finished and push channel closed");
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "Stopped watching".dimmed());
                break;
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    session.teardown().await;
    Ok(())
}

/// The agent reached a terminal status and no more events can arrive.
fn watch_finished(view: &ViewModel) -> bool {
    let terminal = matches!(view.status_badge, StatusBadge::Success | StatusBadge::Danger);
    terminal && view.connection == ConnectionState::Closed
}

pub async fn cmd_kill(config: &AgentOsConfig, agent_id: &str, yes: bool) -> anyhow::Result<()> {
    let session = mount(config, agent_id).await?;
    let outcome = if yes {
        session.commands().kill(&AssumeYes).await
    } else {
        session.commands().kill(&StdinConfirm).await
    };
    session.teardown().await;

    report(outcome, "killed")
}

pub async fn cmd_resume(config: &AgentOsConfig, agent_id: &str) -> anyhow::Result<()> {
    let session = mount(config, agent_id).await?;
    let outcome = session.commands().resume().await;
    session.teardown().await;

    report(outcome, "resumed")
}

fn report(outcome: CommandOutcome, verb: &str) -> anyhow::Result<()> {
    match outcome {
        CommandOutcome::Completed(status) => {
            let label = status.to_string();
            println!(
                "{} Agent {}. Status: {}",
                "✓".green(),
                verb,
                badge(StatusBadge::from(&status), &label)
            );
            Ok(())
        }
        CommandOutcome::Declined => {
            println!("{}", "Cancelled".dimmed());
            Ok(())
        }
        CommandOutcome::Rejected(e) => Err(e.into()),
        CommandOutcome::Alert(message) => Err(anyhow::anyhow!(message)),
    }
}
