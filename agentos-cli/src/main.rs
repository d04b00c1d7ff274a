use agentos_core::{AgentOsConfig, AgentOsError, CliErrorDisplay, LoggingConfig};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{cmd_kill, cmd_resume, cmd_show, cmd_start, cmd_watch};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "agentos")]
#[command(version = VERSION)]
#[command(about = "AgentOS - live dashboard and controls for autonomous agents")]
#[command(long_about = r#"
AgentOS shows what an autonomous agent is doing right now: its status,
progress, cost and a live timeline of everything it has done.

Use 'agentos start <task>' to launch an agent, then 'agentos watch <id>'
to follow it. Running agents can be stopped with 'agentos kill <id>' and
failed or paused ones picked up again with 'agentos resume <id>'.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true, help = "Disable colored output")]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start a new agent for a task")]
    Start {
        #[arg(help = "What the agent should do")]
        task: String,

        #[arg(short, long, help = "LLM provider")]
        provider: Option<String>,

        #[arg(short, long, help = "Model name")]
        model: Option<String>,

        #[arg(long, help = "Spending cap in USD")]
        max_cost: Option<f64>,

        #[arg(short, long, help = "Watch the agent after starting it")]
        watch: bool,
    },

    #[command(about = "Follow an agent live until it finishes")]
    Watch {
        #[arg(help = "Agent id")]
        agent_id: String,
    },

    #[command(about = "Show an agent's current state and timeline")]
    Show {
        #[arg(help = "Agent id")]
        agent_id: String,

        #[arg(
            short,
            long,
            default_value = "text",
            value_parser = ["text", "json"],
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Kill a running agent")]
    Kill {
        #[arg(help = "Agent id")]
        agent_id: String,

        #[arg(short, long, help = "Skip the confirmation prompt")]
        yes: bool,
    },

    #[command(about = "Resume a failed or paused agent")]
    Resume {
        #[arg(help = "Agent id")]
        agent_id: String,
    },

    #[command(about = "Show the effective configuration")]
    Config,

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = AgentOsConfig::load();
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_logging(cli.verbose, &logging);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            e.log();
            eprint!("{}: {}", "Error".red().bold(), CliErrorDisplay::new(&e));
            return ExitCode::FAILURE;
        }
    };

    if cli.no_color || !config.display.color {
        colored::control::set_override(false);
    }

    match run(cli.command, config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<AgentOsError>() {
                Some(agent_error) => {
                    eprint!("{}: {}", "Error".red().bold(), CliErrorDisplay::new(agent_error))
                }
                None => eprintln!("{}: {}", "Error".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so they never interleave with the rendered view.
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(command: Commands, config: AgentOsConfig) -> anyhow::Result<()> {
    match command {
        Commands::Start {
            task,
            provider,
            model,
            max_cost,
            watch,
        } => cmd_start(&config, task, provider, model, max_cost, watch).await,
        Commands::Watch { agent_id } => cmd_watch(&config, &agent_id).await,
        Commands::Show { agent_id, format } => cmd_show(&config, &agent_id, &format).await,
        Commands::Kill { agent_id, yes } => cmd_kill(&config, &agent_id, yes).await,
        Commands::Resume { agent_id } => cmd_resume(&config, &agent_id).await,
        Commands::Config => cmd_config(&config),
        Commands::Version { detailed } => cmd_version(detailed),
    }
}

fn cmd_config(config: &AgentOsConfig) -> anyhow::Result<()> {
    println!("{}", "AgentOS Configuration".cyan().bold());
    println!("{}", "═".repeat(50).dimmed());
    println!();

    println!("  {}", "Control plane".yellow().bold());
    println!("  {:<22} {}", "API base URL:".bold(), config.api.base_url);
    println!("  {:<22} {}", "Push base URL:".bold(), config.api.ws_base_url);
    println!(
        "  {:<22} {}",
        "Request timeout:".bold(),
        seconds_or_none(config.api.request_timeout_secs)
    );
    println!(
        "  {:<22} {}",
        "Connect timeout:".bold(),
        seconds_or_none(config.api.connect_timeout_secs)
    );

    println!();
    println!("  {}", "Push channel".yellow().bold());
    println!("  {:<22} {}", "Reconnect:".bold(), config.stream.reconnect);
    println!(
        "  {:<22} {}",
        "Max reconnects:".bold(),
        config.stream.max_reconnect_attempts
    );
    println!("  {:<22} {}", "Deduplicate:".bold(), config.stream.deduplicate);

    println!();
    println!("  {}", "Display".yellow().bold());
    println!(
        "  {:<22} {} chars",
        "Payload preview:".bold(),
        config.display.payload_preview_chars
    );
    println!("  {:<22} {}", "Time format:".bold(), config.display.time_format);
    println!("  {:<22} {}", "Log level:".bold(), config.log_level());

    if let Some(dir) = agentos_core::get_config_dir() {
        println!();
        println!(
            "  {}",
            format!("Config file: {}", dir.join("config.toml").display()).dimmed()
        );
    }

    Ok(())
}

fn seconds_or_none(secs: u64) -> String {
    if secs == 0 {
        "none".to_string()
    } else {
        format!("{}s", secs)
    }
}

fn cmd_version(detailed: bool) -> anyhow::Result<()> {
    if detailed {
        println!("{}", "AgentOS Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} {}", "Core:".bold(), agentos_core::VERSION);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("agentos {}", VERSION);
    }

    Ok(())
}
