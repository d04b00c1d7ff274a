use agentos_core::{
    ConfidenceBand, ConnectionState, StatusBadge, TimelineEntryView, ViewModel,
};
use colored::{ColoredString, Colorize};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

pub fn print_view(view: &ViewModel) {
    println!("{}", "Agent Details".cyan().bold());
    println!("{}", "═".repeat(50).dimmed());
    println!();

    println!("  {:<14} {}", "Agent:".bold(), view.agent_id);
    println!("  {:<14} {}", "Task:".bold(), view.task);
    println!(
        "  {:<14} {}  {}",
        "Status:".bold(),
        badge(view.status_badge, &view.status),
        connection_label(view.connection)
    );
    println!(
        "  {:<14} {} {}",
        "Progress:".bold(),
        view.step_label,
        progress_bar(view.progress_percentage)
    );
    if let Some(confidence) = &view.confidence {
        let text = format!("{}% confidence", confidence.score);
        let text = match confidence.band {
            ConfidenceBand::High => text.green(),
            ConfidenceBand::Medium => text.yellow(),
        };
        println!("  {:<14} {}", "Confidence:".bold(), text);
    }
    match &view.estimated_cost {
        Some(estimate) => println!(
            "  {:<14} {}  {}",
            "Cost:".bold(),
            view.cost,
            estimate.dimmed()
        ),
        None => println!("  {:<14} {}", "Cost:".bold(), view.cost),
    }
    println!("  {:<14} {}", "Runtime:".bold(), view.runtime);

    let actions: Vec<&str> = [
        view.can_kill.then_some("kill"),
        view.can_resume.then_some("resume"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !actions.is_empty() {
        println!("  {:<14} {}", "Actions:".bold(), actions.join(", "));
    }

    if let Some(result) = &view.result_view {
        println!();
        println!("  {}", "Result".green().bold());
        for line in result.lines() {
            println!("    {}", line);
        }
    }

    if let Some(error) = &view.error_view {
        println!();
        println!("  {}", "Error".red().bold());
        for line in error.lines() {
            println!("    {}", line);
        }
    }

    println!();
    println!("{}", "Execution Timeline".cyan().bold());
    if view.displayed_timeline.is_empty() {
        println!("  {}", "No events yet".dimmed());
    } else {
        println!("{}", timeline_table(&view.displayed_timeline));
    }
}

pub fn timeline_table(entries: &[TimelineEntryView]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Time").fg(Color::White),
            Cell::new("Action").fg(Color::White),
            Cell::new("Status").fg(Color::White),
            Cell::new("Step").fg(Color::White),
            Cell::new("Data").fg(Color::White),
            Cell::new("Cost").fg(Color::White),
        ]);

    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.time),
            Cell::new(&entry.action),
            Cell::new(&entry.status).fg(badge_color(entry.badge)),
            Cell::new(entry.step),
            Cell::new(entry.data.as_deref().unwrap_or("-")),
            Cell::new(entry.cost.as_deref().unwrap_or("-")),
        ]);
    }

    table
}

pub fn badge(badge: StatusBadge, label: &str) -> ColoredString {
    let label = label.to_uppercase();
    match badge {
        StatusBadge::Info => label.blue().bold(),
        StatusBadge::Success => label.green().bold(),
        StatusBadge::Danger => label.red().bold(),
        StatusBadge::Warning => label.yellow().bold(),
        StatusBadge::Neutral => label.dimmed(),
    }
}

fn badge_color(badge: StatusBadge) -> Color {
    match badge {
        StatusBadge::Info => Color::Blue,
        StatusBadge::Success => Color::Green,
        StatusBadge::Danger => Color::Red,
        StatusBadge::Warning => Color::Yellow,
        StatusBadge::Neutral => Color::DarkGrey,
    }
}

pub fn connection_label(state: ConnectionState) -> ColoredString {
    match state {
        ConnectionState::Open => "● live".green(),
        ConnectionState::Connecting => "○ connecting".yellow(),
        ConnectionState::Closed => "✗ disconnected".red(),
    }
}

fn progress_bar(percentage: u64) -> String {
    const WIDTH: u64 = 20;
    let filled = (percentage.min(100) * WIDTH / 100) as usize;
    format!(
        "[{}{}] {}%",
        "█".repeat(filled).blue(),
        "░".repeat(WIDTH as usize - filled).dimmed(),
        percentage
    )
}
