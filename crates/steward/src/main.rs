use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use sw_archive::FsArchive;
use sw_core::config::{repo_root_from_env, StewardConfig};
use sw_core::types::ids::ChangeId;
use sw_core::types::ReviewPayload;
use sw_core::{Archive, DecisionInput, ReviewDecider, ReviewOutcome, Steward};
use sw_events::{EventBus, EventSource};

#[derive(Parser)]
#[command(name = "steward", version, about = "Human-gated governance for agent-authored changes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the MCP stdio transport for agents.
    Mcp,
    /// Submit a change request and review it interactively.
    Request {
        /// One-line description of the change.
        summary: String,
        /// Unified diff file; reads stdin when omitted.
        #[arg(long)]
        diff_file: Option<PathBuf>,
    },
    /// Print the archived record of a change.
    Show { change_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let repo_root = repo_root_from_env();
    let config = match StewardConfig::load(&repo_root) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return ExitCode::FAILURE;
        }
    };
    let archive = FsArchive::new(config.archive_root(&repo_root));

    let result = match cli.command {
        Command::Mcp => {
            let steward = Arc::new(Steward::new(
                repo_root,
                archive,
                EventBus::new(config.event_capacity),
                EventSource::Mcp,
            ));
            sw_mcp::Executor::new(steward)
                .run_stdio()
                .await
                .map_err(|err| err.to_string())
        }
        Command::Request { summary, diff_file } => {
            let steward = Steward::new(
                repo_root,
                archive,
                EventBus::new(config.event_capacity),
                EventSource::Cli,
            );
            run_request(&steward, &summary, diff_file).await
        }
        Command::Show { change_id } => show(&archive, &change_id),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run_request(
    steward: &Steward<FsArchive>,
    summary: &str,
    diff_file: Option<PathBuf>,
) -> Result<(), String> {
    let unified_diff = match diff_file {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|err| format!("cannot read {}: {err}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|err| format!("cannot read stdin: {err}"))?;
            buffer
        }
    };

    let mut decider = TerminalDecider;
    let outcome = steward
        .run_request(summary, &unified_diff, &mut decider)
        .await
        .map_err(|err| match err.hint() {
            Some(hint) => format!("{err}\n  hint: {hint}"),
            None => err.to_string(),
        })?;

    match outcome {
        ReviewOutcome::Applied(result) => {
            println!(
                "{} commit {} ({})",
                "applied:".green().bold(),
                result.commit,
                result.paths.join(", ")
            );
        }
        ReviewOutcome::Archived(record) => {
            println!(
                "{} {:?} recorded at {}",
                "closed:".yellow().bold(),
                record.outcome.decision,
                record.archived_to.display()
            );
        }
        ReviewOutcome::Next(_) => unreachable!("run_request only returns terminal outcomes"),
    }
    Ok(())
}

fn show(archive: &FsArchive, change_id: &str) -> Result<(), String> {
    let change_id = ChangeId::from_str(change_id).map_err(|err| err.to_string())?;
    let entry = archive
        .load(&change_id)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("no archive entry for {change_id}"))?;
    let rendered =
        serde_json::to_string_pretty(&entry).map_err(|err| err.to_string())?;
    println!("{rendered}");
    Ok(())
}

/// Prompts on the controlling terminal at each checkpoint.
struct TerminalDecider;

impl ReviewDecider for TerminalDecider {
    async fn decide(&mut self, payload: &ReviewPayload) -> DecisionInput {
        println!();
        println!("{} {}", "review:".cyan().bold(), payload.message);
        println!("  {} {}", "change:".bold(), payload.change_id);
        println!("  {} {}", "summary:".bold(), payload.summary);
        if !payload.normalized_diff.is_empty() {
            println!();
            print_diff(&payload.normalized_diff);
        }
        if !payload.metadata.is_empty() {
            println!();
            for (key, value) in &payload.metadata {
                println!("  {key}: {value}");
            }
        }
        println!();
        let approved = prompt_yes_no("approve? [y/N] ");
        let feedback = if approved {
            None
        } else {
            prompt_line("feedback (optional): ")
        };
        DecisionInput { approved, feedback }
    }
}

fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
    }
}

fn prompt_yes_no(prompt: &str) -> bool {
    prompt_line(prompt).is_some_and(|answer| {
        matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
    })
}

fn prompt_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer).ok()?;
    let trimmed = answer.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
