pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::classify::ClassifyArgs;

#[derive(Debug, Parser)]
#[command(
    name = "deskpilot",
    about = "Deskpilot operator CLI",
    long_about = "Operate the deskpilot triage engine: migrations, config inspection, readiness checks, offline classification, knowledge questions and reindexing.",
    after_help = "Examples:\n  deskpilot doctor --json\n  deskpilot classify \"printer on floor 3 is offline\" --priority high\n  deskpilot ask \"how do I reset my VPN password?\"\n  deskpilot reindex --all"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database, model provider and gateway readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Classify a ticket message against the configured teams")]
    Classify {
        #[arg(help = "Ticket message text")]
        text: String,
        #[arg(long, help = "Known priority; skips model inference for priority")]
        priority: Option<String>,
        #[arg(long, help = "Known team id; skips model inference for team")]
        team: Option<String>,
        #[arg(long, help = "Known ticket title")]
        title: Option<String>,
        #[arg(long, help = "Persist the result onto this ticket id")]
        ticket: Option<String>,
    },
    #[command(about = "Answer a question from the knowledge base, as a contact would receive it")]
    Ask {
        #[arg(help = "Question text")]
        question: String,
    },
    #[command(about = "Compute embeddings for knowledge documents")]
    Reindex {
        #[arg(long, help = "Re-embed every document, not only those missing an embedding")]
        all: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Classify { text, priority, team, title, ticket } => {
            commands::classify::run(ClassifyArgs { text, priority, team, title, ticket })
        }
        Command::Ask { question } => commands::ask::run(&question),
        Command::Reindex { all } => commands::reindex::run(all),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
