pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tellr",
    about = "Tellr operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and preview knowledge ingestion.",
    after_help = "Examples:\n  tellr doctor --json\n  tellr config\n  tellr chunk docs/home_loan.md --category loans"
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
    #[command(about = "Validate config, knowledge directory, and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Chunk a text or markdown document and print the passages as JSON")]
    Chunk {
        path: PathBuf,
        #[arg(long, help = "Category hint applied when the content does not name one")]
        category: Option<String>,
        #[arg(long = "source-id", help = "Override the source id (defaults to the file stem)")]
        source_id: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Chunk { path, category, source_id } => {
            commands::chunk::run(&path, category, source_id)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
