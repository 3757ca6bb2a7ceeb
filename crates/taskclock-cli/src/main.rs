use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "taskclock", version, about = "Multi-task time tracking")]
pub struct Cli {
    /// User to act as (defaults to `identity.user` from config)
    #[arg(long, global = true)]
    user: Option<String>,
    /// Database file (defaults to `storage.database` or the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start timing a task
    Start {
        /// Task ID
        task: String,
        /// Estimated minutes of work
        #[arg(long)]
        estimate: Option<u32>,
    },
    /// Stop timing a task and close its time entry
    Stop {
        /// Task ID
        task: String,
    },
    /// Print every running timer as JSON
    Status,
    /// Print the time-entry history of a task
    Log {
        /// Task ID
        task: String,
    },
    /// Interactive session with pause/resume and a live display
    Session,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init();

    let ctx = commands::Context {
        user: cli.user,
        db: cli.db,
    };
    let result = match cli.command {
        Commands::Start { task, estimate } => commands::timer::start(&ctx, task, estimate),
        Commands::Stop { task } => commands::timer::stop(&ctx, task),
        Commands::Status => commands::timer::status(&ctx),
        Commands::Log { task } => commands::log::run(&ctx, task),
        Commands::Session => commands::session::run(&ctx),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => commands::completions::run(shell),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
