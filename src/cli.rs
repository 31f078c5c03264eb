use clap::{Parser, Subcommand};

/// quizgen — generate multiple-choice quiz questions with rotating API keys
#[derive(Parser)]
#[command(name = "quizgen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate questions on a topic
    Generate {
        #[arg(short, long)]
        topic: String,
        /// Number of questions to ask the model for
        #[arg(short = 'n', long, default_value = "5")]
        count: u32,
        /// Attempts before giving up (defaults to QUIZGEN_MAX_ATTEMPTS)
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Print the questions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the periodic quota reset until interrupted
    Watch {
        /// Hours between resets (defaults to QUIZGEN_QUOTA_RESET_HOURS)
        #[arg(long)]
        interval_hours: Option<u64>,
    },

    /// Manage stored API keys
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// List keys (masked) with usage and status
    List,
    /// Add a key to the rotation
    Add { key: String },
    /// Remove a key and its status
    Remove { key: String },
    /// Mark every key active again (quota reset)
    Reactivate,
}
