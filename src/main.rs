use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quizgen::config::{self, Config};
use quizgen::generator::QuizGenerator;
use quizgen::jobs::quota_reset;
use quizgen::models::{GenerationRequest, ValidatedQuestion};
use quizgen::provider::GeminiClient;
use quizgen::store::{mask_credential, CredentialStore};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load()?;
    init_tracing(&cfg);

    let args = cli::Cli::parse();

    let store = Arc::new(
        CredentialStore::load(&cfg.keys_file, cfg.api_key_override.as_deref())
            .context("failed to load API keys")?,
    );

    let result = match args.command {
        cli::Commands::Generate {
            topic,
            count,
            max_attempts,
            json,
        } => {
            let request = GenerationRequest::new(topic, count)
                .with_max_attempts(max_attempts.unwrap_or(cfg.max_attempts));
            run_generate(&cfg, store, &request, json).await
        }
        cli::Commands::Watch { interval_hours } => {
            let interval =
                config::reset_interval(interval_hours).unwrap_or(cfg.quota_reset_interval);
            run_watch(store, interval).await
        }
        cli::Commands::Keys { command } => handle_key_command(&store, command),
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(cfg: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "quizgen=info".into()),
    );

    // Logs go to stderr so stdout stays clean for --json output
    if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_generate(
    cfg: &Config,
    store: Arc<CredentialStore>,
    request: &GenerationRequest,
    json: bool,
) -> anyhow::Result<()> {
    let client = GeminiClient::new(&cfg.api_base, &cfg.model, cfg.request_timeout)
        .context("failed to build HTTP client")?;
    let generator = QuizGenerator::new(store, client);

    let questions = generator
        .generate_with_timeout(request, cfg.generation_timeout)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&questions)?);
    } else {
        print_questions(&questions);
    }
    Ok(())
}

async fn run_watch(store: Arc<CredentialStore>, interval: Duration) -> anyhow::Result<()> {
    if store.is_ephemeral() {
        tracing::warn!("runtime override in effect; resets will not be persisted");
    }
    tracing::info!(interval_secs = interval.as_secs(), "quota reset job started");

    let handle = quota_reset::spawn(store, interval);
    tokio::select! {
        res = handle => res.context("quota reset job stopped")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down quota reset job"),
    }
    Ok(())
}

fn print_questions(questions: &[ValidatedQuestion]) {
    println!("Generated {} questions", questions.len());
    for (i, q) in questions.iter().enumerate() {
        println!();
        println!("Q{}: {}", i + 1, q.question_text);
        for (j, option) in q.options.iter().enumerate() {
            let marker = if *option == q.correct_answer { "*" } else { " " };
            println!("  {} {}. {}", marker, j + 1, option);
        }
    }
}

fn handle_key_command(store: &CredentialStore, command: cli::KeyCommands) -> anyhow::Result<()> {
    match command {
        cli::KeyCommands::List => {
            if store.is_ephemeral() {
                println!("(runtime override in effect; nothing is persisted)");
            }
            let record = store.snapshot();
            if record.keys.is_empty() {
                println!("No API keys configured.");
            }
            for key in &record.keys {
                let status = record.key_status.get(key).cloned().unwrap_or_default();
                let note = match (&status.deactivation_reason, status.is_active) {
                    (Some(reason), false) => format!("({})", reason),
                    _ => String::new(),
                };
                println!(
                    "{:<12} {:<8} uses={:<6} last_used={} {}",
                    mask_credential(key),
                    if status.is_active { "active" } else { "inactive" },
                    status.usage_count,
                    status.last_used.as_deref().unwrap_or("-"),
                    note,
                );
            }
        }
        cli::KeyCommands::Add { key } => {
            if store.add_credential(&key)? {
                println!("Added {}", mask_credential(&key));
            } else {
                println!("{} is already configured", mask_credential(&key));
            }
        }
        cli::KeyCommands::Remove { key } => {
            if store.remove_credential(&key)? {
                println!("Removed {}", mask_credential(&key));
            } else {
                println!("{} is not configured", mask_credential(&key));
            }
        }
        cli::KeyCommands::Reactivate => {
            let n = store.reactivate_all();
            println!("Reactivated {} keys", n);
        }
    }
    Ok(())
}
