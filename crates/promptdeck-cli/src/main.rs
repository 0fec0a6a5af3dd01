mod config;
mod content_routes;
mod credits_cmd;
mod events_cmd;
mod serve_cmd;
mod template_cmd;
mod user_cmds;

#[cfg(test)]
mod test_util;

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};

use promptdeck_core::checkout::LemonSqueezyClient;
use promptdeck_core::completion::GroqClient;
use promptdeck_db::pool;

use config::{AppConfig, ServeConfig};

#[derive(Parser)]
#[command(name = "promptdeck", about = "Prompt library service with credit-metered AI generation")]
struct Cli {
    /// Database URL (overrides PROMPTDECK_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a promptdeck config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/promptdeck")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the promptdeck database (requires config file or env vars)
    DbInit,
    /// Run the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Account management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Credit maintenance
    Credits {
        #[command(subcommand)]
        command: CreditsCommands,
    },
    /// Inspect and render prompt templates offline
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Show recent payment webhook events
    Events {
        /// Number of events to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a trial account and print its session token
    Add {
        /// Account email
        email: String,
    },
    /// Show plan and credits for an account
    Show {
        /// Account email
        email: String,
    },
    /// Issue a new session token for an account
    Token {
        /// Account email
        email: String,
    },
}

#[derive(Subcommand)]
pub enum CreditsCommands {
    /// Top trial and free accounts back up to the daily allowance
    ResetDaily,
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List the variables a template needs
    Vars {
        /// Template text, e.g. "Plan for {goal}"
        template: String,
    },
    /// Substitute variables into a template
    Render {
        /// Template text
        template: String,
        /// Variable binding as key=value (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Text to show when placeholders remain after substitution
        #[arg(long)]
        raw: Option<String>,
    },
}

/// Execute the `promptdeck init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let session_secret = config::generate_session_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        auth: config::AuthSection {
            session_secret: session_secret.clone(),
        },
        completion: config::CompletionSection::default(),
        billing: config::BillingSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!(
        "  auth.session_secret = {}...{}",
        &session_secret[..8],
        &session_secret[56..]
    );
    println!();
    println!("Add [completion] and [billing] keys (or set their env vars) before `promptdeck serve`.");
    println!("Next: run `promptdeck db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `promptdeck db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = AppConfig::resolve(cli_db_url)?;

    println!("Initializing promptdeck database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database {}.", resolved.db_config.database_name().unwrap_or_default());
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("promptdeck db-init complete.");
    Ok(())
}

/// Execute the `promptdeck serve` command.
async fn cmd_serve(cli_db_url: Option<&str>, bind: &str, port: u16) -> anyhow::Result<()> {
    let resolved = AppConfig::resolve(cli_db_url)?;
    let serve = ServeConfig::resolve()?;

    let completion = GroqClient::new(serve.completion)?;
    let checkout = LemonSqueezyClient::new(serve.checkout);

    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let state = serve_cmd::AppState::new(
        db_pool.clone(),
        resolved.session_config,
        serve.webhook,
        Arc::new(completion),
        Arc::new(checkout),
    );
    let result = serve_cmd::run_serve(state, bind, port).await;
    db_pool.close().await;
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), &bind, port).await?;
        }
        Commands::User { command } => {
            let resolved = AppConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result =
                user_cmds::run_user_command(command, &db_pool, &resolved.session_config).await;
            db_pool.close().await;
            result?;
        }
        Commands::Credits { command } => {
            let resolved = AppConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = credits_cmd::run_credits_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Template { command } => {
            template_cmd::run_template_command(command)?;
        }
        Commands::Events { limit } => {
            let resolved = AppConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = events_cmd::run_events(&db_pool, limit).await;
            db_pool.close().await;
            result?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "promptdeck", &mut std::io::stdout());
        }
    }

    Ok(())
}
