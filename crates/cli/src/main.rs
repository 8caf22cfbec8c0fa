//! ChiefOps CLI: operate the conversational memory from a terminal.
//!
//! Commands:
//! - `resolve`  : Merge per-source person records into identities
//! - `turn`     : Record a conversation turn
//! - `context`  : Print the assembled context for a query
//! - `compact`  : Compact a project's older turns if due
//! - `facts`    : Add, list and supersede hard facts
//! - `config`   : Write or show the configuration

use std::path::PathBuf;

use chiefops_core::conversation::Role;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chiefops",
    about = "ChiefOps conversational memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge raw person records (JSON array) into resolved identities
    Resolve {
        /// JSON file holding the raw records
        #[arg(short, long)]
        input: PathBuf,

        /// Write merged persons here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a conversation turn
    Turn {
        #[arg(short, long)]
        project: String,

        /// user or assistant
        #[arg(short, long, default_value = "user")]
        role: Role,

        content: String,
    },

    /// Print the assembled context for a query
    Context {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        query: String,

        /// Print per-layer statistics after the context
        #[arg(long)]
        report: bool,
    },

    /// Compact a project's older turns if due
    Compact {
        #[arg(short, long)]
        project: String,

        /// Compact even when the trigger has not been reached
        #[arg(long)]
        force: bool,
    },

    /// Manage hard facts
    Facts {
        #[command(subcommand)]
        action: FactsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum FactsAction {
    /// Store a new fact
    Add {
        content: String,

        #[arg(short, long, default_value = "other")]
        category: String,

        /// Leave empty for a global fact
        #[arg(short, long)]
        project: Option<String>,

        #[arg(long, default_value = "manual")]
        source: String,

        #[arg(long, default_value_t = 1.0)]
        confidence: f32,
    },

    /// List active facts
    List {
        /// Leave empty for global facts only
        #[arg(short, long)]
        project: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace a fact with a corrected one
    Supersede {
        /// Id of the fact being replaced
        old_fact_id: String,

        content: String,

        #[arg(short, long, default_value = "other")]
        category: String,

        /// Defaults to the replaced fact's project
        #[arg(short, long)]
        project: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Resolve { input, output } => {
            commands::resolve::run(&input, output.as_deref()).await?
        }
        Commands::Turn {
            project,
            role,
            content,
        } => commands::turn::run(&project, role, &content).await?,
        Commands::Context {
            project,
            query,
            report,
        } => commands::context::run(&project, &query, report).await?,
        Commands::Compact { project, force } => commands::compact::run(&project, force).await?,
        Commands::Facts { action } => match action {
            FactsAction::Add {
                content,
                category,
                project,
                source,
                confidence,
            } => {
                commands::facts::add(&content, &category, project, &source, confidence).await?
            }
            FactsAction::List { project, json } => {
                commands::facts::list(project.as_deref(), json).await?
            }
            FactsAction::Supersede {
                old_fact_id,
                content,
                category,
                project,
            } => commands::facts::supersede(&old_fact_id, &content, &category, project).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => commands::config_cmd::init(force).await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
