//! contextloom CLI — the main entry point.
//!
//! Commands:
//! - `assemble` — Assemble a context from a JSON fixture
//! - `config`   — Show, validate, or locate the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use contextloom_core::query::ScopeMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "contextloom",
    about = "contextloom — bounded, access-controlled context assembly",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a context for a query against fixture data
    Assemble(AssembleArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct AssembleArgs {
    /// JSON fixture with entities, documents, and ACL denials
    #[arg(short, long)]
    fixture: PathBuf,

    /// The natural-language query
    #[arg(short, long)]
    query: String,

    #[arg(short, long, value_enum, default_value_t = ScopeArg::None)]
    scope: ScopeArg,

    /// Scope entity id (required for entity and project scope)
    #[arg(short, long)]
    entity: Option<String>,

    /// Classified intent label
    #[arg(short, long, default_value = "search")]
    intent: String,

    /// Tenant id (defaults to the fixture's tenant)
    #[arg(short, long)]
    tenant: Option<String>,

    #[arg(short, long, default_value = "cli")]
    user: String,

    /// Token budget (0 uses the configured default)
    #[arg(short, long, default_value_t = 0)]
    budget: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Config file (defaults to $CONTEXTLOOM_CONFIG or ~/.contextloom/config.toml)
    #[arg(short, long, env = "CONTEXTLOOM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show {
        /// Print built-in defaults instead of the loaded file
        #[arg(long)]
        defaults: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print the default config file path
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    None,
    Entity,
    Project,
    Global,
}

impl From<ScopeArg> for ScopeMode {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::None => ScopeMode::None,
            ScopeArg::Entity => ScopeMode::Entity,
            ScopeArg::Project => ScopeMode::Project,
            ScopeArg::Global => ScopeMode::Global,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
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
        Commands::Assemble(args) => commands::assemble::run(args.into()).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show { defaults } => commands::config_cmd::show(defaults).await?,
            ConfigAction::Validate { file } => commands::config_cmd::validate(file).await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}

impl From<AssembleArgs> for commands::assemble::AssembleOptions {
    fn from(args: AssembleArgs) -> Self {
        Self {
            fixture: args.fixture,
            query: args.query,
            scope: args.scope.into(),
            entity: args.entity,
            intent: args.intent,
            tenant: args.tenant,
            user: args.user,
            budget: args.budget,
            json: args.format == OutputFormat::Json,
            config: args.config,
        }
    }
}
