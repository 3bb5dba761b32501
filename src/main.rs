// src/main.rs

use anyhow::{Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use sqlshift::script::FilenameAffixes;
use sqlshift::{Config, Engine, TargetVersion};
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "sqlshift")]
#[command(author, version, about = "Schema migration engine with versioned SQL scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every engine command.
#[derive(Args)]
struct EngineOpts {
    /// Database connection string (SQLite file path or :memory:)
    #[arg(short, long)]
    url: String,
    /// Database driver
    #[arg(long, default_value = "sqlite")]
    driver: String,
    /// Directory containing migration scripts (repeatable)
    #[arg(short, long = "location", default_value = "Sql_Scripts")]
    locations: Vec<PathBuf>,
    /// Schema managed by the engine (repeatable; default: connection schema)
    #[arg(short, long = "schema")]
    schemas: Vec<String>,
    /// Schema holding the metadata table (default: first schema)
    #[arg(long)]
    metadata_schema: Option<String>,
    /// Name of the metadata table
    #[arg(long, default_value = "changelog")]
    metadata_table: String,
    /// Placeholder value as KEY=VALUE (repeatable)
    #[arg(short, long = "placeholder")]
    placeholders: Vec<String>,
    /// Placeholder prefix in script bodies
    #[arg(long, default_value = "${")]
    placeholder_prefix: String,
    /// Placeholder suffix in script bodies
    #[arg(long, default_value = "}")]
    placeholder_suffix: String,
    /// Migration filename prefix
    #[arg(long, default_value = "V")]
    sql_prefix: String,
    /// Migration filename separator
    #[arg(long, default_value = "__")]
    sql_separator: String,
    /// Migration filename suffix
    #[arg(long, default_value = ".sql")]
    sql_suffix: String,
    /// Identity recorded in the ledger (default: database or process user)
    #[arg(long)]
    installed_by: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply outstanding migrations up to the target version
    Migrate {
        #[command(flatten)]
        opts: EngineOpts,
        /// Version cap, or "latest"
        #[arg(short, long, default_value = "latest")]
        target: String,
        /// Erase the managed schemas and restart when validation fails
        #[arg(long)]
        erase_on_validation_error: bool,
    },
    /// Check the recorded history against the on-disk scripts
    Validate {
        #[command(flatten)]
        opts: EngineOpts,
    },
    /// Rewrite ledger checksums to match the on-disk scripts
    Repair {
        #[command(flatten)]
        opts: EngineOpts,
    },
    /// Drop or empty the managed schemas, consent markers permitting
    Erase {
        #[command(flatten)]
        opts: EngineOpts,
        /// Safety switch: log and do nothing
        #[arg(long)]
        disabled: bool,
    },
    /// Show discovered scripts and the ledger state
    Info {
        #[command(flatten)]
        opts: EngineOpts,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_placeholders(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut placeholders = BTreeMap::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid placeholder '{}', expected KEY=VALUE", pair);
        };
        placeholders.insert(key.to_string(), value.to_string());
    }
    Ok(placeholders)
}

fn build_config(opts: &EngineOpts) -> Result<Config> {
    Ok(Config {
        connection_string: opts.url.clone(),
        driver: opts.driver.clone(),
        schemas: opts.schemas.clone(),
        metadata_table_schema: opts.metadata_schema.clone(),
        metadata_table_name: opts.metadata_table.clone(),
        locations: opts.locations.clone(),
        affixes: FilenameAffixes {
            prefix: opts.sql_prefix.clone(),
            separator: opts.sql_separator.clone(),
            suffix: opts.sql_suffix.clone(),
        },
        placeholder_prefix: opts.placeholder_prefix.clone(),
        placeholder_suffix: opts.placeholder_suffix.clone(),
        placeholders: parse_placeholders(&opts.placeholders)?,
        installed_by: opts.installed_by.clone().unwrap_or_default(),
        ..Config::default()
    })
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate {
            opts,
            target,
            erase_on_validation_error,
        } => {
            let mut config = build_config(&opts)?;
            config.target_version = target.parse::<TargetVersion>()?;
            config.must_erase_on_validation_error = erase_on_validation_error;

            let mut engine = Engine::from_config(config)?;
            engine.migrate()?;
            println!("{} migration(s) applied", engine.migrations_applied());
        }
        Commands::Validate { opts } => {
            let mut engine = Engine::from_config(build_config(&opts)?)?;
            engine.validate()?;
            println!("Migration history is valid");
        }
        Commands::Repair { opts } => {
            let mut engine = Engine::from_config(build_config(&opts)?)?;
            engine.repair()?;
            println!("{} migration(s) repaired", engine.checksums_repaired());
        }
        Commands::Erase { opts, disabled } => {
            let mut config = build_config(&opts)?;
            config.is_erase_disabled = disabled;

            let mut engine = Engine::from_config(config)?;
            engine.erase()?;
            println!("Erase complete");
        }
        Commands::Info { opts } => {
            let mut engine = Engine::from_config(build_config(&opts)?)?;
            let (scripts, entries) = engine.info()?;

            info!("Found {} script(s), {} ledger entries", scripts.len(), entries.len());
            println!("Migration scripts:");
            for script in &scripts {
                println!("  {:<12} {}", script.version().to_string(), script.name());
            }
            println!("\nLedger:");
            if entries.is_empty() {
                println!("  (no metadata table)");
            }
            for entry in &entries {
                println!(
                    "  {:>4}  {:<12} {:<32} {:<10} {}",
                    entry.id,
                    entry
                        .version
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    entry.name,
                    if entry.success { "ok" } else { "failed" },
                    entry.installed_on,
                );
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sqlshift", &mut io::stdout());
        }
    }

    Ok(())
}
