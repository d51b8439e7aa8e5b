use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use fieldline_core::{Catalog, FieldlineConfig};

mod commands;

use commands::{CallerArgs, ListArgs};

#[derive(Parser, Debug)]
#[command(name = "fieldline", version, about = "Fieldline entity service tools")]
struct Cli {
    /// Path to fieldline.yaml. Defaults to ./fieldline.yaml, then built-ins.
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate entity metadata and the RLS policy table.
    Check,

    /// Print the SQL a list call would run for a caller, without running it.
    Explain {
        /// Entity key, e.g. work_order
        entity: String,

        #[command(flatten)]
        caller: CallerArgs,

        #[command(flatten)]
        list: ListArgs,
    },

    /// Print the JSON Schema for an entity's create or update input.
    Schema {
        entity: String,

        /// create or update
        operation: String,
    },

    /// List rows through the entity service.
    List {
        entity: String,

        #[command(flatten)]
        caller: CallerArgs,

        #[command(flatten)]
        list: ListArgs,

        /// Overrides the database section of the config.
        #[arg(long = "database-url", env = "FIELDLINE_DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Fetch one row by primary key through the entity service.
    Get {
        entity: String,

        id: String,

        #[command(flatten)]
        caller: CallerArgs,

        #[arg(long = "database-url", env = "FIELDLINE_DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.cmd {
        Command::Check => commands::check::run(config_path),
        Command::Explain {
            entity,
            caller,
            list,
        } => {
            let (config, catalog) = load(config_path)?;
            commands::explain::run(&config, &catalog, &entity, &caller, &list)
        }
        Command::Schema { entity, operation } => {
            let (_, catalog) = load(config_path)?;
            commands::schema::run(&catalog, &entity, &operation)
        }
        Command::List {
            entity,
            caller,
            list,
            database_url,
        } => {
            let (config, catalog) = load(config_path)?;
            commands::data::list(
                &config,
                &catalog,
                &entity,
                &caller,
                &list,
                database_url.as_deref(),
            )
            .await
        }
        Command::Get {
            entity,
            id,
            caller,
            database_url,
        } => {
            let (config, catalog) = load(config_path)?;
            commands::data::get(
                &config,
                &catalog,
                &entity,
                &id,
                &caller,
                database_url.as_deref(),
            )
            .await
        }
    }
}

/// Config and catalog for commands that need a valid configuration.
fn load(path: Option<&Path>) -> anyhow::Result<(FieldlineConfig, Catalog)> {
    let config = commands::load_config(path)?;
    let catalog = commands::load_catalog(&config)?;
    Ok((config, catalog))
}
