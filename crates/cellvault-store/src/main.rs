use std::path::PathBuf;

use anyhow::Context;
use cellvault_store::{JsonExtractor, Store, StoreConfig, VersionId};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "cellvault: versioned workbook cell store", long_about = None)]
struct Cli {
    /// Database file (overrides CELLVAULT_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a workbook, extracting it again only if the file changed
    Ingest {
        workbook: PathBuf,

        /// Extraction payload to read instead of `<workbook>.extract.json`
        #[arg(long)]
        extract: Option<PathBuf>,

        /// Extract even if the file is unchanged
        #[arg(long)]
        force: bool,
    },

    /// List the versions of a workbook
    Versions { workbook: PathBuf },

    /// Print one cell of a version as JSON
    Cell {
        version_id: VersionId,
        sheet: String,
        address: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cellvault_store=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env()?;
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    let store = Store::from_config(&config)
        .with_context(|| format!("Failed to open store {}", config.database_path.display()))?;

    match cli.command {
        Commands::Ingest {
            workbook,
            extract,
            force,
        } => {
            let extractor = match extract {
                Some(source) => JsonExtractor::from_file(source),
                None => JsonExtractor::sidecar(),
            };
            let outcome = store.load_or_extract(&workbook, &extractor, force)?;
            println!(
                "{} version {} (id {})",
                if outcome.cached { "cached" } else { "extracted" },
                outcome.version.version_number,
                outcome.version.id
            );
        }
        Commands::Versions { workbook } => {
            for version in store.list_versions(&workbook)? {
                println!(
                    "{}\t{}\t{}\t{}",
                    version.version_number,
                    version.id,
                    version.created_at.to_rfc3339(),
                    version.change_description
                );
            }
        }
        Commands::Cell {
            version_id,
            sheet,
            address,
        } => match store.get_cell(version_id, &sheet, &address)? {
            Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
            None => anyhow::bail!("No cell {}!{} in version {}", sheet, address, version_id),
        },
    }

    Ok(())
}
