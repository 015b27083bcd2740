//! # Catalog Harness CLI (`catalog`)
//!
//! ## Usage
//!
//! ```bash
//! catalog [--settings catalog.toml] [--root DIR] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `catalog split` | Normalize the flat export and write one file per family |
//! | `catalog provision` | Create the products and documents collections if missing |
//! | `catalog load-products` | Insert every `products/*/products.jsonl` |
//! | `catalog load-documents` | Insert every `products/*/documents.jsonl` |
//! | `catalog truncate` | Delete all documents from both collections |
//! | `catalog check-docs <dir>` | Validate a family directory's documentation references |
//! | `catalog prompts` | Build `image-prompts.jsonl` from the catalog |
//! | `catalog images` | Generate product images from the prompts |
//! | `catalog hero` | Generate the landing-page hero image |
//! | `catalog links` | Rewrite ID references in documentation as Markdown links |
//!
//! Store and API credentials are read from the environment (a `.env` file
//! in the working directory is loaded first). Log verbosity follows
//! `RUST_LOG`, defaulting to `info`.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use catalog_harness::config::Config;
use catalog_harness::load::CatalogKind;
use catalog_harness::{check, config, images, links, load, prompts, provision, split, truncate};

/// Catalog Harness: prepare, enrich, and load a product catalog.
#[derive(Parser)]
#[command(name = "catalog", version)]
struct Cli {
    /// Optional TOML settings file. Built-in defaults apply without one.
    #[arg(long, global = true, env = "CATALOG_SETTINGS")]
    settings: Option<PathBuf>,

    /// Catalog root directory; overrides `[catalog].root`.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize `products.jsonl` and split it into family files.
    ///
    /// Writes `products/<family>/products.jsonl` for every family that has
    /// products. Records of unknown families are dropped and counted.
    Split,

    /// Create the catalog collections if they do not exist.
    Provision,

    /// Load every family `products.jsonl` into the products collection.
    LoadProducts,

    /// Load every family `documents.jsonl` into the documents collection.
    LoadDocuments,

    /// Delete all documents from the catalog collections. Asks for `yes` first.
    Truncate,

    /// Validate `products.jsonl` and `documents.jsonl` in one family directory.
    CheckDocs {
        /// Family directory, e.g. `products/constructobots`.
        dir: PathBuf,
    },

    /// Build image prompts for every product.
    Prompts,

    /// Generate missing product images from the prompts file.
    Images,

    /// Generate the landing-page hero image.
    Hero,

    /// Replace product and document IDs in documentation with Markdown links.
    Links,
}

/// Settings file plus environment, with `--root` applied.
fn load_settings(path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut cfg = config::load_config(path)?;
    if let Some(root) = root {
        cfg.catalog.root = root;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        settings,
        root,
        command,
    } = Cli::parse();
    let load_cfg = || load_settings(settings.as_deref(), root.clone());

    match command {
        // Needs no settings or credentials.
        Commands::CheckDocs { dir } => check::run_check_docs(&dir)?,
        Commands::Split => split::run_split(&load_cfg()?)?,
        Commands::Provision => provision::run_provision(&load_cfg()?).await?,
        Commands::LoadProducts => load::run_load(&load_cfg()?, CatalogKind::Products).await?,
        Commands::LoadDocuments => load::run_load(&load_cfg()?, CatalogKind::Documents).await?,
        Commands::Truncate => truncate::run_truncate(&load_cfg()?).await?,
        Commands::Prompts => prompts::run_prompts(&load_cfg()?)?,
        Commands::Images => images::run_images(&load_cfg()?).await?,
        Commands::Hero => images::run_hero(&load_cfg()?).await?,
        Commands::Links => links::run_links(&load_cfg()?).await?,
    }

    Ok(())
}
