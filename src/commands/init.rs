//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// What `init` created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitReport {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub overwritten: bool,
}

/// Write a default config and create the lead database.
///
/// An existing config is only replaced with `force`; the database is kept
/// either way and its schema is applied idempotently.
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<InitReport> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    let exists = config.paths.config_file.exists();
    if exists && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(InitReport {
        base_dir: config.paths.base_dir,
        config_path: config.paths.config_file,
        db_path: config.paths.db_file,
        overwritten: exists,
    })
}

pub fn print_init(report: &InitReport) {
    println!("✓ Initialized leadforge at {:?}", report.base_dir);
    println!("\nConfiguration: {:?}", report.config_path);
    println!("Database: {:?}", report.db_path);
    println!("\nNext steps:");
    println!("  export FIRECRAWL_API_KEY=...          # Scrape service key");
    println!("  export LLM_API_KEY=...                # Generation service key");
    println!("  leadforge leads add example.com       # Queue a lead");
    println!("  leadforge run                         # Drain the queue");
}
