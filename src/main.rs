//! leadforge CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use leadforge::{
    commands::{
        cmd_add_lead, cmd_check, cmd_costs, cmd_init, cmd_list_leads, cmd_position, cmd_retry,
        cmd_run, cmd_show_lead, cmd_status, print_costs, print_init, print_integrity,
        print_lead_detail, print_leads, print_positions, print_run_summary, print_status,
        PositionOptions, RunOptions,
    },
    config::Config,
    error::{Error, Result},
    integrity::RewriteMode,
    meta::{LeadStatus, MetaDb, NewLead},
    pipeline::Stage,
    positioning::{Metric, Scope},
    progress::LogWriterFactory,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "leadforge")]
#[command(version, about = "Scrape business websites into original, integrity-checked SEO profiles", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize leadforge configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Run the lead pipeline
    Run {
        /// Stage to run first (scrape or generate)
        #[arg(long)]
        stage: Option<String>,

        /// Leads per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Run a single batch instead of draining the queue
        #[arg(long)]
        once: bool,
    },

    /// Reset failed leads to pending
    Retry,

    /// Show pipeline status
    Status,

    /// Show estimated API costs
    Costs,

    /// Add, list and inspect leads
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },

    /// Check a generated text against its source for copied passages
    Check {
        /// Source text file
        source: PathBuf,

        /// Generated text file
        generated: PathBuf,

        /// Rewrite mode to tag the verdict with
        #[arg(long)]
        mode: Option<String>,
    },

    /// Compute comparative positions for a lead
    Position {
        /// Lead ID
        lead_id: i64,

        /// Peer scope (city, neighborhood, service_cluster)
        #[arg(long)]
        scope: Option<String>,

        /// Metrics to rank (rating, reviews, years_active)
        #[arg(long = "metric")]
        metrics: Vec<String>,

        /// Area for neighborhood scope
        #[arg(long)]
        area: Option<String>,

        /// Service for service_cluster scope
        #[arg(long)]
        service: Option<String>,

        /// Store the positions on the lead
        #[arg(long)]
        save: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum LeadsAction {
    /// Queue a new lead
    Add {
        /// Business website
        website: String,

        /// City the business operates in
        #[arg(long, default_value = "")]
        city: String,

        /// Business name
        #[arg(long)]
        name: Option<String>,

        /// Street address ("street, City, ST zip")
        #[arg(long)]
        address: Option<String>,

        /// Average review rating
        #[arg(long)]
        rating: Option<f64>,

        /// Number of reviews
        #[arg(long)]
        reviews: Option<i64>,

        /// Years in business
        #[arg(long)]
        years: Option<i64>,
    },

    /// List leads
    List {
        /// Filter by status (pending, scraped, processed, failed)
        #[arg(long)]
        status: Option<String>,

        /// Maximum number of leads
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show one lead
    Show {
        /// Lead ID
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let base_dir = cli.config.as_deref().map(config_base_dir);
        let report = cmd_init(base_dir, force).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_init(&report);
        }
        return Ok(());
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "leadforge", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Check needs no database
    if let Commands::Check {
        source,
        generated,
        mode,
    } = &cli.command
    {
        let mode = mode.as_deref().map(str::parse::<RewriteMode>).transpose()?;
        let result = cmd_check(&config, source, generated, mode)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_integrity(&result, config.integrity.similarity_threshold);
        }
        return Ok(());
    }

    let db = MetaDb::new(&config.paths.db_file).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } | Commands::Check { .. } => {
            unreachable!()
        }

        Commands::Run {
            stage,
            batch_size,
            once,
        } => {
            let options = RunOptions {
                stage: stage.as_deref().map(str::parse::<Stage>).transpose()?,
                batch_size,
                once,
                show_progress: !cli.json,
            };

            let summary = cmd_run(&config, Arc::new(db), options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_run_summary(&summary);
            }
        }

        Commands::Retry => {
            let report = cmd_retry(&db).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("✓ Reset {} failed lead(s) to pending", report.reset);
            }
        }

        Commands::Status => {
            let status = cmd_status(&config, &db).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Costs => {
            let costs = cmd_costs(&config, &db).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&costs)?);
            } else {
                print_costs(&costs);
            }
        }

        Commands::Leads { action } => {
            handle_leads(&db, action, cli.json).await?;
        }

        Commands::Position {
            lead_id,
            scope,
            metrics,
            area,
            service,
            save,
        } => {
            let options = PositionOptions {
                scope: scope.as_deref().map(str::parse::<Scope>).transpose()?,
                metrics: metrics
                    .iter()
                    .map(|m| m.parse::<Metric>())
                    .collect::<Result<Vec<_>>>()?,
                area,
                service,
                save,
            };

            let report = cmd_position(&config, &db, lead_id, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_positions(&report);
            }
        }
    }

    Ok(())
}

async fn handle_leads(db: &MetaDb, action: LeadsAction, json: bool) -> Result<()> {
    match action {
        LeadsAction::Add {
            website,
            city,
            name,
            address,
            rating,
            reviews,
            years,
        } => {
            let lead = NewLead {
                website,
                city,
                business_name: name,
                address,
                rating,
                reviews_count: reviews,
                years_active: years,
            };
            let added = cmd_add_lead(db, lead).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&added)?);
            } else {
                println!("✓ Added lead #{} ({})", added.id, added.website);
            }
        }

        LeadsAction::List { status, limit } => {
            let status = status.as_deref().map(str::parse::<LeadStatus>).transpose()?;
            let leads = cmd_list_leads(db, status, limit).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&leads)?);
            } else {
                print_leads(&leads);
            }
        }

        LeadsAction::Show { id } => {
            let detail = cmd_show_lead(db, id).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print_lead_detail(&detail);
            }
        }
    }

    Ok(())
}

/// Base directory for `--config`: a `.toml` path means its parent directory
fn config_base_dir(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => p.to_path_buf(),
        Some(p) => p.join("config.toml"),
        None => Config::default_config_path(),
    };

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}
