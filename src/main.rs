//! schoolharvest CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use schoolharvest::{
    commands::{
        cmd_clear_cache, cmd_init, cmd_inspect, cmd_inspect_html, cmd_reset, cmd_scrape_details,
        cmd_scrape_statistics, cmd_status, cmd_summary, print_html_inspection, print_init,
        print_page_inspection, print_scrape_report, print_statistics_report, print_status,
        print_summary, ScrapeOptions,
    },
    config::Config,
    error::Result,
    progress::LogWriterFactory,
    store::Store,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "schoolharvest")]
#[command(version, about = "Harvest the Berlin school directory into SQLite", long_about = None)]
struct Cli {
    /// Path to config file or base directory
    #[arg(short, long, global = true, env = "SCHOOLHARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Harvest every detail page and store the results
    Scrape {
        /// Ignore cached pages (fresh captures are still cached)
        #[arg(long)]
        force_refresh: bool,

        /// Do not read or write the cache
        #[arg(long, conflicts_with = "force_refresh")]
        no_cache: bool,

        /// Empty the cache before starting
        #[arg(long)]
        clear_cache: bool,

        /// Run deadline in seconds (defaults to harvest.run_deadline_secs)
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Fetch the statistics portal grid and store it
    ScrapeStatistics,

    /// Delete all cached detail pages
    ClearCache,

    /// Count stored schools
    Summary,

    /// Show paths, cache and last run
    Status,

    /// Scrape one detail page live and print what was extracted
    Inspect {
        /// Detail page URL
        url: String,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },

    /// Run table detection over a saved HTML file
    InspectHtml {
        /// Path to the HTML file
        path: PathBuf,
    },

    /// Delete all stored schools and statistics
    Reset {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
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

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(LogWriterFactory::default()))
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Init { force } => {
            let base_dir = cli.config.as_deref().map(base_dir_of);
            let info = cmd_init(base_dir, force).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print_init(&info);
            }
            return Ok(());
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "schoolharvest", &mut std::io::stdout());
            return Ok(());
        }
        Commands::InspectHtml { ref path } => {
            let inspection = cmd_inspect_html(path)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&inspection)?);
            } else {
                print_html_inspection(&inspection);
            }
            return Ok(());
        }
        _ => {}
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scrape {
            force_refresh,
            no_cache,
            clear_cache,
            deadline_secs,
            headed,
        } => {
            let options = ScrapeOptions {
                force_refresh,
                no_cache,
                clear_cache,
                deadline: deadline_secs.map(Duration::from_secs),
                headed,
                progress: !cli.json && !cli.log_json,
            };

            let report = cmd_scrape_details(&config, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_scrape_report(&report);
            }
        }

        Commands::ScrapeStatistics => {
            let report = cmd_scrape_statistics(&config).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_statistics_report(&report);
            }
        }

        Commands::ClearCache => {
            let info = cmd_clear_cache(&config)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!(
                    "✓ Removed {} cached records from {}",
                    info.removed_entries, info.cache_dir
                );
            }
        }

        Commands::Summary => {
            let store = Store::new(&config.paths.db_file).await?;
            let summary = cmd_summary(&store).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Status => {
            let store = Store::new(&config.paths.db_file).await?;
            let status = cmd_status(&config, &store).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Inspect { url, headed } => {
            let inspection = cmd_inspect(&config, &url, headed).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&inspection)?);
            } else {
                print_page_inspection(&inspection);
            }
        }

        Commands::Reset { yes } => {
            if !yes {
                eprintln!(
                    "This deletes every stored school in {}.\nRe-run with --yes to confirm.",
                    config.paths.db_file.display()
                );
                std::process::exit(1);
            }

            let store = Store::new(&config.paths.db_file).await?;
            let info = cmd_reset(&store).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("✓ Deleted {} schools", info.deleted_details);
            }
        }

        Commands::Init { .. } | Commands::Completions { .. } | Commands::InspectHtml { .. } => {
            unreachable!()
        }
    }

    Ok(())
}

/// A `.toml` path names the config file; anything else is the base directory
fn base_dir_of(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "toml") {
        path.parent()
            .map(PathBuf::from)
            .unwrap_or_else(Config::default_base_dir)
    } else {
        path.to_path_buf()
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) if p.extension().is_some_and(|e| e == "toml") => Config::load(p),
        Some(p) => Config::load_from(Some(p.to_path_buf())),
        None => Config::load_from(None),
    }
}
