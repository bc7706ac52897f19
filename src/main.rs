#![allow(dead_code, unused_imports)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod acquisition;
mod config;
mod error;
mod graph;
mod model;
mod modeler;
mod progress;
mod schema;

use acquisition::HttpFetcher;
use config::ModelerConfig;
use modeler::driver::ModelerDriver;
use modeler::RunOutcome;

#[derive(Parser)]
#[command(
    name = "tessera",
    about = "Tessera — website structure modeler",
    version,
    after_help = "Run 'tessera <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover a site's page classes and emit its page-class graph
    Model {
        /// Entry URL the run starts from (e.g. "https://example.com")
        url: String,
        /// Total page budget for the run
        #[arg(long, default_value_t = config::DEFAULT_MAX_TOTAL_PAGES)]
        max_pages: u32,
        /// Target pages sampled per collection expansion
        #[arg(long, default_value_t = config::DEFAULT_BATCH_WIDTH)]
        batch: usize,
        /// Politeness wait between batches, in milliseconds
        #[arg(long, default_value = "500")]
        wait_ms: u64,
        /// Ask the fetch service to execute script when rendering pages
        #[arg(long)]
        script: bool,
        /// Keep page snapshots on disk instead of in memory
        #[arg(long)]
        persist_snapshots: bool,
        /// Directory for disk snapshots (defaults to the platform data dir)
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
        /// Load run configuration from a JSON file (CLI flags override it)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the graph JSON here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "tessera=debug"
    } else if cli.quiet {
        "tessera=error"
    } else {
        "tessera=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().expect("static directive parses")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Model {
            url,
            max_pages,
            batch,
            wait_ms,
            script,
            persist_snapshots,
            snapshot_dir,
            config,
            output,
        } => {
            let mut cfg = match config {
                Some(path) => ModelerConfig::load(&path)?,
                None => ModelerConfig::default(),
            };
            cfg.entry_url = url;
            cfg.max_total_pages = max_pages;
            cfg.max_pages_per_batch = batch;
            cfg.inter_batch_wait_ms = wait_ms;
            cfg.use_script = script;
            cfg.persist_snapshots = persist_snapshots;
            if snapshot_dir.is_some() {
                cfg.snapshot_dir = snapshot_dir;
            }

            run_model(cfg, cli.json, cli.quiet, output).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tessera", &mut std::io::stdout());
            Ok(())
        }
    }
}

async fn run_model(
    cfg: ModelerConfig,
    json: bool,
    quiet: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(cfg.fetch_timeout_ms));
    let driver = ModelerDriver::new(cfg, fetcher, None).context("failed to start model run")?;
    let run_id = driver.run_id().to_string();
    info!(run_id = %run_id, "model run starting");

    match driver.run().await {
        RunOutcome::Graph(graph) => {
            let rendered = graph.to_json().context("failed to serialize graph")?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    if !quiet {
                        eprintln!(
                            "wrote {} classes, {} edges to {}",
                            graph.header.node_count,
                            graph.header.edge_count,
                            path.display()
                        );
                    }
                }
                None => println!("{rendered}"),
            }
            Ok(())
        }
        RunOutcome::NoModel { reason } => {
            if json {
                println!("{}", serde_json::json!({ "no_model": true, "reason": reason }));
            } else {
                eprintln!("no model: {reason}");
            }
            std::process::exit(2);
        }
    }
}
