//! riskblocs - loan tape toolkit
//!
//! Offline front end over the RiskBlocs crates: parse and filter tapes,
//! render ESMA and investor reports, scrape offering PDFs, and resolve
//! the transaction stage of a deal snapshot.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use riskblocs_types::RiskblocsConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// riskblocs - loan tape toolkit
#[derive(Parser, Debug)]
#[command(name = "riskblocs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a JSON configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Tapes ===
    /// Parse a loan tape and print what was kept, dropped and rejected
    Parse(commands::tape::ParseArgs),

    /// Filter a loan tape and export the selection as CSV
    Filter(commands::tape::FilterArgs),

    // === Reports ===
    /// Render the ESMA loan-level template for a tape
    Esma(commands::report::EsmaArgs),

    /// Build the investor report (summary, strats, tranches, waterfall)
    Report(commands::report::ReportArgs),

    /// Scrape deal terms from an offering PDF
    Pdf {
        /// PDF file
        file: PathBuf,
    },

    // === Deals ===
    /// Resolve the transaction stage of a deal snapshot
    Stage(commands::stage::StageArgs),
}

fn init_logging(level: &str, json: bool) {
    // RUST_LOG wins over --log-level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let plain = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let structured = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RiskblocsConfig> {
    let config = match path {
        Some(path) => RiskblocsConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RiskblocsConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);
    let config = load_config(cli.config.as_ref())?;

    match &cli.command {
        Commands::Parse(args) => commands::tape::parse(&config, args),
        Commands::Filter(args) => commands::tape::filter(&config, args),
        Commands::Esma(args) => commands::report::esma(&config, args),
        Commands::Report(args) => commands::report::report(&config, args),
        Commands::Pdf { file } => commands::report::pdf(file),
        Commands::Stage(args) => commands::stage::run(args),
    }
}
