//! Subcommand implementations.

pub mod report;
pub mod stage;
pub mod tape;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use riskblocs_ingest::{ParsedTape, TapeParser};
use riskblocs_types::RiskblocsConfig;

/// Read and parse the tape at `path` with the configured ingest settings.
pub fn read_tape(config: &RiskblocsConfig, path: &Path) -> Result<ParsedTape> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    TapeParser::new(config.ingest.clone())
        .parse_bytes(&bytes, file_name)
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Write `text` to `output`, or to stdout when no path is given.
pub fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = text.len(), "Wrote output");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
