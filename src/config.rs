use std::path::PathBuf;

use anyhow::{bail, Result};

/// Immutable run configuration, constructed once from the CLI and passed
/// into the pipeline entry point.
#[derive(Debug, Clone)]
pub struct VisitaggConfig {
    /// Directory scanned (non-recursively) for input files.
    pub input_dir: PathBuf,
    /// Output file, created or truncated on every run.
    pub output_file: PathBuf,
    /// Parse worker count; 0 means one worker per CPU core.
    pub threads: usize,
    /// Lines per batch moved between stages.
    pub batch_size: usize,
    /// Placeholder per-line parse work; 0 disables it.
    pub parse_cost: u32,
    /// Print a processing summary to stderr after the run.
    pub stats: bool,
}

impl VisitaggConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        Ok(())
    }

    /// Get effective parse worker count with auto-detection
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

impl Default for VisitaggConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./data"),
            output_file: PathBuf::from("./output.txt"),
            threads: 1,
            batch_size: 1000,
            parse_cost: 50,
            stats: false,
        }
    }
}
