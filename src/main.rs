use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use visitagg::{run_pipeline, VisitaggConfig};

#[derive(Parser)]
#[command(name = "visitagg")]
#[command(about = "Aggregate tab-separated visit logs into per-visitor counts")]
#[command(version)]
struct Cli {
    /// Directory of tab-separated input files (scanned non-recursively)
    input_dir: PathBuf,

    #[arg(
        short = 'o',
        long = "output",
        default_value = "./output.txt",
        help = "Output file, overwritten each run",
        help_heading = "Output Options"
    )]
    output: PathBuf,

    #[arg(
        short = 'c',
        long = "threads",
        default_value_t = 1,
        help = "Parse worker count (0 = one per CPU core)",
        help_heading = "Performance Options"
    )]
    threads: usize,

    #[arg(
        short = 'b',
        long = "batch-size",
        default_value_t = 1000,
        help = "Lines per batch moved between pipeline stages",
        help_heading = "Performance Options"
    )]
    batch_size: usize,

    #[arg(
        long = "parse-cost",
        default_value_t = 50,
        help = "Placeholder per-line parse work (0 disables)",
        help_heading = "Performance Options"
    )]
    parse_cost: u32,

    #[arg(
        short = 's',
        long = "stats",
        help = "Print a processing summary to stderr",
        help_heading = "Display Options"
    )]
    stats: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = VisitaggConfig {
        input_dir: cli.input_dir,
        output_file: cli.output,
        threads: cli.threads,
        batch_size: cli.batch_size,
        parse_cost: cli.parse_cost,
        stats: cli.stats,
    };

    match run_pipeline(&config) {
        Ok(summary) => {
            if config.stats {
                eprintln!("{}", summary.format_stats());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("visitagg: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
