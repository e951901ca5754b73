//! Synthetic visit-log generator. Prints conforming tab-separated lines to
//! stdout, deterministic by default so runs are reproducible.

use std::io::{self, BufWriter, Write};

use anyhow::Result;
use clap::Parser;

const DATE: &str = "2018-06-05 06:00:00";

/// Percent of lines carrying an identified user id.
const USER_FRACTION: u32 = 66;
const USER_RANGE: u32 = 1000;

const IP_PREFIX: &str = "192.168.0.";
const IP_RANGE: u32 = 256;

const OS_LIST: [&str; 5] = ["Windows", "Mac OS X", "Android", "iOS", "Ubuntu"];
const BROWSER_LIST: [&str; 5] = ["Chrome", "Safari", "Firefox", "Opera", "IE"];

const DEFAULT_SEED: u64 = 4855279955359852901;

#[derive(Parser)]
#[command(name = "visitgen")]
#[command(about = "Generate synthetic tab-separated visit logs on stdout")]
#[command(version)]
struct Cli {
    /// Number of lines to generate
    #[arg(short = 'n', long = "lines", default_value_t = 1000)]
    lines: u64,

    /// Seed for the random generator
    #[arg(long = "seed", default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Use an entropy-derived seed instead of the fixed default
    #[arg(short = 'r', long = "random", conflicts_with = "seed")]
    random: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut rng = if cli.random {
        fastrand::Rng::new()
    } else {
        fastrand::Rng::with_seed(cli.seed)
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for _ in 0..cli.lines {
        writeln!(out, "{}", rand_visit(&mut rng))?;
    }
    out.flush()?;

    Ok(())
}

fn rand_visit(rng: &mut fastrand::Rng) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        DATE,
        rand_user_id(rng),
        rand_ip(rng),
        rand_os(rng),
        rand_browser(rng)
    )
}

fn rand_user_id(rng: &mut fastrand::Rng) -> u32 {
    if rng.u32(0..100) < USER_FRACTION {
        front_weighted(rng, 1, USER_RANGE)
    } else {
        0
    }
}

fn rand_ip(rng: &mut fastrand::Rng) -> String {
    format!("{}{}", IP_PREFIX, front_weighted(rng, 0, IP_RANGE))
}

fn rand_os(rng: &mut fastrand::Rng) -> &'static str {
    OS_LIST[front_weighted(rng, 0, OS_LIST.len() as u32) as usize]
}

fn rand_browser(rng: &mut fastrand::Rng) -> &'static str {
    BROWSER_LIST[front_weighted(rng, 0, BROWSER_LIST.len() as u32) as usize]
}

/// Skewed draw in `[start, end)`: small values are much more likely.
fn front_weighted(rng: &mut fastrand::Rng, start: u32, end: u32) -> u32 {
    let len = (end - start) as f64;
    start + ((101f64.powf(rng.f64()) - 1.0) / 100.0 * len) as u32
}
