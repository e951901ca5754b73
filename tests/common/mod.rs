// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tempfile::TempDir;
use visitagg::{run_pipeline, PipelineSummary, VisitaggConfig};

/// Output record tuple: (user_id, ip, os, browser).
pub type VisitKey = (u32, String, String, String);

/// Create an input directory populated with the given (name, contents) files.
pub fn make_input_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp input dir");
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents).expect("Failed to write input file");
    }
    dir
}

/// Run the pipeline over `input_dir` with the given parallelism settings,
/// writing to `output_file`.
pub fn run_aggregation(
    input_dir: &Path,
    output_file: &Path,
    threads: usize,
    batch_size: usize,
) -> Result<PipelineSummary> {
    let config = VisitaggConfig {
        input_dir: input_dir.to_path_buf(),
        output_file: output_file.to_path_buf(),
        threads,
        batch_size,
        parse_cost: 0,
        stats: false,
    };
    run_pipeline(&config)
}

/// Parse the output file into a key -> count map, asserting no key appears
/// on more than one line.
pub fn read_output(path: &Path) -> HashMap<VisitKey, u32> {
    let contents = fs::read_to_string(path).expect("Failed to read output file");
    let mut map = HashMap::new();

    for line in contents.lines() {
        let parts: Vec<&str> = line.split('\t').collect();
        assert_eq!(parts.len(), 5, "malformed output line: {:?}", line);
        let count: u32 = parts[0].parse().expect("non-numeric count");
        let key = (
            parts[1].parse::<u32>().expect("non-numeric user id"),
            parts[2].to_string(),
            parts[3].to_string(),
            parts[4].to_string(),
        );
        let previous = map.insert(key, count);
        assert!(previous.is_none(), "duplicate key in output: {:?}", line);
    }

    map
}
