use std::time::Duration;

/// Counters and per-stage timings reported by a finished pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub files_read: usize,
    pub lines_read: usize,
    pub lines_parsed: usize,
    pub unique_visits: usize,
    pub lines_written: usize,
    pub read_time: Duration,
    pub parse_time: Duration,
    pub write_time: Duration,
    pub total_time: Duration,
}

impl PipelineSummary {
    pub fn format_stats(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Read {} lines from {} files in {}ms",
            self.lines_read,
            self.files_read,
            self.read_time.as_millis()
        ));
        output.push_str(&format!(
            "; parsed {} lines in {}ms",
            self.lines_parsed,
            self.parse_time.as_millis()
        ));
        output.push_str(&format!(
            "; wrote {} unique visits in {}ms",
            self.lines_written,
            self.write_time.as_millis()
        ));

        let total_ms = self.total_time.as_millis();
        output.push_str(&format!("; total {}ms", total_ms));

        if total_ms > 0 && self.lines_read > 0 {
            let lines_per_sec = (self.lines_read as f64 * 1000.0) / total_ms as f64;
            output.push_str(&format!(" ({:.0} lines/s)", lines_per_sec));
        }

        output
    }
}
