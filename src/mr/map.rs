use std::collections::HashMap;

use super::{LogFormat, PartialResult};

/// Status-code counts for one chunk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapOutput {
    pub counts: HashMap<String, i64>,
    /// Non-empty lines the log format did not match.
    pub skipped_lines: u64,
}

impl MapOutput {
    /// One partial result per distinct status code, in no particular order.
    pub fn into_partial_results(self) -> Vec<PartialResult> {
        self.counts
            .into_iter()
            .map(|(key, count)| PartialResult { key, count })
            .collect()
    }
}

pub fn map_chunk(format: &dyn LogFormat, data: &[u8]) -> MapOutput {
    let mut out = MapOutput::default();
    for line in data.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let line = String::from_utf8_lossy(line);
        match format.status_code(&line) {
            Some(status) => *out.counts.entry(status.to_string()).or_insert(0) += 1,
            None => out.skipped_lines += 1,
        }
    }
    out
}
