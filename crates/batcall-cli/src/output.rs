//! JSON output formatting

use batcall_core::BatCall;
use serde::Serialize;

/// Calls found in one input file
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub input: String,
    pub sample_rate: u32,
    pub duration_ms: f64,
    pub calls: Vec<BatCall>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub files: Vec<FileReport>,
}

impl Report {
    pub fn total_calls(&self) -> usize {
        self.files.iter().map(|f| f.calls.len()).sum()
    }
}

/// Render the report as pretty JSON.
pub fn to_json(report: &Report) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Print the report as pretty JSON on stdout
pub fn print_json_report(report: &Report) {
    match to_json(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }
}
