//! Batcall CLI support: WAV loading and JSON report output

pub mod audio;
pub mod output;
