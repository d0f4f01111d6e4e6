//! Report Synthesizer (spec §4.6): turns a scan's evidence into a scored,
//! cited `Report`.

pub mod analyzer;
pub mod citation;
pub mod synthesize;

pub use analyzer::{Analyzer, DeterministicAnalyzer, OpenRouterAnalyzer};
pub use synthesize::{ReportGenerator, Synthesizer};
