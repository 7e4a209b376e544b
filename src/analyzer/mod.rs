// Analyzer module: the valuation engine proper.

pub mod bargain;
pub mod comparables;
pub mod orchestrator;
pub mod ppsf;

pub use orchestrator::AnalysisService;
