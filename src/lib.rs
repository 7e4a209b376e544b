//! Valuation analysis engine for spotting underpriced UK property
//! listings against Land Registry sale history.

pub mod analyzer;
pub mod config;
pub mod matcher;
pub mod model;
pub mod provider;
pub mod storage;
pub mod utils;
