//! Configuration module for mdb-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use mdb_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawling years {}..={}", config.crawler.first_year, config.crawler.last_year);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{CaptchaConfig, Config, CrawlerConfig, FetchConfig, OutputConfig, SiteConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
