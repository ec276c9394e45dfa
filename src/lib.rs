//! leadforge - A CLI pipeline that turns business websites into SEO profiles
//!
//! This crate provides:
//! - A batch lead pipeline (`pending -> scraped -> processed`) over SQLite
//! - Content integrity checks that flag rewrites too close to their source
//! - Percentile-based comparative positioning against peer businesses
//! - HTTP clients for a Firecrawl-compatible scraper and a chat-completions model

pub mod chunk;
pub mod commands;
pub mod config;
pub mod error;
pub mod generate;
pub mod integrity;
pub mod meta;
pub mod pipeline;
pub mod positioning;
pub mod progress;
pub mod scrape;
pub mod similarity;

pub use config::Config;
pub use error::{Error, Result};
