//! Standalone integrity check on two files

use crate::config::Config;
use crate::error::Result;
use crate::integrity::{IntegrityChecker, IntegrityResult, RewriteMode};
use std::path::Path;
use tracing::info;

/// Check a generated text file against its source file.
///
/// Uses the configured threshold and chunk size; `mode` only tags the verdict
/// and defaults to the configured rewrite mode.
pub fn cmd_check(
    config: &Config,
    source_path: &Path,
    generated_path: &Path,
    mode: Option<RewriteMode>,
) -> Result<IntegrityResult> {
    let source = std::fs::read_to_string(source_path)?;
    let generated = std::fs::read_to_string(generated_path)?;
    let mode = match mode {
        Some(mode) => mode,
        None => config.rewrite_mode()?,
    };

    let checker = IntegrityChecker::new(&config.integrity);
    let result = checker.check(&source, &generated, mode)?;
    info!(
        status = %result.status,
        max_similarity = result.max_similarity,
        "Integrity check complete"
    );
    Ok(result)
}

pub fn print_integrity(result: &IntegrityResult, threshold: f64) {
    let marker = if result.is_flagged() { "⚠" } else { "✓" };
    println!(
        "{} {} (max similarity {:.3}, threshold {:.2})",
        marker, result.status, result.max_similarity, threshold
    );
    println!("  Rewrite mode: {}", result.rewrite_mode);
    println!("  Source hash: {}", result.source_hash);

    if let Some(pair) = &result.worst_chunk_pair {
        println!("\nMost similar passage ({:.3}):", pair.similarity);
        println!("  Source:    {}", pair.source_chunk);
        println!("  Generated: {}", pair.generated_chunk);
    }
}
