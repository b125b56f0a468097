mod docx;
mod engine;
mod error;
pub mod fit;
pub mod matcher;
mod model;
pub mod rewrite;
pub mod text;

pub use docx::PartKind;
pub use engine::{BackupStore, CancellationToken, ReplaceOptions, ScanOptions, SiblingBackup};
pub use error::{Error, Result};
pub use matcher::{Directive, DirectiveKind, Matcher};
pub use model::{
    BatchReplaceResult, FileReplaceResult, ImageInfo, Placeholder, PlaceholderLocation,
    PlaceholderScanResult, PreviewResult, ReplacementMap, ScanError,
};

use std::path::Path;
use std::time::Instant;

/// Find every placeholder in a `.docx` file or a folder of them.
///
/// Per-file problems are reported in the result; `Err` is returned only
/// for invalid arguments.
pub fn scan_path(path: &Path, options: &ScanOptions) -> Result<PlaceholderScanResult> {
    let result = engine::scan(path, options)?;
    log::info!(
        "Timing: scan={:.1}ms ({} files, {} placeholders, {} occurrences, {} errors)",
        result.scan_duration.as_secs_f64() * 1000.0,
        result.total_files_scanned,
        result.placeholders.len(),
        result.total_occurrences,
        result.errors.len(),
    );
    Ok(result)
}

/// Replace mapped placeholders in a `.docx` file or a folder of them.
///
/// Each file is rewritten atomically and only when something was replaced.
pub fn replace_path(
    path: &Path,
    map: &ReplacementMap,
    options: &ReplaceOptions,
) -> Result<BatchReplaceResult> {
    let t0 = Instant::now();
    let result = engine::replace(path, map, options)?;
    log::info!(
        "Timing: replace={:.1}ms ({} files, {} replacements, errors={})",
        t0.elapsed().as_secs_f64() * 1000.0,
        result.file_results.len(),
        result.total_replacements,
        result.has_errors,
    );
    Ok(result)
}

/// Report what [`replace_path`] would touch without writing anything.
pub fn preview_path(
    path: &Path,
    map: &ReplacementMap,
    options: &ScanOptions,
) -> Result<PreviewResult> {
    let t0 = Instant::now();
    let result = engine::preview(path, map, options)?;
    log::info!(
        "Timing: preview={:.1}ms ({} files, {} placeholders)",
        t0.elapsed().as_secs_f64() * 1000.0,
        result.files_to_process.len(),
        result.placeholders_to_replace.len(),
    );
    Ok(result)
}
