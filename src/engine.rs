use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::docx::image::{self, ImageRequest};
use crate::docx::runs::{ParagraphRuns, run_texts};
use crate::docx::traverse::{self, ParagraphLocation};
use crate::docx::xml::XmlElement;
use crate::docx::{DocxPackage, Part, PartKind};
use crate::error::{Error, Result};
use crate::matcher::{Directive, DirectiveKind, Matcher};
use crate::model::{
    BatchReplaceResult, FileReplaceResult, Placeholder, PlaceholderLocation,
    PlaceholderScanResult, PreviewResult, ReplacementMap, ScanError, normalize_name,
};
use crate::rewrite::apply_all;
use crate::text::{Insert, LogicalParagraphText};

const SNIPPET_RADIUS: usize = 30;

/// Coarse cancellation, checked before each file starts.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Copies a file aside before it is overwritten.
pub trait BackupStore: Send + Sync {
    fn backup(&self, path: &Path) -> std::io::Result<PathBuf>;
}

/// `report.docx` -> `report.docx.bak` (or `.bak.1`, `.bak.2`, ... when taken).
#[derive(Clone, Copy, Debug, Default)]
pub struct SiblingBackup;

impl BackupStore for SiblingBackup {
    fn backup(&self, path: &Path) -> std::io::Result<PathBuf> {
        let with_suffix = |suffix: &str| {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            PathBuf::from(name)
        };
        let mut target = with_suffix(".bak");
        let mut n = 1;
        while target.exists() {
            target = with_suffix(&format!(".bak.{n}"));
            n += 1;
        }
        std::fs::copy(path, &target)?;
        Ok(target)
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub recursive: bool,
    pub max_workers: usize,
    pub matcher: Matcher,
    pub cancel: CancellationToken,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            max_workers: default_workers(),
            matcher: Matcher::default(),
            cancel: CancellationToken::new(),
        }
    }
}

impl ScanOptions {
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Clone)]
pub struct ReplaceOptions {
    pub recursive: bool,
    pub max_workers: usize,
    pub matcher: Matcher,
    pub create_backup: bool,
    pub backup: Arc<dyn BackupStore>,
    pub cancel: CancellationToken,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            max_workers: default_workers(),
            matcher: Matcher::default(),
            create_backup: false,
            backup: Arc::new(SiblingBackup),
            cancel: CancellationToken::new(),
        }
    }
}

impl ReplaceOptions {
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_backup(mut self, create_backup: bool) -> Self {
        self.create_backup = create_backup;
        self
    }

    pub fn with_backup_store(mut self, store: Arc<dyn BackupStore>) -> Self {
        self.backup = store;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One token found while scanning a file.
struct FoundToken {
    name: String,
    raw: String,
    kind: DirectiveKind,
    part: PartKind,
    snippet: String,
}

/// Read-only pass over one document.
fn scan_file(path: &Path, matcher: &Matcher) -> Result<Vec<FoundToken>> {
    let package = DocxPackage::open(path)?;
    let mut found = Vec::new();
    for location in traverse::paragraphs(&package) {
        let Some(paragraph) = paragraph_at(&package, &location) else {
            continue;
        };
        let layout = LogicalParagraphText::from_runs(&run_texts(paragraph));
        if layout.is_empty() {
            continue;
        }
        for m in matcher.find_all(&layout.text) {
            let name = m.directive.name();
            if name.is_empty() {
                log::debug!("{}: skipping empty placeholder", path.display());
                continue;
            }
            found.push(FoundToken {
                name: name.to_string(),
                raw: layout.text[m.span()].to_string(),
                kind: m.directive.kind(),
                part: location.kind,
                snippet: layout.snippet(m.span(), SNIPPET_RADIUS),
            });
        }
    }
    Ok(found)
}

fn paragraph_at<'a>(package: &'a DocxPackage, location: &ParagraphLocation) -> Option<&'a XmlElement> {
    package.parts.get(location.part)?.root.at_path(&location.path)
}

/// Outcome of the replace pass over an opened package.
#[derive(Default)]
struct PackageEdits {
    applied: usize,
    match_errors: Vec<String>,
}

/// Apply every mapped placeholder in the package, paragraph by paragraph.
fn replace_in_package(
    package: &mut DocxPackage,
    map: &ReplacementMap,
    matcher: &Matcher,
) -> PackageEdits {
    let mut edits = PackageEdits::default();
    for location in traverse::paragraphs(package) {
        let Some(paragraph) = paragraph_at(package, &location) else {
            continue;
        };
        let layout = LogicalParagraphText::from_runs(&run_texts(paragraph));
        if layout.is_empty() {
            continue;
        }

        // Resolve replacements first; image registration needs the package
        let mut splices: Vec<(Range<usize>, Insert<XmlElement>)> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut sources: Vec<Option<String>> = Vec::new();
        let mut fresh: Vec<String> = Vec::new();
        for m in matcher.find_all(&layout.text) {
            let (insert, source) = match &m.directive {
                Directive::Text { name } => match map.get(name) {
                    Some(value) => (Insert::Text(value.to_string()), None),
                    None => continue,
                },
                Directive::Image {
                    name,
                    width,
                    height,
                } => {
                    let Some(source) = map.get(name) else {
                        log::debug!("No image for {name}, leaving placeholder");
                        continue;
                    };
                    let request = ImageRequest {
                        name,
                        source,
                        width: *width,
                        height: *height,
                    };
                    let registered = package.cached_image_rel(location.part, source).is_some();
                    match image::resolve(package, location.part, &request) {
                        Ok(drawing) => {
                            if !registered {
                                fresh.push(source.to_string());
                            }
                            (Insert::Drawing(drawing), Some(source.to_string()))
                        }
                        Err(e) => {
                            let level = if e.is_recoverable() {
                                log::Level::Warn
                            } else {
                                log::Level::Error
                            };
                            log::log!(level, "Image placeholder {name} not replaced: {e}");
                            edits.match_errors.push(format!("{name}: {e}"));
                            continue;
                        }
                    }
                }
            };
            names.push(m.directive.name().to_string());
            sources.push(source);
            splices.push((m.span(), insert));
        }
        if splices.is_empty() {
            continue;
        }

        let results = match package.parts.get_mut(location.part) {
            Some(part) => splice_paragraph(part, &location.path, &layout, splices),
            None => rejected(names.len(), "part is gone"),
        };
        let part_name = package.parts.get(location.part).map_or("", |p| p.name.as_str());
        let mut used: HashSet<&str> = HashSet::new();
        for ((name, source), result) in names.iter().zip(&sources).zip(results) {
            match result {
                Ok(()) => {
                    log::trace!(
                        "Replaced {name} in {part_name} (table depth {})",
                        location.table_depth
                    );
                    edits.applied += 1;
                    if let Some(source) = source {
                        used.insert(source.as_str());
                    }
                }
                Err(e) => {
                    log::warn!("Placeholder {name} in {part_name} not replaced: {e}");
                    edits.match_errors.push(format!("{name}: {e}"));
                }
            }
        }
        for source in fresh.iter().filter(|s| !used.contains(s.as_str())) {
            package.discard_image(location.part, source);
        }
    }
    edits
}

/// Splice one paragraph. Mixed runs are split first, so the layout is read
/// again; its text must still be the text the matches came from.
fn splice_paragraph(
    part: &mut Part,
    path: &[usize],
    layout: &LogicalParagraphText,
    splices: Vec<(Range<usize>, Insert<XmlElement>)>,
) -> Vec<Result<()>> {
    let count = splices.len();
    let prefix = part.wml_prefix.clone();
    let Some(paragraph) = part.root.at_path_mut(path) else {
        return rejected(count, "paragraph is gone");
    };
    let mut runs = ParagraphRuns::new(paragraph, prefix.as_deref());
    let current = LogicalParagraphText::from_runs(&runs);
    if current.text != layout.text {
        return rejected(count, "paragraph text changed before splicing");
    }
    let results = apply_all(&mut runs, &current, splices);
    if runs.is_modified() {
        part.dirty = true;
    }
    results
}

fn rejected(count: usize, why: &str) -> Vec<Result<()>> {
    (0..count)
        .map(|_| Err(Error::RewriteInconsistency(why.to_string())))
        .collect()
}

/// Replace placeholders in one file. The file is rewritten only when at
/// least one placeholder was replaced, and only as a whole.
pub(crate) fn replace_file(path: &Path, map: &ReplacementMap, options: &ReplaceOptions) -> FileReplaceResult {
    let mut package = match DocxPackage::open(path) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("{}: {e}", path.display());
            return FileReplaceResult::failed(path.to_path_buf(), &e);
        }
    };

    let edits = replace_in_package(&mut package, map, &options.matcher);
    let mut result = FileReplaceResult {
        file_path: path.to_path_buf(),
        is_success: true,
        replacement_count: edits.applied,
        error_message: None,
        match_errors: edits.match_errors,
        backup_path: None,
    };
    if edits.applied == 0 || !package.is_modified() {
        return result;
    }

    if options.create_backup {
        match options.backup.backup(path) {
            Ok(backup) => result.backup_path = Some(backup),
            Err(e) => {
                let e = Error::Io(e);
                log::warn!("{}: backup failed, not saving: {e}", path.display());
                return FileReplaceResult {
                    match_errors: result.match_errors,
                    ..FileReplaceResult::failed(path.to_path_buf(), &e)
                };
            }
        }
    }

    if let Err(e) = package.save(path) {
        log::warn!("{}: save failed, original left untouched: {e}", path.display());
        return FileReplaceResult {
            match_errors: result.match_errors,
            backup_path: result.backup_path,
            ..FileReplaceResult::failed(path.to_path_buf(), &e)
        };
    }
    log::info!("Saved {} ({} replacements)", path.display(), edits.applied);
    result
}

/// Expand a file or folder argument into the documents to process.
fn discover(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        let looks_like_file = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("docx"));
        return Err(if looks_like_file {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::DirectoryNotFound(path.to_path_buf())
        });
    }

    let walker = walkdir::WalkDir::new(path)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(false);
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("Skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_document(p))
        .collect();
    files.sort();
    Ok(files)
}

fn is_document(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    // Word's owner/lock files
    !name.starts_with("~$")
        && path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("docx"))
}

fn validate_common(path: &Path, max_workers: usize) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::InputValidation("path is empty".into()));
    }
    if max_workers == 0 {
        return Err(Error::InputValidation("max_workers must be at least 1".into()));
    }
    Ok(())
}

/// Run `task` over `files` on a bounded pool. `None` marks files skipped
/// after cancellation.
fn run_files<T, F>(files: &[PathBuf], workers: usize, cancel: &CancellationToken, task: F) -> Result<Vec<Option<T>>>
where
    T: Send,
    F: Fn(&Path) -> T + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    Ok(pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(task(file.as_path()))
            })
            .collect()
    }))
}

pub(crate) fn scan(path: &Path, options: &ScanOptions) -> Result<PlaceholderScanResult> {
    validate_common(path, options.max_workers)?;
    let t0 = Instant::now();

    let files = match discover(path, options.recursive) {
        Ok(files) => files,
        Err(e) => {
            return Ok(PlaceholderScanResult {
                placeholders: Vec::new(),
                total_files_scanned: 0,
                total_occurrences: 0,
                errors: vec![ScanError {
                    file_path: path.to_path_buf(),
                    message: e.to_string(),
                }],
                is_successful: false,
                scan_duration: t0.elapsed(),
                cancelled: false,
            });
        }
    };

    let outcomes = run_files(&files, options.max_workers, &options.cancel, |file| {
        scan_file(file, &options.matcher)
    })?;

    let mut placeholders: Vec<Placeholder> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut errors = Vec::new();
    let mut scanned = 0;
    let mut cancelled = false;

    for (file, outcome) in files.iter().zip(outcomes) {
        let tokens = match outcome {
            None => {
                cancelled = true;
                continue;
            }
            Some(Err(e)) => {
                log::warn!("{}: {e}", file.display());
                errors.push(ScanError {
                    file_path: file.clone(),
                    message: e.to_string(),
                });
                continue;
            }
            Some(Ok(tokens)) => tokens,
        };
        scanned += 1;

        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for token in tokens {
            let slot = *index.entry(normalize_name(&token.name)).or_insert_with(|| {
                placeholders.push(Placeholder {
                    name: token.name.trim().to_string(),
                    pattern: token.raw.clone(),
                    kind: token.kind,
                    occurrences: Vec::new(),
                    total_occurrences: 0,
                });
                placeholders.len() - 1
            });
            let placeholder = &mut placeholders[slot];
            placeholder.total_occurrences += 1;
            match placeholder.occurrences.iter_mut().find(|o| o.file_path == *file) {
                Some(location) => location.occurrence_count += 1,
                None => placeholder.occurrences.push(PlaceholderLocation {
                    file_path: file.clone(),
                    file_name: file_name.clone(),
                    occurrence_count: 1,
                    context_snippet: token.snippet,
                    part: token.part,
                }),
            }
        }
    }

    let total_occurrences = placeholders.iter().map(|p| p.total_occurrences).sum();
    Ok(PlaceholderScanResult {
        placeholders,
        total_files_scanned: scanned,
        total_occurrences,
        is_successful: errors.is_empty(),
        errors,
        scan_duration: t0.elapsed(),
        cancelled,
    })
}

pub(crate) fn replace(path: &Path, map: &ReplacementMap, options: &ReplaceOptions) -> Result<BatchReplaceResult> {
    validate_common(path, options.max_workers)?;
    map.validate()?;

    let files = match discover(path, options.recursive) {
        Ok(files) => files,
        Err(e) => {
            let failed = FileReplaceResult::failed(path.to_path_buf(), &e);
            return Ok(BatchReplaceResult::from_files(vec![failed], false));
        }
    };

    let outcomes = run_files(&files, options.max_workers, &options.cancel, |file| {
        replace_file(file, map, options)
    })?;
    let cancelled = outcomes.iter().any(Option::is_none);
    Ok(BatchReplaceResult::from_files(
        outcomes.into_iter().flatten().collect(),
        cancelled,
    ))
}

pub(crate) fn preview(path: &Path, map: &ReplacementMap, options: &ScanOptions) -> Result<PreviewResult> {
    map.validate()?;
    let scan = scan(path, options)?;

    let placeholders_to_replace: Vec<Placeholder> = scan
        .placeholders
        .into_iter()
        .filter(|p| map.contains(&p.name))
        .collect();
    let mut files_to_process: Vec<PathBuf> = placeholders_to_replace
        .iter()
        .flat_map(|p| p.occurrences.iter().map(|o| o.file_path.clone()))
        .collect();
    files_to_process.sort();
    files_to_process.dedup();

    Ok(PreviewResult {
        files_to_process,
        placeholders_to_replace,
    })
}
