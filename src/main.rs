use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use docxide_fill::{
    BatchReplaceResult, Matcher, PlaceholderScanResult, PreviewResult, ReplaceOptions,
    ReplacementMap, ScanOptions,
};

#[derive(Parser, Debug)]
#[command(name = "docxide-fill")]
#[command(author, version, about = "Scan and fill {{placeholders}} in .docx files", long_about = None)]
struct Cli {
    /// Debug logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the placeholders found in a file or folder
    Scan {
        path: PathBuf,
        #[command(flatten)]
        common: Common,
    },
    /// Replace placeholders using a JSON object of name -> value
    Replace {
        path: PathBuf,
        /// JSON file mapping placeholder names to values or image paths
        #[arg(short, long)]
        map: PathBuf,
        /// Copy each file to <name>.bak before writing it
        #[arg(long)]
        backup: bool,
        #[command(flatten)]
        common: Common,
    },
    /// Show which files and placeholders a replace would touch
    Preview {
        path: PathBuf,
        #[arg(short, long)]
        map: PathBuf,
        #[command(flatten)]
        common: Common,
    },
}

#[derive(Args, Debug)]
struct Common {
    /// Descend into subfolders
    #[arg(short, long)]
    recursive: bool,

    /// Number of files processed in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Placeholder regex; the first capture group is the name
    #[arg(long)]
    pattern: Option<String>,
}

impl Common {
    fn scan_options(&self) -> docxide_fill::Result<ScanOptions> {
        let mut options = ScanOptions::default().with_recursive(self.recursive);
        if let Some(jobs) = self.jobs {
            options = options.with_max_workers(jobs);
        }
        if let Some(pattern) = &self.pattern {
            options = options.with_matcher(Matcher::new(pattern)?);
        }
        Ok(options)
    }

    fn replace_options(&self, backup: bool) -> docxide_fill::Result<ReplaceOptions> {
        let mut options = ReplaceOptions::default()
            .with_recursive(self.recursive)
            .with_backup(backup);
        if let Some(jobs) = self.jobs {
            options = options.with_max_workers(jobs);
        }
        if let Some(pattern) = &self.pattern {
            options = options.with_matcher(Matcher::new(pattern)?);
        }
        Ok(options)
    }
}

fn load_map(path: &Path) -> Result<ReplacementMap, String> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&data).map_err(|e| format!("invalid map {}: {e}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{out}");
    Ok(())
}

fn print_scan(result: &PlaceholderScanResult) {
    println!(
        "{} placeholders, {} occurrences in {} files ({:.1}ms)",
        result.placeholders.len(),
        result.total_occurrences,
        result.total_files_scanned,
        result.scan_duration.as_secs_f64() * 1000.0
    );
    println!("{:<30} {:>6} {:>6}  EXAMPLE", "NAME", "KIND", "COUNT");
    for p in &result.placeholders {
        let kind = match p.kind {
            docxide_fill::DirectiveKind::Text => "text",
            docxide_fill::DirectiveKind::Image => "image",
        };
        let example = p
            .occurrences
            .first()
            .map(|o| format!("{}: {}", o.file_name, o.context_snippet))
            .unwrap_or_default();
        println!("{:<30} {:>6} {:>6}  {}", p.name, kind, p.total_occurrences, example);
    }
    for e in &result.errors {
        eprintln!("error: {}: {}", e.file_path.display(), e.message);
    }
    if result.cancelled {
        eprintln!("scan cancelled");
    }
}

fn print_replace(result: &BatchReplaceResult) {
    for f in &result.file_results {
        let status = if f.is_success { "ok" } else { "FAILED" };
        println!("{:<6} {:>4}  {}", status, f.replacement_count, f.file_path.display());
        if let Some(msg) = &f.error_message {
            eprintln!("  {msg}");
        }
        for msg in &f.match_errors {
            eprintln!("  skipped {msg}");
        }
        if let Some(backup) = &f.backup_path {
            println!("  backup: {}", backup.display());
        }
    }
    println!("{} replacements", result.total_replacements);
}

fn print_preview(result: &PreviewResult) {
    println!("Files to process:");
    for f in &result.files_to_process {
        println!("  {}", f.display());
    }
    println!("Placeholders to replace:");
    for p in &result.placeholders_to_replace {
        println!("  {} ({})", p.name, p.total_occurrences);
    }
}

fn run(cli: &Cli) -> Result<bool, String> {
    match &cli.command {
        Command::Scan { path, common } => {
            let options = common.scan_options().map_err(|e| e.to_string())?;
            let result = docxide_fill::scan_path(path, &options).map_err(|e| e.to_string())?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_scan(&result);
            }
            Ok(result.is_successful)
        }
        Command::Replace {
            path,
            map,
            backup,
            common,
        } => {
            let map = load_map(map)?;
            let options = common.replace_options(*backup).map_err(|e| e.to_string())?;
            let result =
                docxide_fill::replace_path(path, &map, &options).map_err(|e| e.to_string())?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_replace(&result);
            }
            Ok(!result.has_errors)
        }
        Command::Preview { path, map, common } => {
            let map = load_map(map)?;
            let options = common.scan_options().map_err(|e| e.to_string())?;
            let result =
                docxide_fill::preview_path(path, &map, &options).map_err(|e| e.to_string())?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_preview(&result);
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}
