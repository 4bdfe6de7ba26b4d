use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use docsift::{dispatch::FileKind, extract::extract_office, logging};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "docsift-extract",
    about = "Extract text from Word, Excel, and PowerPoint files on disk"
)]
struct Cli {
    /// Files or directories to extract.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Descend into subdirectories.
    #[arg(long, short)]
    recursive: bool,
    /// Emit one JSON object per file instead of plain text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum FileOutcome {
    Extracted { kind: FileKind, text: String },
    NeedsService(FileKind),
    Unsupported,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    path: String,
    kind: FileKind,
    text: &'a str,
}

fn main() {
    logging::init_cli_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let files = collect_files(&cli.paths, cli.recursive)?;
    let mut failures = 0usize;

    for path in &files {
        match extract_file(path) {
            Ok(FileOutcome::Extracted { kind, text }) => {
                if cli.json {
                    let record = JsonRecord {
                        path: path.display().to_string(),
                        kind,
                        text: &text,
                    };
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!("==> {} <==", path.display());
                    println!("{text}");
                }
            }
            Ok(FileOutcome::NeedsService(kind)) => {
                tracing::warn!(path = %path.display(), %kind, "Skipping file that needs the hosted services");
                eprintln!(
                    "skipped {}: {kind} files are read by the hosted services; use the server instead",
                    path.display()
                );
            }
            Ok(FileOutcome::Unsupported) => {
                tracing::debug!(path = %path.display(), "Unsupported file type");
                eprintln!("skipped {}: Unsupported file type.", path.display());
            }
            Err(err) => {
                failures += 1;
                eprintln!("error: {err:#}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} files failed to extract", files.len());
    }
    Ok(())
}

/// Expand the given paths into a sorted list of files.
fn collect_files(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            bail!("{} does not exist", path.display());
        }
        let walker = WalkDir::new(path).sort_by_file_name();
        let walker = if recursive {
            walker
        } else {
            walker.max_depth(1)
        };
        for entry in walker {
            let entry =
                entry.with_context(|| format!("failed to walk {}", path.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn extract_file(path: &Path) -> Result<FileOutcome> {
    let Some(kind) = FileKind::from_file_name(&path.to_string_lossy()) else {
        return Ok(FileOutcome::Unsupported);
    };
    if !kind.is_local() {
        return Ok(FileOutcome::NeedsService(kind));
    }
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    match extract_office(kind, &bytes) {
        Some(result) => {
            let text =
                result.with_context(|| format!("failed to extract {}", path.display()))?;
            Ok(FileOutcome::Extracted { kind, text })
        }
        None => Ok(FileOutcome::NeedsService(kind)),
    }
}
