/// Corpus Linter: static checks over storylet corpora.
///
/// Usage: corpus_linter <corpus file or dir> [--quiet]
///
/// Exits with status 1 if any corpus fails to load or has lint errors.

use std::path::{Path, PathBuf};
use std::process;
use storylet_engine::core::lint::lint;
use storylet_engine::schema::storylet::Corpus;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: corpus_linter <corpus file or dir> [--quiet]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let quiet = args[2..].iter().any(|a| a == "--quiet");

    let mut files = Vec::new();
    if target.is_file() {
        files.push(target.to_path_buf());
    } else if target.is_dir() {
        collect_corpora(target, &mut files);
        files.sort();
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    }

    let mut total_errors = 0;
    let mut total_warnings = 0;

    for path in &files {
        let corpus = match Corpus::load(path) {
            Ok(corpus) => corpus,
            Err(e) => {
                eprintln!("ERROR: {}: {}", path.display(), e);
                total_errors += 1;
                continue;
            }
        };

        let report = lint(&corpus);
        println!(
            "\n=== {} ({} storylets) ===",
            path.display(),
            corpus.len()
        );
        if report.is_clean() {
            println!("All checks passed!");
        }
        if !quiet {
            for warning in &report.warnings {
                println!("WARNING: {}", warning);
            }
        }
        for error in &report.errors {
            println!("ERROR: {}", error);
        }
        total_errors += report.errors.len();
        total_warnings += report.warnings.len();
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        total_errors,
        total_warnings
    );

    if total_errors == 0 {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_corpora(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_corpora(&path, files);
            } else if matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("txt") | Some("storylets")
            ) {
                files.push(path);
            }
        }
    }
}
