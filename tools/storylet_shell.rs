/// Storylet Shell: interactive driver for exploring a corpus.
///
/// Usage: storylet_shell <corpus> [--config <search.ron>] [--seed <n>]
///
/// Commands:
///   search [ms]               resolve the current tree, optionally giving up after ms
///   show                      render the current tree
///   tree                      print the activation tree
///   facts                     print the fact table and verdict
///   options <path> <query>    list candidates for a query
///   pick <path> <query> <n>   attach candidate n under a query
///   clear <path> <query>      remove the subtree answering a query
///   reset                     start over from the entry storylet
///   seed <n>                  set RNG seed
///   lint                      run static checks on the corpus
///   help                      list commands
///   quit                      exit
///
/// Paths are dot separated query indices; `.` is the root.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storylet_engine::core::candidate::options;
use storylet_engine::core::config::SearchConfig;
use storylet_engine::core::facts::aggregate;
use storylet_engine::core::lint::lint;
use storylet_engine::core::render::render;
use storylet_engine::core::search::{Outcome, Recorder, Search, Step};
use storylet_engine::schema::activation::{Activation, ActivationPath};
use storylet_engine::schema::storylet::Corpus;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let corpus_path = args[1].clone();
    let mut config = SearchConfig::default();
    let mut seed: u64 = 42;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                match SearchConfig::load_from_ron(Path::new(&args[i])) {
                    Ok(loaded) => {
                        if let Some(s) = loaded.seed {
                            seed = s;
                        }
                        config = loaded;
                    }
                    Err(e) => {
                        eprintln!("ERROR: Failed to load config: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let corpus = match Corpus::load(Path::new(&corpus_path)) {
        Ok(corpus) => Arc::new(corpus),
        Err(e) => {
            eprintln!("ERROR: Failed to load corpus: {}", e);
            std::process::exit(1);
        }
    };
    if corpus.is_empty() {
        eprintln!("ERROR: Corpus '{}' has no storylets", corpus_path);
        std::process::exit(1);
    }

    println!("Loaded {} storylets", corpus.len());
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut tree = Activation::root(0);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("storylets> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
            }
            "search" => {
                let limit = match parts.get(1) {
                    Some(ms) => match ms.parse::<u64>() {
                        Ok(ms) => Some(Duration::from_millis(ms)),
                        Err(_) => {
                            println!("Invalid time limit: {}", ms);
                            continue;
                        }
                    },
                    None => None,
                };
                let search_config = SearchConfig {
                    seed: Some(seed),
                    ..config.clone()
                };
                if let Some(resolved) = run_search(&corpus, &tree, search_config, limit) {
                    tree = resolved;
                    print_rendered(&corpus, &tree);
                }
                // Advance so repeated searches explore different stories.
                seed = seed.wrapping_add(1);
            }
            "show" => {
                print_rendered(&corpus, &tree);
            }
            "tree" => {
                print_tree(&corpus, &tree, &ActivationPath::root(), 0);
            }
            "facts" => {
                let result = aggregate(&corpus, &tree);
                for (key, fact) in result.facts.iter() {
                    let marker = if fact.exported { "+" } else { "=" };
                    println!("  {}{} = {}", marker, key, fact.value);
                }
                println!("Verdict: {:?}", result.verdict());
                for conflict in &result.conflicts {
                    println!("  conflict: {:?}", conflict);
                }
            }
            "options" => {
                let Some((path, query)) = parse_target(&parts) else {
                    println!("Usage: options <path> <query>");
                    continue;
                };
                let Some(node) = tree.at(&path) else {
                    println!("No activation at path '{}'", path);
                    continue;
                };
                let facts = aggregate(&corpus, &tree).facts;
                let found = options(&corpus, node, query, &facts);
                if found.is_empty() {
                    println!("No candidates.");
                }
                for (n, candidate) in found.iter().enumerate() {
                    let mut locals: Vec<_> = candidate.locals.iter().collect();
                    locals.sort();
                    println!(
                        "  [{}] #{} {:?}: {}",
                        n, candidate.template, locals, corpus[candidate.template]
                    );
                }
            }
            "pick" => {
                let Some((path, query)) = parse_target(&parts) else {
                    println!("Usage: pick <path> <query> <n>");
                    continue;
                };
                let Some(n) = parts.get(3).and_then(|s| s.parse::<usize>().ok()) else {
                    println!("Usage: pick <path> <query> <n>");
                    continue;
                };
                let Some(node) = tree.at(&path) else {
                    println!("No activation at path '{}'", path);
                    continue;
                };
                let facts = aggregate(&corpus, &tree).facts;
                let Some(candidate) = options(&corpus, node, query, &facts).into_iter().nth(n) else {
                    println!("No candidate {}", n);
                    continue;
                };
                match tree.pick(&corpus, &path, query, candidate.into_activation()) {
                    Ok(picked) => {
                        tree = picked;
                        print_rendered(&corpus, &tree);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "clear" => {
                let Some((path, query)) = parse_target(&parts) else {
                    println!("Usage: clear <path> <query>");
                    continue;
                };
                match tree.clear(&path, query) {
                    Ok(cleared) => {
                        tree = cleared;
                        print_rendered(&corpus, &tree);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "reset" => {
                tree = Activation::root(0);
                println!("Tree reset.");
            }
            "seed" => {
                if parts.len() < 2 {
                    println!("Current seed: {}", seed);
                    continue;
                }
                match parts[1].parse::<u64>() {
                    Ok(n) => {
                        seed = n;
                        println!("Seed set to {}", seed);
                    }
                    Err(_) => println!("Invalid seed: {}", parts[1]),
                }
            }
            "lint" => {
                let report = lint(&corpus);
                if report.is_clean() {
                    println!("All checks passed!");
                }
                for warning in &report.warnings {
                    println!("WARNING: {}", warning);
                }
                for error in &report.errors {
                    println!("ERROR: {}", error);
                }
            }
            _ => {
                println!("Unknown command: {}. Type 'help' for commands.", cmd);
            }
        }
    }
}

/// Drive a search in time slices, reporting progress between slices.
fn run_search(
    corpus: &Arc<Corpus>,
    tree: &Activation,
    config: SearchConfig,
    limit: Option<Duration>,
) -> Option<Activation> {
    let slice = config.slice();
    let mut search = match Search::builder(Arc::clone(corpus))
        .config(config)
        .begin(tree.clone(), Recorder::new())
    {
        Ok(search) => search,
        Err(e) => {
            println!("Error: {}", e);
            return None;
        }
    };

    let started = Instant::now();
    let outcome = loop {
        if let Step::Done(outcome) = search.step(slice) {
            break outcome;
        }
        let stats = search.stats();
        print!(
            "\r  searching... {} publishes, {} backtracks, depth {}",
            stats.publishes, stats.backtracks, stats.deepest
        );
        io::stdout().flush().ok();
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            search.cancel();
        }
    };
    println!();

    let stats = search.stats();
    match outcome {
        Outcome::Completed(resolved) => {
            println!(
                "Resolved in {:?} ({} publishes, {} backtracks)",
                started.elapsed(),
                stats.publishes,
                stats.backtracks
            );
            Some(resolved)
        }
        Outcome::Exhausted => {
            println!("No consistent story exists from this tree.");
            None
        }
        Outcome::Cancelled => {
            let latest = search.publisher().latest().map_or(0, Activation::size);
            println!(
                "Gave up after {:?}; the last tentative tree had {} activations.",
                started.elapsed(),
                latest
            );
            None
        }
    }
}

fn parse_target(parts: &[&str]) -> Option<(ActivationPath, usize)> {
    let path = parts.get(1)?.parse::<ActivationPath>().ok()?;
    let query = parts.get(2)?.parse::<usize>().ok()?;
    Some((path, query))
}

fn print_rendered(corpus: &Corpus, tree: &Activation) {
    let result = aggregate(corpus, tree);
    println!("\n{}\n", render(corpus, tree, &result.facts));
    if !result.is_consistent() {
        println!("(inconsistent: {} conflicts)", result.conflicts.len());
    }
}

fn print_tree(corpus: &Corpus, activation: &Activation, path: &ActivationPath, indent: usize) {
    let label = if path.queries().is_empty() {
        ".".to_string()
    } else {
        path.to_string()
    };
    let mut locals: Vec<_> = activation.locals().iter().collect();
    locals.sort();
    println!(
        "{:indent$}{} #{} {:?}",
        "",
        label,
        activation.template(),
        locals,
        indent = indent * 2
    );
    if let Some(storylet) = corpus.storylet(activation.template()) {
        println!("{:indent$}  {}", "", storylet, indent = indent * 2);
    }
    for (query, child) in activation.children() {
        print_tree(corpus, child, &path.child(query), indent + 1);
    }
}

fn print_usage() {
    println!("Usage: storylet_shell <corpus> [--config <search.ron>] [--seed <n>]");
    println!();
    println!("Interactive shell for resolving and exploring storylet corpora.");
}

fn print_help() {
    println!("Commands:");
    println!("  search [ms]               resolve the current tree");
    println!("  show                      render the current tree");
    println!("  tree                      print the activation tree");
    println!("  facts                     print the fact table and verdict");
    println!("  options <path> <query>    list candidates for a query");
    println!("  pick <path> <query> <n>   attach candidate n under a query");
    println!("  clear <path> <query>      remove the subtree answering a query");
    println!("  reset                     start over from the entry storylet");
    println!("  seed <n>                  set RNG seed");
    println!("  lint                      run static checks on the corpus");
    println!("  help                      show this help");
    println!("  quit                      exit");
    println!();
    println!("Paths are dot separated query indices; '.' is the root.");
}
