/// Haunted Inn demo: resolves the same corpus under several seeds.
///
/// Each story is searched in 30 ms slices the way an interactive host would
/// drive it, printing progress between slices.
///
/// Run with: cargo run --example haunted_inn

use std::path::Path;
use std::sync::Arc;
use storylet_engine::core::config::SearchConfig;
use storylet_engine::core::facts::aggregate;
use storylet_engine::core::render::render;
use storylet_engine::core::search::{Outcome, Recorder, Search, Step};
use storylet_engine::schema::activation::Activation;
use storylet_engine::schema::storylet::Corpus;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let corpus = Arc::new(
        Corpus::load(Path::new("corpora/haunted_inn.txt")).expect("Failed to load haunted inn corpus"),
    );
    let config = SearchConfig::load_from_ron(Path::new("corpora/search.ron"))
        .expect("Failed to load search config");

    for seed in [7, 2026, 31337] {
        let mut search = Search::builder(Arc::clone(&corpus))
            .config(config.clone())
            .seed(seed)
            .begin(Activation::root(0), Recorder::new())
            .expect("Failed to start search");

        let mut slices = 0;
        let outcome = loop {
            slices += 1;
            if let Step::Done(outcome) = search.step(config.slice()) {
                break outcome;
            }
        };

        let stats = search.stats();
        println!(
            "--- seed {} ({} slices, {} publishes, {} backtracks) ---",
            seed, slices, stats.publishes, stats.backtracks
        );
        match outcome {
            Outcome::Completed(tree) => {
                let facts = aggregate(&corpus, &tree).facts;
                println!("{}\n", render(&corpus, &tree, &facts));
            }
            other => println!("no story: {:?}\n", other),
        }
    }
}
