/// Search integration tests: end-to-end resolution of corpora on disk.

use std::path::Path;
use std::sync::Arc;
use storylet_engine::core::config::SearchConfig;
use storylet_engine::core::facts::{aggregate, Aggregate};
use storylet_engine::core::render::render;
use storylet_engine::core::search::{begin_search, Outcome, Recorder, Search, SearchStatus, Step};
use storylet_engine::schema::activation::Activation;
use storylet_engine::schema::key::Key;
use storylet_engine::schema::storylet::Corpus;

fn load(path: &str) -> Arc<Corpus> {
    Arc::new(Corpus::load(Path::new(path)).unwrap())
}

fn resolve(corpus: &Arc<Corpus>, seed: u64) -> Activation {
    let mut search = Search::builder(Arc::clone(corpus))
        .seed(seed)
        .begin(Activation::root(0), Recorder::new())
        .unwrap();
    match search.run() {
        Outcome::Completed(tree) => tree,
        other => panic!("seed {seed}: expected a story, got {other:?}"),
    }
}

#[test]
fn greetings_corpus_binds_the_character() {
    let corpus = load("corpora/greetings.txt");
    let tree = resolve(&corpus, 1);
    let facts = aggregate(&corpus, &tree).facts;
    assert!(facts.is_exported(&Key::parse("char_A")));
    assert_eq!(render(&corpus, &tree, &facts), "root Greetings from I am A");
}

#[test]
fn backtracking_fixture_always_finds_the_only_story() {
    let corpus = load("tests/fixtures/backtrack.txt");
    for seed in 0..25 {
        let tree = resolve(&corpus, seed);
        let result = aggregate(&corpus, &tree);
        assert!(result.is_consistent());
        assert_eq!(result.facts.value(&Key::parse("x")), Some(&Key::parse("b")));
        assert_eq!(result.facts.value(&Key::parse("y")), Some(&Key::parse("no")));
    }
}

#[test]
fn haunted_inn_resolves_consistently_for_many_seeds() {
    let corpus = load("corpora/haunted_inn.txt");
    for seed in 0..30 {
        let tree = resolve(&corpus, seed);
        let result = aggregate(&corpus, &tree);
        assert!(result.is_consistent(), "seed {seed}: {:?}", result.conflicts);
        assert!(result.facts.is_exported(&Key::parse("ending")));

        let text = render(&corpus, &tree, &result.facts);
        assert!(!text.contains("[?"), "seed {seed}: {text}");
        assert!(!text.contains("[$"), "seed {seed}: {text}");
        assert!(text.contains("a weary bard"));
    }
}

#[test]
fn haunted_inn_endings_follow_the_rumor() {
    let corpus = load("corpora/haunted_inn.txt");
    for seed in 0..30 {
        let tree = resolve(&corpus, seed);
        let facts = aggregate(&corpus, &tree).facts;
        let haunted = facts.value(&Key::parse("ghost")) == Some(&Key::parse("yes"));
        assert_eq!(facts.is_exported(&Key::parse("ghost_name")), haunted);
    }
}

#[test]
fn same_seed_reproduces_the_same_story() {
    let corpus = load("corpora/haunted_inn.txt");
    assert_eq!(resolve(&corpus, 2026), resolve(&corpus, 2026));
}

#[test]
fn configured_search_uses_the_config_seed() {
    let corpus = load("corpora/haunted_inn.txt");
    let config = SearchConfig {
        seed: Some(11),
        ..SearchConfig::load_from_ron(Path::new("corpora/search.ron")).unwrap()
    };
    let mut search = Search::builder(Arc::clone(&corpus))
        .config(config)
        .begin(Activation::root(0), Recorder::new())
        .unwrap();
    assert_eq!(search.run(), Outcome::Completed(resolve(&corpus, 11)));
}

#[test]
fn unanswerable_fixture_exhausts() {
    let corpus = load("tests/fixtures/unanswerable.txt");
    let mut search = begin_search(corpus, Activation::root(0), Recorder::new()).unwrap();
    assert_eq!(search.run(), Outcome::Exhausted);
    assert_eq!(search.stats().backtracks, 0);
}

#[test]
fn cancelled_search_leaves_published_trees_intact() {
    let corpus = load("corpora/haunted_inn.txt");
    let mut search = Search::builder(Arc::clone(&corpus))
        .seed(5)
        .begin(Activation::root(0), Recorder::new())
        .unwrap();
    assert_eq!(search.step_ticks(40), Step::Pending);
    search.cancel();
    assert_eq!(search.status(), SearchStatus::Cancelled);

    let recorder = search.into_publisher();
    let latest = recorder.latest().unwrap();
    assert_eq!(latest.template(), 0);
    assert!(latest.unknown_template(&corpus).is_none());
    assert_eq!(recorder.latest_aggregate(), Some(&aggregate(&corpus, latest)));
    assert!(recorder.published() > 0);
}

#[test]
fn every_published_tree_is_rooted_at_the_start() {
    let corpus = load("corpora/haunted_inn.txt");
    let mut roots = Vec::new();
    let publisher = |corpus: &Corpus, tree: &Activation| -> Aggregate {
        roots.push(tree.template());
        aggregate(corpus, tree)
    };
    let mut search = Search::builder(Arc::clone(&corpus))
        .seed(3)
        .begin(Activation::root(0), publisher)
        .unwrap();
    assert!(matches!(search.run(), Outcome::Completed(_)));
    drop(search);
    assert!(!roots.is_empty());
    assert!(roots.iter().all(|&t| t == 0));
}

#[test]
fn picked_choices_are_kept_by_later_searches() {
    let corpus = load("corpora/haunted_inn.txt");
    // Query 12 of the entry storylet is `?rumor`; template 7 denies the ghost.
    let start = Activation::root(0).with_child(12, Activation::root(7));
    for seed in 0..10 {
        let mut search = Search::builder(Arc::clone(&corpus))
            .seed(seed)
            .begin(start.clone(), Recorder::new())
            .unwrap();
        let Outcome::Completed(tree) = search.run() else {
            panic!("seed {seed}: expected a story");
        };
        assert_eq!(tree.child(12).map(Activation::template), Some(7));
        let facts = aggregate(&corpus, &tree).facts;
        assert_eq!(facts.value(&Key::parse("ghost")), Some(&Key::parse("no")));
    }
}
