//! WASM bindings for storylet-engine: powers the interactive corpus explorer.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use wasm_bindgen::prelude::*;

use storylet_engine::core::candidate::{options, Candidate};
use storylet_engine::core::config::SearchConfig;
use storylet_engine::core::facts::{aggregate, Aggregate};
use storylet_engine::core::lint::lint;
use storylet_engine::core::render::render;
use storylet_engine::core::search::{Outcome, Publish, Search, SearchStatus};
use storylet_engine::schema::activation::{Activation, ActivationPath};
use storylet_engine::schema::storylet::Corpus;

// ---------------------------------------------------------------------------
// Embedded sample corpus, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const HAUNTED_INN: &str = include_str!("../../corpora/haunted_inn.txt");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct OptionInfo {
    index: usize,
    template: usize,
    text: String,
    locals: Vec<(String, String)>,
}

/// Publisher that mirrors every tentative tree into the explorer's view.
struct TreeSink {
    view: Rc<RefCell<Activation>>,
}

impl Publish for TreeSink {
    fn publish(&mut self, corpus: &Corpus, tree: &Activation) -> Aggregate {
        *self.view.borrow_mut() = tree.clone();
        aggregate(corpus, tree)
    }
}

fn status_label(status: SearchStatus) -> &'static str {
    match status {
        SearchStatus::Running => "running",
        SearchStatus::Completed => "completed",
        SearchStatus::Exhausted => "exhausted",
        SearchStatus::Cancelled => "cancelled",
    }
}

fn parse_path(path: &str) -> Result<ActivationPath, JsError> {
    path.parse()
        .map_err(|e| JsError::new(&format!("Invalid path: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// StoryletExplorer
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StoryletExplorer {
    corpus: Arc<Corpus>,
    view: Rc<RefCell<Activation>>,
    search: Option<Search<TreeSink>>,
    config: SearchConfig,
}

#[wasm_bindgen]
impl StoryletExplorer {
    /// Create an explorer over a corpus written in storylet surface syntax.
    #[wasm_bindgen(constructor)]
    pub fn new(source: &str) -> Result<StoryletExplorer, JsError> {
        let corpus = Corpus::parse(source)
            .map_err(|e| JsError::new(&format!("Corpus parse error: {e}")))?;
        if corpus.is_empty() {
            return Err(JsError::new("Corpus has no storylets"));
        }
        Ok(StoryletExplorer {
            corpus: Arc::new(corpus),
            view: Rc::new(RefCell::new(Activation::root(0))),
            search: None,
            config: SearchConfig::default(),
        })
    }

    /// Explorer over the bundled haunted inn corpus.
    pub fn sample() -> Result<StoryletExplorer, JsError> {
        Self::new(data::HAUNTED_INN)
    }

    /// Start resolving the current tree. Any running search is dropped.
    pub fn start_search(&mut self, seed: u64) -> Result<(), JsError> {
        let root = self.view.borrow().clone();
        let sink = TreeSink {
            view: Rc::clone(&self.view),
        };
        let search = Search::builder(Arc::clone(&self.corpus))
            .config(self.config.clone())
            .seed(seed)
            .begin(root, sink)
            .map_err(|e| JsError::new(&format!("Search error: {e}")))?;
        self.search = Some(search);
        Ok(())
    }

    /// Advance the running search by at most `max_ticks` units of work and
    /// return its status. Call this once per animation frame.
    ///
    /// Ticks are used instead of wall-clock slices because `Instant` is not
    /// available on `wasm32-unknown-unknown`.
    pub fn step(&mut self, max_ticks: usize) -> String {
        let Some(search) = self.search.as_mut() else {
            return "idle".to_string();
        };
        search.step_ticks(max_ticks);
        let status = search.status();
        if let Some(Outcome::Completed(tree)) = search.outcome() {
            *self.view.borrow_mut() = tree.clone();
        }
        if status != SearchStatus::Running {
            self.search = None;
        }
        status_label(status).to_string()
    }

    /// Cancel the running search. The view keeps the last tree it published.
    pub fn stop(&mut self) {
        if let Some(mut search) = self.search.take() {
            search.cancel();
        }
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    /// Search counters as JSON, or `null` when idle.
    pub fn stats_json(&self) -> Result<String, JsError> {
        to_json(&self.search.as_ref().map(|s| s.stats()))
    }

    pub fn tree_json(&self) -> Result<String, JsError> {
        to_json(&*self.view.borrow())
    }

    pub fn facts_json(&self) -> Result<String, JsError> {
        to_json(&aggregate(&self.corpus, &self.view.borrow()))
    }

    pub fn render(&self) -> String {
        let tree = self.view.borrow();
        let facts = aggregate(&self.corpus, &tree).facts;
        render(&self.corpus, &tree, &facts)
    }

    /// Candidates for query `query` of the activation at `path`, as JSON.
    pub fn options_json(&self, path: &str, query: usize) -> Result<String, JsError> {
        let found = self.options_at(path, query)?;
        let info: Vec<OptionInfo> = found
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                let mut locals: Vec<_> = candidate.locals.into_iter().collect();
                locals.sort();
                OptionInfo {
                    index,
                    template: candidate.template,
                    text: self.corpus[candidate.template].to_string(),
                    locals,
                }
            })
            .collect();
        to_json(&info)
    }

    /// Attach candidate `index` of `options_json(path, query)` under the query.
    pub fn pick(&mut self, path: &str, query: usize, index: usize) -> Result<(), JsError> {
        self.stop();
        let candidate = self
            .options_at(path, query)?
            .into_iter()
            .nth(index)
            .ok_or_else(|| JsError::new(&format!("No candidate {index}")))?;
        let picked = self
            .view
            .borrow()
            .pick(&self.corpus, &parse_path(path)?, query, candidate.into_activation())
            .map_err(|e| JsError::new(&e.to_string()))?;
        *self.view.borrow_mut() = picked;
        Ok(())
    }

    /// Remove the subtree answering `query` at `path`.
    pub fn clear(&mut self, path: &str, query: usize) -> Result<(), JsError> {
        self.stop();
        let cleared = self
            .view
            .borrow()
            .clear(&parse_path(path)?, query)
            .map_err(|e| JsError::new(&e.to_string()))?;
        *self.view.borrow_mut() = cleared;
        Ok(())
    }

    /// Drop everything and start again from the entry storylet.
    pub fn reset(&mut self) {
        self.stop();
        *self.view.borrow_mut() = Activation::root(0);
    }

    pub fn lint_json(&self) -> Result<String, JsError> {
        to_json(&lint(&self.corpus))
    }

    /// The corpus in surface syntax, one storylet per entry.
    pub fn storylets_json(&self) -> Result<String, JsError> {
        let texts: Vec<String> = self
            .corpus
            .storylets()
            .iter()
            .map(|s| s.to_string())
            .collect();
        to_json(&texts)
    }
}

impl StoryletExplorer {
    fn options_at(&self, path: &str, query: usize) -> Result<Vec<Candidate>, JsError> {
        let path = parse_path(path)?;
        let tree = self.view.borrow();
        let node = tree
            .at(&path)
            .ok_or_else(|| JsError::new(&format!("No activation at path '{path}'")))?;
        let facts = aggregate(&self.corpus, &tree).facts;
        Ok(options(&self.corpus, node, query, &facts))
    }
}
