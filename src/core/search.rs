//! Backtracking search scheduler.
//!
//! The search resolves open queries depth first: it publishes the tentative
//! tree, finds the first open query, generates and refines candidates,
//! orders them, then tries each one as a child. A child that resolves is
//! committed and the parent is resolved again under that choice; when
//! everything downstream of a choice fails, the next candidate is tried.
//!
//! Instead of running to completion, the search is an explicit stack of
//! frames. Every call to [`Search::step`] advances it by small ticks until
//! the time budget runs out, so an interactive host stays responsive.
//! Dropping a [`Search`] at any point cancels it cleanly; everything it has
//! produced so far was handed to the [`Publish`] callback.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::vec;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::core::candidate::{open_query_at, order, providers, refine, Candidate};
use crate::core::config::SearchConfig;
use crate::core::facts::{aggregate, Aggregate, FactTable};
use crate::schema::activation::Activation;
use crate::schema::key::Key;
use crate::schema::storylet::Corpus;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("cannot search an empty corpus")]
    EmptyCorpus,
    #[error("activation tree references unknown template {0}")]
    UnknownTemplate(usize),
}

/// Receives every tentative full tree the search considers and judges it.
///
/// The returned aggregate gates the search: an inconsistent verdict makes the
/// branch a dead end. Any `FnMut(&Corpus, &Activation) -> Aggregate` closure
/// is a publisher.
pub trait Publish {
    fn publish(&mut self, corpus: &Corpus, tree: &Activation) -> Aggregate;
}

impl<F> Publish for F
where
    F: FnMut(&Corpus, &Activation) -> Aggregate,
{
    fn publish(&mut self, corpus: &Corpus, tree: &Activation) -> Aggregate {
        self(corpus, tree)
    }
}

/// Publisher that aggregates each tree and remembers the latest one.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    latest: Option<Activation>,
    aggregate: Option<Aggregate>,
    published: u64,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent tentative tree.
    pub fn latest(&self) -> Option<&Activation> {
        self.latest.as_ref()
    }

    pub fn latest_aggregate(&self) -> Option<&Aggregate> {
        self.aggregate.as_ref()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl Publish for Recorder {
    fn publish(&mut self, corpus: &Corpus, tree: &Activation) -> Aggregate {
        let result = aggregate(corpus, tree);
        self.latest = Some(tree.clone());
        self.aggregate = Some(result.clone());
        self.published += 1;
        result
    }
}

/// How a finished search ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every query of the root is answered.
    Completed(Activation),
    /// No choice of candidates leads to a consistent, complete tree.
    Exhausted,
    /// The driver stopped the search.
    Cancelled,
}

/// Result of advancing a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Pending,
    Done(Outcome),
}

impl Step {
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchStatus {
    Running,
    Completed,
    Exhausted,
    Cancelled,
}

/// Counters describing the work a search has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub ticks: u64,
    pub publishes: u64,
    pub backtracks: u64,
    /// Deepest activation depth attempted.
    pub deepest: usize,
}

/// Where a frame's tentative tree hangs in the full tree.
#[derive(Debug, Clone, Copy)]
enum Link {
    Root,
    /// Attached under query `query` of the activation of stack frame `frame`.
    Child { frame: usize, query: usize },
}

/// Resume point of one `resolve` call.
enum Phase {
    Enter,
    Publish,
    Scan {
        facts: FactTable,
        position: usize,
    },
    Generate {
        facts: FactTable,
        query: usize,
        want: Key,
        template: usize,
        found: Vec<Candidate>,
    },
    Refine {
        facts: FactTable,
        query: usize,
        pending: vec::IntoIter<Candidate>,
        kept: Vec<Candidate>,
    },
    Try {
        query: usize,
        candidates: vec::IntoIter<Candidate>,
    },
    AwaitChild {
        query: usize,
        candidates: vec::IntoIter<Candidate>,
    },
    Resume {
        query: usize,
        candidates: vec::IntoIter<Candidate>,
        child: Activation,
    },
    AwaitResume {
        query: usize,
        candidates: vec::IntoIter<Candidate>,
    },
}

struct Frame {
    activation: Activation,
    link: Link,
    depth: usize,
    phase: Phase,
}

enum Flow {
    Continue,
    Call(Frame),
    Return(Option<Activation>),
}

/// Builder for a [`Search`].
pub struct SearchBuilder {
    corpus: Arc<Corpus>,
    config: SearchConfig,
}

impl SearchBuilder {
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = Some(depth);
        self
    }

    /// Start resolving `root`, seeding `StdRng` from the configured seed or
    /// from entropy.
    pub fn begin<P: Publish>(self, root: Activation, publisher: P) -> Result<Search<P>, SearchError> {
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.begin_with_rng(root, publisher, rng)
    }

    pub fn begin_with_rng<P: Publish, R: Rng>(
        self,
        root: Activation,
        publisher: P,
        rng: R,
    ) -> Result<Search<P, R>, SearchError> {
        if self.corpus.is_empty() {
            return Err(SearchError::EmptyCorpus);
        }
        if let Some(template) = root.unknown_template(&self.corpus) {
            return Err(SearchError::UnknownTemplate(template));
        }
        debug!(
            storylets = self.corpus.len(),
            root = root.template(),
            seed = ?self.config.seed,
            "search started"
        );
        Ok(Search {
            corpus: self.corpus,
            publisher,
            rng,
            config: self.config,
            stack: vec![Frame {
                activation: root,
                link: Link::Root,
                depth: 0,
                phase: Phase::Enter,
            }],
            outcome: None,
            stats: SearchStats::default(),
        })
    }
}

/// Start a search over `corpus` from `root` with the default configuration.
pub fn begin_search<P: Publish>(
    corpus: Arc<Corpus>,
    root: Activation,
    publisher: P,
) -> Result<Search<P>, SearchError> {
    Search::builder(corpus).begin(root, publisher)
}

/// A resumable, cancellable search.
pub struct Search<P = Recorder, R = StdRng> {
    corpus: Arc<Corpus>,
    publisher: P,
    rng: R,
    config: SearchConfig,
    stack: Vec<Frame>,
    outcome: Option<Outcome>,
    stats: SearchStats,
}

impl Search {
    pub fn builder(corpus: Arc<Corpus>) -> SearchBuilder {
        SearchBuilder {
            corpus,
            config: SearchConfig::default(),
        }
    }
}

impl<P: Publish, R: Rng> Search<P, R> {
    /// Advance for roughly `budget` of wall-clock time. At least one tick runs.
    ///
    /// Relies on `Instant`; hosts without a monotonic clock (such as
    /// `wasm32-unknown-unknown`) should use [`Search::step_ticks`].
    pub fn step(&mut self, budget: Duration) -> Step {
        let started = Instant::now();
        while self.outcome.is_none() {
            self.tick();
            if started.elapsed() >= budget {
                break;
            }
        }
        self.current_step()
    }

    /// Advance by at most `ticks` units of work.
    pub fn step_ticks(&mut self, ticks: usize) -> Step {
        for _ in 0..ticks {
            if self.outcome.is_some() {
                break;
            }
            self.tick();
        }
        self.current_step()
    }

    /// Run until the search finishes.
    pub fn run(&mut self) -> Outcome {
        loop {
            if let Some(outcome) = &self.outcome {
                return outcome.clone();
            }
            self.tick();
        }
    }

    /// Stop the search. Has no effect once it has finished.
    pub fn cancel(&mut self) {
        if self.outcome.is_none() {
            self.stack.clear();
            info!(ticks = self.stats.ticks, "search cancelled");
            self.outcome = Some(Outcome::Cancelled);
        }
    }

    pub fn status(&self) -> SearchStatus {
        match &self.outcome {
            None => SearchStatus::Running,
            Some(Outcome::Completed(_)) => SearchStatus::Completed,
            Some(Outcome::Exhausted) => SearchStatus::Exhausted,
            Some(Outcome::Cancelled) => SearchStatus::Cancelled,
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn into_publisher(self) -> P {
        self.publisher
    }

    fn current_step(&self) -> Step {
        match &self.outcome {
            Some(outcome) => Step::Done(outcome.clone()),
            None => Step::Pending,
        }
    }

    fn tick(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        self.stats.ticks += 1;
        match self.advance() {
            Flow::Continue => {}
            Flow::Call(frame) => {
                self.stats.deepest = self.stats.deepest.max(frame.depth);
                self.stack.push(frame);
            }
            Flow::Return(result) => self.unwind(result),
        }
    }

    /// Run one unit of work on the top frame.
    fn advance(&mut self) -> Flow {
        let top = self.stack.len() - 1;
        let phase = mem::replace(&mut self.stack[top].phase, Phase::Enter);
        match phase {
            Phase::Enter => {
                self.stack[top].phase = Phase::Publish;
                Flow::Continue
            }
            Phase::Publish => {
                let tree = self.tentative_tree(top);
                let aggregate = self.publisher.publish(&self.corpus, &tree);
                self.stats.publishes += 1;
                if !aggregate.is_consistent() {
                    debug!(
                        depth = self.stack[top].depth,
                        conflicts = aggregate.conflicts.len(),
                        "tentative tree is inconsistent"
                    );
                    return Flow::Return(None);
                }
                self.stack[top].phase = Phase::Scan {
                    facts: aggregate.facts,
                    position: 0,
                };
                Flow::Continue
            }
            Phase::Scan { facts, position } => {
                let frame = &mut self.stack[top];
                if position >= self.corpus[frame.activation.template()].len() {
                    return Flow::Return(Some(frame.activation.clone()));
                }
                frame.phase = match open_query_at(&self.corpus, &frame.activation, position, &facts) {
                    Some(want) => {
                        trace!(template = frame.activation.template(), query = position, %want, "open query");
                        Phase::Generate {
                            facts,
                            query: position,
                            want,
                            template: 0,
                            found: Vec::new(),
                        }
                    }
                    None => Phase::Scan {
                        facts,
                        position: position + 1,
                    },
                };
                Flow::Continue
            }
            Phase::Generate {
                facts,
                query,
                want,
                template,
                mut found,
            } => {
                self.stack[top].phase = if template < self.corpus.len() {
                    found.extend(providers(&self.corpus, template, &want));
                    Phase::Generate {
                        facts,
                        query,
                        want,
                        template: template + 1,
                        found,
                    }
                } else {
                    trace!(query, %want, candidates = found.len(), "generated candidates");
                    Phase::Refine {
                        facts,
                        query,
                        pending: found.into_iter(),
                        kept: Vec::new(),
                    }
                };
                Flow::Continue
            }
            Phase::Refine {
                facts,
                query,
                mut pending,
                mut kept,
            } => {
                self.stack[top].phase = match pending.next() {
                    Some(candidate) => {
                        kept.extend(refine(&self.corpus, candidate, &facts));
                        Phase::Refine {
                            facts,
                            query,
                            pending,
                            kept,
                        }
                    }
                    None => {
                        order(&mut kept, &self.corpus, &self.config, &mut self.rng);
                        trace!(query, candidates = kept.len(), "refined candidates");
                        Phase::Try {
                            query,
                            candidates: kept.into_iter(),
                        }
                    }
                };
                Flow::Continue
            }
            Phase::Try {
                query,
                mut candidates,
            } => {
                let frame = &mut self.stack[top];
                let Some(candidate) = candidates.next() else {
                    trace!(template = frame.activation.template(), query, "candidates exhausted");
                    return Flow::Return(None);
                };
                let depth = frame.depth + 1;
                if self.config.max_depth.is_some_and(|max| depth > max) {
                    trace!(depth, template = candidate.template, "depth limit reached");
                    frame.phase = Phase::Try { query, candidates };
                    return Flow::Continue;
                }
                frame.phase = Phase::AwaitChild { query, candidates };
                Flow::Call(Frame {
                    activation: candidate.into_activation(),
                    link: Link::Child { frame: top, query },
                    depth,
                    phase: Phase::Enter,
                })
            }
            Phase::Resume {
                query,
                candidates,
                child,
            } => {
                let frame = &mut self.stack[top];
                let activation = frame.activation.with_child(query, child);
                let (link, depth) = (frame.link, frame.depth);
                frame.phase = Phase::AwaitResume { query, candidates };
                Flow::Call(Frame {
                    activation,
                    link,
                    depth,
                    phase: Phase::Enter,
                })
            }
            Phase::AwaitChild { .. } | Phase::AwaitResume { .. } => {
                unreachable!("a frame waiting on a call was scheduled")
            }
        }
    }

    /// Pop the finished top frame and hand `result` to its caller. A success
    /// returned into a resumed parent finishes that parent too.
    fn unwind(&mut self, mut result: Option<Activation>) {
        loop {
            self.stack.pop();
            if self.stack.is_empty() {
                self.finish(result);
                return;
            }
            let top = self.stack.len() - 1;
            let caller = &mut self.stack[top];
            let phase = mem::replace(&mut caller.phase, Phase::Enter);
            caller.phase = match (phase, result) {
                (Phase::AwaitChild { query, candidates }, Some(child)) => Phase::Resume {
                    query,
                    candidates,
                    child,
                },
                (Phase::AwaitResume { .. }, Some(done)) => {
                    result = Some(done);
                    continue;
                }
                (Phase::AwaitChild { query, candidates }, None)
                | (Phase::AwaitResume { query, candidates }, None) => {
                    self.stats.backtracks += 1;
                    debug!(
                        template = caller.activation.template(),
                        query,
                        "backtracking to next candidate"
                    );
                    Phase::Try { query, candidates }
                }
                _ => unreachable!("returned into a frame that was not waiting on a call"),
            };
            return;
        }
    }

    fn finish(&mut self, result: Option<Activation>) {
        let outcome = match result {
            Some(tree) => Outcome::Completed(tree),
            None => Outcome::Exhausted,
        };
        info!(
            completed = matches!(outcome, Outcome::Completed(_)),
            ticks = self.stats.ticks,
            publishes = self.stats.publishes,
            backtracks = self.stats.backtracks,
            deepest = self.stats.deepest,
            "search finished"
        );
        self.outcome = Some(outcome);
    }

    /// The full tree as seen from the frame at `index`: its activation wrapped
    /// into each ancestor it is tentatively attached to.
    fn tentative_tree(&self, index: usize) -> Activation {
        let frame = &self.stack[index];
        let mut tree = frame.activation.clone();
        let mut link = frame.link;
        while let Link::Child { frame: parent, query } = link {
            let parent = &self.stack[parent];
            tree = parent.activation.with_child(query, tree);
            link = parent.link;
        }
        tree
    }
}
