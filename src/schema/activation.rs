//! The activation tree: instantiated, bound uses of storylets.
//!
//! Activations are immutable. Every edit returns a new tree that shares all
//! untouched subtrees with the old one through `Arc`, so a discarded branch
//! never disturbs an ancestor's view.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use super::fragment::Fragment;
use super::key::Bindings;
use super::storylet::Corpus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("malformed activation path '{0}': expected dot separated query indices")]
    Malformed(String),
    #[error("no activation at path '{0}'")]
    NoActivation(ActivationPath),
    #[error("fragment {query} at path '{path}' is not a query")]
    NotAQuery { path: ActivationPath, query: usize },
    #[error("query {query} at path '{path}' has no child to clear")]
    NoChild { path: ActivationPath, query: usize },
}

/// One instantiated use of a storylet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    template: usize,
    locals: Arc<Bindings>,
    /// Query fragment index → the activation answering it.
    children: BTreeMap<usize, Arc<Activation>>,
}

impl Activation {
    /// An activation with no locals and no children.
    pub fn root(template: usize) -> Activation {
        Activation::new(template, Bindings::default())
    }

    pub fn new(template: usize, locals: Bindings) -> Activation {
        Activation {
            template,
            locals: Arc::new(locals),
            children: BTreeMap::new(),
        }
    }

    pub fn template(&self) -> usize {
        self.template
    }

    pub fn locals(&self) -> &Bindings {
        &self.locals
    }

    pub fn children(&self) -> impl Iterator<Item = (usize, &Activation)> {
        self.children.iter().map(|(i, child)| (*i, child.as_ref()))
    }

    pub fn child(&self, query: usize) -> Option<&Activation> {
        self.children.get(&query).map(Arc::as_ref)
    }

    pub fn has_child(&self, query: usize) -> bool {
        self.children.contains_key(&query)
    }

    /// A copy of this activation with `child` answering `query`.
    pub fn with_child(&self, query: usize, child: Activation) -> Activation {
        let mut children = self.children.clone();
        children.insert(query, Arc::new(child));
        Activation {
            template: self.template,
            locals: Arc::clone(&self.locals),
            children,
        }
    }

    /// A copy of this activation with the answer to `query` removed.
    pub fn without_child(&self, query: usize) -> Activation {
        let mut children = self.children.clone();
        children.remove(&query);
        Activation {
            template: self.template,
            locals: Arc::clone(&self.locals),
            children,
        }
    }

    /// Number of activations in the tree.
    pub fn size(&self) -> usize {
        1 + self.children.values().map(|c| c.size()).sum::<usize>()
    }

    /// Depth of the tree; a lone activation has depth 0.
    pub fn depth(&self) -> usize {
        self.children
            .values()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// First template index in the tree that the corpus does not contain.
    pub fn unknown_template(&self, corpus: &Corpus) -> Option<usize> {
        if corpus.storylet(self.template).is_none() {
            return Some(self.template);
        }
        self.children
            .values()
            .find_map(|child| child.unknown_template(corpus))
    }

    pub fn at(&self, path: &ActivationPath) -> Option<&Activation> {
        let mut node = self;
        for query in path.queries() {
            node = node.child(*query)?;
        }
        Some(node)
    }

    /// Rebuild the tree with the activation at `path` replaced by `edit`'s
    /// result. Every ancestor on the path is copied; everything else is shared.
    pub fn replace_at<F>(&self, path: &ActivationPath, edit: F) -> Result<Activation, PathError>
    where
        F: FnOnce(&Activation) -> Result<Activation, PathError>,
    {
        self.replace_from(path.queries(), path, edit)
    }

    fn replace_from<F>(
        &self,
        rest: &[usize],
        path: &ActivationPath,
        edit: F,
    ) -> Result<Activation, PathError>
    where
        F: FnOnce(&Activation) -> Result<Activation, PathError>,
    {
        match rest.split_first() {
            None => edit(self),
            Some((query, tail)) => {
                let child = self
                    .child(*query)
                    .ok_or_else(|| PathError::NoActivation(path.clone()))?;
                let replaced = child.replace_from(tail, path, edit)?;
                Ok(self.with_child(*query, replaced))
            }
        }
    }

    /// Attach `child` under the query fragment `query` of the activation at `path`.
    pub fn pick(
        &self,
        corpus: &Corpus,
        path: &ActivationPath,
        query: usize,
        child: Activation,
    ) -> Result<Activation, PathError> {
        self.replace_at(path, |node| {
            let is_query = corpus
                .storylet(node.template)
                .and_then(|s| s.fragments().get(query))
                .is_some_and(|f| matches!(f, Fragment::Query { .. }));
            if !is_query {
                return Err(PathError::NotAQuery {
                    path: path.clone(),
                    query,
                });
            }
            Ok(node.with_child(query, child))
        })
    }

    /// Truncate the subtree answering `query` at `path`, so it can be retried.
    pub fn clear(&self, path: &ActivationPath, query: usize) -> Result<Activation, PathError> {
        self.replace_at(path, |node| {
            if !node.has_child(query) {
                return Err(PathError::NoChild {
                    path: path.clone(),
                    query,
                });
            }
            Ok(node.without_child(query))
        })
    }
}

/// Address of an activation: the query indices followed from the root.
/// Written as dot separated indices, e.g. `1.3`; the root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ActivationPath(Vec<usize>);

impl ActivationPath {
    pub fn root() -> ActivationPath {
        ActivationPath(Vec::new())
    }

    pub fn queries(&self) -> &[usize] {
        &self.0
    }

    pub fn child(&self, query: usize) -> ActivationPath {
        let mut queries = self.0.clone();
        queries.push(query);
        ActivationPath(queries)
    }
}

impl fmt::Display for ActivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, query) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{query}")?;
        }
        Ok(())
    }
}

impl FromStr for ActivationPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "." {
            return Ok(ActivationPath::root());
        }
        s.split('.')
            .map(|part| part.parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map(ActivationPath)
            .map_err(|_| PathError::Malformed(s.to_string()))
    }
}
