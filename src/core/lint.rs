//! Static checks over a corpus.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::schema::fragment::Fragment;
use crate::schema::key::{is_variable, Key};
use crate::schema::storylet::Corpus;

/// One finding, attached to a storylet when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub storylet: Option<usize>,
    pub message: String,
}

impl fmt::Display for LintIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.storylet {
            Some(index) => write!(f, "storylet {index}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LintReport {
    pub errors: Vec<LintIssue>,
    pub warnings: Vec<LintIssue>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn error(&mut self, storylet: usize, message: String) {
        self.errors.push(LintIssue {
            storylet: Some(storylet),
            message,
        });
    }

    fn warning(&mut self, storylet: Option<usize>, message: String) {
        self.warnings.push(LintIssue { storylet, message });
    }
}

/// Whether some binding of variables could make `pattern` and `key` equal.
/// A wildcard on either side matches anything.
pub fn could_unify(pattern: &Key, key: &Key) -> bool {
    if pattern.is_wildcard() || key.is_wildcard() {
        return true;
    }
    pattern.arity() == key.arity()
        && pattern
            .atoms()
            .iter()
            .zip(key.atoms())
            .all(|(a, b)| is_variable(a) || is_variable(b) || a == b)
}

/// Check `corpus` for queries nothing can answer, storylets the entry
/// storylet can never reach, and reads or constraints on keys nobody assigns.
pub fn lint(corpus: &Corpus) -> LintReport {
    let mut report = LintReport::default();
    if corpus.is_empty() {
        report.warning(None, "corpus is empty".to_string());
        return report;
    }

    let exports: Vec<(usize, &Key)> = corpus
        .storylets()
        .iter()
        .enumerate()
        .flat_map(|(i, s)| s.exported_keys().map(move |k| (i, k)))
        .collect();
    let assigns: Vec<&Key> = corpus
        .storylets()
        .iter()
        .flat_map(|s| s.fragments())
        .filter_map(|f| match f {
            Fragment::Assign { key, .. } => Some(key),
            _ => None,
        })
        .collect();

    for (index, storylet) in corpus.storylets().iter().enumerate() {
        for fragment in storylet.fragments() {
            match fragment {
                Fragment::Query { key } => {
                    if !exports.iter().any(|(_, export)| could_unify(key, export)) {
                        report.error(index, format!("no storylet exports a key answering ?{key}"));
                    }
                }
                Fragment::Read { key } | Fragment::Match { key, .. } | Fragment::Exclude { key, .. } => {
                    if !assigns.iter().any(|assigned| could_unify(key, assigned)) {
                        report.warning(Some(index), format!("'{fragment}' refers to a key nothing assigns"));
                    }
                }
                Fragment::Assign { .. } | Fragment::Literal { .. } => {}
            }
        }
    }

    let mut reachable = vec![false; corpus.len()];
    reachable[0] = true;
    let mut queue = VecDeque::from([0]);
    while let Some(index) = queue.pop_front() {
        for fragment in corpus[index].fragments() {
            let Fragment::Query { key } = fragment else {
                continue;
            };
            for (provider, export) in &exports {
                if !reachable[*provider] && could_unify(key, export) {
                    reachable[*provider] = true;
                    queue.push_back(*provider);
                }
            }
        }
    }
    for (index, seen) in reachable.iter().enumerate() {
        if !seen {
            report.warning(Some(index), "unreachable from the entry storylet".to_string());
        }
    }

    report
}
