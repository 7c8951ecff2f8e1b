//! Fact aggregation. Derives the global fact table from an activation tree
//! and judges whether it is logically consistent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::schema::activation::Activation;
use crate::schema::fragment::Fragment;
use crate::schema::key::{Key, NEGATIVE};
use crate::schema::storylet::Corpus;

/// One entry of the fact table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub value: Key,
    pub exported: bool,
}

/// Fully substituted key → fact. Sorted so dumps are stable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactTable {
    facts: BTreeMap<Key, Fact>,
}

impl FactTable {
    pub fn get(&self, key: &Key) -> Option<&Fact> {
        self.facts.get(key)
    }

    pub fn value(&self, key: &Key) -> Option<&Key> {
        self.facts.get(key).map(|f| &f.value)
    }

    pub fn is_exported(&self, key: &Key) -> bool {
        self.facts.get(key).is_some_and(|f| f.exported)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Fact)> {
        self.facts.iter()
    }

    /// Exported facts as `(key, value)` pairs.
    pub fn exported(&self) -> impl Iterator<Item = (&Key, &Key)> {
        self.facts
            .iter()
            .filter(|(_, f)| f.exported)
            .map(|(k, f)| (k, &f.value))
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Whether an `Exclude` of `key:value` is violated by this table.
    ///
    /// A wildcard value forbids any exported fact for `key` whose value is
    /// not `no`. Any other value, `no` included, forbids an exported fact for
    /// `key` holding exactly that value.
    pub fn violates_exclusion(&self, key: &Key, value: &Key) -> bool {
        match self.facts.get(key) {
            Some(fact) if fact.exported => {
                if value.is_wildcard() {
                    !fact.value.is_atom(NEGATIVE)
                } else {
                    fact.value == *value
                }
            }
            _ => false,
        }
    }
}

/// Result of judging a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Consistent,
    Inconsistent,
}

/// Why a tree was judged inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Conflict {
    /// Two assigns gave the same key different values.
    Value { key: Key, existing: Key, incoming: Key },
    /// The same fact was exported from two places.
    DoubleExport { key: Key },
    /// An exclude fragment forbids a fact that is exported.
    Excluded { key: Key, value: Key },
}

/// A fact table and the conflicts found while building it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Aggregate {
    pub facts: FactTable,
    pub conflicts: Vec<Conflict>,
}

impl Aggregate {
    pub fn verdict(&self) -> Verdict {
        if self.conflicts.is_empty() {
            Verdict::Consistent
        } else {
            Verdict::Inconsistent
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge every assign in the tree rooted at `root` into one fact table.
///
/// Conflicts never stop the walk; they only decide the verdict. Once all
/// assigns are merged, every exclude in the tree is checked against the
/// finished table.
pub fn aggregate(corpus: &Corpus, root: &Activation) -> Aggregate {
    let mut out = Aggregate::default();
    collect_into(corpus, root, &mut out);
    check_exclusions(corpus, root, &mut out);
    out
}

fn collect_into(corpus: &Corpus, activation: &Activation, out: &mut Aggregate) {
    let Some(storylet) = corpus.storylet(activation.template()) else {
        warn!(
            template = activation.template(),
            "activation references a template outside the corpus"
        );
        return;
    };

    for fragment in storylet.fragments() {
        let Fragment::Assign {
            key,
            value,
            exported,
        } = fragment
        else {
            continue;
        };
        let key = key.substitute(activation.locals());
        let value = value.substitute(activation.locals());

        let fact = out.facts.facts.entry(key.clone()).or_insert_with(|| Fact {
            value: value.clone(),
            exported: false,
        });
        if fact.value != value {
            out.conflicts.push(Conflict::Value {
                key: key.clone(),
                existing: fact.value.clone(),
                incoming: value,
            });
        }
        if *exported {
            if fact.exported {
                out.conflicts.push(Conflict::DoubleExport { key });
            }
            fact.exported = true;
        }
    }

    for (_, child) in activation.children() {
        collect_into(corpus, child, out);
    }
}

fn check_exclusions(corpus: &Corpus, activation: &Activation, out: &mut Aggregate) {
    if let Some(storylet) = corpus.storylet(activation.template()) {
        for fragment in storylet.fragments() {
            if let Fragment::Exclude { key, value } = fragment {
                let key = key.substitute(activation.locals());
                let value = value.substitute(activation.locals());
                if out.facts.violates_exclusion(&key, &value) {
                    out.conflicts.push(Conflict::Excluded { key, value });
                }
            }
        }
    }
    for (_, child) in activation.children() {
        check_exclusions(corpus, child, out);
    }
}
