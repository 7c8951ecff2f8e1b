//! Candidate storylets for an open query: detection, generation, refinement
//! and priority ordering.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::core::config::SearchConfig;
use crate::core::facts::FactTable;
use crate::core::unify::{unify, unify_fact};
use crate::schema::activation::Activation;
use crate::schema::fragment::Fragment;
use crate::schema::key::{Bindings, Key};
use crate::schema::storylet::Corpus;

/// A storylet and the variable bindings under which it answers a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub template: usize,
    pub locals: Bindings,
}

impl Candidate {
    pub fn into_activation(self) -> Activation {
        Activation::new(self.template, self.locals)
    }
}

/// If fragment `position` of `activation`'s storylet is a query that is still
/// open, return its key with the activation's locals substituted.
///
/// A query is answered when a child fills it or when some exported fact
/// already carries its key.
pub fn open_query_at(
    corpus: &Corpus,
    activation: &Activation,
    position: usize,
    facts: &FactTable,
) -> Option<Key> {
    let fragment = corpus
        .storylet(activation.template())?
        .fragments()
        .get(position)?;
    let Fragment::Query { key } = fragment else {
        return None;
    };
    if activation.has_child(position) {
        return None;
    }
    let want = key.substitute(activation.locals());
    if facts.is_exported(&want) {
        return None;
    }
    Some(want)
}

/// The first open query of `activation`, as `(position, key)`.
pub fn first_open_query(
    corpus: &Corpus,
    activation: &Activation,
    facts: &FactTable,
) -> Option<(usize, Key)> {
    let len = corpus.storylet(activation.template())?.len();
    (0..len).find_map(|i| open_query_at(corpus, activation, i, facts).map(|key| (i, key)))
}

/// Every way storylet `template` can answer `want` through one of its exported
/// assigns. Each candidate starts from fresh bindings.
pub fn providers(corpus: &Corpus, template: usize, want: &Key) -> Vec<Candidate> {
    let Some(storylet) = corpus.storylet(template) else {
        return Vec::new();
    };
    storylet
        .exported_keys()
        .filter(|key| key.arity() == want.arity())
        .filter_map(|key| unify(want, key, &Bindings::default()))
        .map(|locals| Candidate { template, locals })
        .collect()
}

/// Walk the candidate's storylet against the current facts.
///
/// An `Exclude` that the facts already violate drops the candidate. A `Match`
/// fans it out into one candidate per exported fact that unifies with the
/// pattern under the running bindings, so several satisfying facts yield
/// several siblings and none yields nothing.
pub fn refine(corpus: &Corpus, candidate: Candidate, facts: &FactTable) -> Vec<Candidate> {
    let Some(storylet) = corpus.storylet(candidate.template) else {
        return Vec::new();
    };

    let mut frontier = vec![candidate.locals];
    for fragment in storylet.fragments() {
        match fragment {
            Fragment::Exclude { key, value } => {
                frontier.retain(|bindings| {
                    !facts.violates_exclusion(&key.substitute(bindings), &value.substitute(bindings))
                });
            }
            Fragment::Match { key, value } => {
                frontier = frontier
                    .iter()
                    .flat_map(|bindings| {
                        facts.exported().filter_map(move |(fact_key, fact_value)| {
                            unify_fact(fact_key, fact_value, key, value, bindings)
                        })
                    })
                    .collect();
            }
            _ => {}
        }
        if frontier.is_empty() {
            break;
        }
    }

    frontier
        .into_iter()
        .map(|locals| Candidate {
            template: candidate.template,
            locals,
        })
        .collect()
}

/// Shuffle uniformly, then stable-sort by descending priority score so ties
/// stay in random order.
pub fn order<R: Rng + ?Sized>(
    candidates: &mut [Candidate],
    corpus: &Corpus,
    config: &SearchConfig,
    rng: &mut R,
) {
    candidates.shuffle(rng);
    candidates.sort_by_key(|c| {
        let (high, low) = corpus
            .storylet(c.template)
            .map(|s| s.priority_balance())
            .unwrap_or((0, 0));
        Reverse(config.priority_score(high, low))
    });
}

/// Refined candidates for the query at `position`, in corpus order. Used to
/// offer manual choices; the search shuffles and orders its own copy.
pub fn options(
    corpus: &Corpus,
    activation: &Activation,
    position: usize,
    facts: &FactTable,
) -> Vec<Candidate> {
    let Some(Fragment::Query { key }) = corpus
        .storylet(activation.template())
        .and_then(|s| s.fragments().get(position))
    else {
        return Vec::new();
    };
    let want = key.substitute(activation.locals());
    (0..corpus.len())
        .flat_map(|template| providers(corpus, template, &want))
        .flat_map(|candidate| refine(corpus, candidate, facts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::facts::aggregate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn key(text: &str) -> Key {
        Key::parse(text)
    }

    #[test]
    fn open_query_skips_answered_positions() {
        let corpus = Corpus::parse("root ?x ?y\n\n+x:a\n\n+y:b").unwrap();
        let root = Activation::root(0);
        let facts = aggregate(&corpus, &root).facts;
        assert_eq!(first_open_query(&corpus, &root, &facts), Some((1, key("x"))));

        let filled = root.with_child(1, Activation::root(1));
        let facts = aggregate(&corpus, &filled).facts;
        assert_eq!(first_open_query(&corpus, &filled, &facts), Some((2, key("y"))));
    }

    #[test]
    fn query_answered_by_an_exported_fact_elsewhere_is_not_open() {
        let corpus = Corpus::parse("root ?x ?y\n\n+x:a +y:b").unwrap();
        let tree = Activation::root(0).with_child(1, Activation::root(1));
        let facts = aggregate(&corpus, &tree).facts;
        assert_eq!(first_open_query(&corpus, &tree, &facts), None);
    }

    #[test]
    fn providers_bind_variables_in_the_exported_key() {
        let corpus = Corpus::parse("root ?char_A\n\nGreetings from +char_@c I am @c\n\n+place_@p").unwrap();
        let found = providers(&corpus, 1, &key("char_A"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].locals.get("@c").map(String::as_str), Some("A"));
        assert!(providers(&corpus, 2, &key("char_A")).is_empty());
    }

    #[test]
    fn providers_require_equal_arity() {
        let corpus = Corpus::parse("root\n\n+x_@y_z").unwrap();
        assert!(providers(&corpus, 1, &key("x_q")).is_empty());
        assert_eq!(providers(&corpus, 1, &key("x_q_z")).len(), 1);
    }

    #[test]
    fn exclude_filters_candidates_already_contradicted() {
        let corpus = Corpus::parse("root ?x ?y\n\n+y:no\n\n+x:a !y:no").unwrap();
        let tree = Activation::root(0).with_child(2, Activation::root(1));
        let facts = aggregate(&corpus, &tree).facts;
        let found = providers(&corpus, 2, &key("x"));
        assert_eq!(found.len(), 1);
        assert!(refine(&corpus, found[0].clone(), &facts).is_empty());

        let empty = FactTable::default();
        assert_eq!(refine(&corpus, found[0].clone(), &empty).len(), 1);
    }

    #[test]
    fn match_fans_out_over_exported_facts() {
        let corpus = Corpus::parse(
            "root ?hero_anna ?hero_bert ?rival\n\n+hero_@h\n\n+rival &hero_@r =foe:@r",
        )
        .unwrap();
        let mut anna = Bindings::default();
        anna.insert("@h".to_string(), "anna".to_string());
        let mut bert = Bindings::default();
        bert.insert("@h".to_string(), "bert".to_string());
        let tree = Activation::root(0)
            .with_child(1, Activation::new(1, anna))
            .with_child(2, Activation::new(1, bert));
        let facts = aggregate(&corpus, &tree).facts;

        let found = options(&corpus, &tree, 3, &facts);
        let mut rivals: Vec<_> = found
            .iter()
            .map(|c| c.locals.get("@r").cloned().unwrap_or_default())
            .collect();
        rivals.sort();
        assert_eq!(rivals, vec!["anna".to_string(), "bert".to_string()]);
    }

    #[test]
    fn match_with_no_satisfying_fact_drops_candidate() {
        let corpus = Corpus::parse("root ?rival\n\n+rival &hero_@r").unwrap();
        let root = Activation::root(0);
        let facts = aggregate(&corpus, &root).facts;
        assert!(options(&corpus, &root, 1, &facts).is_empty());
    }

    #[test]
    fn match_value_pattern_is_checked() {
        let corpus = Corpus::parse("root ?door ?x\n\n+door:open\n\n+x &door:shut\n\n+x:b &door:open").unwrap();
        let tree = Activation::root(0).with_child(1, Activation::root(1));
        let facts = aggregate(&corpus, &tree).facts;
        let found = options(&corpus, &tree, 2, &facts);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].template, 3);
    }

    #[test]
    fn order_puts_high_priority_first() {
        let corpus = Corpus::parse("root ?x\n\n+x:a *low\n\n+x:b\n\n+x:c *high\n\n+x:d *high *high").unwrap();
        let root = Activation::root(0);
        let facts = aggregate(&corpus, &root).facts;
        let config = SearchConfig::default();
        for seed in 0..20 {
            let mut found = options(&corpus, &root, 1, &facts);
            let mut rng = StdRng::seed_from_u64(seed);
            order(&mut found, &corpus, &config, &mut rng);
            let templates: Vec<_> = found.iter().map(|c| c.template).collect();
            assert_eq!(templates, vec![4, 3, 2, 1]);
        }
    }

    #[test]
    fn order_shuffles_equal_priorities() {
        let corpus = Corpus::parse("root ?x\n\n+x:a\n\n+x:b\n\n+x:c\n\n+x:d").unwrap();
        let root = Activation::root(0);
        let facts = aggregate(&corpus, &root).facts;
        let config = SearchConfig::default();
        let mut firsts = std::collections::BTreeSet::new();
        for seed in 0..40 {
            let mut found = options(&corpus, &root, 1, &facts);
            order(&mut found, &corpus, &config, &mut StdRng::seed_from_u64(seed));
            firsts.insert(found[0].template);
        }
        assert!(firsts.len() > 1);
    }
}
