//! Renders an activation tree as narrative text.

use crate::core::facts::FactTable;
use crate::schema::activation::Activation;
use crate::schema::fragment::Fragment;
use crate::schema::key::is_variable;
use crate::schema::storylet::Corpus;

/// Render `tree` as text. `facts` should be the aggregate of the whole tree
/// so reads and queries answered elsewhere resolve.
///
/// Filled queries render their child inline, unanswered queries render as
/// `[?key]` and unknown reads as `[$key]`. Bookkeeping fragments render
/// nothing.
pub fn render(corpus: &Corpus, tree: &Activation, facts: &FactTable) -> String {
    let mut words = Vec::new();
    render_into(corpus, tree, facts, &mut words);
    words.join(" ")
}

fn render_into(corpus: &Corpus, activation: &Activation, facts: &FactTable, words: &mut Vec<String>) {
    let Some(storylet) = corpus.storylet(activation.template()) else {
        words.push(format!("[#{}]", activation.template()));
        return;
    };
    let locals = activation.locals();

    for (position, fragment) in storylet.fragments().iter().enumerate() {
        match fragment {
            Fragment::Query { key } => {
                if let Some(child) = activation.child(position) {
                    render_into(corpus, child, facts, words);
                } else {
                    let want = key.substitute(locals);
                    if !facts.is_exported(&want) {
                        words.push(format!("[?{want}]"));
                    }
                }
            }
            Fragment::Read { key } => {
                let key = key.substitute(locals);
                match facts.value(&key) {
                    Some(value) => words.push(value.to_string()),
                    None => words.push(format!("[${key}]")),
                }
            }
            Fragment::Literal { text } => {
                if fragment.priority().is_some() {
                    continue;
                }
                match locals.get(text.as_str()) {
                    Some(bound) if is_variable(text) => words.push(bound.clone()),
                    _ => words.push(text.clone()),
                }
            }
            Fragment::Assign { .. } | Fragment::Match { .. } | Fragment::Exclude { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::facts::aggregate;
    use crate::schema::key::Bindings;

    fn rendered(corpus: &Corpus, tree: &Activation) -> String {
        let facts = aggregate(corpus, tree).facts;
        render(corpus, tree, &facts)
    }

    #[test]
    fn children_render_inline_with_bound_locals() {
        let corpus = Corpus::parse("root ?char_A\n\nGreetings from +char_@c I am @c").unwrap();
        let mut locals = Bindings::default();
        locals.insert("@c".to_string(), "A".to_string());
        let tree = Activation::root(0).with_child(1, Activation::new(1, locals));
        assert_eq!(rendered(&corpus, &tree), "root Greetings from I am A");
    }

    #[test]
    fn open_queries_and_unknown_reads_are_marked() {
        let corpus = Corpus::parse("You see $door_state and ?ghost").unwrap();
        let tree = Activation::root(0);
        assert_eq!(rendered(&corpus, &tree), "You see [$door_state] and [?ghost]");
    }

    #[test]
    fn reads_show_fact_values() {
        let corpus = Corpus::parse("The door is $door . ?door\n\n+door:open *high").unwrap();
        let tree = Activation::root(0).with_child(5, Activation::root(1));
        assert_eq!(rendered(&corpus, &tree), "The door is open .");
    }

    #[test]
    fn query_answered_elsewhere_renders_nothing() {
        let corpus = Corpus::parse("?x then ?y\n\n+x +y").unwrap();
        let tree = Activation::root(0).with_child(0, Activation::root(1));
        assert_eq!(rendered(&corpus, &tree), "then");
    }
}
