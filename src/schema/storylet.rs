//! Storylets, the corpus, and the surface syntax parser.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use std::path::Path;
use thiserror::Error;

use super::fragment::{Fragment, Priority, DEFAULT_ASSIGN_VALUE};
use super::key::{Key, ATOM_SEPARATOR, WILDCARD};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("storylet {storylet}: cannot parse '{token}': {reason}")]
    Parse {
        storylet: usize,
        token: String,
        reason: String,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// An immutable template: an ordered sequence of fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storylet {
    fragments: Vec<Fragment>,
}

impl Storylet {
    pub fn new(fragments: Vec<Fragment>) -> Storylet {
        Storylet { fragments }
    }

    /// Parse one paragraph of surface syntax. `index` is only used for error
    /// reporting.
    ///
    /// Tokens are whitespace separated and classified by their leading sigil:
    /// - `+key`, `+key:value` → exported `Assign` (value defaults to `yes`)
    /// - `=key`, `=key:value` → non-exported `Assign`
    /// - `?key` → `Query`
    /// - `$key` → `Read`
    /// - `&key`, `&key:value` → `Match` (value defaults to `*`)
    /// - `!key`, `!key:value` → `Exclude` (value defaults to `*`)
    /// - anything else, including a bare sigil → `Literal`
    pub fn parse(text: &str, index: usize) -> Result<Storylet, CorpusError> {
        let fragments = text
            .split_whitespace()
            .map(|token| parse_token(token, index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Storylet { fragments })
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Counts of `*high` and `*low` markers, in that order.
    pub fn priority_balance(&self) -> (usize, usize) {
        let mut high = 0;
        let mut low = 0;
        for fragment in &self.fragments {
            match fragment.priority() {
                Some(Priority::High) => high += 1,
                Some(Priority::Low) => low += 1,
                None => {}
            }
        }
        (high, low)
    }

    /// Keys of every exported assign, in fragment order.
    pub fn exported_keys(&self) -> impl Iterator<Item = &Key> {
        self.fragments.iter().filter_map(Fragment::exported_key)
    }
}

impl fmt::Display for Storylet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fragment) in self.fragments.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{fragment}")?;
        }
        Ok(())
    }
}

fn parse_token(token: &str, storylet: usize) -> Result<Fragment, CorpusError> {
    let mut chars = token.chars();
    let sigil = chars.next();
    let body = chars.as_str();
    if body.is_empty() {
        return Ok(Fragment::Literal {
            text: token.to_string(),
        });
    }

    let fail = |reason: &str| CorpusError::Parse {
        storylet,
        token: token.to_string(),
        reason: reason.to_string(),
    };

    let split = |default: &str| -> Result<(Key, Key), CorpusError> {
        let (key, value) = match body.split_once(':') {
            Some((key, value)) => (key, value),
            None => (body, default),
        };
        if key.is_empty() {
            return Err(fail("empty key"));
        }
        if value.is_empty() {
            return Err(fail("empty value"));
        }
        let key = parse_key(key).ok_or_else(|| fail("empty atom in key"))?;
        let value = parse_key(value).ok_or_else(|| fail("empty atom in value"))?;
        Ok((key, value))
    };

    let fragment = match sigil {
        Some('+') | Some('=') => {
            let (key, value) = split(DEFAULT_ASSIGN_VALUE)?;
            Fragment::Assign {
                key,
                value,
                exported: sigil == Some('+'),
            }
        }
        Some('&') => {
            let (key, value) = split(WILDCARD)?;
            Fragment::Match { key, value }
        }
        Some('!') => {
            let (key, value) = split(WILDCARD)?;
            Fragment::Exclude { key, value }
        }
        Some('?') | Some('$') => {
            if body.contains(':') {
                return Err(fail("queries and reads take no value"));
            }
            let key = parse_key(body).ok_or_else(|| fail("empty atom in key"))?;
            if sigil == Some('?') {
                Fragment::Query { key }
            } else {
                Fragment::Read { key }
            }
        }
        _ => Fragment::Literal {
            text: token.to_string(),
        },
    };
    Ok(fragment)
}

fn parse_key(text: &str) -> Option<Key> {
    if text.split(ATOM_SEPARATOR).any(str::is_empty) {
        return None;
    }
    Some(Key::parse(text))
}

/// The ordered template corpus. Template 0 is the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Corpus {
    storylets: Vec<Storylet>,
}

impl Corpus {
    pub fn new(storylets: Vec<Storylet>) -> Corpus {
        Corpus { storylets }
    }

    /// Parse surface syntax: one storylet per paragraph, paragraphs separated
    /// by blank lines.
    pub fn parse(text: &str) -> Result<Corpus, CorpusError> {
        let mut paragraphs: Vec<String> = Vec::new();
        let mut current = String::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.trim().is_empty() {
                    paragraphs.push(std::mem::take(&mut current));
                }
                current.clear();
                continue;
            }
            current.push_str(line);
            current.push('\n');
        }
        if !current.trim().is_empty() {
            paragraphs.push(current);
        }

        let storylets = paragraphs
            .iter()
            .enumerate()
            .map(|(i, paragraph)| Storylet::parse(paragraph.trim(), i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Corpus { storylets })
    }

    /// Load a corpus from disk. `.ron` files hold a serialized corpus; any
    /// other extension is read as surface syntax.
    pub fn load(path: &Path) -> Result<Corpus, CorpusError> {
        let contents = std::fs::read_to_string(path)?;
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            Self::parse_ron(&contents)
        } else {
            Self::parse(&contents)
        }
    }

    /// Parse a corpus from a RON string.
    pub fn parse_ron(input: &str) -> Result<Corpus, CorpusError> {
        Ok(ron::from_str(input)?)
    }

    pub fn storylet(&self, index: usize) -> Option<&Storylet> {
        self.storylets.get(index)
    }

    pub fn storylets(&self) -> &[Storylet] {
        &self.storylets
    }

    pub fn len(&self) -> usize {
        self.storylets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storylets.is_empty()
    }
}

impl Index<usize> for Corpus {
    type Output = Storylet;

    fn index(&self, index: usize) -> &Storylet {
        &self.storylets[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> Key {
        Key::parse(text)
    }

    #[test]
    fn parse_every_sigil() {
        let s = Storylet::parse("Hello +x =y:b ?q $r &m !e:no there", 0).unwrap();
        assert_eq!(
            s.fragments(),
            &[
                Fragment::Literal {
                    text: "Hello".to_string()
                },
                Fragment::Assign {
                    key: key("x"),
                    value: key("yes"),
                    exported: true
                },
                Fragment::Assign {
                    key: key("y"),
                    value: key("b"),
                    exported: false
                },
                Fragment::Query { key: key("q") },
                Fragment::Read { key: key("r") },
                Fragment::Match {
                    key: key("m"),
                    value: Key::wildcard()
                },
                Fragment::Exclude {
                    key: key("e"),
                    value: key("no")
                },
                Fragment::Literal {
                    text: "there".to_string()
                },
            ]
        );
    }

    #[test]
    fn bare_sigils_are_literal_text() {
        let s = Storylet::parse("one + two ?", 0).unwrap();
        assert!(s
            .fragments()
            .iter()
            .all(|f| matches!(f, Fragment::Literal { .. })));
    }

    #[test]
    fn compound_keys_with_variables() {
        let s = Storylet::parse("Greetings from +char_@c I am @c", 1).unwrap();
        assert_eq!(
            s.fragments()[2],
            Fragment::Assign {
                key: key("char_@c"),
                value: key("yes"),
                exported: true
            }
        );
        assert_eq!(
            s.fragments()[5],
            Fragment::Literal {
                text: "@c".to_string()
            }
        );
    }

    #[test]
    fn parse_errors() {
        assert!(Storylet::parse("+:a", 0).is_err());
        assert!(Storylet::parse("+x:", 0).is_err());
        assert!(Storylet::parse("?x:a", 0).is_err());
        assert!(Storylet::parse("?a__b", 0).is_err());
        let err = Storylet::parse("fine =_x", 4).unwrap_err();
        assert!(matches!(err, CorpusError::Parse { storylet: 4, .. }));
    }

    #[test]
    fn priority_balance_counts_markers() {
        let s = Storylet::parse("*high +x *high *low", 0).unwrap();
        assert_eq!(s.priority_balance(), (2, 1));
    }

    #[test]
    fn corpus_splits_on_blank_lines() {
        let text = "root ?char_A\n\n  \nGreetings from +char_@c\nI am @c\n\n\n";
        let corpus = Corpus::parse(text).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[1].len(), 6);
        assert_eq!(corpus[0].to_string(), "root ?char_A");
    }

    #[test]
    fn empty_text_is_empty_corpus() {
        assert!(Corpus::parse("\n \n").unwrap().is_empty());
    }

    #[test]
    fn display_round_trips_through_parser() {
        let corpus = Corpus::parse("root ?x *high\n\n+x:a !y:no &z").unwrap();
        let again = Corpus::parse(
            &corpus
                .storylets()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
        .unwrap();
        assert_eq!(corpus, again);
    }

    #[test]
    fn ron_corpus_loads() {
        let corpus = Corpus::parse("root ?x\n\n+x:a").unwrap();
        let text = ron::to_string(&corpus).unwrap();
        assert_eq!(Corpus::parse_ron(&text).unwrap(), corpus);
    }
}
