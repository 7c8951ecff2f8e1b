//! Compound keys, atoms, and variable bindings.
//!
//! A key is a sequence of atoms joined by `_`. Atoms starting with `@` are
//! pattern variables; every other atom is a literal.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the atoms of a compound key.
pub const ATOM_SEPARATOR: char = '_';
/// Sigil marking a pattern variable atom.
pub const VARIABLE_SIGIL: char = '@';
/// The wildcard pattern atom.
pub const WILDCARD: &str = "*";
/// The explicit negative atom. A wildcard never matches it.
pub const NEGATIVE: &str = "no";

/// Variable bindings: pattern-variable atom → bound literal atom.
pub type Bindings = FxHashMap<String, String>;

/// Returns true if `atom` is a pattern variable.
pub fn is_variable(atom: &str) -> bool {
    atom.starts_with(VARIABLE_SIGIL)
}

/// A compound key such as `color_@x` or `char_A`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct Key {
    atoms: Vec<String>,
}

impl Key {
    /// Split `text` into atoms on `_`.
    pub fn parse(text: &str) -> Key {
        Key {
            atoms: text.split(ATOM_SEPARATOR).map(str::to_string).collect(),
        }
    }

    /// The single-atom wildcard key `*`.
    pub fn wildcard() -> Key {
        Key::parse(WILDCARD)
    }

    pub fn atoms(&self) -> &[String] {
        &self.atoms
    }

    pub fn arity(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_atom(WILDCARD)
    }

    /// True if the key is exactly the single atom `atom`.
    pub fn is_atom(&self, atom: &str) -> bool {
        self.atoms.len() == 1 && self.atoms[0] == atom
    }

    /// True if any atom is a pattern variable.
    pub fn has_variables(&self) -> bool {
        self.atoms.iter().any(|a| is_variable(a))
    }

    /// Replace every atom found in `bindings` with its bound value. Atoms not
    /// bound pass through unchanged.
    pub fn substitute(&self, bindings: &Bindings) -> Key {
        Key {
            atoms: self
                .atoms
                .iter()
                .map(|atom| bindings.get(atom).unwrap_or(atom).clone())
                .collect(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.atoms.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ATOM_SEPARATOR)?;
            }
            f.write_str(atom)?;
        }
        Ok(())
    }
}

impl From<String> for Key {
    fn from(text: String) -> Self {
        Key::parse(&text)
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Key::parse(text)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_underscore() {
        let key = Key::parse("color_@x_red");
        assert_eq!(key.arity(), 3);
        assert_eq!(key.atoms()[1], "@x");
        assert!(key.has_variables());
        assert_eq!(key.to_string(), "color_@x_red");
    }

    #[test]
    fn wildcard_detection() {
        assert!(Key::wildcard().is_wildcard());
        assert!(!Key::parse("*_a").is_wildcard());
        assert!(Key::parse("no").is_atom(NEGATIVE));
    }

    #[test]
    fn substitute_passes_unbound_atoms_through() {
        let mut bindings = Bindings::default();
        bindings.insert("@c".to_string(), "anna".to_string());
        let key = Key::parse("char_@c_@d").substitute(&bindings);
        assert_eq!(key.to_string(), "char_anna_@d");
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = Key::parse("mood_tense");
        let text = ron::to_string(&key).unwrap();
        assert_eq!(text, "\"mood_tense\"");
        let back: Key = ron::from_str(&text).unwrap();
        assert_eq!(back, key);
    }
}
