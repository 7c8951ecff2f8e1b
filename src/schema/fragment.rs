use serde::{Deserialize, Serialize};
use std::fmt;

use super::key::Key;

/// Default value of an assign written without `:value`.
pub const DEFAULT_ASSIGN_VALUE: &str = "yes";

/// Literal token raising a storylet's candidate priority.
pub const HIGH_PRIORITY_MARKER: &str = "*high";
/// Literal token lowering a storylet's candidate priority.
pub const LOW_PRIORITY_MARKER: &str = "*low";

/// One typed element of a storylet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragment {
    /// `+key:value` (exported) or `=key:value`: declares the fact `key = value`.
    Assign { key: Key, value: Key, exported: bool },
    /// `?key`: an open question answered by some exported assign.
    Query { key: Key },
    /// `$key`: display-only lookup into the fact table.
    Read { key: Key },
    /// Inert text.
    Literal { text: String },
    /// `&key:value`: some exported fact must unify with this pattern.
    Match { key: Key, value: Key },
    /// `!key:value`: negative constraint on exported facts.
    Exclude { key: Key, value: Key },
}

/// Candidate ordering marker carried by a literal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Low,
}

impl Fragment {
    /// The priority marker this fragment carries, if it is one.
    pub fn priority(&self) -> Option<Priority> {
        match self {
            Fragment::Literal { text } if text == HIGH_PRIORITY_MARKER => Some(Priority::High),
            Fragment::Literal { text } if text == LOW_PRIORITY_MARKER => Some(Priority::Low),
            _ => None,
        }
    }

    /// The key of an exported assign, if this fragment is one.
    pub fn exported_key(&self) -> Option<&Key> {
        match self {
            Fragment::Assign {
                key,
                exported: true,
                ..
            } => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Assign {
                key,
                value,
                exported,
            } => {
                let sigil = if *exported { '+' } else { '=' };
                write!(f, "{sigil}{key}:{value}")
            }
            Fragment::Query { key } => write!(f, "?{key}"),
            Fragment::Read { key } => write!(f, "${key}"),
            Fragment::Literal { text } => f.write_str(text),
            Fragment::Match { key, value } => write!(f, "&{key}:{value}"),
            Fragment::Exclude { key, value } => write!(f, "!{key}:{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_markers() {
        let high = Fragment::Literal {
            text: "*high".to_string(),
        };
        let low = Fragment::Literal {
            text: "*low".to_string(),
        };
        let plain = Fragment::Literal {
            text: "*medium".to_string(),
        };
        assert_eq!(high.priority(), Some(Priority::High));
        assert_eq!(low.priority(), Some(Priority::Low));
        assert_eq!(plain.priority(), None);
    }

    #[test]
    fn display_uses_surface_sigils() {
        let assign = Fragment::Assign {
            key: Key::parse("x"),
            value: Key::parse("a"),
            exported: true,
        };
        assert_eq!(assign.to_string(), "+x:a");
        let exclude = Fragment::Exclude {
            key: Key::parse("y"),
            value: Key::wildcard(),
        };
        assert_eq!(exclude.to_string(), "!y:*");
    }

    #[test]
    fn exported_key_only_for_exported_assigns() {
        let hidden = Fragment::Assign {
            key: Key::parse("x"),
            value: Key::parse("a"),
            exported: false,
        };
        assert!(hidden.exported_key().is_none());
        let query = Fragment::Query {
            key: Key::parse("x"),
        };
        assert!(query.exported_key().is_none());
    }
}
