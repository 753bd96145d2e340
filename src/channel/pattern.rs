//! Action patterns used by `take`

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::runtime::value::Action;

/// Matches actions by kind.
#[derive(Clone, Default)]
pub enum Pattern {
    /// Every action (`"*"`).
    #[default]
    Any,
    Kind(String),
    /// Any of the listed kinds.
    Kinds(Vec<String>),
    /// Kind matched against a regular expression.
    Regex(Regex),
    Predicate(Rc<dyn Fn(&Action) -> bool>),
}

impl Pattern {
    /// Pattern from a predicate closure.
    pub fn predicate(f: impl Fn(&Action) -> bool + 'static) -> Self {
        Pattern::Predicate(Rc::new(f))
    }

    pub fn matches(
        &self,
        action: &Action,
    ) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Kind(kind) => action.kind == *kind,
            Pattern::Kinds(kinds) => kinds.iter().any(|kind| action.kind == *kind),
            Pattern::Regex(re) => re.is_match(&action.kind),
            Pattern::Predicate(f) => f(action),
        }
    }
}

impl From<&str> for Pattern {
    fn from(kind: &str) -> Self {
        if kind == "*" {
            Pattern::Any
        } else {
            Pattern::Kind(kind.to_string())
        }
    }
}

impl From<String> for Pattern {
    fn from(kind: String) -> Self {
        Pattern::from(kind.as_str())
    }
}

impl From<Vec<&str>> for Pattern {
    fn from(kinds: Vec<&str>) -> Self {
        Pattern::Kinds(kinds.into_iter().map(String::from).collect())
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Regex(re)
    }
}

impl fmt::Display for Pattern {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Pattern::Any => write!(f, "*"),
            Pattern::Kind(kind) => write!(f, "{}", kind),
            Pattern::Kinds(kinds) => write!(f, "[{}]", kinds.join(", ")),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
            Pattern::Predicate(_) => write!(f, "<predicate>"),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Pattern({})", self)
    }
}
