//! Property stack symbols
//!
//! Stack alphabet of the field system. Besides named properties, three
//! distinguished markers exist:
//! - `Wildcard` matches the transitive has-property closure of an object,
//! - `Epsilon` labels automaton transitions taken without input,
//! - `Empty` marks the starting stack height.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Property {
    Named(Arc<str>),
    Wildcard,
    Epsilon,
    Empty,
}

impl Property {
    #[inline]
    pub fn named(name: &str) -> Self {
        Property::Named(Arc::from(name))
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        match self {
            Property::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Named(name) => write!(f, "[\"{name}\"]"),
            Property::Wildcard => write!(f, "[*]"),
            Property::Epsilon => write!(f, "[eps]"),
            Property::Empty => write!(f, "[empty]"),
        }
    }
}
