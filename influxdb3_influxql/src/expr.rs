//! Tag predicates used to select series.
//!
//! Only the subset of InfluxQL conditional expressions that a shard index can
//! answer is represented here. Field and time predicates are evaluated by the
//! query engine above the iterators and never reach a shard.

use std::fmt::{self, Display, Formatter};

use regex::Regex;

use crate::Tags;

#[derive(Debug, Clone)]
pub enum Expr {
    /// `key = 'value'`
    Eq { key: String, value: String },
    /// `key != 'value'`
    NotEq { key: String, value: String },
    /// `key =~ /regex/`
    Match { key: String, regex: Regex },
    /// `key !~ /regex/`
    NotMatch { key: String, regex: Regex },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn not_eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NotEq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(key: impl Into<String>, regex: Regex) -> Self {
        Self::Match {
            key: key.into(),
            regex,
        }
    }

    pub fn not_matches(key: impl Into<String>, regex: Regex) -> Self {
        Self::NotMatch {
            key: key.into(),
            regex,
        }
    }

    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Evaluate the predicate against the tags of a series.
    ///
    /// A tag missing from `tags` compares as the empty string.
    pub fn eval(&self, tags: &Tags) -> bool {
        match self {
            Self::Eq { key, value } => tag_value(tags, key) == value,
            Self::NotEq { key, value } => tag_value(tags, key) != value,
            Self::Match { key, regex } => regex.is_match(tag_value(tags, key)),
            Self::NotMatch { key, regex } => !regex.is_match(tag_value(tags, key)),
            Self::And(lhs, rhs) => lhs.eval(tags) && rhs.eval(tags),
            Self::Or(lhs, rhs) => lhs.eval(tags) || rhs.eval(tags),
        }
    }
}

fn tag_value<'a>(tags: &'a Tags, key: &str) -> &'a str {
    tags.get(key).map(String::as_str).unwrap_or_default()
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq { key, value } => write!(f, "{key} = '{value}'"),
            Self::NotEq { key, value } => write!(f, "{key} != '{value}'"),
            Self::Match { key, regex } => write!(f, "{key} =~ /{}/", regex.as_str()),
            Self::NotMatch { key, regex } => write!(f, "{key} !~ /{}/", regex.as_str()),
            Self::And(lhs, rhs) => write!(f, "{lhs} AND {rhs}"),
            Self::Or(lhs, rhs) => write!(f, "({lhs} OR {rhs})"),
        }
    }
}
