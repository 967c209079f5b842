//! Static types and run-time values of the rule language.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use pruner_torrent_core::Torrent;

/// Static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// String.
    Str,
    /// Instant in UTC.
    Time,
    /// Signed span of time.
    Duration,
    /// Ordered sequence of torrents.
    Seq,
}

impl Type {
    /// Whether the type takes part in numeric arithmetic.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Str => "string",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Seq => "[]torrent",
        })
    }
}

/// Run-time value; sequences borrow from the evaluated input.
#[derive(Debug, Clone)]
pub(crate) enum Value<'a> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(Cow<'a, str>),
    Time(DateTime<Utc>),
    Duration(TimeDelta),
    Seq(Vec<&'a Torrent>),
}

impl Value<'_> {
    pub(crate) const fn type_of(&self) -> Type {
        match self {
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Bool(_) => Type::Bool,
            Self::Str(_) => Type::Str,
            Self::Time(_) => Type::Time,
            Self::Duration(_) => Type::Duration,
            Self::Seq(_) => Type::Seq,
        }
    }
}

/// Folded literal stored in the compiled program.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Duration(TimeDelta),
}

impl Constant {
    pub(crate) const fn type_of(&self) -> Type {
        match self {
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Bool(_) => Type::Bool,
            Self::Str(_) => Type::Str,
            Self::Duration(_) => Type::Duration,
        }
    }

    pub(crate) fn to_value<'a>(&self) -> Value<'a> {
        match self {
            Self::Int(v) => Value::Int(*v),
            Self::Float(v) => Value::Float(*v),
            Self::Bool(v) => Value::Bool(*v),
            Self::Str(v) => Value::Str(Cow::Owned(v.clone())),
            Self::Duration(v) => Value::Duration(*v),
        }
    }
}
