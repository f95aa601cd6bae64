use std::fmt;

use crate::error::{Error, Result};
use crate::model::{Sample, Series};

/// A value produced while running an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Sample(Sample),
    Series(Series),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Sample(_) => "sample",
            Value::Series(_) => "series",
            Value::List(_) => "list",
        }
    }

    /// Normalizes an expression result into a series.
    ///
    /// A list keeps its sample elements in order and drops everything else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResultType`] for any value that is neither a series
    /// nor a list.
    pub fn into_series(self) -> Result<Series> {
        match self {
            Value::Series(series) => Ok(series),
            Value::List(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Sample(sample) => Some(sample),
                    _ => None,
                })
                .collect()),
            other => Err(Error::ResultType(other.type_name().to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Sample(s) => write!(f, "sample({:?}, {})", s.timestamp, s.value),
            Value::Series(s) => write!(f, "series of {} samples", s.len()),
            Value::List(items) => write!(f, "list of {} elements", items.len()),
        }
    }
}
