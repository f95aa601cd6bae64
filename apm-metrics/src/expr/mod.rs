//! Series expressions.
//!
//! An expression combines cached series through the `Metrics` map, for
//! example `Metrics["requests"] - Metrics["errors"]`. `+` and `-` between two
//! series align them on identical timestamps (see [`sum_merge`] and
//! [`diff_merge`]); between numbers they are plain arithmetic. Samples can be
//! picked out by index and their `.Timestamp`/`.Value` read, so an expression
//! may also build a list of samples, which is accepted as a result.
//!
//! Every `Metrics` index must be a string literal. That keeps the set of
//! referenced keys known after compilation, so the caller only has to load
//! those series into the environment.

mod eval;
mod lexer;
mod merge;
mod parser;
mod value;

pub use merge::{diff_merge, sum_merge};
pub use value::Value;

use crate::error::Result;
use crate::model::{MetricsEnv, Series};

/// A compiled expression.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    root: parser::Expr,
    metric_keys: Vec<String>,
}

impl Program {
    /// Parses and checks `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compile`](crate::Error::Compile) on syntax errors,
    /// unknown names, wrong arity and non-literal `Metrics` indexes.
    pub fn compile(source: &str) -> Result<Self> {
        let root = parser::parse(source)?;
        let mut metric_keys = Vec::new();
        root.collect_metric_keys(&mut metric_keys);
        metric_keys.sort();
        metric_keys.dedup();
        Ok(Self {
            source: source.to_string(),
            root,
            metric_keys,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct metric keys referenced by the expression, sorted.
    pub fn metric_keys(&self) -> &[String] {
        &self.metric_keys
    }

    /// Runs the program against `env`.
    pub fn run(&self, env: &MetricsEnv) -> Result<Value> {
        eval::eval(&self.root, env)
    }
}

/// Compiles `source`, runs it against `env` and normalizes the result into a
/// series.
pub fn evaluate(source: &str, env: &MetricsEnv) -> Result<Series> {
    let program = Program::compile(source)?;
    program.run(env)?.into_series()
}
