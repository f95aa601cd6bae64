//! Tree-walking interpreter over a compiled expression.

use super::merge::{diff_merge, sum_merge};
use super::parser::{BinaryOp, Builtin, Expr, Field, METRICS_IDENT};
use super::value::Value;
use crate::error::{Error, Result};
use crate::model::MetricsEnv;
use crate::util::unix_secs_f64;

pub(crate) fn eval(expr: &Expr, env: &MetricsEnv) -> Result<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Nil => Ok(Value::Nil),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Expr::Metric(key) => env
            .get(key)
            .map(|series| Value::Series(series.clone()))
            .ok_or_else(|| Error::Run(format!("no metric {:?} in {}", key, METRICS_IDENT))),
        Expr::Call { func, args } => {
            let args = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<Result<Vec<_>>>()?;
            call(*func, args)
        }
        Expr::Index { target, index } => index_value(eval(target, env)?, eval(index, env)?),
        Expr::Member { target, field } => member(eval(target, env)?, *field),
        Expr::Neg(operand) => match eval(operand, env)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(Error::Run(format!(
                "invalid operation: -{}",
                other.type_name()
            ))),
        },
        Expr::Binary { op, lhs, rhs } => binary(*op, eval(lhs, env)?, eval(rhs, env)?),
    }
}

fn call(func: Builtin, mut args: Vec<Value>) -> Result<Value> {
    match func {
        Builtin::MetricsSum | Builtin::MetricsDiff => {
            let (Some(Value::Series(b)), Some(Value::Series(a))) = (args.pop(), args.pop()) else {
                return Err(Error::Run(format!("{} expects two series", func)));
            };
            let merged = match func {
                Builtin::MetricsSum => sum_merge(&a, &b),
                _ => diff_merge(&a, &b),
            };
            Ok(Value::Series(merged))
        }
        Builtin::Len => match args.pop() {
            Some(Value::Series(s)) => Ok(Value::Number(s.len() as f64)),
            Some(Value::List(items)) => Ok(Value::Number(items.len() as f64)),
            Some(Value::String(s)) => Ok(Value::Number(s.chars().count() as f64)),
            other => Err(Error::Run(format!(
                "invalid argument for len: {}",
                other.map_or("nothing", |v| v.type_name())
            ))),
        },
    }
}

fn index_value(target: Value, index: Value) -> Result<Value> {
    let Value::Number(raw) = index else {
        return Err(Error::Run(format!(
            "index must be a number, got {}",
            index.type_name()
        )));
    };
    if raw.fract() != 0.0 {
        return Err(Error::Run(format!("index must be an integer, got {}", raw)));
    }

    match target {
        Value::Series(series) => resolve_index(raw, series.len())
            .map(|i| Value::Sample(series[i]))
            .ok_or_else(|| out_of_range(raw, series.len())),
        Value::List(mut items) => {
            let len = items.len();
            resolve_index(raw, len)
                .map(|i| items.swap_remove(i))
                .ok_or_else(|| out_of_range(raw, len))
        }
        other => Err(Error::Run(format!(
            "cannot index {}",
            other.type_name()
        ))),
    }
}

/// Maps a possibly negative index onto `0..len`.
fn resolve_index(raw: f64, len: usize) -> Option<usize> {
    let len = len as f64;
    let i = if raw < 0.0 { len + raw } else { raw };
    (i >= 0.0 && i < len).then_some(i as usize)
}

fn out_of_range(raw: f64, len: usize) -> Error {
    Error::Run(format!("index out of range: {} (length {})", raw, len))
}

fn member(target: Value, field: Field) -> Result<Value> {
    let Value::Sample(sample) = target else {
        return Err(Error::Run(format!(
            "cannot access field of {}",
            target.type_name()
        )));
    };
    Ok(match field {
        Field::Timestamp => Value::Number(unix_secs_f64(sample.timestamp)),
        Field::Value => Value::Number(sample.value),
    })
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Series(a), Value::Series(b)) => Ok(Value::Series(sum_merge(&a, &b))),
        (BinaryOp::Sub, Value::Series(a), Value::Series(b)) => {
            Ok(Value::Series(diff_merge(&a, &b)))
        }
        (BinaryOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
        (BinaryOp::Div, Value::Number(_), Value::Number(b)) if b == 0.0 => {
            Err(Error::Run("division by zero".to_string()))
        }
        (op, Value::Number(a), Value::Number(b)) => Ok(Value::Number(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        })),
        (op, lhs, rhs) => Err(Error::Run(format!(
            "invalid operation: {} {} {}",
            lhs.type_name(),
            op,
            rhs.type_name()
        ))),
    }
}
