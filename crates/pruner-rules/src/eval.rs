//! Tree-walking interpreter for checked programs.

use std::borrow::Cow;
use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, Utc};
use pruner_torrent_core::{Torrent, parse_bytes, parse_duration};
use regex::Regex;

use crate::ast::BinaryOp;
use crate::check::{Field, Ir};
use crate::error::{EvalResult, EvaluationError};
use crate::value::Value;

/// Integer three-way comparison: `-1`, `0` or `1`.
#[must_use]
pub const fn cmp_int(lhs: i64, rhs: i64) -> i64 {
    if lhs < rhs {
        -1
    } else if lhs > rhs {
        1
    } else {
        0
    }
}

/// Float three-way comparison: `-1`, `0` or `1`; unordered operands compare as `0`.
#[must_use]
pub fn cmp_float(lhs: f64, rhs: f64) -> i64 {
    match lhs.partial_cmp(&rhs) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Greater) => 1,
        Some(Ordering::Equal) | None => 0,
    }
}

pub(crate) struct Env<'a> {
    pub(crate) torrents: &'a [Torrent],
    pub(crate) disk: i64,
    pub(crate) now: DateTime<Utc>,
}

pub(crate) fn eval<'a>(
    ir: &Ir,
    env: &Env<'a>,
    current: Option<&'a Torrent>,
) -> EvalResult<Value<'a>> {
    match ir {
        Ir::Const(constant) => Ok(constant.to_value()),
        Ir::Torrents => Ok(Value::Seq(env.torrents.iter().collect())),
        Ir::Disk => Ok(Value::Int(env.disk)),
        Ir::Now => Ok(Value::Time(env.now)),
        Ir::Field(field) => {
            let torrent = current.ok_or(EvaluationError::TypeMismatch {
                operation: field.name(),
            })?;
            read_field(torrent, *field)
        }
        Ir::Not(inner) => Ok(Value::Bool(!eval_bool(inner, env, current, "!")?)),
        Ir::Neg(inner) => match eval(inner, env, current)? {
            Value::Int(v) => v
                .checked_neg()
                .map(Value::Int)
                .ok_or(EvaluationError::Overflow { operation: "-" }),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Duration(v) => Ok(Value::Duration(-v)),
            _ => Err(EvaluationError::TypeMismatch { operation: "-" }),
        },
        Ir::And(lhs, rhs) => Ok(Value::Bool(
            eval_bool(lhs, env, current, "&&")? && eval_bool(rhs, env, current, "&&")?,
        )),
        Ir::Or(lhs, rhs) => Ok(Value::Bool(
            eval_bool(lhs, env, current, "||")? || eval_bool(rhs, env, current, "||")?,
        )),
        Ir::Binary(op, lhs, rhs) => {
            let left = eval(lhs, env, current)?;
            let right = eval(rhs, env, current)?;
            binary(*op, left, right)
        }
        Ir::MatchesConst(lhs, regex) => {
            let text = eval_str(lhs, env, current, "matches")?;
            Ok(Value::Bool(regex.is_match(&text)))
        }
        Ir::Bytes(arg) => {
            let text = eval_str(arg, env, current, "bytes")?;
            parse_bytes(&text)
                .map(Value::Int)
                .map_err(|err| EvaluationError::InvalidArgument {
                    function: "bytes",
                    reason: err.to_string(),
                })
        }
        Ir::Duration(arg) => {
            let text = eval_str(arg, env, current, "duration")?;
            parse_duration(&text)
                .map(Value::Duration)
                .map_err(|err| EvaluationError::InvalidArgument {
                    function: "duration",
                    reason: err.to_string(),
                })
        }
        Ir::Cmp(lhs, rhs) => match (eval(lhs, env, current)?, eval(rhs, env, current)?) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(cmp_int(a, b))),
            _ => Err(EvaluationError::TypeMismatch { operation: "cmp" }),
        },
        Ir::CmpFloat(lhs, rhs) => {
            let left = eval(lhs, env, current)?;
            let right = eval(rhs, env, current)?;
            let (a, b) = as_floats(&left, &right).ok_or(EvaluationError::TypeMismatch {
                operation: "cmpFloat",
            })?;
            Ok(Value::Int(cmp_float(a, b)))
        }
        Ir::Filter(seq, predicate) => {
            let Value::Seq(items) = eval(seq, env, current)? else {
                return Err(EvaluationError::TypeMismatch {
                    operation: "filter",
                });
            };
            let mut kept = Vec::with_capacity(items.len());
            for torrent in items {
                if eval_bool(predicate, env, Some(torrent), "filter")? {
                    kept.push(torrent);
                }
            }
            Ok(Value::Seq(kept))
        }
    }
}

fn eval_bool<'a>(
    ir: &Ir,
    env: &Env<'a>,
    current: Option<&'a Torrent>,
    operation: &'static str,
) -> EvalResult<bool> {
    match eval(ir, env, current)? {
        Value::Bool(v) => Ok(v),
        _ => Err(EvaluationError::TypeMismatch { operation }),
    }
}

fn eval_str<'a>(
    ir: &Ir,
    env: &Env<'a>,
    current: Option<&'a Torrent>,
    operation: &'static str,
) -> EvalResult<Cow<'a, str>> {
    match eval(ir, env, current)? {
        Value::Str(v) => Ok(v),
        _ => Err(EvaluationError::TypeMismatch { operation }),
    }
}

fn span<'a>(field: Field, value: std::time::Duration) -> EvalResult<Value<'a>> {
    TimeDelta::from_std(value)
        .map(Value::Duration)
        .map_err(|_| EvaluationError::Overflow {
            operation: field.name(),
        })
}

fn read_field(torrent: &Torrent, field: Field) -> EvalResult<Value<'_>> {
    Ok(match field {
        Field::Hash => Value::Str(Cow::Borrowed(&torrent.hash)),
        Field::Name => Value::Str(Cow::Borrowed(&torrent.name)),
        Field::Category => Value::Str(Cow::Borrowed(&torrent.category)),
        Field::Ratio => Value::Float(torrent.ratio),
        Field::Progress => Value::Float(torrent.progress),
        Field::Status => Value::Int(i64::from(torrent.status.bits())),
        Field::Size => Value::Int(torrent.size),
        Field::Leecher => Value::Int(torrent.leecher),
        Field::Seeder => Value::Int(torrent.seeder),
        Field::DlSpeed => Value::Int(torrent.dl_speed),
        Field::UpSpeed => Value::Int(torrent.up_speed),
        Field::AvgDlSpeed => Value::Int(torrent.avg_dl_speed),
        Field::AvgUpSpeed => Value::Int(torrent.avg_up_speed),
        Field::Downloaded => Value::Int(torrent.downloaded),
        Field::Uploaded => Value::Int(torrent.uploaded),
        Field::AddedTime => Value::Time(torrent.added_time),
        // Never-active torrents count as infinitely stale.
        Field::LastActivity => {
            Value::Time(torrent.last_activity.unwrap_or(DateTime::<Utc>::MIN_UTC))
        }
        Field::SeedingTime => span(field, torrent.seeding_time)?,
        Field::TimeElapsed => span(field, torrent.time_elapsed)?,
    })
}

#[allow(clippy::cast_precision_loss)]
fn as_floats(lhs: &Value<'_>, rhs: &Value<'_>) -> Option<(f64, f64)> {
    let float = |value: &Value<'_>| match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    };
    Some((float(lhs)?, float(rhs)?))
}

fn binary<'a>(op: BinaryOp, lhs: Value<'a>, rhs: Value<'a>) -> EvalResult<Value<'a>> {
    match op {
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge => compare(op, &lhs, &rhs).map(Value::Bool),
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith | BinaryOp::Matches => {
            string_op(op, &lhs, &rhs).map(Value::Bool)
        }
        BinaryOp::Add
        | BinaryOp::Sub
        | BinaryOp::Mul
        | BinaryOp::Div
        | BinaryOp::Rem => arithmetic(op, lhs, rhs),
        BinaryOp::And | BinaryOp::Or => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinaryOp::And {
                a && b
            } else {
                a || b
            })),
            _ => Err(EvaluationError::TypeMismatch {
                operation: op.symbol(),
            }),
        },
    }
}

fn compare(op: BinaryOp, lhs: &Value<'_>, rhs: &Value<'_>) -> EvalResult<bool> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => {
            let (a, b) = as_floats(lhs, rhs).ok_or(EvaluationError::TypeMismatch {
                operation: op.symbol(),
            })?;
            a.partial_cmp(&b)
        }
    };

    let Some(ordering) = ordering else {
        return Ok(op == BinaryOp::Ne);
    };
    Ok(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => {
            return Err(EvaluationError::TypeMismatch {
                operation: op.symbol(),
            });
        }
    })
}

fn string_op(op: BinaryOp, lhs: &Value<'_>, rhs: &Value<'_>) -> EvalResult<bool> {
    let (Value::Str(text), Value::Str(needle)) = (lhs, rhs) else {
        return Err(EvaluationError::TypeMismatch {
            operation: op.symbol(),
        });
    };
    match op {
        BinaryOp::Contains => Ok(text.contains(&**needle)),
        BinaryOp::StartsWith => Ok(text.starts_with(&**needle)),
        BinaryOp::EndsWith => Ok(text.ends_with(&**needle)),
        BinaryOp::Matches => Regex::new(needle)
            .map(|regex| regex.is_match(text))
            .map_err(|err| EvaluationError::InvalidArgument {
                function: "matches",
                reason: err.to_string(),
            }),
        _ => Err(EvaluationError::TypeMismatch {
            operation: op.symbol(),
        }),
    }
}

fn arithmetic<'a>(op: BinaryOp, lhs: Value<'a>, rhs: Value<'a>) -> EvalResult<Value<'a>> {
    let overflow = || EvaluationError::Overflow {
        operation: op.symbol(),
    };
    let mismatch = || EvaluationError::TypeMismatch {
        operation: op.symbol(),
    };

    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => {
            a.checked_add(b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => {
            a.checked_sub(b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => {
            a.checked_mul(b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Rem, Value::Int(_), Value::Int(0)) => Err(EvaluationError::ModuloByZero),
        (BinaryOp::Rem, Value::Int(a), Value::Int(b)) => {
            a.checked_rem(b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
            Ok(Value::Str(Cow::Owned(format!("{a}{b}"))))
        }
        (BinaryOp::Add, Value::Time(t), Value::Duration(d))
        | (BinaryOp::Add, Value::Duration(d), Value::Time(t)) => {
            t.checked_add_signed(d).map(Value::Time).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Time(t), Value::Duration(d)) => {
            t.checked_sub_signed(d).map(Value::Time).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Time(a), Value::Time(b)) => {
            Ok(Value::Duration(a.signed_duration_since(b)))
        }
        (BinaryOp::Add, Value::Duration(a), Value::Duration(b)) => {
            a.checked_add(&b).map(Value::Duration).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Duration(a), Value::Duration(b)) => {
            a.checked_sub(&b).map(Value::Duration).ok_or_else(overflow)
        }
        (BinaryOp::Mul, Value::Duration(d), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::Duration(d)) => i32::try_from(n)
            .ok()
            .and_then(|n| d.checked_mul(n))
            .map(Value::Duration)
            .ok_or_else(overflow),
        (op, lhs, rhs) => {
            let (a, b) = as_floats(&lhs, &rhs).ok_or_else(mismatch)?;
            match op {
                BinaryOp::Add => Ok(Value::Float(a + b)),
                BinaryOp::Sub => Ok(Value::Float(a - b)),
                BinaryOp::Mul => Ok(Value::Float(a * b)),
                BinaryOp::Div => Ok(Value::Float(a / b)),
                _ => Err(mismatch()),
            }
        }
    }
}
