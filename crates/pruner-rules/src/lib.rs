#![forbid(unsafe_code)]
#![deny(unused_must_use, rustdoc::broken_intra_doc_links, rustdoc::bare_urls)]
#![warn(
    dead_code,
    unused,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs
)]

//! Rule expression language for selecting torrents to act on.
//!
//! A rule is compiled once and evaluated against every fresh torrent list:
//!
//! ```text
//! filter(torrents, .ratio > 2 && now() - .last_activity > duration("24h"))
//! ```
//!
//! Layout: `lexer.rs` and `parser.rs` (syntax), `check.rs` (typing and
//! lowering), `eval.rs` (interpreter), `value.rs`, `error.rs`.

mod ast;
mod check;
pub mod error;
mod eval;
mod lexer;
mod parser;
mod value;

use chrono::{DateTime, Utc};
use pruner_torrent_core::{Bytes, Torrent};

pub use error::{CompileError, CompileResult, EvalResult, EvaluationError};
pub use eval::{cmp_float, cmp_int};
pub use value::Type;

use crate::check::Ir;
use crate::eval::Env;
use crate::value::Value;

/// Inputs a rule may observe besides the torrent list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    /// Free space on the strategy's mount path, `0` when not queried.
    pub disk: Bytes,
    /// Value returned by `now()`.
    pub now: DateTime<Utc>,
}

impl EvalContext {
    /// Context pinned to the current wall clock.
    #[must_use]
    pub fn new(disk: Bytes) -> Self {
        Self::at(disk, Utc::now())
    }

    /// Context with an explicit clock, for reproducible evaluation.
    #[must_use]
    pub const fn at(disk: Bytes, now: DateTime<Utc>) -> Self {
        Self { disk, now }
    }
}

/// A parsed and type-checked rule, reusable across runs.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    source: String,
    program: Ir,
    uses_disk: bool,
}

impl CompiledRule {
    /// Compile `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for syntax errors, unknown names, type
    /// mismatches, malformed literal arguments, or a rule that does not
    /// produce a torrent sequence.
    pub fn compile(source: &str) -> CompileResult<Self> {
        let tree = parser::parse(source)?;
        let checked = check::check(&tree)?;
        Ok(Self {
            source: source.to_string(),
            program: checked.program,
            uses_disk: checked.uses_disk,
        })
    }

    /// Rule text as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the rule reads `disk`, so free space must be queried first.
    #[must_use]
    pub const fn uses_disk(&self) -> bool {
        self.uses_disk
    }

    /// Select matching torrents by reference, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] on arithmetic overflow, modulo by zero
    /// or an argument rejected at run time.
    pub fn select<'a>(
        &self,
        torrents: &'a [Torrent],
        ctx: &EvalContext,
    ) -> EvalResult<Vec<&'a Torrent>> {
        let env = Env {
            torrents,
            disk: ctx.disk.get(),
            now: ctx.now,
        };
        match eval::eval(&self.program, &env, None)? {
            Value::Seq(selected) => Ok(selected),
            other => Err(EvaluationError::UnexpectedResult {
                found: other.type_of(),
            }),
        }
    }

    /// Select matching torrents as owned values.
    ///
    /// # Errors
    ///
    /// See [`CompiledRule::select`].
    pub fn evaluate(&self, torrents: &[Torrent], ctx: &EvalContext) -> EvalResult<Vec<Torrent>> {
        Ok(self
            .select(torrents, ctx)?
            .into_iter()
            .cloned()
            .collect())
    }
}

/// Compile `source`; shorthand for [`CompiledRule::compile`].
///
/// # Errors
///
/// See [`CompiledRule::compile`].
pub fn compile(source: &str) -> CompileResult<CompiledRule> {
    CompiledRule::compile(source)
}

/// Run `rule` over `torrents`.
///
/// # Errors
///
/// See [`CompiledRule::select`].
pub fn evaluate(
    rule: &CompiledRule,
    torrents: &[Torrent],
    ctx: &EvalContext,
) -> EvalResult<Vec<Torrent>> {
    rule.evaluate(torrents, ctx)
}
