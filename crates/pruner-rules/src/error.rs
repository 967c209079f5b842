//! Compile-time and run-time failures of the rule language.
//!
//! # Design
//!
//! - Compile errors carry the character offset of the offending construct.
//! - Evaluation errors are rare for well-typed programs: overflow, modulo by
//!   zero and bad arguments computed at run time.

use thiserror::Error;

use crate::value::Type;

/// A rule failed to parse or type-check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A character that starts no token.
    #[error("unexpected character {found:?} at offset {pos}")]
    UnexpectedChar {
        /// Character offset.
        pos: usize,
        /// Offending character.
        found: char,
    },
    /// A string literal without its closing quote.
    #[error("unterminated string starting at offset {pos}")]
    UnterminatedString {
        /// Offset of the opening quote.
        pos: usize,
    },
    /// A numeric literal that does not fit its type.
    #[error("invalid number {literal:?} at offset {pos}")]
    InvalidNumber {
        /// Character offset.
        pos: usize,
        /// Literal text.
        literal: String,
    },
    /// The parser met a token it did not expect.
    #[error("expected {expected} at offset {pos}, found {found}")]
    UnexpectedToken {
        /// Character offset.
        pos: usize,
        /// What the grammar allows here.
        expected: &'static str,
        /// What was found instead.
        found: String,
    },
    /// An identifier other than `torrents` or `disk`.
    #[error("unknown identifier `{name}` at offset {pos}")]
    UnknownIdentifier {
        /// Character offset.
        pos: usize,
        /// Identifier text.
        name: String,
    },
    /// A call to a function the language does not provide.
    #[error("unknown function `{name}` at offset {pos}")]
    UnknownFunction {
        /// Character offset.
        pos: usize,
        /// Function name.
        name: String,
    },
    /// A `.field` that torrents do not have.
    #[error("unknown torrent field `.{name}` at offset {pos}")]
    UnknownField {
        /// Character offset.
        pos: usize,
        /// Field name.
        name: String,
    },
    /// A `.field` used outside a `filter` predicate.
    #[error("`.{name}` at offset {pos} is only valid inside a filter predicate")]
    FieldOutsidePredicate {
        /// Character offset.
        pos: usize,
        /// Field name.
        name: String,
    },
    /// Wrong number of arguments.
    #[error("`{function}` at offset {pos} takes {expected} argument(s), got {found}")]
    Arity {
        /// Character offset.
        pos: usize,
        /// Function name.
        function: &'static str,
        /// Expected count.
        expected: usize,
        /// Supplied count.
        found: usize,
    },
    /// Operand or argument types do not fit the operation.
    #[error("type mismatch at offset {pos}: {detail}")]
    TypeMismatch {
        /// Character offset.
        pos: usize,
        /// Human readable description.
        detail: String,
    },
    /// A literal argument was rejected while folding constants.
    #[error("invalid argument to `{function}` at offset {pos}: {reason}")]
    InvalidArgument {
        /// Character offset.
        pos: usize,
        /// Function or operator name.
        function: &'static str,
        /// Underlying parse failure.
        reason: String,
    },
    /// Nesting beyond what the compiler accepts.
    #[error("rule nests deeper than {limit} levels at offset {pos}")]
    TooDeep {
        /// Character offset where the limit was reached.
        pos: usize,
        /// Maximum nesting depth.
        limit: usize,
    },
    /// The whole rule does not produce a torrent sequence.
    #[error("rule must produce a sequence of torrents, found {found}")]
    ResultType {
        /// Inferred result type.
        found: Type,
    },
}

/// A compiled rule failed while running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// The program produced something other than a torrent sequence.
    #[error("rule returned {found} instead of a sequence of torrents")]
    UnexpectedResult {
        /// Runtime type of the result.
        found: Type,
    },
    /// Integer or time arithmetic left the representable range.
    #[error("arithmetic overflow in `{operation}`")]
    Overflow {
        /// Operator or conversion.
        operation: &'static str,
    },
    /// Integer modulo by zero.
    #[error("integer modulo by zero")]
    ModuloByZero,
    /// A run-time argument was rejected.
    #[error("invalid argument to `{function}`: {reason}")]
    InvalidArgument {
        /// Function or operator name.
        function: &'static str,
        /// Underlying failure.
        reason: String,
    },
    /// Operand types did not match at run time.
    #[error("type mismatch in `{operation}`")]
    TypeMismatch {
        /// Operator or function.
        operation: &'static str,
    },
}

/// Result alias for rule compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Result alias for rule evaluation.
pub type EvalResult<T> = Result<T, EvaluationError>;
