//! Type checking and lowering of the syntax tree into an executable program.
//!
//! Literal arguments of `bytes`, `duration` and `matches` are folded here so a
//! malformed literal is a compile error rather than a per-run failure.

use pruner_torrent_core::{parse_bytes, parse_duration};
use regex::Regex;

use crate::ast::{BinaryOp, Expr, Node, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::value::{Constant, Type};

/// Torrent attribute readable as `.name` inside a filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    Hash,
    Name,
    Category,
    Ratio,
    Progress,
    Status,
    Size,
    Leecher,
    Seeder,
    DlSpeed,
    UpSpeed,
    AvgDlSpeed,
    AvgUpSpeed,
    Downloaded,
    Uploaded,
    AddedTime,
    LastActivity,
    SeedingTime,
    TimeElapsed,
}

const FIELDS: &[(&str, Field)] = &[
    ("hash", Field::Hash),
    ("name", Field::Name),
    ("category", Field::Category),
    ("ratio", Field::Ratio),
    ("progress", Field::Progress),
    ("status", Field::Status),
    ("size", Field::Size),
    ("leecher", Field::Leecher),
    ("seeder", Field::Seeder),
    ("dl_speed", Field::DlSpeed),
    ("up_speed", Field::UpSpeed),
    ("avg_dl_speed", Field::AvgDlSpeed),
    ("avg_up_speed", Field::AvgUpSpeed),
    ("downloaded", Field::Downloaded),
    ("uploaded", Field::Uploaded),
    ("added_time", Field::AddedTime),
    ("last_activity", Field::LastActivity),
    ("seeding_time", Field::SeedingTime),
    ("time_elapsed", Field::TimeElapsed),
];

impl Field {
    fn lookup(name: &str) -> Option<Self> {
        FIELDS
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, field)| *field)
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Name => "name",
            Self::Category => "category",
            Self::Ratio => "ratio",
            Self::Progress => "progress",
            Self::Status => "status",
            Self::Size => "size",
            Self::Leecher => "leecher",
            Self::Seeder => "seeder",
            Self::DlSpeed => "dl_speed",
            Self::UpSpeed => "up_speed",
            Self::AvgDlSpeed => "avg_dl_speed",
            Self::AvgUpSpeed => "avg_up_speed",
            Self::Downloaded => "downloaded",
            Self::Uploaded => "uploaded",
            Self::AddedTime => "added_time",
            Self::LastActivity => "last_activity",
            Self::SeedingTime => "seeding_time",
            Self::TimeElapsed => "time_elapsed",
        }
    }

    const fn ty(self) -> Type {
        match self {
            Self::Hash | Self::Name | Self::Category => Type::Str,
            Self::Ratio | Self::Progress => Type::Float,
            Self::AddedTime | Self::LastActivity => Type::Time,
            Self::SeedingTime | Self::TimeElapsed => Type::Duration,
            Self::Status
            | Self::Size
            | Self::Leecher
            | Self::Seeder
            | Self::DlSpeed
            | Self::UpSpeed
            | Self::AvgDlSpeed
            | Self::AvgUpSpeed
            | Self::Downloaded
            | Self::Uploaded => Type::Int,
        }
    }
}

/// Executable, type-checked program.
#[derive(Debug, Clone)]
pub(crate) enum Ir {
    Const(Constant),
    Torrents,
    Disk,
    Now,
    Field(Field),
    Not(Box<Ir>),
    Neg(Box<Ir>),
    And(Box<Ir>, Box<Ir>),
    Or(Box<Ir>, Box<Ir>),
    Binary(BinaryOp, Box<Ir>, Box<Ir>),
    MatchesConst(Box<Ir>, Regex),
    Bytes(Box<Ir>),
    Duration(Box<Ir>),
    Cmp(Box<Ir>, Box<Ir>),
    CmpFloat(Box<Ir>, Box<Ir>),
    Filter(Box<Ir>, Box<Ir>),
}

/// Output of a successful check.
pub(crate) struct Checked {
    pub(crate) program: Ir,
    pub(crate) uses_disk: bool,
}

/// Type-check `root`, requiring a torrent sequence as the result.
pub(crate) fn check(root: &Node) -> CompileResult<Checked> {
    let mut checker = Checker::default();
    let (program, ty) = checker.check(root)?;
    if ty != Type::Seq {
        return Err(CompileError::ResultType { found: ty });
    }
    Ok(Checked {
        program,
        uses_disk: checker.uses_disk,
    })
}

/// Result type of `lhs op rhs`, or `None` when the operands do not fit.
pub(crate) fn binary_type(op: BinaryOp, lhs: Type, rhs: Type) -> Option<Type> {
    use Type::{Bool, Duration, Float, Int, Str, Time};

    let numeric = lhs.is_numeric() && rhs.is_numeric();
    match op {
        BinaryOp::And | BinaryOp::Or => (lhs == Bool && rhs == Bool).then_some(Bool),
        BinaryOp::Eq | BinaryOp::Ne => {
            (numeric || (lhs == rhs && matches!(lhs, Bool | Str | Time | Duration)))
                .then_some(Bool)
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            (numeric || (lhs == rhs && matches!(lhs, Str | Time | Duration))).then_some(Bool)
        }
        BinaryOp::Contains | BinaryOp::StartsWith | BinaryOp::EndsWith | BinaryOp::Matches => {
            (lhs == Str && rhs == Str).then_some(Bool)
        }
        BinaryOp::Add => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            _ if numeric => Some(Float),
            (Str, Str) => Some(Str),
            (Time, Duration) | (Duration, Time) => Some(Time),
            (Duration, Duration) => Some(Duration),
            _ => None,
        },
        BinaryOp::Sub => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            _ if numeric => Some(Float),
            (Time, Time) | (Duration, Duration) => Some(Duration),
            (Time, Duration) => Some(Time),
            _ => None,
        },
        BinaryOp::Mul => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            _ if numeric => Some(Float),
            (Duration, Int) | (Int, Duration) => Some(Duration),
            _ => None,
        },
        BinaryOp::Div => numeric.then_some(Float),
        BinaryOp::Rem => (lhs == Int && rhs == Int).then_some(Int),
    }
}

#[derive(Default)]
struct Checker {
    predicate_depth: usize,
    uses_disk: bool,
}

impl Checker {
    fn check(&mut self, node: &Node) -> CompileResult<(Ir, Type)> {
        match &node.expr {
            Expr::Int(v) => Ok(constant(Constant::Int(*v))),
            Expr::Float(v) => Ok(constant(Constant::Float(*v))),
            Expr::Str(v) => Ok(constant(Constant::Str(v.clone()))),
            Expr::Bool(v) => Ok(constant(Constant::Bool(*v))),
            Expr::Ident(name) => self.check_ident(name, node.pos),
            Expr::Field(name) => self.check_field(name, node.pos),
            Expr::Unary(op, operand) => self.check_unary(*op, operand, node.pos),
            Expr::Binary(op, lhs, rhs) => self.check_binary(*op, lhs, rhs, node.pos),
            Expr::Call(name, args) => self.check_call(name, args, node.pos),
        }
    }

    fn check_ident(&mut self, name: &str, pos: usize) -> CompileResult<(Ir, Type)> {
        match name {
            "torrents" => Ok((Ir::Torrents, Type::Seq)),
            "disk" => {
                self.uses_disk = true;
                Ok((Ir::Disk, Type::Int))
            }
            _ => Err(CompileError::UnknownIdentifier {
                pos,
                name: name.to_string(),
            }),
        }
    }

    fn check_field(&self, name: &str, pos: usize) -> CompileResult<(Ir, Type)> {
        let field = Field::lookup(name).ok_or_else(|| CompileError::UnknownField {
            pos,
            name: name.to_string(),
        })?;
        if self.predicate_depth == 0 {
            return Err(CompileError::FieldOutsidePredicate {
                pos,
                name: name.to_string(),
            });
        }
        Ok((Ir::Field(field), field.ty()))
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Node, pos: usize) -> CompileResult<(Ir, Type)> {
        let (ir, ty) = self.check(operand)?;
        match (op, ty) {
            (UnaryOp::Not, Type::Bool) => Ok((Ir::Not(Box::new(ir)), Type::Bool)),
            (UnaryOp::Neg, Type::Int | Type::Float | Type::Duration) => {
                Ok((Ir::Neg(Box::new(ir)), ty))
            }
            (UnaryOp::Not, _) => Err(mismatch(pos, format!("cannot apply `!` to {ty}"))),
            (UnaryOp::Neg, _) => Err(mismatch(pos, format!("cannot negate {ty}"))),
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Node,
        rhs: &Node,
        pos: usize,
    ) -> CompileResult<(Ir, Type)> {
        let (left, lt) = self.check(lhs)?;

        if op == BinaryOp::Matches
            && let Expr::Str(pattern) = &rhs.expr
        {
            if lt != Type::Str {
                return Err(mismatch(pos, format!("cannot apply `matches` to {lt}")));
            }
            let regex = Regex::new(pattern).map_err(|err| CompileError::InvalidArgument {
                pos: rhs.pos,
                function: "matches",
                reason: err.to_string(),
            })?;
            return Ok((Ir::MatchesConst(Box::new(left), regex), Type::Bool));
        }

        let (right, rt) = self.check(rhs)?;
        let ty = binary_type(op, lt, rt).ok_or_else(|| {
            mismatch(
                pos,
                format!("cannot apply `{}` to {lt} and {rt}", op.symbol()),
            )
        })?;
        let ir = match op {
            BinaryOp::And => Ir::And(Box::new(left), Box::new(right)),
            BinaryOp::Or => Ir::Or(Box::new(left), Box::new(right)),
            _ => Ir::Binary(op, Box::new(left), Box::new(right)),
        };
        Ok((ir, ty))
    }

    fn check_call(&mut self, name: &str, args: &[Node], pos: usize) -> CompileResult<(Ir, Type)> {
        match name {
            "filter" => {
                let [seq, predicate] = arity::<2>("filter", args, pos)?;
                let (seq_ir, seq_ty) = self.check(seq)?;
                if seq_ty != Type::Seq {
                    return Err(mismatch(
                        seq.pos,
                        format!("`filter` expects a torrent sequence, found {seq_ty}"),
                    ));
                }
                self.predicate_depth += 1;
                let checked = self.check(predicate);
                self.predicate_depth -= 1;
                let (pred_ir, pred_ty) = checked?;
                if pred_ty != Type::Bool {
                    return Err(mismatch(
                        predicate.pos,
                        format!("`filter` predicate must be bool, found {pred_ty}"),
                    ));
                }
                Ok((Ir::Filter(Box::new(seq_ir), Box::new(pred_ir)), Type::Seq))
            }
            "now" => {
                arity::<0>("now", args, pos)?;
                Ok((Ir::Now, Type::Time))
            }
            "bytes" => {
                let [arg] = arity::<1>("bytes", args, pos)?;
                if let Expr::Str(literal) = &arg.expr {
                    let bytes = parse_bytes(literal).map_err(|err| CompileError::InvalidArgument {
                        pos: arg.pos,
                        function: "bytes",
                        reason: err.to_string(),
                    })?;
                    return Ok(constant(Constant::Int(bytes)));
                }
                let ir = self.expect_type(arg, Type::Str, "bytes")?;
                Ok((Ir::Bytes(Box::new(ir)), Type::Int))
            }
            "duration" => {
                let [arg] = arity::<1>("duration", args, pos)?;
                if let Expr::Str(literal) = &arg.expr {
                    let delta =
                        parse_duration(literal).map_err(|err| CompileError::InvalidArgument {
                            pos: arg.pos,
                            function: "duration",
                            reason: err.to_string(),
                        })?;
                    return Ok(constant(Constant::Duration(delta)));
                }
                let ir = self.expect_type(arg, Type::Str, "duration")?;
                Ok((Ir::Duration(Box::new(ir)), Type::Duration))
            }
            "cmp" => {
                let [lhs, rhs] = arity::<2>("cmp", args, pos)?;
                let left = self.expect_type(lhs, Type::Int, "cmp")?;
                let right = self.expect_type(rhs, Type::Int, "cmp")?;
                Ok((Ir::Cmp(Box::new(left), Box::new(right)), Type::Int))
            }
            "cmpFloat" => {
                let [lhs, rhs] = arity::<2>("cmpFloat", args, pos)?;
                let left = self.expect_numeric(lhs, "cmpFloat")?;
                let right = self.expect_numeric(rhs, "cmpFloat")?;
                Ok((Ir::CmpFloat(Box::new(left), Box::new(right)), Type::Int))
            }
            _ => Err(CompileError::UnknownFunction {
                pos,
                name: name.to_string(),
            }),
        }
    }

    fn expect_type(&mut self, node: &Node, want: Type, function: &str) -> CompileResult<Ir> {
        let (ir, ty) = self.check(node)?;
        if ty == want {
            Ok(ir)
        } else {
            Err(mismatch(
                node.pos,
                format!("`{function}` expects {want}, found {ty}"),
            ))
        }
    }

    fn expect_numeric(&mut self, node: &Node, function: &str) -> CompileResult<Ir> {
        let (ir, ty) = self.check(node)?;
        if ty.is_numeric() {
            Ok(ir)
        } else {
            Err(mismatch(
                node.pos,
                format!("`{function}` expects a number, found {ty}"),
            ))
        }
    }
}

fn constant(value: Constant) -> (Ir, Type) {
    let ty = value.type_of();
    (Ir::Const(value), ty)
}

fn mismatch(pos: usize, detail: String) -> CompileError {
    CompileError::TypeMismatch { pos, detail }
}

fn arity<'n, const N: usize>(
    function: &'static str,
    args: &'n [Node],
    pos: usize,
) -> CompileResult<&'n [Node; N]> {
    args.try_into().map_err(|_| CompileError::Arity {
        pos,
        function,
        expected: N,
        found: args.len(),
    })
}
