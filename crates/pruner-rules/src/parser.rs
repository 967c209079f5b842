//! Recursive-descent parser.
//!
//! Precedence, loosest first: `||`, `&&`, equality, ordering, string
//! operators, additive, multiplicative, unary, primary.
//!
//! Both the parser's own recursion and the height of the tree it builds are
//! capped at [`MAX_DEPTH`]; the checker and the evaluator walk the tree
//! recursively.

use crate::ast::{BinaryOp, Expr, Node, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Token, TokenKind, tokenize};

/// Deepest nesting a rule may use.
pub(crate) const MAX_DEPTH: usize = 128;

/// Parse a complete rule.
pub(crate) fn parse(source: &str) -> CompileResult<Node> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let node = parser.parse_or()?;
    parser.expect(&TokenKind::Eof, "end of input")?;
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with Eof and the cursor never passes it.
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> CompileResult<Token> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> CompileError {
        let token = self.peek();
        CompileError::UnexpectedToken {
            pos: token.pos,
            expected,
            found: token.kind.to_string(),
        }
    }

    fn node(expr: Expr, pos: usize) -> CompileResult<Node> {
        let node = Node::new(expr, pos);
        if node.height > MAX_DEPTH {
            return Err(CompileError::TooDeep {
                pos,
                limit: MAX_DEPTH,
            });
        }
        Ok(node)
    }

    fn binary_loop(
        &mut self,
        next: fn(&mut Self) -> CompileResult<Node>,
        op_for: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> CompileResult<Node> {
        let mut lhs = next(self)?;
        while let Some(op) = op_for(&self.peek().kind) {
            let pos = self.advance().pos;
            let rhs = next(self)?;
            lhs = Self::node(Expr::Binary(op, Box::new(lhs), Box::new(rhs)), pos)?;
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> CompileResult<Node> {
        self.binary_loop(Self::parse_and, |kind| {
            (kind == &TokenKind::Or).then_some(BinaryOp::Or)
        })
    }

    fn parse_and(&mut self) -> CompileResult<Node> {
        self.binary_loop(Self::parse_equality, |kind| {
            (kind == &TokenKind::And).then_some(BinaryOp::And)
        })
    }

    fn parse_equality(&mut self) -> CompileResult<Node> {
        self.binary_loop(Self::parse_ordering, |kind| match kind {
            TokenKind::Eq => Some(BinaryOp::Eq),
            TokenKind::Ne => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_ordering(&mut self) -> CompileResult<Node> {
        self.binary_loop(Self::parse_string_op, |kind| match kind {
            TokenKind::Lt => Some(BinaryOp::Lt),
            TokenKind::Le => Some(BinaryOp::Le),
            TokenKind::Gt => Some(BinaryOp::Gt),
            TokenKind::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_string_op(&mut self) -> CompileResult<Node> {
        self.binary_loop(Self::parse_additive, |kind| match kind {
            TokenKind::Ident(word) => match word.as_str() {
                "contains" => Some(BinaryOp::Contains),
                "startsWith" => Some(BinaryOp::StartsWith),
                "endsWith" => Some(BinaryOp::EndsWith),
                "matches" => Some(BinaryOp::Matches),
                _ => None,
            },
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> CompileResult<Node> {
        self.binary_loop(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Node> {
        self.binary_loop(Self::parse_unary, |kind| match kind {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            TokenKind::Percent => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// Every nested construct (parentheses, call arguments, prefix
    /// operators) re-enters here, so this is where recursion is counted.
    fn parse_unary(&mut self) -> CompileResult<Node> {
        if self.depth >= MAX_DEPTH {
            return Err(CompileError::TooDeep {
                pos: self.peek().pos,
                limit: MAX_DEPTH,
            });
        }
        self.depth += 1;
        let result = self.parse_prefixed();
        self.depth -= 1;
        result
    }

    fn parse_prefixed(&mut self) -> CompileResult<Node> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => {
                self.advance();
                return self.parse_unary();
            }
            _ => return self.parse_primary(),
        };
        let pos = self.advance().pos;
        let operand = self.parse_unary()?;
        Self::node(Expr::Unary(op, Box::new(operand)), pos)
    }

    fn parse_primary(&mut self) -> CompileResult<Node> {
        let token = self.advance();
        let pos = token.pos;
        let expr = match token.kind {
            TokenKind::Int(v) => Expr::Int(v),
            TokenKind::Float(v) => Expr::Float(v),
            TokenKind::Str(v) => Expr::Str(v),
            TokenKind::Bool(v) => Expr::Bool(v),
            TokenKind::Field(name) => Expr::Field(name),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen) {
                    Expr::Call(name, self.parse_arguments()?)
                } else {
                    Expr::Ident(name)
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                return Ok(inner);
            }
            other => {
                return Err(CompileError::UnexpectedToken {
                    pos,
                    expected: "an expression",
                    found: other.to_string(),
                });
            }
        };
        Self::node(expr, pos)
    }

    fn parse_arguments(&mut self) -> CompileResult<Vec<Node>> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RParen, "`,` or `)`")?;
            return Ok(args);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(node: &Node) -> String {
        match &node.expr {
            Expr::Int(v) => v.to_string(),
            Expr::Float(v) => v.to_string(),
            Expr::Str(v) => format!("{v:?}"),
            Expr::Bool(v) => v.to_string(),
            Expr::Ident(v) => v.clone(),
            Expr::Field(v) => format!(".{v}"),
            Expr::Unary(UnaryOp::Not, inner) => format!("(!{})", shape(inner)),
            Expr::Unary(UnaryOp::Neg, inner) => format!("(-{})", shape(inner)),
            Expr::Binary(op, lhs, rhs) => {
                format!("({} {} {})", shape(lhs), op.symbol(), shape(rhs))
            }
            Expr::Call(name, args) => format!(
                "{name}({})",
                args.iter().map(shape).collect::<Vec<_>>().join(", ")
            ),
        }
    }

    fn parsed(source: &str) -> String {
        shape(&parse(source).expect("parse"))
    }

    #[test]
    fn precedence_binds_arithmetic_tighter_than_logic() {
        assert_eq!(
            parsed("a || b && c == 1 + 2 * 3"),
            "(a || (b && (c == (1 + (2 * 3)))))"
        );
        assert_eq!(parsed("-a - -b"), "((-a) - (-b))");
        assert_eq!(parsed("!(a || b)"), "(!(a || b))");
        assert_eq!(parsed("10 - 3 - 2"), "((10 - 3) - 2)");
    }

    #[test]
    fn string_operators_sit_between_ordering_and_arithmetic() {
        assert_eq!(
            parsed(r#".name contains "x" + "y" == true"#),
            r#"((.name contains ("x" + "y")) == true)"#
        );
    }

    #[test]
    fn calls_take_nested_arguments() {
        assert_eq!(
            parsed(r#"filter(torrents, .seeder / .leecher < 1 && now() - .last_activity > duration("1h"))"#),
            r#"filter(torrents, (((.seeder / .leecher) < 1) && ((now() - .last_activity) > duration("1h"))))"#
        );
    }

    #[test]
    fn nesting_is_capped() {
        let deep = format!("filter(torrents, {}true{})", "(".repeat(1000), ")".repeat(1000));
        assert!(matches!(
            parse(&deep),
            Err(CompileError::TooDeep {
                limit: MAX_DEPTH,
                ..
            })
        ));

        let negations = format!("{}true", "!".repeat(1000));
        assert!(matches!(parse(&negations), Err(CompileError::TooDeep { .. })));

        let chain = vec!["1"; 1000].join(" + ");
        assert!(matches!(parse(&chain), Err(CompileError::TooDeep { .. })));

        let shallow = format!("filter(torrents, {}true{})", "(".repeat(100), ")".repeat(100));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn syntax_errors_point_at_the_token() {
        assert_eq!(
            parse("filter(torrents, .size >)"),
            Err(CompileError::UnexpectedToken {
                pos: 24,
                expected: "an expression",
                found: "`)`".into(),
            })
        );
        assert!(matches!(
            parse("filter(torrents"),
            Err(CompileError::UnexpectedToken {
                expected: "`,` or `)`",
                ..
            })
        ));
        assert!(matches!(
            parse("torrents torrents"),
            Err(CompileError::UnexpectedToken {
                expected: "end of input",
                ..
            })
        ));
    }
}
