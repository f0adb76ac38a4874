use std::collections::HashMap;
use std::str::Chars;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};

/// Name of the synthetic zero-parameter function a bare top-level
/// expression is wrapped in, so the driver can lower it like any other
/// definition.
pub const ANONYMOUS_FUNCTION_NAME: &str = "__anon_expr";

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("unknown token {0} when expecting an expression")]
    ExpectedExpression(Token),
    #[error("expected {expected:?} but found {found}")]
    Expected { expected: char, found: Token },
    #[error("expected ')' or ',' in argument list but found {0}")]
    BadArgumentList(Token),
    #[error("expected function name in prototype but found {0}")]
    BadPrototypeName(Token),
}

type ParseResult<T> = Result<T, ParserError>;

/// Recursive-descent parser with a one-token lookahead pulled straight
/// from the lexer. Binary expressions are parsed by precedence climbing
/// over the `precedence` table.
pub struct Parser<I: Iterator<Item = char>> {
    lexer: Lexer<I>,
    current: Token,
    precedence: HashMap<char, i32>,
}

impl<'src> Parser<Chars<'src>> {
    pub fn from_source(source: &'src str) -> Self {
        Parser::new(Lexer::from_source(source))
    }
}

impl<I: Iterator<Item = char>> Parser<I> {
    pub fn new(lexer: Lexer<I>) -> Self {
        let mut precedence = HashMap::new();
        precedence.insert('<', 10);
        precedence.insert('+', 20);
        precedence.insert('-', 20);
        precedence.insert('*', 40);

        let mut parser = Parser {
            lexer,
            current: Token::Eof,
            precedence,
        };
        // prime the lookahead
        parser.advance();
        parser
    }

    /// Registers `op` as a binary operator. A non-positive precedence
    /// unregisters it as far as expression parsing is concerned. Lowering
    /// keeps its own set of supported operators, so an operator can be
    /// parseable without being lowerable.
    pub fn set_precedence(&mut self, op: char, precedence: i32) {
        self.precedence.insert(op, precedence);
    }

    /// The token the parser is currently looking at.
    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Drops the current token and pulls the next one from the lexer.
    pub fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    /// The current token as a registered binary operator, if it is one.
    fn binop(&self) -> Option<(char, i32)> {
        match self.current {
            Token::Char(op) => match self.precedence.get(&op) {
                Some(&precedence) if precedence > 0 => Some((op, precedence)),
                _ => None,
            },
            _ => None,
        }
    }

    fn expect_char(&mut self, expected: char) -> ParseResult<()> {
        if self.current == Token::Char(expected) {
            self.advance();
            Ok(())
        } else {
            Err(ParserError::Expected {
                expected,
                found: self.current.clone(),
            })
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current.clone() {
            Token::Number(value) => {
                self.advance();
                Ok(Expression::Number(value))
            }
            Token::Ident(name) => self.parse_identifier(name),
            Token::Char('(') => self.parse_paren(),
            token => Err(ParserError::ExpectedExpression(token)),
        }
    }

    /// Parses a variable reference, or a call when the identifier is
    /// immediately followed by an argument list.
    fn parse_identifier(&mut self, name: String) -> ParseResult<Expression> {
        self.advance(); // eat the identifier

        if self.current != Token::Char('(') {
            return Ok(Expression::Variable(name));
        }
        self.advance(); // eat '('

        let mut args = Vec::new();
        if self.current != Token::Char(')') {
            loop {
                args.push(self.parse_expression()?);
                if self.current == Token::Char(')') {
                    break;
                }
                if self.current != Token::Char(',') {
                    return Err(ParserError::BadArgumentList(self.current.clone()));
                }
                self.advance(); // eat ','
            }
        }
        self.advance(); // eat ')'

        Ok(Expression::Call(name, args))
    }

    fn parse_paren(&mut self) -> ParseResult<Expression> {
        self.advance(); // eat '('
        let expression = self.parse_expression()?;
        self.expect_char(')')?;
        Ok(expression)
    }

    /// Folds a run of `op primary` pairs onto `lhs` as long as the
    /// operators bind at least as tightly as `min_precedence`. A tighter
    /// operator to the right takes the pending rhs as its own lhs first,
    /// which is what makes `a + b * c` come out as `a + (b * c)` while
    /// equal precedence stays left-associative.
    fn parse_binop_rhs(
        &mut self,
        min_precedence: i32,
        mut lhs: Expression,
    ) -> ParseResult<Expression> {
        loop {
            let (op, precedence) = match self.binop() {
                Some((op, precedence)) if precedence >= min_precedence => (op, precedence),
                _ => return Ok(lhs),
            };
            self.advance(); // eat the operator

            let mut rhs = self.parse_primary()?;

            if let Some((_, next_precedence)) = self.binop() {
                if precedence < next_precedence {
                    rhs = self.parse_binop_rhs(precedence + 1, rhs)?;
                }
            }

            lhs = Expression::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        let lhs = self.parse_primary()?;
        self.parse_binop_rhs(0, lhs)
    }

    fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let name = match self.current.clone() {
            Token::Ident(name) => name,
            token => return Err(ParserError::BadPrototypeName(token)),
        };
        self.advance(); // eat the function name

        self.expect_char('(')?;
        let mut params = Vec::new();
        while let Token::Ident(param) = self.current.clone() {
            params.push(param);
            self.advance();
        }
        self.expect_char(')')?;

        Ok(Prototype { name, params })
    }

    /// Parses `def prototype expression`, with the leading `def` still in
    /// the lookahead.
    pub fn parse_definition(&mut self) -> ParseResult<Function> {
        self.advance(); // eat 'def'
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    /// Parses `extern prototype`, with the leading `extern` still in the
    /// lookahead.
    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.advance(); // eat 'extern'
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self) -> ParseResult<Function> {
        let body = self.parse_expression()?;
        Ok(Function {
            prototype: Prototype {
                name: ANONYMOUS_FUNCTION_NAME.to_string(),
                params: Vec::new(),
            },
            body,
        })
    }

    /// Parses everything until end of input, stopping at the first error.
    /// Skip-and-resync recovery is the interactive driver's policy, not
    /// the parser's.
    pub fn parse_program(&mut self) -> ParseResult<Vec<ASTNode>> {
        let mut nodes = Vec::new();
        loop {
            match self.current {
                Token::Eof => return Ok(nodes),
                // stray semicolons separate top-level constructs
                Token::Char(';') => self.advance(),
                Token::Def => nodes.push(ASTNode::Function(self.parse_definition()?)),
                Token::Extern => nodes.push(ASTNode::Extern(self.parse_extern()?)),
                _ => nodes.push(ASTNode::Function(self.parse_top_level_expr()?)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_expr(source: &str) -> Expression {
        let mut parser = Parser::from_source(source);
        parser.parse_expression().unwrap()
    }

    fn binary(op: char, lhs: Expression, rhs: Expression) -> Expression {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn number(value: f64) -> Expression {
        Expression::Number(value)
    }

    fn variable(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    #[test]
    fn parse_expr_works() {
        let res = parse_expr("x + 1 * (2 - 3)");
        let target = binary(
            '+',
            variable("x"),
            binary('*', number(1.0), binary('-', number(2.0), number(3.0))),
        );
        assert_eq!(res, target);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(
            parse_expr("1 + 2 * 3"),
            binary('+', number(1.0), binary('*', number(2.0), number(3.0)))
        );
        assert_eq!(
            parse_expr("1 * 2 + 3"),
            binary('+', binary('*', number(1.0), number(2.0)), number(3.0))
        );
    }

    #[test]
    fn equal_precedence_is_left_associative() {
        assert_eq!(
            parse_expr("1 - 2 - 3"),
            binary('-', binary('-', number(1.0), number(2.0)), number(3.0))
        );
    }

    #[test]
    fn parens_override_precedence() {
        assert_eq!(
            parse_expr("(1 + 2) * 3"),
            binary('*', binary('+', number(1.0), number(2.0)), number(3.0))
        );
    }

    #[test]
    fn comparison_binds_loosest() {
        assert_eq!(
            parse_expr("a < b + 1"),
            binary('<', variable("a"), binary('+', variable("b"), number(1.0)))
        );
    }

    #[test]
    fn bare_identifier_is_a_variable() {
        assert_eq!(parse_expr("foo"), variable("foo"));
    }

    #[test]
    fn calls_parse_argument_lists() {
        assert_eq!(
            parse_expr("foo(1, bar(x), 2 + 3)"),
            Expression::Call(
                "foo".to_string(),
                vec![
                    number(1.0),
                    Expression::Call("bar".to_string(), vec![variable("x")]),
                    binary('+', number(2.0), number(3.0)),
                ]
            )
        );
        assert_eq!(parse_expr("foo()"), Expression::Call("foo".to_string(), vec![]));
    }

    #[test]
    fn parse_definition_works() {
        let mut parser = Parser::from_source("def add(x y) x + y");
        let res = parser.parse_definition().unwrap();
        let target = Function {
            prototype: Prototype {
                name: "add".to_string(),
                params: vec!["x".to_string(), "y".to_string()],
            },
            body: binary('+', variable("x"), variable("y")),
        };
        assert_eq!(res, target);
    }

    #[test]
    fn duplicate_parameters_are_accepted() {
        let mut parser = Parser::from_source("def join(x x) x");
        let res = parser.parse_definition().unwrap();
        assert_eq!(res.prototype.params, ["x", "x"]);
    }

    #[test]
    fn parse_extern_works() {
        let mut parser = Parser::from_source("extern sin(x)");
        let res = parser.parse_extern().unwrap();
        assert_eq!(
            res,
            Prototype {
                name: "sin".to_string(),
                params: vec!["x".to_string()],
            }
        );
    }

    #[test]
    fn top_level_expression_wraps_in_anonymous_function() {
        let mut parser = Parser::from_source("1 < 2");
        let res = parser.parse_top_level_expr().unwrap();
        let target = Function {
            prototype: Prototype {
                name: ANONYMOUS_FUNCTION_NAME.to_string(),
                params: vec![],
            },
            body: binary('<', number(1.0), number(2.0)),
        };
        assert_eq!(res, target);
    }

    #[test]
    fn parse_program_works() {
        let mut parser = Parser::from_source("extern sin(x); def thing(x) sin(x) * x;");
        let res = parser.parse_program().unwrap();
        let target = vec![
            ASTNode::Extern(Prototype {
                name: "sin".to_string(),
                params: vec!["x".to_string()],
            }),
            ASTNode::Function(Function {
                prototype: Prototype {
                    name: "thing".to_string(),
                    params: vec!["x".to_string()],
                },
                body: binary(
                    '*',
                    Expression::Call("sin".to_string(), vec![variable("x")]),
                    variable("x"),
                ),
            }),
        ];
        assert_eq!(res, target);
    }

    #[test]
    fn stray_semicolons_are_skipped() {
        let mut parser = Parser::from_source(";; 1 ;;");
        let res = parser.parse_program().unwrap();
        assert_eq!(res.len(), 1);
    }

    #[test]
    fn comments_are_invisible_to_the_parser() {
        let mut plain = Parser::from_source("def f(x) x + 1");
        let mut commented = Parser::from_source("def f(x) # adds one\n x + 1 # done");
        assert_eq!(
            plain.parse_program().unwrap(),
            commented.parse_program().unwrap()
        );
    }

    #[test]
    fn unknown_token_at_expression_start() {
        let mut parser = Parser::from_source("* 3");
        assert_eq!(
            parser.parse_expression(),
            Err(ParserError::ExpectedExpression(Token::Char('*')))
        );
    }

    #[test]
    fn unclosed_paren_reports_expected_char() {
        let mut parser = Parser::from_source("(1 + 2");
        assert_eq!(
            parser.parse_expression(),
            Err(ParserError::Expected {
                expected: ')',
                found: Token::Eof,
            })
        );
    }

    #[test]
    fn missing_argument_delimiter() {
        let mut parser = Parser::from_source("foo(1 2)");
        assert_eq!(
            parser.parse_expression(),
            Err(ParserError::BadArgumentList(Token::Number(2.0)))
        );
    }

    #[test]
    fn prototype_requires_a_name() {
        let mut parser = Parser::from_source("def (x) x");
        assert_eq!(
            parser.parse_definition(),
            Err(ParserError::BadPrototypeName(Token::Char('(')))
        );
    }

    #[test]
    fn prototype_requires_parens() {
        let mut parser = Parser::from_source("def f x");
        assert_eq!(
            parser.parse_definition(),
            Err(ParserError::Expected {
                expected: '(',
                found: Token::Ident("x".to_string()),
            })
        );
    }

    #[test]
    fn definition_requires_a_body() {
        let mut parser = Parser::from_source("def f(x)");
        assert_eq!(
            parser.parse_definition(),
            Err(ParserError::ExpectedExpression(Token::Eof))
        );
    }

    #[test]
    fn unregistered_operators_end_the_expression() {
        let mut parser = Parser::from_source("1 / 2");
        assert_eq!(parser.parse_expression(), Ok(number(1.0)));
        assert_eq!(parser.current(), &Token::Char('/'));
    }

    #[test]
    fn set_precedence_registers_new_operators() {
        let mut parser = Parser::from_source("1 / 2 + 3");
        parser.set_precedence('/', 40);
        assert_eq!(
            parser.parse_expression(),
            Ok(binary(
                '+',
                binary('/', number(1.0), number(2.0)),
                number(3.0)
            ))
        );
    }
}
