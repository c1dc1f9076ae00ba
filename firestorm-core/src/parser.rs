use crate::ast::{
    Attribute, BinaryOp, Call, CompareOp, Expr, Function, Global, GlobalVariable, Item,
    NamedDatatype, Offset, Stmt, UnaryOp,
};
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind, lex, unescape};
use crate::span::{Location, Span};
use crate::types::{BaseType, Datatype};

/// Lex and parse a flattened source text into its [`Global`] root.
pub fn parse(source: &str) -> Result<Global, CoreError> {
    let tokens = lex(source)?;
    Parser::new(source, &tokens).global()
}

/// Binary operator levels, loosest first.
const BINARY_LEVELS: &[&[TokenKind]] = &[
    &[TokenKind::Pipe],
    &[TokenKind::Caret],
    &[TokenKind::Amp],
    &[TokenKind::EqualEqual, TokenKind::NotEqual],
    &[
        TokenKind::Less,
        TokenKind::LessEqual,
        TokenKind::Greater,
        TokenKind::GreaterEqual,
    ],
    &[TokenKind::ShiftLeft, TokenKind::ShiftRight],
    &[TokenKind::Plus, TokenKind::Minus],
    &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
];

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        Parser {
            source,
            tokens,
            position: 0,
        }
    }

    fn global(&mut self) -> Result<Global, CoreError> {
        let mut items = Vec::new();
        loop {
            let item = match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Function => Item::Function(self.function()?),
                TokenKind::Offset => Item::Offset(self.offset()?),
                TokenKind::Ident if self.at_datatype() => {
                    let var = self.named_datatype()?;
                    let init = if self.eat(TokenKind::Assign) {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    self.expect(TokenKind::Semi)?;
                    Item::Variable(GlobalVariable { var, init })
                }
                _ => return Err(self.unexpected("a declaration")),
            };
            items.push(item);
        }
        Ok(Global { items })
    }

    fn function(&mut self) -> Result<Function, CoreError> {
        self.expect(TokenKind::Function)?;
        let attributes = self.attributes()?;
        let name = self.ident()?;

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                params.push(self.named_datatype()?);
                if self.eat(TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }

        self.expect(TokenKind::Arrow)?;
        let return_type = self.datatype()?;

        let mut function = Function {
            name,
            params,
            return_type,
            body: Vec::new(),
            attributes,
            assembly: None,
        };

        if function.has_attribute(Attribute::Assembly) {
            self.expect(TokenKind::LBrace)?;
            let text = self.string_literal()?;
            self.expect(TokenKind::RBrace)?;
            function.assembly = Some(String::from_utf8_lossy(&text).into_owned());
        } else if function.has_attribute(Attribute::External) && self.eat(TokenKind::Semi) {
            // signature only
        } else {
            function.body = self.block()?;
        }
        Ok(function)
    }

    fn attributes(&mut self) -> Result<Vec<Attribute>, CoreError> {
        let mut attributes = Vec::new();
        if !self.eat(TokenKind::LParen) {
            return Ok(attributes);
        }
        loop {
            let token = self.peek();
            let attribute = (token.kind == TokenKind::Ident)
                .then(|| Attribute::from_name(self.text(token.span)))
                .flatten()
                .ok_or_else(|| self.unexpected("a function attribute"))?;
            self.advance();
            if !attributes.contains(&attribute) {
                attributes.push(attribute);
            }
            if self.eat(TokenKind::RParen) {
                return Ok(attributes);
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    fn offset(&mut self) -> Result<Offset, CoreError> {
        self.expect(TokenKind::Offset)?;
        let name = self.ident()?;
        self.expect(TokenKind::LBrace)?;
        let mut entries = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            entries.push(self.named_datatype()?);
            self.expect(TokenKind::Semi)?;
        }
        Ok(Offset { name, entries })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, CoreError> {
        self.expect(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, CoreError> {
        match self.peek().kind {
            TokenKind::Return => {
                self.advance();
                let value = if self.peek().kind == TokenKind::Semi {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return(value))
            }
            TokenKind::If => self.if_statement(),
            TokenKind::While => {
                self.advance();
                let cond = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            TokenKind::Do => {
                self.advance();
                let body = self.block()?;
                self.expect(TokenKind::While)?;
                let cond = self.expression()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::DoWhile { body, cond })
            }
            TokenKind::Loop => {
                self.advance();
                Ok(Stmt::Loop {
                    body: self.block()?,
                })
            }
            TokenKind::End => {
                self.advance();
                Ok(Stmt::End {
                    body: self.block()?,
                })
            }
            TokenKind::Ident if self.at_datatype() => {
                let var = self.named_datatype()?;
                let init = if self.eat(TokenKind::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Declare { var, init })
            }
            TokenKind::Ident => self.identifier_statement(),
            _ => Err(self.unexpected("a statement")),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, CoreError> {
        self.expect(TokenKind::If)?;
        let cond = self.expression()?;
        let then_body = self.block()?;
        let else_body = if self.eat(TokenKind::Else) {
            if self.peek().kind == TokenKind::If {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    /// Statements starting with a plain identifier: assignments,
    /// increments and calls.
    fn identifier_statement(&mut self) -> Result<Stmt, CoreError> {
        let name = self.ident()?;
        let stmt = match self.peek().kind {
            TokenKind::Assign => {
                self.advance();
                Stmt::Assign {
                    name,
                    value: self.expression()?,
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.expression()?;
                self.expect(TokenKind::RBracket)?;
                self.expect(TokenKind::Assign)?;
                Stmt::AssignIndexed {
                    name,
                    index,
                    value: self.expression()?,
                }
            }
            TokenKind::Increment => {
                self.advance();
                Stmt::Increment(name)
            }
            TokenKind::Decrement => {
                self.advance();
                Stmt::Decrease(name)
            }
            TokenKind::LParen => Stmt::Call(self.call_arguments(name)?),
            _ => return Err(self.unexpected("'=', '[', '++', '--' or '('")),
        };
        self.expect(TokenKind::Semi)?;
        Ok(stmt)
    }

    fn expression(&mut self) -> Result<Expr, CoreError> {
        self.binary(0)
    }

    fn binary(&mut self, level: usize) -> Result<Expr, CoreError> {
        let Some(operators) = BINARY_LEVELS.get(level) else {
            return self.unary();
        };
        let mut lhs = self.binary(level + 1)?;
        while operators.contains(&self.peek().kind) {
            let kind = self.advance().kind;
            let rhs = self.binary(level + 1)?;
            lhs = combine(kind, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CoreError> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            _ => return self.primary(),
        };
        self.advance();
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.unary()?),
        })
    }

    fn primary(&mut self) -> Result<Expr, CoreError> {
        let token = self.peek();
        match token.kind {
            TokenKind::IntLiteral => {
                self.advance();
                self.number(token)
            }
            TokenKind::CharLiteral => {
                self.advance();
                match unescape(self.text(token.span)).as_deref() {
                    Ok([byte]) => Ok(Expr::Number(i64::from(*byte))),
                    _ => Err(self.error_at(token.span, "character literal must be one byte")),
                }
            }
            TokenKind::StringLiteral => Ok(Expr::Str(self.string_literal()?)),
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident => {
                let name = self.ident()?;
                match self.peek().kind {
                    TokenKind::LParen => Ok(Expr::Call(self.call_arguments(name)?)),
                    TokenKind::LBracket => {
                        self.advance();
                        let index = self.expression()?;
                        self.expect(TokenKind::RBracket)?;
                        Ok(Expr::LookupIndexed {
                            name,
                            index: Box::new(index),
                        })
                    }
                    _ => Ok(Expr::Lookup(name)),
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn call_arguments(&mut self, name: String) -> Result<Call, CoreError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(TokenKind::RParen) {
                    break;
                }
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(Call { name, args })
    }

    fn number(&self, token: Token) -> Result<Expr, CoreError> {
        let text = self.text(token.span).replace('_', "");
        let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).map(|v| v as i64).ok(),
            None => text.parse::<i64>().ok(),
        };
        value
            .map(Expr::Number)
            .ok_or_else(|| self.error_at(token.span, format!("invalid integer literal '{text}'")))
    }

    fn string_literal(&mut self) -> Result<Vec<u8>, CoreError> {
        let token = self.expect(TokenKind::StringLiteral)?;
        unescape(self.text(token.span))
            .map_err(|c| self.error_at(token.span, format!("unknown escape '\\{c}'")))
    }

    fn at_datatype(&self) -> bool {
        let token = self.peek();
        token.kind == TokenKind::Ident && BaseType::from_name(self.text(token.span)).is_some()
    }

    fn datatype(&mut self) -> Result<Datatype, CoreError> {
        let token = self.peek();
        let base = (token.kind == TokenKind::Ident)
            .then(|| BaseType::from_name(self.text(token.span)))
            .flatten()
            .ok_or_else(|| self.unexpected("a datatype"))?;
        self.advance();
        if self.eat(TokenKind::LBracket) {
            self.expect(TokenKind::RBracket)?;
            Ok(Datatype::array(base))
        } else {
            Ok(Datatype::scalar(base))
        }
    }

    fn named_datatype(&mut self) -> Result<NamedDatatype, CoreError> {
        let datatype = self.datatype()?;
        let name = self.ident()?;
        Ok(NamedDatatype { name, datatype })
    }

    fn ident(&mut self) -> Result<String, CoreError> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(self.text(token.span).to_string())
    }

    fn peek(&self) -> Token {
        // The token stream always ends with Eof, and we never advance past it.
        self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, CoreError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{}'", kind.debug_name())))
        }
    }

    fn text(&self, span: Span) -> &'a str {
        &self.source[span.start as usize..span.end as usize]
    }

    fn unexpected(&self, expected: &str) -> CoreError {
        let token = self.peek();
        let found = match token.kind {
            TokenKind::Ident | TokenKind::IntLiteral => {
                format!("{} '{}'", token.kind.debug_name(), self.text(token.span))
            }
            kind => format!("'{}'", kind.debug_name()),
        };
        self.error_at(token.span, format!("expected {expected} but found {found}"))
    }

    fn error_at(&self, span: Span, message: impl Into<String>) -> CoreError {
        CoreError::Syntax {
            location: Location::from_offset(self.source, span.start),
            message: message.into(),
        }
    }
}

fn combine(kind: TokenKind, lhs: Expr, rhs: Expr) -> Expr {
    let compare = match kind {
        TokenKind::EqualEqual => Some(CompareOp::Equal),
        TokenKind::NotEqual => Some(CompareOp::NotEqual),
        TokenKind::Less => Some(CompareOp::Less),
        TokenKind::LessEqual => Some(CompareOp::LessEqual),
        TokenKind::Greater => Some(CompareOp::Greater),
        TokenKind::GreaterEqual => Some(CompareOp::GreaterEqual),
        _ => None,
    };
    if let Some(op) = compare {
        return Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }
    let op = match kind {
        TokenKind::Pipe => BinaryOp::Or,
        TokenKind::Caret => BinaryOp::Xor,
        TokenKind::Amp => BinaryOp::And,
        TokenKind::ShiftLeft => BinaryOp::Shl,
        TokenKind::ShiftRight => BinaryOp::Shr,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        _ => BinaryOp::Mod,
    };
    Expr::binary(op, lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn parse_expr(text: &str) -> Expr {
        let source = format!("int x = {text};");
        let global = parse(&source).expect("parse");
        match global.items.into_iter().next() {
            Some(Item::Variable(GlobalVariable { init: Some(expr), .. })) => expr,
            other => panic!("unexpected item {other:?}"),
        }
    }

    fn single_function(source: &str) -> Function {
        let global = parse(source).expect("parse");
        match global.items.into_iter().next() {
            Some(Item::Function(function)) => function,
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        assert_eq!(
            parse_expr("1 + 2 * 3"),
            Expr::binary(
                BinaryOp::Add,
                Expr::Number(1),
                Expr::binary(BinaryOp::Mul, Expr::Number(2), Expr::Number(3)),
            )
        );
    }

    #[test]
    fn binary_operators_are_left_associative() {
        assert_eq!(
            parse_expr("8 - 4 - 2"),
            Expr::binary(
                BinaryOp::Sub,
                Expr::binary(BinaryOp::Sub, Expr::Number(8), Expr::Number(4)),
                Expr::Number(2),
            )
        );
    }

    #[test]
    fn shift_binds_tighter_than_comparison_and_bitwise_loosest() {
        let expr = parse_expr("1 << 2 < 8 | 1");
        let Expr::Binary { op: BinaryOp::Or, lhs, .. } = expr else {
            panic!("expected | at the root");
        };
        let Expr::Compare { op: CompareOp::Less, lhs: shift, .. } = *lhs else {
            panic!("expected < under |");
        };
        assert!(matches!(*shift, Expr::Binary { op: BinaryOp::Shl, .. }));
    }

    #[test]
    fn parses_unary_and_literals() {
        assert_eq!(
            parse_expr("-'a'"),
            Expr::Unary {
                op: UnaryOp::Minus,
                operand: Box::new(Expr::Number(97)),
            }
        );
        assert_eq!(parse_expr("0x10"), Expr::Number(16));
        assert_eq!(parse_expr("\"a\\n\""), Expr::Str(b"a\n".to_vec()));
    }

    #[test]
    fn parses_globals_offsets_and_functions_in_order() {
        let global = parse(
            "int counter;\n\
             offset Header { int32 magic; chr[] data; }\n\
             function (external) puts(str s) -> int;\n\
             function main() -> int { return 0; }",
        )
        .expect("parse");
        assert_eq!(global.items.len(), 4);
        assert!(matches!(global.items[0], Item::Variable(_)));
        let Item::Offset(offset) = &global.items[1] else {
            panic!("expected offset");
        };
        assert_eq!(offset.name, "Header");
        assert_eq!(offset.entries[1].datatype, Datatype::array(BaseType::Chr));
        let Item::Function(puts) = &global.items[2] else {
            panic!("expected function");
        };
        assert_eq!(puts.attributes, vec![Attribute::External]);
        assert!(puts.body.is_empty());
    }

    #[test]
    fn parses_statements() {
        let function = single_function(
            "function f(int[] xs, int n) -> void {
                int i = 0;
                while i < n { xs[i] = i; i++; }
                do { n--; } while n > 0;
                if n == 0 { g(n); } else if n == 1 { return; } else { loop { return; } }
                end { g(1); }
            }",
        );
        assert_eq!(function.params.len(), 2);
        assert!(matches!(function.body[0], Stmt::Declare { .. }));
        let Stmt::While { body, .. } = &function.body[1] else {
            panic!("expected while");
        };
        assert!(matches!(body[0], Stmt::AssignIndexed { .. }));
        assert_eq!(body[1], Stmt::Increment("i".to_string()));
        assert!(matches!(function.body[2], Stmt::DoWhile { .. }));
        let Stmt::If { else_body, .. } = &function.body[3] else {
            panic!("expected if");
        };
        assert!(matches!(else_body[0], Stmt::If { .. }));
        assert!(matches!(function.body[4], Stmt::End { .. }));
    }

    #[test]
    fn parses_assembly_body_as_text() {
        let function = single_function("function (assembly, noreturn) halt() -> void { \"hlt\" }");
        assert_eq!(function.assembly.as_deref(), Some("hlt"));
        assert_eq!(
            function.attributes,
            vec![Attribute::Assembly, Attribute::NoReturn]
        );
    }

    #[test]
    fn reports_expected_token_with_location() {
        let err = parse("function main() -> int {\n  return 0\n}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        let message = err.to_string();
        assert!(message.contains("expected ';'"), "{message}");
        assert!(message.contains("3:1"), "{message}");
    }

    #[test]
    fn rejects_unknown_attribute() {
        let err = parse("function (inline) f() -> void {}").unwrap_err();
        assert!(err.to_string().contains("function attribute"));
    }

    #[test]
    fn rejects_expression_statements_that_are_not_calls() {
        assert!(parse("function f() -> void { x; }").is_err());
    }
}
