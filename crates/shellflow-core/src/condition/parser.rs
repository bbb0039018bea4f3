//! Lexer and recursive-descent parser for condition expressions.
//!
//! Precedence, lowest first: `||`, `&&`, equality, relational, unary,
//! postfix (`.prop`, `.method(args)`, `[index]`), primary. There is no
//! division operator, so a `/` always starts a regex literal.

use super::ConditionError;

/// Nesting limit for parentheses, unary chains and call arguments.
const MAX_DEPTH: usize = 64;

/// Limit on operator, member, call and index nodes in one expression.
/// Operator chains nest to the left, so this also bounds tree height.
const MAX_NODES: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Regex { pattern: String, flags: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    LooseEq,
    LooseNotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Regex { pattern: String, flags: String },
    OrOr,
    AndAnd,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    Bang,
    Minus,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

/// Parse an expression into its syntax tree.
pub fn parse(input: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ConditionError::Parse("empty expression".into()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        nodes: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ConditionError::Parse(format!("unexpected token {:?}", tok))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' | '`' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars, ch)?));
            }
            '/' => {
                chars.next();
                tokens.push(read_regex(&mut chars)?);
            }
            '0'..='9' => tokens.push(Token::Num(read_number(&mut chars)?)),
            '.' => {
                chars.next();
                // `.5` is a number, `.length` is member access
                if chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                    let mut text = String::from("0.");
                    while let Some(d) = chars.next_if(|c| c.is_ascii_digit()) {
                        text.push(d);
                    }
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| ConditionError::Parse(format!("invalid number '{}'", text)))?;
                    tokens.push(Token::Num(value));
                } else {
                    tokens.push(Token::Dot);
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '|' => {
                chars.next();
                expect_char(&mut chars, '|')?;
                tokens.push(Token::OrOr);
            }
            '&' => {
                chars.next();
                expect_char(&mut chars, '&')?;
                tokens.push(Token::AndAnd);
            }
            '=' => {
                chars.next();
                expect_char(&mut chars, '=')?;
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::EqEqEq);
                } else {
                    tokens.push(Token::EqEq);
                }
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    if chars.next_if_eq(&'=').is_some() {
                        tokens.push(Token::NotEqEq);
                    } else {
                        tokens.push(Token::NotEq);
                    }
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            other => {
                return Err(ConditionError::Parse(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn expect_char(chars: &mut Chars<'_>, expected: char) -> Result<(), ConditionError> {
    match chars.next() {
        Some(c) if c == expected => Ok(()),
        _ => Err(ConditionError::Parse(format!("expected '{}'", expected))),
    }
}

fn read_string(chars: &mut Chars<'_>, quote: char) -> Result<String, ConditionError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(ConditionError::Parse("unterminated string".into())),
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(c) => out.push(c),
                None => return Err(ConditionError::Parse("unterminated string".into())),
            },
            Some(c) => out.push(c),
        }
    }
}

fn read_regex(chars: &mut Chars<'_>) -> Result<Token, ConditionError> {
    let mut pattern = String::new();
    let mut in_class = false;
    loop {
        match chars.next() {
            None | Some('\n') => return Err(ConditionError::Parse("unterminated regex".into())),
            Some('\\') => {
                pattern.push('\\');
                match chars.next() {
                    Some(c) => pattern.push(c),
                    None => return Err(ConditionError::Parse("unterminated regex".into())),
                }
            }
            Some('[') => {
                in_class = true;
                pattern.push('[');
            }
            Some(']') => {
                in_class = false;
                pattern.push(']');
            }
            Some('/') if !in_class => break,
            Some(c) => pattern.push(c),
        }
    }
    let mut flags = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphabetic() {
            flags.push(c);
            chars.next();
        } else {
            break;
        }
    }
    Ok(Token::Regex { pattern, flags })
}

fn read_number(chars: &mut Chars<'_>) -> Result<f64, ConditionError> {
    let mut text = String::new();
    let mut seen_dot = false;
    let mut seen_exp = false;
    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' => text.push(c),
            '.' if !seen_dot && !seen_exp => {
                seen_dot = true;
                text.push(c);
            }
            'e' | 'E' if !seen_exp && !text.is_empty() => {
                seen_exp = true;
                text.push(c);
                chars.next();
                if let Some(sign) = chars.next_if(|c| *c == '+' || *c == '-') {
                    text.push(sign);
                }
                continue;
            }
            _ => break,
        }
        chars.next();
    }
    text.parse::<f64>()
        .map_err(|_| ConditionError::Parse(format!("invalid number '{}'", text)))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    nodes: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(ConditionError::Parse(format!(
                "expected {:?}, found {:?}",
                expected,
                self.peek()
            )))
        }
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ConditionError::Parse("expression nested too deeply".into()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn node(&mut self) -> Result<(), ConditionError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(ConditionError::Parse("expression too long".into()));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            self.node()?;
            let right = self.parse_and()?;
            left = Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            self.node()?;
            let right = self.parse_equality()?;
            left = Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::LooseEq,
                Some(Token::NotEq) => BinaryOp::LooseNotEq,
                Some(Token::EqEqEq) => BinaryOp::StrictEq,
                Some(Token::NotEqEq) => BinaryOp::StrictNotEq,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.node()?;
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            self.node()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        self.node()?;
        self.enter()?;
        let expr = self.parse_unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr?),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ConditionError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                self.node()?;
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    other => {
                        return Err(ConditionError::Parse(format!(
                            "expected property name, found {:?}",
                            other
                        )))
                    }
                };
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    expr = Expr::Call {
                        object: Box::new(expr),
                        method: name,
                        args,
                    };
                } else {
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: name,
                    };
                }
            } else if self.eat(&Token::LBracket) {
                self.node()?;
                self.enter()?;
                let index = self.parse_or();
                self.leave();
                self.expect(Token::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index?),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ConditionError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        self.enter()?;
        let result = loop {
            match self.parse_or() {
                Ok(arg) => args.push(arg),
                Err(e) => break Err(e),
            }
            if self.eat(&Token::Comma) {
                continue;
            }
            break self.expect(Token::RParen);
        };
        self.leave();
        result.map(|_| args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Literal(Literal::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::Regex { pattern, flags }) => {
                Ok(Expr::Literal(Literal::Regex { pattern, flags }))
            }
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                "null" | "undefined" => Expr::Literal(Literal::Null),
                _ => Expr::Ident(name),
            }),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or();
                self.leave();
                let inner = inner?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(ConditionError::Parse(format!(
                "unexpected {}",
                other
                    .map(|t| format!("{:?}", t))
                    .unwrap_or_else(|| "end of expression".into())
            ))),
        }
    }
}
