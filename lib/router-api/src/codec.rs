//! Parser for route definition documents
//!
//! A document is a `;`-separated list of definitions:
//!
//! ```text
//! hello: Path("/hello") && Method("GET") -> setPath("/") -> "https://hello.internal";
//! fallback: * -> status(404) -> <shunt>
//! ```
//!
//! Parsing is all-or-nothing: the first malformed definition fails the
//! whole document.

use crate::route::{Arg, Backend, Call, Route};
use crate::{CodecError, Result};

/// Parse a document containing any number of route definitions
pub fn parse_batch(doc: &str) -> Result<Vec<Route>> {
    let mut parser = Parser::new(doc);
    let mut routes = Vec::new();

    loop {
        parser.skip_trivia();
        if parser.at_end() {
            break;
        }

        if parser.eat(';') {
            continue;
        }

        routes.push(parser.route()?);

        parser.skip_trivia();
        if !parser.at_end() && !parser.eat(';') {
            return Err(parser.error("expected ';' between route definitions"));
        }
    }

    Ok(routes)
}

/// Parse a document that must contain exactly one route definition
pub fn parse_route(definition: &str) -> Result<Route> {
    let mut routes = parse_batch(definition)?;
    if routes.len() != 1 {
        return Err(CodecError::RouteCount(routes.len()));
    }
    Ok(routes.remove(0))
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, message: impl Into<String>) -> CodecError {
        CodecError::parse(self.pos, message)
    }

    /// Skip whitespace and `//` comments
    fn skip_trivia(&mut self) {
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.src.len() - trimmed.len();

            if trimmed.starts_with("//") {
                match trimmed.find('\n') {
                    Some(nl) => self.pos += nl + 1,
                    None => self.pos = self.src.len(),
                }
            } else {
                return;
            }
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        self.skip_trivia();
        if self.eat_str(s) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", s)))
        }
    }

    fn route(&mut self) -> Result<Route> {
        let id = self.identifier(true)?;
        self.expect(":")?;

        let predicates = self.predicates()?;
        self.expect("->")?;

        // Filters and the backend share the `->` chain; a call is a filter,
        // anything else must be the backend.
        let mut filters = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some('"') | Some('<') => break,
                _ => {
                    filters.push(self.call()?);
                    self.expect("->")?;
                }
            }
        }

        let backend = self.backend()?;

        Ok(Route {
            id,
            predicates,
            filters,
            backend,
        })
    }

    fn predicates(&mut self) -> Result<Vec<Call>> {
        self.skip_trivia();
        if self.eat('*') {
            return Ok(Vec::new());
        }

        let mut predicates = vec![self.call()?];
        loop {
            self.skip_trivia();
            if !self.eat_str("&&") {
                return Ok(predicates);
            }
            predicates.push(self.call()?);
        }
    }

    fn call(&mut self) -> Result<Call> {
        let name = self.identifier(false)?;
        self.expect("(")?;

        let mut args = Vec::new();
        self.skip_trivia();
        if self.eat(')') {
            return Ok(Call { name, args });
        }

        loop {
            args.push(self.arg()?);
            self.skip_trivia();
            if self.eat(')') {
                return Ok(Call { name, args });
            }
            if !self.eat(',') {
                return Err(self.error("expected ',' or ')' in argument list"));
            }
        }
    }

    fn arg(&mut self) -> Result<Arg> {
        self.skip_trivia();
        match self.peek() {
            Some('"') => Ok(Arg::String(self.string()?)),
            Some(c) if c == '-' || c.is_ascii_digit() => Ok(Arg::Number(self.number()?)),
            _ => Err(self.error("expected string or number argument")),
        }
    }

    fn backend(&mut self) -> Result<Backend> {
        self.skip_trivia();
        if self.eat_str("<shunt>") {
            return Ok(Backend::Shunt);
        }
        if self.peek() == Some('"') {
            return Ok(Backend::Network(self.string()?));
        }
        Err(self.error("expected backend address or <shunt>"))
    }

    /// Route ids may contain `-`, names of predicates and filters may not
    fn identifier(&mut self, allow_dash: bool) -> Result<String> {
        self.skip_trivia();
        let start = self.pos;

        let first = self.peek();
        if !matches!(first, Some(c) if c.is_ascii_alphabetic() || c == '_' || (allow_dash && c.is_ascii_digit())) {
            return Err(self.error("expected identifier"));
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_dash && c == '-') {
                self.pos += 1;
            } else {
                break;
            }
        }

        Ok(self.src[start..self.pos].to_string())
    }

    fn string(&mut self) -> Result<String> {
        let start = self.pos;
        if !self.eat('"') {
            return Err(self.error("expected '\"'"));
        }

        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped @ ('"' | '\\'))) => out.push(escaped),
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((j, other)) => {
                        return Err(CodecError::parse(
                            self.pos + j,
                            format!("invalid escape sequence '\\{}'", other),
                        ))
                    }
                    None => break,
                },
                c => out.push(c),
            }
        }

        Err(CodecError::parse(start, "unterminated string"))
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        self.eat('-');
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                self.pos += 1;
            } else {
                break;
            }
        }

        self.src[start..self.pos]
            .parse::<f64>()
            .map_err(|_| CodecError::parse(start, "invalid number"))
    }
}
