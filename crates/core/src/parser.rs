//! Expression parser.
//!
//! A recursive-descent parser that scans characters directly rather than
//! tokenizing first: import locators make lexing context-sensitive (`./x`
//! is a path, `a ? b` is an operator, `?q=1` is a URL query), so each
//! precedence level reads exactly what it needs and backtracks with
//! save/restore where the grammar is ambiguous on its first character.
//!
//! Grammar, loosest to tightest: lambda/forall/let, `→`, `:` annotation,
//! `||`, `&&`, `==`, `?`, application, `.` selection, atoms.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{Const, Expr, Var};
use crate::import::{
    Directory, File, FilePrefix, Import, ImportMode, ImportTarget, Scheme, Url,
};

/// A parse failure, carrying the source name handed to [`parse_expression`]
/// (a file path, URL, or `env:NAME`) for error framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    pub name: String,
    pub line: u32,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.name, self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

const RESERVED: &[&str] = &[
    "let", "in", "as", "using", "missing", "forall", "Type", "Kind", "Bool", "True", "False",
    "Integer", "Text", "List",
];

/// Parse a complete expression: leading whitespace is skipped and the whole
/// input must be consumed.
pub fn parse_expression(name: &str, input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(name, input);
    parser.skip_whitespace();
    let expr = parser.parse_expr()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.err("unexpected input after the expression"));
    }
    Ok(expr)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    name: String,
}

impl Parser {
    fn new(name: &str, input: &str) -> Parser {
        Parser {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            name: name.to_string(),
        }
    }

    // ── Low-level scanning ───────────────────────────────────────────

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn save(&self) -> (usize, u32) {
        (self.pos, self.line)
    }

    fn restore(&mut self, state: (usize, u32)) {
        self.pos = state.0;
        self.line = state.1;
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    /// `s` followed by a non-identifier character (word boundary).
    fn starts_with_word(&self, s: &str) -> bool {
        self.starts_with(s)
            && !self
                .peek_at(s.chars().count())
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            for _ in s.chars() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.peek_at(1) == Some('-') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            name: self.name.clone(),
            line: self.line,
            message: message.into(),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.peek() == Some(c) {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!(
                "expected '{}', got {}",
                c,
                describe(self.peek())
            )))
        }
    }

    fn expect_arrow(&mut self) -> Result<(), ParseError> {
        if self.eat_str("→") || self.eat_str("->") {
            Ok(())
        } else {
            Err(self.err(format!("expected '→', got {}", describe(self.peek()))))
        }
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            other => {
                return Err(self.err(format!("expected an identifier, got {}", describe(other))))
            }
        }
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(word)
    }

    /// An identifier that may be bound or selected: reserved words refused.
    fn label(&mut self) -> Result<String, ParseError> {
        let word = self.ident()?;
        if RESERVED.contains(&word.as_str()) {
            return Err(self.err(format!("'{}' is a reserved word", word)));
        }
        Ok(word)
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        let word = self.ident()?;
        if word == keyword {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got '{}'", keyword, word)))
        }
    }

    // ── Expression grammar ───────────────────────────────────────────

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('λ') | Some('\\') => {
                self.bump();
                let (x, a) = self.parse_binder()?;
                let b = self.parse_expr()?;
                return Ok(Expr::Lam(x, Box::new(a), Box::new(b)));
            }
            Some('∀') => {
                self.bump();
                let (x, a) = self.parse_binder()?;
                let b = self.parse_expr()?;
                return Ok(Expr::Pi(x, Box::new(a), Box::new(b)));
            }
            _ => {}
        }
        if self.starts_with_word("forall") {
            self.expect_keyword("forall")?;
            let (x, a) = self.parse_binder()?;
            let b = self.parse_expr()?;
            return Ok(Expr::Pi(x, Box::new(a), Box::new(b)));
        }
        if self.starts_with_word("let") {
            return self.parse_let();
        }

        let left = self.parse_or()?;
        let state = self.save();
        self.skip_whitespace();
        if self.eat_str("→") || self.eat_str("->") {
            let right = self.parse_expr()?;
            return Ok(Expr::Pi("_".to_string(), Box::new(left), Box::new(right)));
        }
        if self.peek() == Some(':') && self.peek_at(1).is_some_and(char::is_whitespace) {
            self.bump();
            let annotation = self.parse_expr()?;
            return Ok(Expr::Annot(Box::new(left), Box::new(annotation)));
        }
        self.restore(state);
        Ok(left)
    }

    /// `( x : A )` followed by `→`, shared by `λ` and `∀`.
    fn parse_binder(&mut self) -> Result<(String, Expr), ParseError> {
        self.skip_whitespace();
        self.expect('(')?;
        self.skip_whitespace();
        let x = self.label()?;
        self.skip_whitespace();
        self.expect(':')?;
        let a = self.parse_expr()?;
        self.skip_whitespace();
        self.expect(')')?;
        self.skip_whitespace();
        self.expect_arrow()?;
        Ok((x, a))
    }

    fn parse_let(&mut self) -> Result<Expr, ParseError> {
        self.expect_keyword("let")?;
        self.skip_whitespace();
        let x = self.label()?;
        self.skip_whitespace();
        let annotation = if self.peek() == Some(':') {
            self.bump();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.skip_whitespace();
        self.expect('=')?;
        let value = self.parse_expr()?;
        self.skip_whitespace();
        self.expect_keyword("in")?;
        let body = self.parse_expr()?;
        Ok(Expr::Let(x, annotation, Box::new(value), Box::new(body)))
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        loop {
            let state = self.save();
            self.skip_whitespace();
            if self.eat_str("||") {
                let right = self.parse_and()?;
                left = Expr::BoolOr(Box::new(left), Box::new(right));
            } else {
                self.restore(state);
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_eq()?;
        loop {
            let state = self.save();
            self.skip_whitespace();
            if self.eat_str("&&") {
                let right = self.parse_eq()?;
                left = Expr::BoolAnd(Box::new(left), Box::new(right));
            } else {
                self.restore(state);
                return Ok(left);
            }
        }
    }

    fn parse_eq(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_alt()?;
        loop {
            let state = self.save();
            self.skip_whitespace();
            if self.eat_str("==") {
                let right = self.parse_alt()?;
                left = Expr::BoolEq(Box::new(left), Box::new(right));
            } else {
                self.restore(state);
                return Ok(left);
            }
        }
    }

    fn parse_alt(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_app()?;
        loop {
            let state = self.save();
            self.skip_whitespace();
            if self.peek() == Some('?') {
                self.bump();
                let right = self.parse_app()?;
                left = Expr::ImportAlt(Box::new(left), Box::new(right));
            } else {
                self.restore(state);
                return Ok(left);
            }
        }
    }

    fn parse_app(&mut self) -> Result<Expr, ParseError> {
        let mut function = self.parse_selector()?;
        loop {
            let state = self.save();
            self.skip_whitespace();
            if self.argument_follows() {
                let argument = self.parse_selector()?;
                function = Expr::App(Box::new(function), Box::new(argument));
            } else {
                self.restore(state);
                return Ok(function);
            }
        }
    }

    /// Does the upcoming input start an application argument? Keywords that
    /// close an enclosing form (`in`, `as`, `using`) do not.
    fn argument_follows(&self) -> bool {
        match self.peek() {
            None => false,
            Some('(') | Some('[') | Some('{') | Some('"') | Some('/') => true,
            Some('~') => self.peek_at(1) == Some('/'),
            Some('.') => {
                self.peek_at(1) == Some('/')
                    || (self.peek_at(1) == Some('.') && self.peek_at(2) == Some('/'))
            }
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => self.peek_at(1).is_some_and(|c| c.is_ascii_digit()),
            Some(c) if c.is_alphabetic() || c == '_' => {
                !(self.starts_with_word("in")
                    || self.starts_with_word("as")
                    || self.starts_with_word("using"))
            }
            _ => false,
        }
    }

    fn parse_selector(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let state = self.save();
            self.skip_whitespace();
            if self.peek() == Some('.')
                && self
                    .peek_at(1)
                    .is_some_and(|c| c.is_alphabetic() || c == '_')
            {
                self.bump();
                let field = self.label()?;
                expr = Expr::Field(Box::new(expr), field);
            } else {
                self.restore(state);
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();
        if self.at_import_start() {
            return self.parse_import_expr();
        }
        match self.peek() {
            None => Err(self.err("unexpected end of input")),
            Some('(') => {
                self.bump();
                let expr = self.parse_expr()?;
                self.skip_whitespace();
                self.expect(')')?;
                Ok(expr)
            }
            Some('"') => self.parse_text_literal(),
            Some('[') => self.parse_list_literal(),
            Some('{') => self.parse_record(),
            Some(c) if c.is_ascii_digit() => self.parse_integer_literal(),
            Some('+') | Some('-') if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.parse_integer_literal()
            }
            Some('λ') | Some('\\') | Some('∀') => {
                Err(self.err("a function in this position must be parenthesized"))
            }
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_word(),
            Some(c) => Err(self.err(format!("unexpected character '{}'", c))),
        }
    }

    fn parse_word(&mut self) -> Result<Expr, ParseError> {
        let word = self.ident()?;
        match word.as_str() {
            "Type" => Ok(Expr::Const(Const::Type)),
            "Kind" => Ok(Expr::Const(Const::Kind)),
            "Bool" => Ok(Expr::Bool),
            "True" => Ok(Expr::BoolLit(true)),
            "False" => Ok(Expr::BoolLit(false)),
            "Integer" => Ok(Expr::Integer),
            "Text" => Ok(Expr::Text),
            "List" => Ok(Expr::List),
            "forall" | "let" | "in" | "as" | "using" | "missing" => {
                Err(self.err(format!("unexpected keyword '{}'", word)))
            }
            _ => {
                let mut index = 0;
                if self.peek() == Some('@') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                {
                    self.bump();
                    let mut digits = String::new();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_digit() {
                            digits.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    index = digits
                        .parse()
                        .map_err(|_| self.err("variable index out of range"))?;
                }
                Ok(Expr::Var(Var::new(word, index)))
            }
        }
    }

    fn parse_integer_literal(&mut self) -> Result<Expr, ParseError> {
        let mut digits = String::new();
        match self.peek() {
            Some('-') => {
                digits.push('-');
                self.bump();
            }
            Some('+') => {
                self.bump();
            }
            _ => {}
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        digits
            .parse()
            .map(Expr::IntegerLit)
            .map_err(|_| self.err(format!("integer literal '{}' out of range", digits)))
    }

    fn parse_text_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect('"')?;
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err("unterminated text literal")),
                Some('\n') => return Err(self.err("unterminated text literal")),
                Some('"') => {
                    self.bump();
                    return Ok(Expr::TextLit(text));
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some(other) => {
                            return Err(self.err(format!("unknown escape '\\{}'", other)))
                        }
                        None => return Err(self.err("unterminated escape in text literal")),
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
    }

    fn parse_list_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect('[')?;
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.bump();
            return Ok(Expr::ListLit(None, Vec::new()));
        }
        let mut items = Vec::new();
        loop {
            items.push(self.parse_expr()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    return Ok(Expr::ListLit(None, items));
                }
                other => {
                    return Err(self.err(format!(
                        "expected ',' or ']' in list, got {}",
                        describe(other)
                    )))
                }
            }
        }
    }

    fn parse_record(&mut self) -> Result<Expr, ParseError> {
        self.expect('{')?;
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Expr::RecordLit(Vec::new()));
        }
        let first = self.label()?;
        self.skip_whitespace();
        match self.peek() {
            Some(':') => {
                self.bump();
                self.parse_record_fields(first, ':', Expr::RecordType)
            }
            Some('=') => {
                self.bump();
                self.parse_record_fields(first, '=', Expr::RecordLit)
            }
            other => Err(self.err(format!(
                "expected ':' or '=' after field label, got {}",
                describe(other)
            ))),
        }
    }

    /// Finish a record whose first label and separator are already consumed.
    /// Fields stay in declaration order; imports inside them resolve left
    /// to right exactly as written.
    fn parse_record_fields(
        &mut self,
        first: String,
        separator: char,
        build: fn(Vec<(String, Expr)>) -> Expr,
    ) -> Result<Expr, ParseError> {
        let mut fields: Vec<(String, Expr)> = Vec::new();
        let mut label = first;
        loop {
            if fields.iter().any(|(existing, _)| existing == &label) {
                return Err(self.err(format!("duplicate field '{}'", label)));
            }
            let value = self.parse_expr()?;
            fields.push((label.clone(), value));
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    self.skip_whitespace();
                    label = self.label()?;
                    self.skip_whitespace();
                    self.expect(separator)?;
                }
                Some('}') => {
                    self.bump();
                    return Ok(build(fields));
                }
                other => {
                    return Err(self.err(format!(
                        "expected ',' or '}}' in record, got {}",
                        describe(other)
                    )))
                }
            }
        }
    }

    // ── Imports ──────────────────────────────────────────────────────

    fn at_import_start(&self) -> bool {
        if self.peek() == Some('/') {
            return true;
        }
        if self.starts_with("./") || self.starts_with("../") || self.starts_with("~/") {
            return true;
        }
        if self.starts_with("env:")
            || self.starts_with("http://")
            || self.starts_with("https://")
        {
            return true;
        }
        self.starts_with_word("missing")
    }

    fn parse_import_expr(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_import_target()?;
        let hash = self.parse_hash_suffix()?;
        let mode = self.parse_mode_suffix()?;
        Ok(Expr::Embed(Import { hash, target, mode }))
    }

    /// An import allowed after `using`: a locator with an optional hash but
    /// no `as` mode.
    fn parse_plain_import(&mut self) -> Result<Import, ParseError> {
        self.skip_whitespace();
        if !self.at_import_start() {
            return Err(self.err(format!(
                "expected an import after 'using', got {}",
                describe(self.peek())
            )));
        }
        let target = self.parse_import_target()?;
        let hash = self.parse_hash_suffix()?;
        Ok(Import {
            hash,
            target,
            mode: ImportMode::Code,
        })
    }

    fn parse_import_target(&mut self) -> Result<ImportTarget, ParseError> {
        if self.eat_str("../") {
            return Ok(ImportTarget::Local(FilePrefix::Parent, self.parse_file()?));
        }
        if self.eat_str("./") {
            return Ok(ImportTarget::Local(FilePrefix::Here, self.parse_file()?));
        }
        if self.eat_str("~/") {
            return Ok(ImportTarget::Local(FilePrefix::Home, self.parse_file()?));
        }
        if self.peek() == Some('/') {
            self.bump();
            return Ok(ImportTarget::Local(FilePrefix::Absolute, self.parse_file()?));
        }
        if self.starts_with("http://") || self.starts_with("https://") {
            return Ok(ImportTarget::Remote(self.parse_url()?));
        }
        if self.eat_str("env:") {
            let name = self.ident()?;
            return Ok(ImportTarget::Env(name));
        }
        if self.starts_with_word("missing") {
            self.expect_keyword("missing")?;
            return Ok(ImportTarget::Missing);
        }
        Err(self.err("expected an import"))
    }

    fn parse_file(&mut self) -> Result<File, ParseError> {
        let mut components = Vec::new();
        loop {
            let component = self.parse_path_component()?;
            if self.peek() == Some('/') && self.peek_at(1).is_some_and(is_path_char) {
                self.bump();
                components.push(component);
            } else {
                return Ok(File {
                    directory: Directory { components },
                    file: component,
                });
            }
        }
    }

    fn parse_path_component(&mut self) -> Result<String, ParseError> {
        let mut component = String::new();
        while let Some(c) = self.peek() {
            if is_path_char(c) {
                component.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if component.is_empty() {
            Err(self.err(format!(
                "expected a path component, got {}",
                describe(self.peek())
            )))
        } else {
            Ok(component)
        }
    }

    fn parse_url(&mut self) -> Result<Url, ParseError> {
        let scheme = if self.eat_str("https://") {
            Scheme::Https
        } else {
            self.eat_str("http://");
            Scheme::Http
        };
        let mut authority = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':' | '@') {
                authority.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if authority.is_empty() {
            return Err(self.err("expected a URL authority"));
        }
        let path = if self.peek() == Some('/') {
            self.bump();
            if self.peek().is_some_and(is_path_char) {
                self.parse_file()?
            } else {
                File {
                    directory: Directory::default(),
                    file: String::new(),
                }
            }
        } else {
            File {
                directory: Directory::default(),
                file: String::new(),
            }
        };
        let query = if self.peek() == Some('?') {
            self.bump();
            Some(self.parse_url_run())
        } else {
            None
        };
        let fragment = if self.peek() == Some('#') {
            self.bump();
            Some(self.parse_url_run())
        } else {
            None
        };
        let state = self.save();
        self.skip_whitespace();
        let headers = if self.starts_with_word("using") {
            self.expect_keyword("using")?;
            Some(Box::new(self.parse_plain_import()?))
        } else {
            self.restore(state);
            None
        };
        Ok(Url {
            scheme,
            authority,
            path,
            query,
            fragment,
            headers,
        })
    }

    fn parse_url_run(&mut self) -> String {
        let mut run = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '#' | ')' | ']' | '}' | ',' | '"') {
                break;
            }
            run.push(c);
            self.bump();
        }
        run
    }

    fn parse_hash_suffix(&mut self) -> Result<Option<String>, ParseError> {
        let state = self.save();
        self.skip_whitespace();
        if !self.eat_str("sha256:") {
            self.restore(state);
            return Ok(None);
        }
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if digits.len() != 64 {
            return Err(self.err(format!(
                "expected 64 hex digits after 'sha256:', got {}",
                digits.len()
            )));
        }
        Ok(Some(digits.to_lowercase()))
    }

    fn parse_mode_suffix(&mut self) -> Result<ImportMode, ParseError> {
        let state = self.save();
        self.skip_whitespace();
        if !self.starts_with_word("as") {
            self.restore(state);
            return Ok(ImportMode::Code);
        }
        self.expect_keyword("as")?;
        self.skip_whitespace();
        let mode = self.ident()?;
        if mode == "Text" {
            Ok(ImportMode::RawText)
        } else {
            Err(self.err(format!("unsupported import mode '{}'", mode)))
        }
    }
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '-' | '_' | '.' | '~' | '!' | '$' | '\'' | '*' | '+' | ';' | '@' | '%'
        )
}

fn describe(c: Option<char>) -> String {
    match c {
        Some(c) => format!("'{}'", c),
        None => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Expr {
        parse_expression("test", input).expect("should parse")
    }

    fn parse_err(input: &str) -> ParseError {
        parse_expression("test", input).expect_err("should not parse")
    }

    #[test]
    fn parses_polymorphic_identity() {
        let e = parse("λ(a : Type) → λ(x : a) → x");
        match e {
            Expr::Lam(a, domain, _) => {
                assert_eq!(a, "a");
                assert_eq!(*domain, Expr::Const(Const::Type));
            }
            other => panic!("expected a lambda, got {:?}", other),
        }
    }

    #[test]
    fn ascii_lambda_is_equivalent() {
        assert_eq!(parse("\\(x : Bool) -> x"), parse("λ(x : Bool) → x"));
    }

    #[test]
    fn application_is_left_associative() {
        let e = parse("./id Bool True");
        match e {
            Expr::App(f, arg) => {
                assert_eq!(*arg, Expr::BoolLit(true));
                match *f {
                    Expr::App(g, inner) => {
                        assert_eq!(*inner, Expr::Bool);
                        assert!(matches!(*g, Expr::Embed(_)));
                    }
                    other => panic!("expected nested application, got {:?}", other),
                }
            }
            other => panic!("expected application, got {:?}", other),
        }
    }

    #[test]
    fn alternative_is_left_associative() {
        let e = parse("missing ? env:NOPE ? ./does-not-exist");
        match e {
            Expr::ImportAlt(l, r) => {
                assert!(matches!(*r, Expr::Embed(_)));
                assert!(matches!(*l, Expr::ImportAlt(..)));
            }
            other => panic!("expected an alternative, got {:?}", other),
        }
    }

    #[test]
    fn import_suffixes() {
        let hash = "a".repeat(64);
        let e = parse(&format!("./pkg/render sha256:{} as Text", hash));
        match e {
            Expr::Embed(import) => {
                assert_eq!(import.hash.as_deref(), Some(hash.as_str()));
                assert_eq!(import.mode, ImportMode::RawText);
                match import.target {
                    ImportTarget::Local(FilePrefix::Here, file) => {
                        assert_eq!(file.directory.components, vec!["pkg".to_string()]);
                        assert_eq!(file.file, "render");
                    }
                    other => panic!("expected a local target, got {:?}", other),
                }
            }
            other => panic!("expected an import, got {:?}", other),
        }
    }

    #[test]
    fn short_hash_is_rejected() {
        let err = parse_err("./x sha256:abc123");
        assert!(err.message.contains("64 hex digits"));
    }

    #[test]
    fn url_with_query_and_headers() {
        let e = parse("https://example.com/pkg/main?tag=v1 using ./headers");
        match e {
            Expr::Embed(import) => match import.target {
                ImportTarget::Remote(url) => {
                    assert_eq!(url.scheme, Scheme::Https);
                    assert_eq!(url.authority, "example.com");
                    assert_eq!(url.path.directory.components, vec!["pkg".to_string()]);
                    assert_eq!(url.path.file, "main");
                    assert_eq!(url.query.as_deref(), Some("tag=v1"));
                    let headers = url.headers.expect("headers import");
                    assert!(matches!(
                        headers.target,
                        ImportTarget::Local(FilePrefix::Here, _)
                    ));
                }
                other => panic!("expected a remote target, got {:?}", other),
            },
            other => panic!("expected an import, got {:?}", other),
        }
    }

    #[test]
    fn bare_authority_url() {
        let e = parse("http://example.com as Text");
        match e {
            Expr::Embed(import) => {
                assert_eq!(import.mode, ImportMode::RawText);
                match import.target {
                    ImportTarget::Remote(url) => {
                        assert_eq!(url.authority, "example.com");
                        assert_eq!(url.path.file, "");
                    }
                    other => panic!("expected a remote target, got {:?}", other),
                }
            }
            other => panic!("expected an import, got {:?}", other),
        }
    }

    #[test]
    fn env_and_missing_imports() {
        assert!(matches!(
            parse("env:HOME_REGION"),
            Expr::Embed(Import {
                target: ImportTarget::Env(name),
                ..
            }) if name == "HOME_REGION"
        ));
        assert!(matches!(
            parse("missing"),
            Expr::Embed(Import {
                target: ImportTarget::Missing,
                ..
            })
        ));
    }

    #[test]
    fn record_literal_and_type() {
        let lit = parse("{ foo = env:FOO, bar = \"hi\" }");
        match lit {
            Expr::RecordLit(fields) => {
                assert_eq!(fields.len(), 2);
                // declaration order survives parsing
                assert_eq!(fields[0].0, "foo");
                assert_eq!(fields[1].0, "bar");
                assert!(matches!(fields[1].1, Expr::TextLit(_)));
            }
            other => panic!("expected a record literal, got {:?}", other),
        }
        let ty = parse("{ foo : Integer, bar : Text }");
        assert!(matches!(ty, Expr::RecordType(fields) if fields.len() == 2));
    }

    #[test]
    fn duplicate_record_field_is_rejected() {
        let err = parse_err("{ a = 1, a = 2 }");
        assert!(err.message.contains("duplicate field"));
    }

    #[test]
    fn operators_and_annotations() {
        let e = parse("λ(x : Bool) → x == False");
        match e {
            Expr::Lam(_, _, body) => assert!(matches!(*body, Expr::BoolEq(..))),
            other => panic!("expected a lambda, got {:?}", other),
        }
        assert!(matches!(parse("[] : List Text"), Expr::Annot(..)));
        assert!(matches!(parse("Bool → Bool"), Expr::Pi(..)));
    }

    #[test]
    fn let_binding() {
        let e = parse("let region = \"east\" in { region = region }");
        assert!(matches!(e, Expr::Let(..)));
    }

    #[test]
    fn comments_are_whitespace() {
        let e = parse("-- which backend to use\nTrue");
        assert_eq!(e, Expr::BoolLit(true));
    }

    #[test]
    fn trailing_input_is_rejected() {
        let err = parse_err("True False extra )");
        assert!(err.message.contains("unexpected input"));
    }

    #[test]
    fn line_numbers_track_newlines() {
        let err = parse_err("{ a = 1,\n  b = }");
        assert_eq!(err.line, 2);
    }
}
