//! GraphQL Lexical Grammar
//!
//! One tokenizer shared by the SDL loader and the query parser, so that both
//! report positions the same way (1-based line and column).
//!
//! Commas, whitespace, the byte order mark and `#` comments are insignificant.

use logos::Logos;

use crate::error::{InsightError, Result};

// =============================================================================
// Tokens
// =============================================================================

/// Lexical category of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Int,
    Float,
    String,
    BlockString,
    /// `! $ & ( ) ... : = @ [ ] { | }`
    Punct,
}

/// A single token with its decoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Names and numbers verbatim, strings decoded, punctuators as written
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.value == punct
    }

    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.value == name
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, TokenKind::String | TokenKind::BlockString)
    }

    fn describe(&self) -> String {
        match self.kind {
            TokenKind::String | TokenKind::BlockString => "string".to_string(),
            _ => format!("'{}'", self.value),
        }
    }
}

/// A directive application such as `@deprecated(reason: "use x")`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    /// Argument name and rendered value
    pub arguments: Vec<(String, String)>,
}

impl Directive {
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

// =============================================================================
// Lexer
// =============================================================================

/// Raw token classes recognized by the generated lexer
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
    #[token("!")]
    #[token("$")]
    #[token("&")]
    #[token("(")]
    #[token(")")]
    #[token("...")]
    #[token(":")]
    #[token("=")]
    #[token("@")]
    #[token("[")]
    #[token("]")]
    #[token("{")]
    #[token("|")]
    #[token("}")]
    Punct,

    #[regex(r"[_A-Za-z][_0-9A-Za-z]*")]
    Name,

    #[regex(r"-?[0-9]+", number_end)]
    Int,

    #[regex(r"-?[0-9]+\.[0-9]+(?:[eE][+-]?[0-9]+)?", number_end)]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", number_end)]
    Float,

    #[regex(r#""(?:[^"\\\n\r]|\\.)*""#)]
    String,

    #[token("\"\"\"", block_string_end)]
    BlockString,

    #[regex(r"[ \t\r\n,\x{FEFF}]+")]
    Ignored,

    #[regex(r"#[^\n\r]*", allow_greedy = true)]
    Comment,
}

/// A number may not run straight into a name or another `.`
fn number_end(lex: &mut logos::Lexer<RawToken>) -> bool {
    !matches!(
        lex.remainder().chars().next(),
        Some(c) if c == '_' || c == '.' || c.is_ascii_alphabetic()
    )
}

/// Extend a `"""` match through the closing `"""`, skipping `\"""` escapes
fn block_string_end(lex: &mut logos::Lexer<RawToken>) -> bool {
    let rest = lex.remainder().as_bytes();
    let mut i = 0;
    while i < rest.len() {
        if rest[i..].starts_with(b"\\\"\"\"") {
            i += 4;
        } else if rest[i..].starts_with(b"\"\"\"") {
            lex.bump(i + 3);
            return true;
        } else {
            i += 1;
        }
    }
    false
}

/// Byte offset to 1-based line and column (columns count chars)
struct LineIndex<'s> {
    source: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn position(&self, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&start| start <= offset).max(1);
        let line_start = self.starts.get(line - 1).copied().unwrap_or(0);
        let column = self
            .source
            .get(line_start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0);
        (line, column + 1)
    }
}

fn unquote<'t>(text: &'t str, quote: &str) -> &'t str {
    text.strip_prefix(quote)
        .and_then(|t| t.strip_suffix(quote))
        .unwrap_or(text)
}

/// Turn a raw match into a token; ignored input yields `None`
fn convert(kind: RawToken, text: &str, (line, column): (usize, usize)) -> Result<Option<Token>> {
    let (kind, value) = match kind {
        RawToken::Ignored | RawToken::Comment => return Ok(None),
        RawToken::Punct => (TokenKind::Punct, text.to_string()),
        RawToken::Name => (TokenKind::Name, text.to_string()),
        RawToken::Int => (TokenKind::Int, text.to_string()),
        RawToken::Float => (TokenKind::Float, text.to_string()),
        RawToken::String => {
            let value = decode_string(unquote(text, "\""))
                .map_err(|message| InsightError::parse(line, column, message))?;
            (TokenKind::String, value)
        }
        RawToken::BlockString => {
            let raw = unquote(text, "\"\"\"").replace("\\\"\"\"", "\"\"\"");
            (TokenKind::BlockString, block_string_value(&raw))
        }
    };
    Ok(Some(Token {
        kind,
        value,
        line,
        column,
    }))
}

/// Resolve escape sequences in the body of a quoted string
fn decode_string(raw: &str) -> std::result::Result<String, String> {
    let mut value = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('b') => '\u{0008}',
            Some('f') => '\u{000c}',
            Some('"') => '"',
            Some('\\') => '\\',
            Some('/') => '/',
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| "invalid unicode escape".to_string())?
            }
            _ => return Err("invalid escape sequence".to_string()),
        };
        value.push(escaped);
    }
    Ok(value)
}

/// Error for a run of input no token matched
fn garbage_error(source: &str, start: usize, end: usize, lines: &LineIndex<'_>) -> InsightError {
    let (line, column) = lines.position(start);
    let garbage = source.get(start..end).unwrap_or_default();
    let message = if garbage.starts_with("\"\"\"") {
        "unterminated block string".to_string()
    } else if garbage.starts_with('"') {
        "unterminated string".to_string()
    } else if garbage.starts_with('.') {
        "unexpected '.', did you mean '...'?".to_string()
    } else if garbage.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
        format!("invalid number '{}'", garbage)
    } else {
        format!("unexpected character(s) '{}'", garbage)
    };
    InsightError::parse(line, column, message)
}

/// Strip common indentation and surrounding blank lines from a block string
fn block_string_value(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();

    let common_indent = lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
            (indent < line.len()).then_some(indent)
        })
        .min()
        .unwrap_or(0);

    let mut out: Vec<&str> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line
            } else {
                line.get(common_indent..).unwrap_or("")
            }
        })
        .collect();

    while out.first().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.remove(0);
    }
    while out.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.pop();
    }
    out.join("\n")
}

/// Tokenize source text.
///
/// Returns every token up to the first lexical error, plus that error.
/// Consecutive unmatched characters are reported as one error.
pub fn tokenize(source: &str) -> (Vec<Token>, Option<InsightError>) {
    let lines = LineIndex::new(source);
    let mut lexer = RawToken::lexer(source);
    let mut tokens = Vec::new();
    let mut error_start: Option<usize> = None;

    loop {
        let next = lexer.next();
        if let Some(Err(())) = next {
            error_start.get_or_insert(lexer.span().start);
            continue;
        }
        if let Some(start) = error_start {
            let end = if next.is_some() { lexer.span().start } else { source.len() };
            return (tokens, Some(garbage_error(source, start, end, &lines)));
        }
        let Some(Ok(kind)) = next else {
            return (tokens, None);
        };

        let span = lexer.span();
        match convert(kind, lexer.slice(), lines.position(span.start)) {
            Ok(Some(token)) => tokens.push(token),
            Ok(None) => {}
            Err(err) => return (tokens, Some(err)),
        }
    }
}

// =============================================================================
// Token Stream
// =============================================================================

/// Nesting allowed for selection sets, list types and value literals
pub const DEFAULT_MAX_NESTING: usize = 128;

/// Cursor over a token list with GraphQL-specific helpers
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
    end_line: usize,
    end_column: usize,
    nesting: usize,
    max_nesting: usize,
}

impl TokenStream {
    /// Tokenize `source`, returning the stream and any lexical error
    pub fn from_source(source: &str) -> (Self, Option<InsightError>) {
        let (tokens, error) = tokenize(source);
        let end_line = source.split('\n').count().max(1);
        let end_column = source
            .rsplit('\n')
            .next()
            .map(|l| l.chars().count() + 1)
            .unwrap_or(1);
        (
            Self {
                tokens,
                pos: 0,
                end_line,
                end_column,
                nesting: 0,
                max_nesting: DEFAULT_MAX_NESTING,
            },
            error,
        )
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub fn with_max_nesting(mut self, max_nesting: usize) -> Self {
        self.max_nesting = max_nesting;
        self
    }

    /// Enter one nesting level; fails at the current token past the limit
    pub fn descend(&mut self) -> Result<()> {
        if self.nesting >= self.max_nesting {
            let (line, column) = self.position();
            return Err(InsightError::parse(
                line,
                column,
                format!("nesting exceeds the limit of {} levels", self.max_nesting),
            ));
        }
        self.nesting += 1;
        Ok(())
    }

    pub fn ascend(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    pub fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn at_punct(&self, punct: &str) -> bool {
        self.peek().map(|t| t.is_punct(punct)).unwrap_or(false)
    }

    pub fn at_name(&self, name: &str) -> bool {
        self.peek().map(|t| t.is_name(name)).unwrap_or(false)
    }

    pub fn at_string(&self) -> bool {
        self.peek().map(Token::is_string).unwrap_or(false)
    }

    pub fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Position of the next token, or the end of input
    pub fn position(&self) -> (usize, usize) {
        self.peek()
            .map(|t| (t.line, t.column))
            .unwrap_or((self.end_line, self.end_column))
    }

    /// Error at the current position, naming what was found there
    pub fn unexpected(&self, expected: &str) -> InsightError {
        let (line, column) = self.position();
        let found = self
            .peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of input".to_string());
        InsightError::parse(line, column, format!("expected {}, found {}", expected, found))
    }

    pub fn expect_punct(&mut self, punct: &str) -> Result<Token> {
        if self.at_punct(punct) {
            self.next().ok_or_else(|| self.unexpected(punct))
        } else {
            Err(self.unexpected(&format!("'{}'", punct)))
        }
    }

    pub fn expect_name(&mut self) -> Result<Token> {
        match self.peek() {
            Some(t) if t.kind == TokenKind::Name => self.next().ok_or_else(|| self.unexpected("name")),
            _ => Err(self.unexpected("name")),
        }
    }

    /// Consume an optional description string
    pub fn description(&mut self) -> Option<String> {
        if self.at_string() {
            self.next().map(|t| t.value)
        } else {
            None
        }
    }

    /// Parse a value literal and render it back to normalized text
    pub fn parse_value(&mut self) -> Result<String> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("value"));
        };

        match token.kind {
            TokenKind::Int | TokenKind::Float | TokenKind::Name => {
                self.pos += 1;
                Ok(token.value)
            }
            TokenKind::String | TokenKind::BlockString => {
                self.pos += 1;
                Ok(serde_json::to_string(&token.value)?)
            }
            TokenKind::Punct => match token.value.as_str() {
                "$" => {
                    self.pos += 1;
                    let name = self.expect_name()?;
                    Ok(format!("${}", name.value))
                }
                "[" => {
                    self.descend()?;
                    self.pos += 1;
                    let mut items = Vec::new();
                    while !self.eat_punct("]") {
                        if self.is_eof() {
                            return Err(self.unexpected("']'"));
                        }
                        items.push(self.parse_value()?);
                    }
                    self.ascend();
                    Ok(format!("[{}]", items.join(", ")))
                }
                "{" => {
                    self.descend()?;
                    self.pos += 1;
                    let mut fields = Vec::new();
                    while !self.eat_punct("}") {
                        let name = self.expect_name()?;
                        self.expect_punct(":")?;
                        let value = self.parse_value()?;
                        fields.push(format!("{}: {}", name.value, value));
                    }
                    self.ascend();
                    Ok(format!("{{{}}}", fields.join(", ")))
                }
                _ => Err(self.unexpected("value")),
            },
        }
    }

    /// Parse an optional `(name: value, ...)` argument list
    pub fn parse_arguments(&mut self) -> Result<Vec<(String, String)>> {
        let mut arguments = Vec::new();
        if !self.eat_punct("(") {
            return Ok(arguments);
        }
        while !self.eat_punct(")") {
            let name = self.expect_name()?;
            self.expect_punct(":")?;
            let value = self.parse_value()?;
            arguments.push((name.value, value));
        }
        Ok(arguments)
    }

    /// Parse zero or more directive applications
    pub fn parse_directives(&mut self) -> Result<Vec<Directive>> {
        let mut directives = Vec::new();
        while self.eat_punct("@") {
            let name = self.expect_name()?;
            let arguments = self.parse_arguments()?;
            directives.push(Directive {
                name: name.value,
                arguments,
            });
        }
        Ok(directives)
    }
}
