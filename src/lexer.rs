//! Lexical analysis of one input line.
//!
//! The lexer scans a chunk sequence byte by byte through a [`Cursor`], keeping
//! a quote state and the position where the pending word began. Words are cut
//! out of the chunks only when they are emitted, then go through `$name`
//! substitution and escape resolution.

use crate::cursor::{ChunkView, Cursor};
use crate::env::Environment;
use regex::{Captures, Regex};
use std::fmt;
use std::sync::LazyLock;

const QUOTES: &[u8] = b"'\"";
const SPACES: &[u8] = b" \t\n";
const UNARY: &[u8] = b";<>&|";
const DOUBLED: &[u8] = b">&|";
const BACKSLASH: u8 = b'\\';
const COMMENT: u8 = b'#';

/// Either an escaped character (kept as is) or a `$name` reference.
static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(?s:.)|\$([A-Za-z0-9_]*)").expect("variable pattern is valid"));

/// Redirection operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    In,
    OutTrunc,
    OutAppend,
}

/// Operators joining two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    Pipe,
    And,
    Or,
}

/// Operators ending a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparatorOp {
    Seq,
    Background,
}

/// Syntactic class of a token, used by the syntax validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    LParen,
    RParen,
    Redirect(RedirectOp),
    Logical(LogicalOp),
    Separator(SeparatorOp),
    Word,
}

impl Category {
    /// Bit used in the grammar masks: 1, 2, 4, 8, 16, 32.
    pub fn bit(self) -> u8 {
        match self {
            Category::LParen => 1,
            Category::RParen => 2,
            Category::Redirect(_) => 4,
            Category::Logical(_) => 8,
            Category::Separator(_) => 16,
            Category::Word => 32,
        }
    }
}

/// A shell token. Its category is always derived from the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(text: impl Into<String>) -> Self {
        Token(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn category(&self) -> Category {
        match self.0.as_str() {
            "(" => Category::LParen,
            ")" => Category::RParen,
            "<" => Category::Redirect(RedirectOp::In),
            ">" => Category::Redirect(RedirectOp::OutTrunc),
            ">>" => Category::Redirect(RedirectOp::OutAppend),
            "|" => Category::Logical(LogicalOp::Pipe),
            "&&" => Category::Logical(LogicalOp::And),
            "||" => Category::Logical(LogicalOp::Or),
            ";" => Category::Separator(SeparatorOp::Seq),
            "&" => Category::Separator(SeparatorOp::Background),
            _ => Category::Word,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(text: &str) -> Self {
        Token::new(text)
    }
}

/// Errors that can occur during lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    /// The line ended inside a single- or double-quoted word.
    #[error("lexical error: unterminated {0} quote")]
    UnterminatedQuote(char),
}

/// Which escape sequences an emitted word resolves.
#[derive(Debug, Clone, Copy)]
enum Escapes {
    /// Every `\x` becomes `x`.
    All,
    /// Only `\\`, `\$` and an escaped closing quote are resolved.
    Quoted(u8),
}

struct Lexer<'a, C> {
    view: ChunkView<'a, C>,
    env: &'a Environment,
    quote: Option<u8>,
    begin: Cursor,
    pos: Cursor,
    out: Vec<Token>,
}

impl<'a, C: AsRef<[u8]>> Lexer<'a, C> {
    fn new(chunks: &'a [C], env: &'a Environment) -> Self {
        let view = ChunkView::new(chunks);
        let start = view.start();
        Lexer {
            view,
            env,
            quote: None,
            begin: start,
            pos: start,
            out: Vec::new(),
        }
    }

    fn make_tokens(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(ch) = self.view.current(self.pos) {
            match self.quote {
                Some(quote) => self.handle_quoted(ch, quote),
                None => {
                    if ch == COMMENT {
                        break;
                    }
                    self.handle_unquoted(ch);
                }
            }
        }

        if let Some(quote) = self.quote {
            return Err(LexError::UnterminatedQuote(char::from(quote)));
        }
        self.flush();
        Ok(self.out)
    }

    fn handle_quoted(&mut self, ch: u8, quote: u8) {
        if ch == quote {
            self.emit_word(self.begin, self.pos, Escapes::Quoted(quote));
            self.quote = None;
            self.step(1);
        } else if ch == BACKSLASH {
            self.skip_escaped();
        } else {
            self.view.advance(&mut self.pos, 1);
        }
    }

    fn handle_unquoted(&mut self, ch: u8) {
        if QUOTES.contains(&ch) {
            self.flush();
            self.quote = Some(ch);
            self.step(1);
        } else if ch == b'(' || ch == b')' {
            self.flush();
            self.emit_operator(1);
        } else if SPACES.contains(&ch) {
            self.flush();
            self.step(1);
        } else if self.is_doubled(ch) {
            self.flush();
            self.emit_operator(2);
        } else if UNARY.contains(&ch) {
            self.flush();
            self.emit_operator(1);
        } else if ch == BACKSLASH {
            self.skip_escaped();
        } else {
            self.view.advance(&mut self.pos, 1);
        }
    }

    /// `>>`, `&&` or `||` starting at the current position.
    fn is_doubled(&self, ch: u8) -> bool {
        DOUBLED.contains(&ch)
            && self.view.remaining(self.pos) != 1
            && self.view.peek(self.pos, 1) == Some(ch)
    }

    /// Steps over a backslash and the byte it escapes, unless the backslash
    /// is the last byte of the stream.
    fn skip_escaped(&mut self) {
        let n = if self.view.remaining(self.pos) != 1 { 2 } else { 1 };
        self.view.advance(&mut self.pos, n);
    }

    /// Moves past `n` bytes and starts a new word there.
    fn step(&mut self, n: usize) {
        self.view.advance(&mut self.pos, n);
        self.begin = self.pos;
    }

    fn flush(&mut self) {
        if self.begin != self.pos {
            self.emit_word(self.begin, self.pos, Escapes::All);
        }
    }

    fn emit_operator(&mut self, len: usize) {
        let end = self.view.advanced(self.pos, len);
        let text = String::from_utf8_lossy(&self.view.slice(self.pos, end)).into_owned();
        self.out.push(Token(text));
        self.step(len);
    }

    /// Unquoted words that expand to nothing are dropped; quoted ones are
    /// kept even when empty.
    fn emit_word(&mut self, begin: Cursor, end: Cursor, escapes: Escapes) {
        let raw = String::from_utf8_lossy(&self.view.slice(begin, end)).into_owned();
        let substituted = substitute_variables(&raw, self.env);
        let text = resolve_escapes(&substituted, escapes);
        if text.is_empty() && matches!(escapes, Escapes::All) {
            return;
        }
        self.out.push(Token(text));
    }
}

/// Replaces every unescaped `$name` with its value from `env`.
///
/// An escaped character (`\x`) is copied through untouched, which keeps `\$`
/// from triggering a substitution. A `$` with no identifier after it is
/// dropped.
fn substitute_variables(text: &str, env: &Environment) -> String {
    VARIABLE
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            Some(name) => env.substitute(name.as_str()),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn resolve_escapes(text: &str, escapes: Escapes) -> String {
    let resolves = |next: char| match escapes {
        Escapes::All => true,
        Escapes::Quoted(quote) => next == '\\' || next == '$' || next == char::from(quote),
    };

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match chars.peek() {
            Some(&next) if ch == '\\' && resolves(next) => {
                out.push(next);
                chars.next();
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Splits one line, delivered as a chunk sequence, into tokens.
///
/// Fails with [`LexError`] and produces no tokens when a quote is left open.
pub fn split_into_tokens<C: AsRef<[u8]>>(
    chunks: &[C],
    env: &Environment,
) -> Result<Vec<Token>, LexError> {
    Lexer::new(chunks, env).make_tokens()
}
