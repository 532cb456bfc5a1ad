//! Token-category grammar check run before a tree is built.
//!
//! Each token is reduced to its [`Category`] bit and every adjacent pair is
//! checked against a mask of categories allowed to follow. Parentheses are
//! counted on the way.

use crate::lexer::{Category, Token};

const LPAREN: u8 = 1;
const RPAREN: u8 = 2;
const REDIRECT: u8 = 4;
const LOGICAL: u8 = 8;
const SEPARATOR: u8 = 16;
const WORD: u8 = 32;

const ALLOWED_FIRST: u8 = LPAREN | REDIRECT | WORD;
const ALLOWED_LAST: u8 = RPAREN | SEPARATOR | WORD;

/// Categories allowed right after a token of category `current`.
fn allowed_after(current: Category) -> u8 {
    match current {
        Category::LParen => LPAREN | REDIRECT | WORD,
        Category::RParen => RPAREN | REDIRECT | LOGICAL | SEPARATOR,
        Category::Redirect(_) => WORD,
        Category::Logical(_) => LPAREN | REDIRECT | WORD,
        Category::Separator(_) => LPAREN | RPAREN | REDIRECT | WORD,
        Category::Word => RPAREN | REDIRECT | LOGICAL | SEPARATOR | WORD,
    }
}

fn balance_delta(category: Category) -> i32 {
    match category {
        Category::LParen => 1,
        Category::RParen => -1,
        _ => 0,
    }
}

/// A grammar or bracket-balance violation. Every variant maps to a distinct
/// numeric code through [`SyntaxError::code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("a command cannot start with `{0}`")]
    UnexpectedFirst(String),
    #[error("`{next}` cannot follow `{current}`")]
    UnexpectedNext { current: String, next: String },
    #[error("unmatched `)`")]
    UnmatchedClose,
    #[error("a command cannot end with `{0}`")]
    UnexpectedLast(String),
    #[error("unbalanced parentheses")]
    Unbalanced,
}

impl SyntaxError {
    /// 1: first token, 2: pair of tokens, 3: negative balance, 4: last token,
    /// 5: nonzero final balance.
    pub fn code(&self) -> i32 {
        match self {
            SyntaxError::UnexpectedFirst(_) => 1,
            SyntaxError::UnexpectedNext { .. } => 2,
            SyntaxError::UnmatchedClose => 3,
            SyntaxError::UnexpectedLast(_) => 4,
            SyntaxError::Unbalanced => 5,
        }
    }
}

/// Checks the token sequence. An empty sequence is valid.
pub fn check(tokens: &[Token]) -> Result<(), SyntaxError> {
    let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
        return Ok(());
    };

    if first.category().bit() & ALLOWED_FIRST == 0 {
        return Err(SyntaxError::UnexpectedFirst(first.to_string()));
    }

    let mut balance = 0;
    for pair in tokens.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if allowed_after(current.category()) & next.category().bit() == 0 {
            return Err(SyntaxError::UnexpectedNext {
                current: current.to_string(),
                next: next.to_string(),
            });
        }
        balance += balance_delta(current.category());
        if balance < 0 {
            return Err(SyntaxError::UnmatchedClose);
        }
    }

    if last.category().bit() & ALLOWED_LAST == 0 {
        return Err(SyntaxError::UnexpectedLast(last.to_string()));
    }
    balance += balance_delta(last.category());
    if balance != 0 {
        return Err(SyntaxError::Unbalanced);
    }

    Ok(())
}
