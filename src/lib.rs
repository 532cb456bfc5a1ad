//! A small shell that turns each input line into a command tree and runs it
//! with forked processes.
//!
//! A line goes through four stages. The [`lexer`] splits it into tokens
//! without joining the chunks it arrived in, [`syntax`] checks the token
//! sequence, [`parser`] builds a [`Node`] tree, and [`executor`] runs the tree
//! with pipes, redirections, subshells, conditional chaining and background
//! jobs. [`Interpreter`] ties the stages together for a session.

mod builtin;
pub mod cursor;
pub mod env;
pub mod executor;
mod external;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod reaper;
pub mod source;
pub mod syntax;
pub mod tree;

/// Name used as the prefix of every diagnostic.
pub const SHELL_NAME: &str = "treesh";

pub use executor::Outcome;
pub use interpreter::{Interpreter, LineError, Settings};
pub use source::{ChunkedLines, EditorLines, Line, LineSource};
pub use tree::Node;
