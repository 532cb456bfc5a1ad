use crate::SHELL_NAME;
use crate::env::Environment;
use crate::executor::{Executor, Outcome};
use crate::lexer::{self, LexError, Token};
use crate::parser;
use crate::reaper::Reaper;
use crate::source::{Line, LineSource};
use crate::syntax::SyntaxError;
use crate::tree::Node;
use anyhow::Result;
use log::debug;

/// What the interpreter prints and whether it runs anything.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Echo every line before processing it, as batch runs do.
    pub echo_input: bool,
    pub print_input: bool,
    pub print_tokens: bool,
    pub print_tree: bool,
    /// Print every tree field, including empty ones.
    pub full_tree: bool,
    pub execute: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            echo_input: false,
            print_input: false,
            print_tokens: false,
            print_tree: false,
            full_tree: false,
            execute: true,
        }
    }
}

impl Settings {
    fn prints_anything(&self) -> bool {
        self.print_input || self.print_tokens || self.print_tree
    }
}

/// Why a line was rejected before execution.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("invalid syntax: error code {code}: {0}", code = .0.code())]
    Syntax(#[from] SyntaxError),
}

/// A shell session.
///
/// The interpreter owns everything that lives as long as the session: the
/// variables visible to `$name` substitution and the channel background
/// processes use to ask for collection. Each line is lexed, validated,
/// turned into a tree and executed, and the tree is dropped before the next
/// line is read.
///
/// Example
/// ```no_run
/// use treesh::{ChunkedLines, Interpreter, Settings};
/// let mut sh = Interpreter::new(Settings::default()).unwrap();
/// sh.run(&mut ChunkedLines::new("echo hello\n".as_bytes())).unwrap();
/// ```
pub struct Interpreter {
    settings: Settings,
    env: Environment,
    reaper: Reaper,
}

impl Interpreter {
    /// Create a session over a snapshot of the process environment.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_env(settings, Environment::new())
    }

    pub fn with_env(settings: Settings, env: Environment) -> Result<Self> {
        Ok(Self {
            settings,
            env,
            reaper: Reaper::new()?,
        })
    }

    /// Reads and processes lines until `source` runs dry.
    pub fn run(&mut self, source: &mut dyn LineSource) -> Result<()> {
        loop {
            let reaped = self.reaper.drain();
            if !reaped.is_empty() {
                debug!("collected {} background process(es)", reaped.len());
            }
            let Some(line) = source.next_line()? else {
                break;
            };
            self.process(&line);
        }
        Ok(())
    }

    /// Handles one line. Returns the status of the executed tree, or `None`
    /// when nothing ran.
    pub fn process(&mut self, line: &Line) -> Option<Outcome> {
        if self.settings.echo_input {
            println!("{}", String::from_utf8_lossy(&line.concat()));
        }
        if self.settings.print_input {
            println!("Input:");
            println!("{}", bracketed(line.iter().map(|c| String::from_utf8_lossy(c))));
        }

        let tree = match self.parse_line(line) {
            Ok(tree) => tree,
            Err(e) => {
                eprintln!("{SHELL_NAME}: {e}");
                return None;
            }
        };

        if self.settings.print_tree {
            println!("Tree:");
            if self.settings.full_tree {
                print!("{}", tree.display_full());
            } else {
                print!("{tree}");
            }
        }

        if !self.settings.execute || tree.is_empty() {
            return None;
        }
        if self.settings.prints_anything() {
            println!("Execution:");
        }
        let outcome = Executor::new(&self.env, &self.reaper).execute(&tree);
        debug!("line finished: {outcome:?}");
        Some(outcome)
    }

    /// Lexes and validates `line` and builds its command tree.
    pub fn parse_line(&self, line: &Line) -> Result<Node, LineError> {
        let tokens = lexer::split_into_tokens(line, &self.env)?;
        debug!("tokens: {tokens:?}");
        if self.settings.print_tokens {
            println!("Tokens:");
            println!("{}", bracketed(tokens.iter().map(Token::as_str)));
        }

        let tree = parser::build_tree(&tokens)?;
        debug!("tree: {tree:?}");
        Ok(tree)
    }
}

fn bracketed<S: AsRef<str>>(items: impl Iterator<Item = S>) -> String {
    items
        .map(|item| format!("[{}]", item.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
