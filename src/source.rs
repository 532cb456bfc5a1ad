//! Where input lines come from.
//!
//! A line is handed to the lexer as the chunks it was read in, never joined.

use crate::SHELL_NAME;
use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::env;
use std::io::{self, Read};

/// Number of bytes [`ChunkedLines`] asks for per read.
pub const CHUNK_SIZE: usize = 4;

/// One input line as an ordered sequence of byte chunks, without the newline.
pub type Line = Vec<Vec<u8>>;

pub trait LineSource {
    /// Returns the next line, or `None` at the end of input.
    fn next_line(&mut self) -> Result<Option<Line>>;
}

/// Reads lines from any byte stream in fixed-size chunks.
///
/// Bytes read past a newline are kept for the following line. The last line
/// does not need a trailing newline.
pub struct ChunkedLines<R> {
    reader: R,
    carry: Vec<u8>,
}

impl<R: Read> ChunkedLines<R> {
    pub fn new(reader: R) -> Self {
        ChunkedLines {
            reader,
            carry: Vec::new(),
        }
    }

    /// Moves bytes up to the first newline from `bytes` into `line`. Returns
    /// the bytes after the newline if there was one.
    fn split_off_line(bytes: &[u8], line: &mut Line) -> Option<Vec<u8>> {
        match bytes.iter().position(|&b| b == b'\n') {
            Some(end) => {
                if end > 0 {
                    line.push(bytes[..end].to_vec());
                }
                Some(bytes[end + 1..].to_vec())
            }
            None => {
                if !bytes.is_empty() {
                    line.push(bytes.to_vec());
                }
                None
            }
        }
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.reader.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

impl<R: Read> LineSource for ChunkedLines<R> {
    fn next_line(&mut self) -> Result<Option<Line>> {
        let mut line = Line::new();
        let carried = std::mem::take(&mut self.carry);
        let started = !carried.is_empty();
        if let Some(rest) = Self::split_off_line(&carried, &mut line) {
            self.carry = rest;
            return Ok(Some(line));
        }

        let mut buf = [0u8; CHUNK_SIZE];
        let mut read_any = false;
        loop {
            let n = self.read_chunk(&mut buf).context("failed to read input")?;
            if n == 0 {
                return Ok((started || read_any).then_some(line));
            }
            read_any = true;
            if let Some(rest) = Self::split_off_line(&buf[..n], &mut line) {
                self.carry = rest;
                return Ok(Some(line));
            }
        }
    }
}

/// Interactive source with line editing and history.
pub struct EditorLines {
    editor: DefaultEditor,
}

impl EditorLines {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("failed to start line editor")?;
        Ok(EditorLines { editor })
    }

    fn prompt() -> String {
        let cwd = env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        format!("{SHELL_NAME}:{cwd}$ ")
    }
}

impl LineSource for EditorLines {
    fn next_line(&mut self) -> Result<Option<Line>> {
        match self.editor.readline(&Self::prompt()) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(Some(vec![line.into_bytes()]))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err).context("failed to read line"),
        }
    }
}
