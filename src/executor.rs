//! Runs a command tree in forked processes.
//!
//! Every node gets an outer process. The outer process forks an inner one
//! for the node's own command or group and, at the same time, runs the
//! node's `pipe_to` side itself, reading from a pipe the inner process
//! writes to. The caller waits for the outer process unless the node is in
//! the background, then decides from the status whether `next` runs.

use crate::SHELL_NAME;
use crate::builtin;
use crate::env::Environment;
use crate::external;
use crate::reaper::Reaper;
use crate::tree::{Node, OutMode};
use log::{debug, trace, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, close, dup2, fork, getpid, pipe2};
use std::ffi::OsString;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{IntoRawFd, RawFd};

const STDIN: RawFd = 0;
const STDOUT: RawFd = 1;

/// Result of running one node. Only success versus failure drives control
/// flow; the kind becomes the exit status of the process that saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The program ran and exited with a nonzero status or was killed.
    NonZeroExit,
    ForkFailure,
    /// The program could not be found or started.
    ExecFailure,
    WaitFailure,
    /// A redirection target could not be opened.
    OpenFailure,
}

impl Outcome {
    /// Exit status of a forked process that ends with this outcome.
    pub fn code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::ForkFailure => 1,
            Outcome::ExecFailure => 2,
            Outcome::WaitFailure => 3,
            Outcome::OpenFailure => 4,
            Outcome::NonZeroExit => 6,
        }
    }

    pub fn is_success(self) -> bool {
        self == Outcome::Success
    }
}

/// Descriptors a node inherits from the stages around it.
#[derive(Debug, Clone, Copy, Default)]
struct Wiring {
    input: Option<RawFd>,
    output: Option<RawFd>,
}

/// Runs command trees for one session.
pub struct Executor<'a> {
    env: &'a Environment,
    reaper: &'a Reaper,
    search_paths: OsString,
}

impl<'a> Executor<'a> {
    pub fn new(env: &'a Environment, reaper: &'a Reaper) -> Self {
        Executor {
            env,
            reaper,
            search_paths: env.get_var("PATH").unwrap_or_default().into(),
        }
    }

    /// Runs `tree` with the shell's own stdin and stdout and returns the
    /// status of the last stage that ran.
    pub fn execute(&self, tree: &Node) -> Outcome {
        self.run(tree, Wiring::default())
    }

    fn run(&self, node: &Node, wiring: Wiring) -> Outcome {
        let status = match spawn() {
            Ok(ForkResult::Child) => terminate(self.run_outer(node, wiring)),
            Ok(ForkResult::Parent { child }) if node.background => {
                debug!("started background process {child}");
                Outcome::Success
            }
            Ok(ForkResult::Parent { child }) => wait_for(child),
            Err(e) => {
                report("fork", e);
                Outcome::ForkFailure
            }
        };

        match node.next.as_deref() {
            Some(next) if node.next_mode.permits(status.is_success()) => self.run(next, wiring),
            _ => status,
        }
    }

    /// Body of the outer process of `node`.
    fn run_outer(&self, node: &Node, wiring: Wiring) -> Outcome {
        let pipe = match node.pipe_to {
            Some(_) => match open_pipe() {
                Ok(pipe) => Some(pipe),
                Err(e) => {
                    report("pipe", e);
                    return Outcome::ForkFailure;
                }
            },
            None => None,
        };

        let status = match spawn() {
            Ok(ForkResult::Child) => {
                let output = match pipe {
                    Some((read, write)) => {
                        close_fd(read);
                        Some(write)
                    }
                    None => wiring.output,
                };
                let status = self.run_payload(node, Wiring { output, ..wiring });
                if let Some((_, write)) = pipe {
                    close_fd(write);
                }
                terminate(status)
            }
            Ok(ForkResult::Parent { child }) => {
                let mut piped = Outcome::Success;
                if let (Some((read, write)), Some(next)) = (pipe, node.pipe_to.as_deref()) {
                    close_fd(write);
                    piped = self.run(next, Wiring { input: Some(read), ..wiring });
                    close_fd(read);
                }
                match wait_for(child) {
                    Outcome::Success => piped,
                    failed => failed,
                }
            }
            Err(e) => {
                if let Some((read, write)) = pipe {
                    close_fd(read);
                    close_fd(write);
                }
                report("fork", e);
                Outcome::ForkFailure
            }
        };

        // nobody waits for a background node, so it asks to be collected
        if node.background {
            if let Err(e) = self.reaper.notify(getpid()) {
                warn!("failed to post {} for reaping: {e}", getpid());
            }
        }
        status
    }

    /// Body of the inner process: the node's command, its group, or nothing.
    fn run_payload(&self, node: &Node, wiring: Wiring) -> Outcome {
        if !node.argv.is_empty() {
            return self.system(node, wiring);
        }
        let Some(group) = node.subshell.as_deref() else {
            return Outcome::Success;
        };
        // the group's files are opened once and shared by every stage inside
        match open_group_redirects(node, wiring) {
            Ok(wiring) => self.run(group, wiring),
            Err(outcome) => outcome,
        }
    }

    /// Runs one simple command in a child and waits for it.
    fn system(&self, node: &Node, wiring: Wiring) -> Outcome {
        match spawn() {
            Ok(ForkResult::Child) => {
                if let Some(outcome) = builtin::try_run(&node.argv, self.env) {
                    wiring.input.into_iter().chain(wiring.output).for_each(close_fd);
                    terminate(outcome)
                }
                terminate(self.exec_io(node, wiring))
            }
            Ok(ForkResult::Parent { child }) => wait_for(child),
            Err(e) => {
                report("fork", e);
                Outcome::ForkFailure
            }
        }
    }

    /// Wires stdin and stdout for `node` and replaces the process with its
    /// program. Returns only on failure.
    fn exec_io(&self, node: &Node, wiring: Wiring) -> Outcome {
        let input = match node.infile.as_deref() {
            Some(path) => match open_input(path) {
                Ok(file) => Some(file.into_raw_fd()),
                Err(outcome) => return outcome,
            },
            None => wiring.input,
        };
        if let Err(outcome) = attach(input, wiring.input, STDIN) {
            return outcome;
        }

        let output = match node.outfile.as_deref() {
            Some(path) => match open_output(path, node.outmode) {
                Ok(file) => Some(file.into_raw_fd()),
                Err(outcome) => return outcome,
            },
            None => wiring.output,
        };
        if let Err(outcome) = attach(output, wiring.output, STDOUT) {
            return outcome;
        }

        // the Rust runtime ignores SIGPIPE, and an ignored signal survives exec
        // SAFETY: single-threaded child, restoring the default disposition.
        if let Err(e) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) } {
            warn!("failed to restore SIGPIPE: {e}");
        }
        let errno = external::exec_command(&node.argv, &self.search_paths);
        let name = node.argv.first().map_or("", String::as_str);
        eprintln!("{SHELL_NAME}: {name}: exec: {errno}");
        Outcome::ExecFailure
    }
}

/// Replaces the inherited descriptors with the node's own redirections.
fn open_group_redirects(node: &Node, wiring: Wiring) -> Result<Wiring, Outcome> {
    let mut wiring = wiring;
    if let Some(path) = node.infile.as_deref() {
        wiring.input = Some(open_input(path)?.into_raw_fd());
    }
    if let Some(path) = node.outfile.as_deref() {
        wiring.output = Some(open_output(path, node.outmode)?.into_raw_fd());
    }
    Ok(wiring)
}

/// Makes `source` the process's `target` descriptor, then closes the
/// copies that are no longer needed.
fn attach(source: Option<RawFd>, inherited: Option<RawFd>, target: RawFd) -> Result<(), Outcome> {
    if let Some(fd) = source {
        if fd != target {
            dup2(fd, target).map_err(|e| {
                report("dup2", e);
                Outcome::OpenFailure
            })?;
            close_fd(fd);
        }
    }
    if let Some(fd) = inherited {
        if Some(fd) != source && fd != target {
            close_fd(fd);
        }
    }
    Ok(())
}

fn open_input(path: &str) -> Result<File, Outcome> {
    let file = File::open(path).map_err(|e| open_failure(path, describe(&e)))?;
    match file.metadata() {
        Ok(meta) if meta.is_dir() => Err(open_failure(path, Errno::EISDIR.desc())),
        _ => Ok(file),
    }
}

fn open_output(path: &str, mode: OutMode) -> Result<File, Outcome> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    match mode {
        OutMode::Truncate => options.truncate(true),
        OutMode::Append => options.append(true),
    };
    options.open(path).map_err(|e| open_failure(path, describe(&e)))
}

fn open_failure(path: &str, reason: impl Display) -> Outcome {
    eprintln!("{SHELL_NAME}: {path}: {reason}");
    Outcome::OpenFailure
}

/// The C library's text for an OS error, without Rust's `(os error N)` suffix.
fn describe(e: &io::Error) -> String {
    match e.raw_os_error() {
        Some(code) => Errno::from_raw(code).desc().to_string(),
        None => e.to_string(),
    }
}

fn open_pipe() -> nix::Result<(RawFd, RawFd)> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
    Ok((read.into_raw_fd(), write.into_raw_fd()))
}

fn close_fd(fd: RawFd) {
    if let Err(e) = close(fd) {
        trace!("close {fd}: {e}");
    }
}

fn report(call: &str, errno: Errno) {
    eprintln!("{SHELL_NAME}: {call}: {errno}");
}

/// Forks after flushing stdout, so buffered output is not written twice.
fn spawn() -> nix::Result<ForkResult> {
    let _ = io::stdout().flush();
    // SAFETY: the interpreter is single-threaded, and children either fork
    // again, exec, or leave through `terminate`.
    let result = unsafe { fork() };
    if let Ok(ForkResult::Parent { child }) = result {
        trace!("fork {} -> {child}", getpid());
    }
    result
}

fn wait_for(child: Pid) -> Outcome {
    loop {
        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, 0)) => {
                trace!("wait {child}: success");
                return Outcome::Success;
            }
            Ok(status) => {
                trace!("wait {child}: {status:?}");
                return Outcome::NonZeroExit;
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                report("wait", e);
                return Outcome::WaitFailure;
            }
        }
    }
}

/// Ends a forked process with the exit status of `outcome`.
fn terminate(outcome: Outcome) -> ! {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    // SAFETY: `_exit` skips the exit handlers inherited from the interpreter,
    // which must run only once, in the interpreter itself.
    unsafe { nix::libc::_exit(outcome.code()) }
}
