//! Deferred reaping of finished background work.
//!
//! Every outer process started for a background node writes its own pid here
//! right before it exits. The interpreter drains the channel before reading
//! each line and collects those processes, so no job table is needed.

use anyhow::{Context, Result};
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, pipe2};
use std::fs::File;
use std::io::{self, Read, Write};

const RECORD: usize = size_of::<i32>();

/// Session-scoped queue of pids waiting to be collected.
#[derive(Debug)]
pub struct Reaper {
    reader: File,
    writer: File,
    /// Pids received but not yet exited when last checked.
    pending: Vec<Pid>,
}

impl Reaper {
    /// Opens the channel. Both ends are non-blocking and close-on-exec, so
    /// programs started by the shell never see them.
    pub fn new() -> Result<Self> {
        let (reader, writer) =
            pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC).context("failed to open reaper channel")?;
        Ok(Reaper {
            reader: File::from(reader),
            writer: File::from(writer),
            pending: Vec::new(),
        })
    }

    /// Posts `pid` for collection. Usable from any forked process.
    pub fn notify(&self, pid: Pid) -> io::Result<()> {
        (&self.writer).write_all(&pid.as_raw().to_ne_bytes())
    }

    /// Collects every posted process that has exited and returns their pids.
    ///
    /// A posted pid is only signalled while it is still an unreaped child of
    /// this process, which keeps it from being reused. Background stages
    /// nested inside a group are children of the group instead; they are
    /// dropped untouched. A child that is still alive gets a `SIGKILL`,
    /// since by the time it posts it has nothing left to do, and is collected
    /// on this or a later drain.
    pub fn drain(&mut self) -> Vec<Pid> {
        let mut reaped = Vec::new();
        for pid in self.receive() {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    if let Err(e) = kill(pid, Signal::SIGKILL) {
                        debug!("kill {pid}: {e}");
                    }
                    self.pending.push(pid);
                }
                Ok(status) => {
                    debug!("reaped background process {pid}: {status:?}");
                    reaped.push(pid);
                }
                Err(Errno::ECHILD) => debug!("{pid} is not a child, left alone"),
                Err(e) => debug!("waitpid {pid}: {e}"),
            }
        }

        self.pending.retain(|&pid| match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(status) => {
                debug!("reaped background process {pid}: {status:?}");
                reaped.push(pid);
                false
            }
            Err(e) => {
                debug!("waitpid {pid}: {e}");
                false
            }
        });
        reaped
    }

    fn receive(&self) -> Vec<Pid> {
        let mut pids = Vec::new();
        let mut record = [0u8; RECORD];
        loop {
            match (&self.reader).read(&mut record) {
                Ok(RECORD) => pids.push(Pid::from_raw(i32::from_ne_bytes(record))),
                Ok(0) => break,
                Ok(n) => {
                    warn!("reaper channel: dropped a partial record of {n} bytes");
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("reaper channel: {e}");
                    break;
                }
            }
        }
        pids
    }
}
