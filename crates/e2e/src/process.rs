//! Signalling supervised processes

use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Exit value build tools report when they were terminated by SIGTERM.
pub const PROCESS_KILLED: i32 = 143;

/// Non-owning handle used to request termination of a supervised process.
///
/// Supervised commands are started as the leader of their own process group,
/// so signals go to the whole group and reach any helpers the tool forked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: Pid,
}

impl ProcessHandle {
    pub fn new(pid: u32) -> Self {
        Self {
            pid: Pid::from_raw(pid as i32),
        }
    }

    /// Handle for a spawned child, or `None` once it has been reaped.
    pub fn from_child(child: &tokio::process::Child) -> Option<Self> {
        child.id().map(Self::new)
    }

    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Ask the process group to shut down (SIGTERM).
    pub fn terminate(&self) -> bool {
        self.signal(Signal::SIGTERM)
    }

    /// Force the process group down (SIGKILL).
    pub fn kill(&self) -> bool {
        self.signal(Signal::SIGKILL)
    }

    fn signal(&self, signal: Signal) -> bool {
        match killpg(self.pid, signal) {
            Ok(()) => {
                debug!("Sent {:?} to process group {}", signal, self.pid);
                true
            }
            Err(Errno::ESRCH) => {
                debug!("Process group {} already gone", self.pid);
                false
            }
            Err(e) => {
                // Not a group leader (or not ours); fall back to the single pid.
                warn!("killpg({}) failed: {}, signalling pid only", self.pid, e);
                kill(self.pid, signal).is_ok()
            }
        }
    }
}

/// Shell-style exit value: the exit code, or `128 + signal` for a process
/// ended by a signal.
pub fn exit_value(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
}
