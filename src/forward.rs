//! Trigger forwarder: turns console input into trigger signals for every
//! running capture process.

use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info, warn};

use crate::error::ForwardError;
use crate::trigger::TriggerSignal;

/// Linux truncates process names to this many bytes in `/proc/<pid>/comm`.
const COMM_LEN: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Delivery {
    /// Look the target up in procfs and call kill(2) for every match.
    Direct,
    /// Shell out to `killall -s <SIGNAL> <name>`.
    Killall,
}

#[derive(Debug, Clone)]
pub struct Forwarder {
    target: String,
    signal: TriggerSignal,
    delivery: Delivery,
    proc_root: PathBuf,
}

impl Forwarder {
    pub fn new(target: impl Into<String>, signal: TriggerSignal, delivery: Delivery) -> Self {
        Self {
            target: target.into(),
            signal,
            delivery,
            proc_root: PathBuf::from("/proc"),
        }
    }

    /// Look processes up below `root` instead of `/proc`.
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    /// Pids of every process whose name matches the target.
    pub fn find_targets(&self) -> io::Result<Vec<i32>> {
        let wanted = truncate_comm(&self.target);
        let mut pids = Vec::new();
        for entry in fs::read_dir(&self.proc_root)? {
            let entry = entry?;
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<i32>().ok()) else {
                continue;
            };
            // The process may be gone by now.
            let Ok(comm) = fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };
            if comm.trim_end_matches('\n') == wanted {
                pids.push(pid);
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }

    /// Deliver one trigger. No acknowledgement, no retry.
    pub fn send(&self) -> Result<(), ForwardError> {
        match self.delivery {
            Delivery::Direct => {
                let pids = self.find_targets()?;
                if pids.is_empty() {
                    return Err(ForwardError::NotRunning { name: self.target.clone() });
                }
                for pid in pids {
                    debug!(pid, signal = %self.signal, "kill");
                    if unsafe { libc::kill(pid, self.signal.as_raw()) } == -1 {
                        return Err(ForwardError::Kill { pid, source: io::Error::last_os_error() });
                    }
                }
                Ok(())
            }
            Delivery::Killall => {
                let status = Command::new("killall")
                    .args(["-s", self.signal.name(), &self.target])
                    .status()
                    .map_err(ForwardError::Spawn)?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ForwardError::Killall(status))
                }
            }
        }
    }

    /// Send one trigger per line of `input` until it ends.
    ///
    /// Returns how many triggers were delivered. Delivery failures are
    /// logged and skipped.
    pub fn run<R: BufRead>(&self, input: R) -> io::Result<usize> {
        let mut sent = 0;
        for line in input.lines() {
            line?;
            match self.send() {
                Ok(()) => {
                    sent += 1;
                    info!(target_process = %self.target, signal = %self.signal, "trigger sent");
                }
                Err(e) => warn!(error = %e, "trigger not delivered"),
            }
        }
        Ok(sent)
    }
}

fn truncate_comm(name: &str) -> &str {
    if name.len() <= COMM_LEN {
        return name;
    }
    let mut end = COMM_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
