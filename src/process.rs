//! Finding and terminating engine processes.
//!
//! The engine spawns worker processes detached from its own process tree, so they can't be found
//! by walking children. Instead any process whose name contains [`ENGINE_NAME_PATTERN`] and which
//! was created within [`ORPHAN_WINDOW_SECS`] of the main process is treated as one of its workers.
//! Unrelated engine processes started in the same window will be matched too.
use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::process::Child;
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// Substring identifying engine worker processes
pub const ENGINE_NAME_PATTERN: &str = "FemEngine";

/// Half-width of the creation time window, in seconds
pub const ORPHAN_WINDOW_SECS: u64 = 30;

/// A row of the OS process table
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// Creation time in seconds since the Unix epoch
    pub create_time: u64,
}

/// Access to the OS process table
pub trait ProcessTable {
    /// Snapshot of all running processes
    fn processes(&mut self) -> Vec<ProcessInfo>;

    /// Creation time of `pid`, or `None` if no such process exists
    fn create_time(&mut self, pid: u32) -> Option<u64>;

    /// Terminate `pid` and wait for it to exit.
    ///
    /// Returns `Ok(false)` if the process no longer exists.
    fn terminate(&mut self, pid: u32) -> Result<bool>;
}

/// [`ProcessTable`] backed by `sysinfo`
pub struct SystemProcessTable {
    system: System,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        SystemProcessTable {
            system: System::new_with_specifics(
                RefreshKind::new().with_processes(ProcessRefreshKind::new()),
            ),
        }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        self.system.refresh_processes();
        self.system
            .processes()
            .values()
            .map(|process| ProcessInfo {
                pid: process.pid().as_u32(),
                name: process.name().to_string(),
                create_time: process.start_time(),
            })
            .collect()
    }

    fn create_time(&mut self, pid: u32) -> Option<u64> {
        let pid = Pid::from_u32(pid);
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system.process(pid).map(|process| process.start_time())
    }

    fn terminate(&mut self, pid: u32) -> Result<bool> {
        let pid = Pid::from_u32(pid);
        if !self.system.refresh_process(pid) {
            return Ok(false);
        }
        let Some(process) = self.system.process(pid) else {
            return Ok(false);
        };

        if !process.kill() {
            bail!("Could not send kill signal to process {}", pid);
        }
        process.wait();
        Ok(true)
    }
}

/// Whether `create_time` lies in the inclusive window around `start_time`
fn in_window(create_time: u64, start_time: u64) -> bool {
    let window_start = start_time.saturating_sub(ORPHAN_WINDOW_SECS);
    let window_end = start_time.saturating_add(ORPHAN_WINDOW_SECS);
    (window_start..=window_end).contains(&create_time)
}

/// Engine processes created within the window around `start_time`
pub fn find_detached_children(table: &mut dyn ProcessTable, start_time: u64) -> Vec<ProcessInfo> {
    table
        .processes()
        .into_iter()
        .filter(|candidate| {
            candidate.name.contains(ENGINE_NAME_PATTERN)
                && in_window(candidate.create_time, start_time)
        })
        .collect()
}

/// Detached engine workers belonging to the process `pid`
pub fn detached_children_of(table: &mut dyn ProcessTable, pid: u32) -> Result<Vec<ProcessInfo>> {
    let start_time = table
        .create_time(pid)
        .with_context(|| format!("Process {} not found in process table", pid))?;

    let children = find_detached_children(table, start_time);
    debug!(
        "Found {} detached engine processes around process {}",
        children.len(),
        pid
    );
    Ok(children)
}

/// Terminate each detached process, skipping any that have already exited.
///
/// Returns the number of processes that were terminated.
pub fn terminate_detached(table: &mut dyn ProcessTable, orphans: &[ProcessInfo]) -> usize {
    let mut terminated = 0;
    for orphan in orphans {
        match table.terminate(orphan.pid) {
            Ok(true) => {
                info!("Terminated engine process {} ({})", orphan.pid, orphan.name);
                terminated += 1;
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to terminate process {}: {:#}", orphan.pid, e),
        }
    }
    terminated
}

/// Kill the main engine process and wait for it, then terminate its detached workers
pub fn terminate(
    child: &mut Child,
    orphans: &[ProcessInfo],
    table: &mut dyn ProcessTable,
) -> Result<()> {
    if let Err(e) = child.kill() {
        // Already exited
        debug!("Kill of process {} failed: {}", child.id(), e);
    }
    child
        .wait()
        .with_context(|| format!("Failed to wait for process {}", child.id()))?;

    terminate_detached(table, orphans);
    Ok(())
}
