//! Launch the engine and follow its progress.
use crate::process::{ProcessTable, detached_children_of, terminate};
use crate::progress::{Progress, ProgressTracker, simulation_progress_bar};
use anyhow::{Context, Result, bail};
use log::{info, warn};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the interrupt flag is checked while waiting for output
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Returned when a run was stopped by an interrupt request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationInterrupted;

impl fmt::Display for SimulationInterrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Simulation interrupted")
    }
}

impl std::error::Error for SimulationInterrupted {}

/// Whether an error chain was caused by an interrupted run
pub fn is_interrupted(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<SimulationInterrupted>())
}

/// A command run through the platform shell
pub fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

// Read lines as text, replacing bytes that aren't valid UTF-8
fn read_lines_lossy<R: Read>(reader: R, mut sink: impl FnMut(String) -> bool) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                if !sink(line) {
                    break;
                }
            }
        }
    }
}

fn spawn_line_forwarder<R: Read + Send + 'static>(reader: R, tx: Sender<String>) {
    thread::spawn(move || read_lines_lossy(reader, |line| tx.send(line).is_ok()));
}

fn spawn_line_collector<R: Read + Send + 'static>(reader: R) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut lines = Vec::new();
        read_lines_lossy(reader, |line| {
            lines.push(line);
            true
        });
        lines
    })
}

/// Runs engine commands, cleaning up after them when interrupted
pub struct SimulationRunner {
    interrupt: Arc<AtomicBool>,
    table: Box<dyn ProcessTable>,
}

impl SimulationRunner {
    pub fn new(interrupt: Arc<AtomicBool>, table: Box<dyn ProcessTable>) -> Self {
        SimulationRunner { interrupt, table }
    }

    /// Run `command` with a console progress bar of `timesteps` steps
    pub fn run(&mut self, command: &str, timesteps: u64) -> Result<()> {
        let mut pb = simulation_progress_bar(timesteps)?;
        let result = self.run_with_progress(command, &mut pb);
        pb.finish();
        result
    }

    /// Run `command` until it exits, reporting time steps to `progress`.
    ///
    /// Stderr is collected while the engine runs and logged once stdout closes. If the interrupt
    /// flag is raised, the engine and its detached workers are terminated and the returned error
    /// is [`SimulationInterrupted`].
    pub fn run_with_progress(&mut self, command: &str, progress: &mut dyn Progress) -> Result<()> {
        info!("Running: {}", command);
        let mut child = shell_command(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start simulation: {}", command))?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_forwarder(stdout, tx);
        }
        let stderr = child.stderr.take().map(spawn_line_collector);

        let mut tracker = ProgressTracker::new();
        loop {
            if self.interrupt.load(Ordering::SeqCst) {
                return self.abort(&mut child);
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    tracker.feed(&line, progress);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // The engine may have been stopped by the same signal
        if self.interrupt.load(Ordering::SeqCst) {
            return self.abort(&mut child);
        }

        if let Some(handle) = stderr {
            for line in handle.join().unwrap_or_default() {
                if !line.trim().is_empty() {
                    info!("{}", line.trim());
                }
            }
        }

        let status = child
            .wait()
            .with_context(|| format!("Failed to wait for simulation: {}", command))?;
        if !status.success() {
            warn!("Simulation finished at time step {}", tracker.last_step());
            bail!("Simulation exited with {}", status);
        }

        Ok(())
    }

    fn abort(&mut self, child: &mut Child) -> Result<()> {
        warn!("Simulation interrupted. Terminating the process...");
        let orphans = detached_children_of(self.table.as_mut(), child.id()).unwrap_or_else(|e| {
            warn!("Could not look up detached engine processes: {:#}", e);
            Vec::new()
        });
        terminate(child, &orphans, self.table.as_mut())?;
        info!("Process terminated successfully.");

        Err(SimulationInterrupted.into())
    }
}
