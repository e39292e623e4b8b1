//! Runs real shell commands through the simulation runner
#![cfg(unix)]

use anyhow::Result;
use manning_tune::process::{ProcessInfo, ProcessTable};
use manning_tune::progress::Progress;
use manning_tune::runner::{SimulationRunner, is_interrupted};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Process table with nothing in it
struct EmptyTable;

impl ProcessTable for EmptyTable {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        Vec::new()
    }

    fn create_time(&mut self, _pid: u32) -> Option<u64> {
        None
    }

    fn terminate(&mut self, _pid: u32) -> Result<bool> {
        Ok(false)
    }
}

const START: u64 = 1_700_000_000;

/// What [`EngineTable`] was asked to do
#[derive(Default)]
struct TableLog {
    looked_up: Vec<u32>,
    terminated: Vec<u32>,
}

/// Process table reporting every process as started at [`START`], with two engine workers
struct EngineTable(Arc<Mutex<TableLog>>);

impl ProcessTable for EngineTable {
    fn processes(&mut self) -> Vec<ProcessInfo> {
        vec![
            ProcessInfo {
                pid: 900_001,
                name: "FemEngineHD".to_string(),
                create_time: START + 5,
            },
            ProcessInfo {
                pid: 900_002,
                name: "FemEngineHD".to_string(),
                create_time: START + 600,
            },
        ]
    }

    fn create_time(&mut self, pid: u32) -> Option<u64> {
        self.0.lock().unwrap().looked_up.push(pid);
        Some(START)
    }

    fn terminate(&mut self, pid: u32) -> Result<bool> {
        self.0.lock().unwrap().terminated.push(pid);
        Ok(true)
    }
}

#[derive(Default)]
struct Steps(u64);

impl Progress for Steps {
    fn advance(&mut self, steps: u64) {
        self.0 += steps;
    }
}

fn runner(interrupt: bool) -> SimulationRunner {
    SimulationRunner::new(
        Arc::new(AtomicBool::new(interrupt)),
        Box::new(EmptyTable),
    )
}

#[test]
fn test_progress_from_engine_output() {
    let command = concat!(
        "printf 'Starting\\nTime step: 5\\nTime step: 12\\nTime step: oops\\nTime step: 12\\n'; ",
        "echo 'warning: dry cells' >&2"
    );
    let mut steps = Steps::default();

    runner(false).run_with_progress(command, &mut steps).unwrap();

    assert_eq!(steps.0, 12);
}

#[test]
fn test_non_zero_exit_is_an_error() {
    let mut steps = Steps::default();
    let err = runner(false)
        .run_with_progress("echo 'Time step: 3'; exit 4", &mut steps)
        .unwrap_err();

    assert!(!is_interrupted(&err));
    assert_eq!(steps.0, 3);
}

#[test]
fn test_interrupt_terminates_engine() {
    let interrupt = Arc::new(AtomicBool::new(false));
    let mut runner = SimulationRunner::new(interrupt.clone(), Box::new(EmptyTable));

    let flag = interrupt.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        flag.store(true, Ordering::SeqCst);
    });

    let started = Instant::now();
    let mut steps = Steps::default();
    let err = runner
        .run_with_progress("echo 'Time step: 1'; exec sleep 30", &mut steps)
        .unwrap_err();
    trigger.join().unwrap();

    assert!(is_interrupted(&err));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(steps.0, 1);
}

#[test]
fn test_interrupt_terminates_detached_workers() {
    let interrupt = Arc::new(AtomicBool::new(false));
    let table_log = Arc::new(Mutex::new(TableLog::default()));
    let mut runner = SimulationRunner::new(
        interrupt.clone(),
        Box::new(EngineTable(table_log.clone())),
    );

    let flag = interrupt.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        flag.store(true, Ordering::SeqCst);
    });

    let mut steps = Steps::default();
    let err = runner
        .run_with_progress("exec sleep 30", &mut steps)
        .unwrap_err();
    trigger.join().unwrap();

    assert!(is_interrupted(&err));
    let table_log = table_log.lock().unwrap();
    assert_eq!(table_log.looked_up.len(), 1);
    assert_eq!(table_log.terminated, vec![900_001]);
}
