//! Z89, a Heathkit H89 / Zenith Z-89 emulator.
//!
//! Three threads share the machine behind one coarse lock: the CPU thread
//! runs the interpreter (locking per instruction), the timer thread fires
//! every 2 ms to advance virtual time and refill the CPU's tick budget,
//! and the console thread services the operator protocol on stdin.

mod config;
mod console;
mod cpu;
mod disk;
mod h89_emu;

#[cfg(test)]
mod system_test;

use std::io::BufRead;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded};
use log::{error, info};

use config::Config;
use console::ConsoleRequest;
use cpu::StepResult;
use h89_emu::machine::Machine;

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => match Config::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                error!("cannot load configuration: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    let machine = match Machine::build(&config) {
        Ok(machine) => machine,
        Err(e) => {
            error!("cannot build machine: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let machine = Arc::new(Mutex::new(machine));
    let running = Arc::new(AtomicBool::new(true));

    // One pending wake-up at most; the CPU drains it when it runs dry.
    let (wake_tx, wake_rx) = bounded::<()>(1);

    // ── 2 ms timer thread ─────────────────────────────────────
    let timer_machine = Arc::clone(&machine);
    let timer_running = Arc::clone(&running);
    let timer_thread = thread::spawn(move || {
        let ticker = crossbeam_channel::tick(Duration::from_millis(2));
        while timer_running.load(Ordering::Relaxed) {
            let _ = ticker.recv();
            if let Ok(mut m) = timer_machine.lock() {
                m.timer_event();
            }
            let _ = wake_tx.try_send(());
        }
    });

    // ── CPU thread ────────────────────────────────────────────
    let cpu_machine = Arc::clone(&machine);
    let cpu_running = Arc::clone(&running);
    let cpu_thread = thread::spawn(move || {
        info!("CPU running");
        while cpu_running.load(Ordering::Relaxed) {
            // Hold the lock for one instruction, then let the timer and
            // console in.
            let result = match cpu_machine.lock() {
                Ok(mut m) => m.step_instruction(),
                Err(_) => break,
            };
            if result == StepResult::OutOfBudget {
                // Slice spent; sleep until the timer refills the budget.
                if wake_rx.recv_timeout(Duration::from_secs(1)).is_err()
                    && !cpu_running.load(Ordering::Relaxed)
                {
                    break;
                }
            }
        }
        info!("CPU stopped");
    });

    // ── Operator console ──────────────────────────────────────
    let (req_tx, req_rx) = unbounded::<ConsoleRequest>();
    let console_machine = Arc::clone(&machine);
    let console_thread = thread::spawn(move || {
        console::serve(console_machine, req_rx);
    });

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let (reply_tx, reply_rx) = bounded(1);
        if req_tx
            .send(ConsoleRequest {
                line: line.clone(),
                reply: reply_tx,
            })
            .is_err()
        {
            break;
        }
        match reply_rx.recv() {
            Ok(response) => println!("{}", response),
            Err(_) => break,
        }
        if line.trim() == "quit" {
            break;
        }
    }

    running.store(false, Ordering::Relaxed);
    drop(req_tx);
    let _ = console_thread.join();
    let _ = cpu_thread.join();
    let _ = timer_thread.join();
    ExitCode::SUCCESS
}
