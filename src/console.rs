//! Operator console: a line-oriented command protocol for inspecting and
//! reconfiguring the running machine.
//!
//! Commands: `echo …`, `mount <drive> <image-spec>`, `getdisks`,
//! `dump cpu|mach|disk <name>`, `reset`, `quit`.  Every reply is one line
//! starting with `ok` or `error`; embedded newlines fold to `;`.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use log::info;

use crate::config::split_args;
use crate::disk::disk::load_disk_image;
use crate::h89_emu::machine::Machine;

/// A console request and the channel its reply goes back on.
pub struct ConsoleRequest {
    pub line: String,
    pub reply: Sender<String>,
}

/// Service console requests until the channel closes or `quit` arrives.
/// Each command takes the system lock for its whole duration, like any
/// other front-end poking at machine state.
pub fn serve(machine: Arc<Mutex<Machine>>, requests: Receiver<ConsoleRequest>) {
    for request in requests {
        let response = handle_command(&machine, &request.line);
        let quitting = response.is_none();
        let _ = request
            .reply
            .send(response.unwrap_or_else(|| "ok".to_string()));
        if quitting {
            info!("console requested shutdown");
            break;
        }
    }
}

/// Run one command.  `None` means `quit`.
pub fn handle_command(machine: &Arc<Mutex<Machine>>, line: &str) -> Option<String> {
    let args = split_args(line);
    let Some(cmd) = args.first() else {
        return Some("ok".to_string());
    };

    match cmd.as_str() {
        "quit" => None,
        "echo" => Some(format!("ok {}", args[1..].join(" "))),
        "reset" => {
            let mut m = lock(machine);
            m.reset();
            Some("ok".to_string())
        }
        "mount" => Some(cmd_mount(machine, &args)),
        "getdisks" => {
            let m = lock(machine);
            Some(format!("ok {}", m.disk_listing()))
        }
        "dump" => Some(cmd_dump(machine, &args)),
        _ => Some(format!("error badcmd: {}", line)),
    }
}

fn cmd_mount(machine: &Arc<Mutex<Machine>>, args: &[String]) -> String {
    if args.len() < 3 {
        return format!("error syntax: {}", args.join(" "));
    }
    let ident = &args[1];
    let spec = &args[2..];

    let disk = match load_disk_image(spec) {
        Ok(disk) => disk,
        Err(e) => return format!("error badimage: {}", e),
    };

    let mut m = lock(machine);
    match m.drive_mut(ident) {
        Some(drive) => {
            drive.insert_disk(disk);
            "ok".to_string()
        }
        None => format!("error nodrive: {}", ident),
    }
}

fn cmd_dump(machine: &Arc<Mutex<Machine>>, args: &[String]) -> String {
    let Some(what) = args.get(1) else {
        return "error syntax: dump cpu|mach|disk <name>".to_string();
    };
    let m = lock(machine);
    let text = match what.as_str() {
        "cpu" => Some(m.dump_cpu()),
        "mach" => Some(m.dump_machine()),
        "disk" => match args.get(2) {
            Some(name) => match m.dump_disk(name) {
                Some(text) => Some(text),
                None => return format!("error no device {}", name),
            },
            None => return "error syntax: dump disk <name>".to_string(),
        },
        _ => None,
    };
    match text {
        Some(text) => cleanse(format!("ok {}", text)),
        None => format!("error badcmd: dump {}", what),
    }
}

/// Replies are single lines; fold interior newlines.
fn cleanse(text: String) -> String {
    text.trim_end_matches('\n').replace('\n', ";")
}

fn lock(machine: &Arc<Mutex<Machine>>) -> std::sync::MutexGuard<'_, Machine> {
    match machine.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
