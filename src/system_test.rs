//! Whole-machine tests: Z80 programs in RAM driving the real IO map, the
//! 2 ms timer, and the H-37 disk card, paced by the same step/timer calls
//! the threads make.

use crate::config::Config;
use crate::cpu::StepResult;
use crate::disk::sector::Sector;
use crate::disk::store::SectorStore;
use crate::disk::track::{Density, Track};
use crate::h89_emu::machine::Machine;

fn machine_with_h37() -> Machine {
    let config = Config::parse("h37_drive1=FDD_5_25_SS_ST\n");
    let mut machine = Machine::build(&config).unwrap();

    let mut store = SectorStore::new(false);
    for t in 0..40u8 {
        let mut trk = Track::new(0, t);
        trk.set_density(Density::Single);
        for n in 1..=10u8 {
            let data: Vec<u8> = (0..256u32).map(|i| (t as u32 * 31 + n as u32 * 7 + i) as u8).collect();
            trk.add_sector(Sector::new(0, t, n, data));
        }
        store.add_track(trk);
    }
    machine
        .drive_mut("H37-1")
        .unwrap()
        .insert_disk(Box::new(store));
    machine
}

/// Step the machine like the CPU and timer threads do, until the CPU
/// halts or the tick limit runs out.
fn run_until_halt(machine: &mut Machine, max_slices: u32) {
    for _ in 0..max_slices {
        loop {
            if machine.cpu.halted() {
                return;
            }
            if machine.step_instruction() == StepResult::OutOfBudget {
                break;
            }
        }
        machine.timer_event();
    }
    panic!("program never halted");
}

/// Load a program into RAM and point the CPU at it.
fn load_program(machine: &mut Machine, addr: u16, code: &[u8]) {
    let decoder = machine.body.mem.decoder_mut();
    decoder.disable_rom();
    for (i, b) in code.iter().enumerate() {
        machine.body.mem.write_byte(addr + i as u16, *b);
    }
    machine.cpu.pc = addr;
    machine.cpu.sp = 0xFF00;
}

#[test]
fn z80_program_reads_a_sector_through_the_h37() {
    let mut machine = machine_with_h37();

    // Select drive 0, motors on; program track 0 sector 5; issue a read
    // and poll status, copying each DRQ byte to 0x3000.
    #[rustfmt::skip]
    let program = [
        0x3E, 0x81, 0xD3, 0x78, // LD A,81h ; OUT (78h),A   drive 0 + motors
        0x3E, 0x01, 0xD3, 0x79, // LD A,01h ; OUT (79h),A   sector/track access
        0x3E, 0x05, 0xD3, 0x7A, // LD A,05h ; OUT (7Ah),A   sector register
        0x3E, 0x00, 0xD3, 0x7B, // LD A,00h ; OUT (7Bh),A   track register
        0xAF, 0xD3, 0x79,       // XOR A    ; OUT (79h),A   command/data access
        0x3E, 0x80, 0xD3, 0x7A, // LD A,80h ; OUT (7Ah),A   read sector
        0x21, 0x00, 0x30,       // LD HL,3000h
        // poll:
        0xDB, 0x7A,             // IN A,(7Ah)               status
        0xCB, 0x47,             // BIT 0,A                  busy?
        0x28, 0x0A,             // JR Z,done
        0xCB, 0x4F,             // BIT 1,A                  data request?
        0x28, 0xF6,             // JR Z,poll
        0xDB, 0x7B,             // IN A,(7Bh)               data byte
        0x77,                   // LD (HL),A
        0x23,                   // INC HL
        0x18, 0xF0,             // JR poll
        // done:
        0x76,                   // HALT
    ];
    load_program(&mut machine, 0x2000, &program);

    run_until_halt(&mut machine, 2000);

    let expected: Vec<u8> = (0..256u32).map(|i| (5 * 7 + i) as u8).collect();
    let got: Vec<u8> = (0..256u16)
        .map(|i| machine.body.mem.read_byte(0x3000 + i))
        .collect();
    assert_eq!(got, expected);
}

#[test]
fn timer_interrupt_reaches_the_vector() {
    let mut machine = Machine::build(&Config::default()).unwrap();

    // ORG-0 so the vector area is RAM, then IM 1 / EI, enable the 2 ms
    // interrupt through the GPP, and wait.
    #[rustfmt::skip]
    let program = [
        0xED, 0x56,             // IM 1
        0x3E, 0x22, 0xD3, 0xF2, // LD A,22h ; OUT (F2h),A   timer en + ORG-0
        0xFB,                   // EI
        0x00,                   // NOP (EI delay)
        0x76,                   // HALT
    ];
    load_program(&mut machine, 0x2000, &program);
    // The interrupt handler: mark memory and halt for the test harness.
    machine.body.mem.write_byte(0x0038, 0x3E); // LD A,5Ah
    machine.body.mem.write_byte(0x0039, 0x5A);
    machine.body.mem.write_byte(0x003A, 0x32); // LD (4000h),A
    machine.body.mem.write_byte(0x003B, 0x00);
    machine.body.mem.write_byte(0x003C, 0x40);
    machine.body.mem.write_byte(0x003D, 0x76); // HALT

    // First pass runs to the HALT; the timer then wakes the CPU into the
    // handler, which halts again with the marker written.
    for _ in 0..100 {
        if machine.body.mem.read_byte(0x4000) == 0x5A {
            break;
        }
        loop {
            if machine.cpu.halted() {
                break;
            }
            if machine.step_instruction() == StepResult::OutOfBudget {
                break;
            }
        }
        machine.timer_event();
        // Halted CPUs still burn halt cycles so interrupts get sampled.
        for _ in 0..4 {
            machine.step_instruction();
        }
    }
    assert_eq!(machine.body.mem.read_byte(0x4000), 0x5A);
}

#[test]
fn nmi_port_access_traps_to_0x66() {
    let mut machine = Machine::build(&Config::default()).unwrap();

    #[rustfmt::skip]
    let program = [
        0xDB, 0xF0, // IN A,(F0h): any access raises NMI
        0x00,       // never reached before the NMI is taken
    ];
    load_program(&mut machine, 0x2000, &program);
    machine.body.mem.write_byte(0x0066, 0x76); // HALT at the NMI vector

    run_until_halt(&mut machine, 100);
    assert_eq!(machine.cpu.pc, 0x0067);
}

#[test]
fn getdisks_reflects_mounts() {
    let machine = machine_with_h37();
    let listing = machine.disk_listing();
    assert_eq!(listing, "H37-1=scratch");
}
