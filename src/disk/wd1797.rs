//! WD1797 floppy-disk controller.
//!
//! Four registers (Command/Status, Track, Sector, Data) and the four
//! command classes: type I seeks, type II sector transfers, type III
//! track/address operations, type IV force-interrupt.  The controller is
//! pure state; the owning card supplies the drive and recording mode per
//! call and applies the returned INTRQ/DRQ line transitions.

use log::{debug, info, warn};

use super::drive::FloppyDrive;
use super::format;

// ── Register offsets within the chip ──────────────────────────

pub const STATUS_REG: u8 = 0;
pub const COMMAND_REG: u8 = 0;
pub const TRACK_REG: u8 = 1;
pub const SECTOR_REG: u8 = 2;
pub const DATA_REG: u8 = 3;

// ── Status bits ───────────────────────────────────────────────

pub const STAT_NOT_READY: u8 = 0x80;
pub const STAT_WRITE_PROTECT: u8 = 0x40;
pub const STAT_HEAD_LOADED: u8 = 0x20; // type I
pub const STAT_WRITE_FAULT: u8 = 0x20; // type II/III writes
pub const STAT_SEEK_ERROR: u8 = 0x10; // type I
pub const STAT_RECORD_NOT_FOUND: u8 = 0x10; // type II/III
pub const STAT_CRC_ERROR: u8 = 0x08;
pub const STAT_TRACK_ZERO: u8 = 0x04; // type I
pub const STAT_LOST_DATA: u8 = 0x04; // type II/III
pub const STAT_INDEX_PULSE: u8 = 0x02; // type I
pub const STAT_DATA_REQUEST: u8 = 0x02; // type II/III
pub const STAT_BUSY: u8 = 0x01;

// ── Command option bits ───────────────────────────────────────

const OPT_STEP_RATE_MASK: u8 = 0x03;
const OPT_VERIFY: u8 = 0x04;
const OPT_HEAD_LOAD: u8 = 0x08;
const OPT_TRACK_UPDATE: u8 = 0x10;
const OPT_MULTIPLE: u8 = 0x10;
const OPT_DELETE_DAM: u8 = 0x01;
const OPT_SIDE: u8 = 0x02;
const OPT_SIDE_SHIFT: u8 = 1;
const OPT_DELAY_15MS: u8 = 0x04;
const OPT_SECTOR_LENGTH: u8 = 0x08;

// Type IV event triggers.
const OPT_IMMEDIATE_INT: u8 = 0x08;
const OPT_INDEX_PULSE_INT: u8 = 0x04;
const OPT_READY_TO_NOT_READY: u8 = 0x02;
const OPT_NOT_READY_TO_READY: u8 = 0x01;

/// Step rates in milliseconds at a 2 MHz chip clock; a 1 MHz clock (5.25"
/// cards) doubles them.
const STEP_SPEEDS_MS: [u32; 4] = [3, 6, 10, 15];

/// Clock ticks per millisecond of virtual time (2.048 MHz CPU clock).
const TICKS_PER_MS: u64 = 2048;

/// Host catch-up delay before a type II/III command starts moving bytes.
const HEAD_SETTLE_TICKS: u64 = 1000;
/// Delay between latching a command and starting it, so the host may still
/// switch the selected drive.
const COMMAND_LATCH_TICKS: u64 = 50;

/// Sentinel sector positions: before the address mark / after completion.
const SECTOR_POS_INITIAL: i32 = -1000;
const SECTOR_POS_DONE: i32 = -2000;

/// Consecutive unconsumed-byte polls tolerated before LostData.
const MISS_LIMIT: u32 = 4;

// ── Line transitions toward the owning card ───────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    RaiseIntrq,
    LowerIntrq,
    RaiseDrq,
    LowerDrq,
}

pub type Signals = Vec<LineOp>;

/// Per-call wiring the card provides.
pub struct FdcBus<'a> {
    pub drive: Option<&'a mut FloppyDrive>,
    /// MFM recording selected by the card.
    pub double_density: bool,
    /// Chip clock period in nanoseconds: 500 for 8" media, 1000 for 5.25".
    pub clock_period_ns: u32,
    /// The H-37 wires READY to +5 V.
    pub ready_tied_high: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Restore,
    Seek,
    Step,
    StepDone,
    ReadSector,
    WriteSector,
    ReadAddress,
    ReadTrack,
    WriteTrack,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

pub struct Wd1797 {
    track_reg: u8,
    sector_reg: u8,
    data_reg: u8,
    cmd_reg: u8,
    status: u8,

    data_ready: bool,
    intrq_raised: bool,
    drq_raised: bool,
    head_loaded: bool,
    sector_length_code: u8,
    last_index: bool,
    index_count: u32,
    step_update: bool,
    step_settle: u64,
    miss_count: u32,

    seek_speed_ms: u32,
    verify_track: bool,
    multiple: bool,
    delay: bool,
    side: u8,
    delete_dam: bool,

    cur_command: Command,
    step_direction: Direction,
    cur_pos: u64,
    sector_pos: i32,

    /// Force-interrupt event triggers armed by a type IV command.
    intrq_event_mask: u8,
    last_ready: bool,
}

impl Wd1797 {
    pub fn new() -> Self {
        Self {
            track_reg: 0,
            sector_reg: 0,
            data_reg: 0,
            cmd_reg: 0,
            status: 0,
            data_ready: false,
            intrq_raised: false,
            drq_raised: false,
            head_loaded: false,
            sector_length_code: 0,
            last_index: false,
            index_count: 0,
            step_update: false,
            step_settle: 0,
            miss_count: 0,
            seek_speed_ms: 0,
            verify_track: false,
            multiple: false,
            delay: false,
            side: 0,
            delete_dam: false,
            cur_command: Command::None,
            step_direction: Direction::Out,
            cur_pos: 0,
            sector_pos: SECTOR_POS_INITIAL,
            intrq_event_mask: 0,
            last_ready: false,
        }
    }

    pub fn reset(&mut self) {
        self.track_reg = 0;
        self.sector_reg = 0;
        self.data_reg = 0;
        self.cmd_reg = 0;
        self.status = 0;
        self.data_ready = false;
        self.intrq_raised = false;
        self.drq_raised = false;
        self.head_loaded = false;
        self.sector_length_code = 0;
        self.last_index = false;
        self.index_count = 0;
        self.step_update = false;
        self.step_settle = 0;
        self.miss_count = 0;
        self.seek_speed_ms = 0;
        self.verify_track = false;
        self.multiple = false;
        self.delay = false;
        self.side = 0;
        self.delete_dam = false;
        self.cur_command = Command::None;
        self.step_direction = Direction::Out;
        // cur_pos stays; the diskette keeps spinning across resets
        self.sector_pos = SECTOR_POS_INITIAL;
        self.intrq_event_mask = 0;
    }

    // ── Latches the card reads ────────────────────────────────

    pub fn intrq_raised(&self) -> bool {
        self.intrq_raised
    }

    pub fn drq_raised(&self) -> bool {
        self.drq_raised
    }

    pub fn busy(&self) -> bool {
        self.status & STAT_BUSY != 0
    }

    pub fn dump_debug(&self) -> String {
        format!(
            "FDC-STS={:02x} FDC-CMD={:02x}\nFDC-TRK={} FDC-SEC={} FDC-DAT={:02x} L={}\nDRQ={} INTRQ={}\n",
            self.status,
            self.cmd_reg,
            self.track_reg,
            self.sector_reg,
            self.data_reg,
            self.sector_length_code,
            self.drq_raised as u8,
            self.intrq_raised as u8
        )
    }

    // ── Register file ─────────────────────────────────────────

    pub fn read(&mut self, reg: u8) -> (u8, Signals) {
        let mut sig = Signals::new();
        let val = match reg {
            STATUS_REG => {
                self.lower_intrq(&mut sig);
                self.status
            }
            TRACK_REG => self.track_reg,
            SECTOR_REG => self.sector_reg,
            DATA_REG => {
                self.data_ready = false;
                self.status &= !STAT_DATA_REQUEST;
                self.lower_drq(&mut sig);
                self.data_reg
            }
            _ => {
                warn!("read of unknown FDC register {}", reg);
                0
            }
        };
        (val, sig)
    }

    pub fn write(&mut self, reg: u8, val: u8, bus: &mut FdcBus) -> Signals {
        let mut sig = Signals::new();
        match reg {
            COMMAND_REG => {
                // Tolerate a drive-select change after the command byte:
                // nothing touches the drive until the settle expires.
                self.index_count = 0;
                self.cmd_reg = val;
                self.process_cmd(val, bus, &mut sig);
            }
            TRACK_REG => self.track_reg = val,
            SECTOR_REG => self.sector_reg = val,
            DATA_REG => {
                self.data_reg = val;
                self.data_ready = true;
                self.lower_drq(&mut sig);
            }
            _ => warn!("write of unknown FDC register {}", reg),
        }
        sig
    }

    // ── Command dispatch ──────────────────────────────────────

    fn process_cmd(&mut self, cmd: u8, bus: &mut FdcBus, sig: &mut Signals) {
        debug!("FDC cmd {:#04x}", cmd);

        if cmd & 0xF0 == 0xD0 {
            self.process_type_iv(cmd, bus, sig);
            return;
        }

        if self.busy() {
            warn!("command {:#04x} while busy", cmd);
        }
        self.intrq_event_mask = 0;

        // Busy set, everything else cleared.
        self.status = STAT_BUSY;

        if cmd & 0x80 == 0 {
            self.process_type_i(cmd, bus, sig);
        } else if cmd & 0x40 == 0 {
            self.process_type_ii(cmd, sig);
        } else {
            self.process_type_iii(cmd, sig);
        }
    }

    fn process_type_i(&mut self, cmd: u8, bus: &FdcBus, sig: &mut Signals) {
        self.verify_track = cmd & OPT_VERIFY != 0;
        self.seek_speed_ms = STEP_SPEEDS_MS[(cmd & OPT_STEP_RATE_MASK) as usize];
        if bus.clock_period_ns > 500 {
            self.seek_speed_ms *= 2;
        }
        self.lower_drq(sig);
        self.data_ready = false;
        self.head_loaded = cmd & OPT_HEAD_LOAD != 0;
        self.step_update = false;
        self.status &= !(STAT_CRC_ERROR | STAT_SEEK_ERROR);
        self.lower_intrq(sig);

        if cmd & 0xF0 == 0x00 {
            debug!("restore, {} ms/step", self.seek_speed_ms);
            self.cur_command = Command::Restore;
        } else if cmd & 0xC0 == 0x00 {
            debug!("seek to {}", self.data_reg);
            self.cur_command = Command::Seek;
            // Both 0001xxxx and 001Txxxx decode as seek on the 1797; assume
            // the plain form updates the track register as well.
            self.step_update = cmd & OPT_TRACK_UPDATE != 0;
        } else {
            self.cur_command = Command::Step;
            self.step_update = cmd & OPT_TRACK_UPDATE != 0;
            if cmd & 0x40 != 0 {
                self.step_direction = if cmd & 0x20 != 0 {
                    debug!("step out");
                    Direction::Out
                } else {
                    debug!("step in");
                    Direction::In
                };
            }
        }

        self.step_settle = COMMAND_LATCH_TICKS;
    }

    fn process_type_ii(&mut self, cmd: u8, sig: &mut Signals) {
        self.multiple = cmd & OPT_MULTIPLE != 0;
        self.delay = cmd & OPT_DELAY_15MS != 0;
        self.sector_length_code = if cmd & OPT_SECTOR_LENGTH != 0 { 1 } else { 0 };
        self.side = (cmd & OPT_SIDE) >> OPT_SIDE_SHIFT;
        self.head_loaded = true;
        self.lower_drq(sig);
        self.data_ready = false;
        self.sector_pos = SECTOR_POS_INITIAL;

        if cmd & 0x20 != 0 {
            self.delete_dam = cmd & OPT_DELETE_DAM != 0;
            if self.delete_dam {
                warn!("deleted data address mark not supported");
            }
            debug!("write sector {}", self.sector_reg);
            self.cur_command = Command::WriteSector;
        } else {
            debug!(
                "read sector {} multiple={} side={}",
                self.sector_reg, self.multiple, self.side
            );
            self.cur_command = Command::ReadSector;
        }

        self.step_settle = self.start_settle();
    }

    fn process_type_iii(&mut self, cmd: u8, sig: &mut Signals) {
        self.delay = cmd & OPT_DELAY_15MS != 0;
        self.side = (cmd & OPT_SIDE) >> OPT_SIDE_SHIFT;
        self.head_loaded = true;
        self.lower_drq(sig);
        self.data_ready = false;
        self.sector_pos = SECTOR_POS_INITIAL;

        match cmd & 0xF0 {
            0xC0 => {
                debug!("read address");
                self.cur_command = Command::ReadAddress;
            }
            0xF0 => {
                debug!("write track {}", self.track_reg);
                self.cur_command = Command::WriteTrack;
                self.raise_drq(sig);
            }
            0xE0 => {
                debug!("read track {}", self.track_reg);
                self.cur_command = Command::ReadTrack;
            }
            _ => {
                warn!("invalid type III command {:#04x}", cmd);
                self.status &= !STAT_BUSY;
                return;
            }
        }

        self.step_settle = self.start_settle();
    }

    /// Host catch-up time, extended by the E flag's 15 ms head delay.
    fn start_settle(&self) -> u64 {
        if self.delay {
            HEAD_SETTLE_TICKS + 15 * TICKS_PER_MS
        } else {
            HEAD_SETTLE_TICKS
        }
    }

    fn process_type_iv(&mut self, cmd: u8, bus: &mut FdcBus, sig: &mut Signals) {
        debug!("force interrupt {:#04x}", cmd);
        self.head_loaded = false;

        if self.busy() {
            // Abort whatever was running.
            self.cur_command = Command::None;
            self.status &= !STAT_BUSY;
        } else if let Some(drive) = bus.drive.as_deref() {
            // Idle: refresh the type I status picture from the drive.
            self.status &= !(STAT_SEEK_ERROR | STAT_CRC_ERROR);
            self.status &= !(STAT_TRACK_ZERO | STAT_WRITE_PROTECT | STAT_HEAD_LOADED
                | STAT_INDEX_PULSE | STAT_NOT_READY);
            if drive.track_zero() {
                self.status |= STAT_TRACK_ZERO;
            }
            if drive.is_write_protect() {
                self.status |= STAT_WRITE_PROTECT;
            }
            if self.head_loaded {
                self.status |= STAT_HEAD_LOADED;
            }
            if drive.index_pulse() {
                self.status |= STAT_INDEX_PULSE;
            }
            if !(bus.ready_tied_high || drive.is_ready()) {
                self.status |= STAT_NOT_READY;
            }
            self.cur_command = Command::None;
        } else {
            warn!("force interrupt with no drive");
            self.status |= STAT_NOT_READY;
            self.cur_command = Command::None;
        }

        self.intrq_event_mask = cmd & (OPT_INDEX_PULSE_INT | OPT_READY_TO_NOT_READY
            | OPT_NOT_READY_TO_READY);
        if cmd & OPT_IMMEDIATE_INT != 0 {
            self.status &= !STAT_BUSY;
            self.raise_intrq(sig);
        }
    }

    // ── Per-call helpers ──────────────────────────────────────

    fn raise_intrq(&mut self, sig: &mut Signals) {
        self.intrq_raised = true;
        sig.push(LineOp::RaiseIntrq);
    }

    fn lower_intrq(&mut self, sig: &mut Signals) {
        self.intrq_raised = false;
        sig.push(LineOp::LowerIntrq);
    }

    fn raise_drq(&mut self, sig: &mut Signals) {
        self.drq_raised = true;
        sig.push(LineOp::RaiseDrq);
    }

    fn lower_drq(&mut self, sig: &mut Signals) {
        self.drq_raised = false;
        sig.push(LineOp::LowerDrq);
    }

    /// Hand one byte to the host, noting an overrun if the previous byte
    /// was never consumed.
    fn transfer_data(&mut self, data: u8, sig: &mut Signals) {
        if self.data_ready {
            self.status |= STAT_LOST_DATA;
        }
        self.data_ready = true;
        self.data_reg = data;
        self.status |= STAT_DATA_REQUEST;
        self.raise_drq(sig);
    }

    fn finish_command(&mut self, sig: &mut Signals) {
        self.status &= !STAT_BUSY;
        self.raise_intrq(sig);
        self.cur_command = Command::None;
    }

    fn update_ready(&mut self, bus: &FdcBus, drive: &FloppyDrive) {
        if drive.is_write_protect() {
            self.status |= STAT_WRITE_PROTECT;
        } else {
            self.status &= !STAT_WRITE_PROTECT;
        }

        let ready = bus.ready_tied_high || drive.is_ready();
        if ready {
            self.status &= !STAT_NOT_READY;
        } else {
            self.status |= STAT_NOT_READY;
        }
    }

    /// Wait-a-little check shared by the byte-streaming read commands.
    /// Returns true while the host is behind and the byte should be held.
    fn host_behind(&mut self) -> bool {
        if self.data_ready {
            if self.status & STAT_LOST_DATA == 0 {
                self.miss_count += 1;
                if self.miss_count < MISS_LIMIT {
                    return true;
                }
            }
            self.status |= STAT_LOST_DATA;
        }
        self.miss_count = 0;
        false
    }

    // ── Clock notification ────────────────────────────────────

    pub fn notification(&mut self, ticks: u32, bus: &mut FdcBus) -> Signals {
        let mut sig = Signals::new();

        let Some(drive) = bus.drive.take() else {
            // No drive selected.  Without the READY pull-up this aborts any
            // running command.
            if !bus.ready_tied_high {
                self.status |= STAT_NOT_READY;
                if self.cur_command != Command::None {
                    self.cur_command = Command::None;
                    self.raise_intrq(&mut sig);
                    self.status &= !STAT_BUSY;
                }
            }
            return sig;
        };

        self.status &= !STAT_NOT_READY;
        drive.notification(ticks);

        let mut index_edge = false;
        if drive.index_pulse() {
            if !self.last_index {
                index_edge = true;
                self.index_count += 1;
            }
            self.last_index = true;
        } else {
            self.last_index = false;
        }

        self.update_ready(bus, drive);
        self.check_event_triggers(index_edge, bus.ready_tied_high || drive.is_ready(), &mut sig);

        if self.step_settle > 0 {
            if self.step_settle > ticks as u64 {
                self.step_settle -= ticks as u64;
                bus.drive = Some(drive);
                return sig;
            }
            self.step_settle = 0;
            self.miss_count = 0;
        }

        let char_pos = drive.char_pos(bus.double_density);
        if char_pos == self.cur_pos {
            bus.drive = Some(drive);
            return sig;
        }
        self.cur_pos = char_pos;

        // Seek family: one head movement per byte time.
        match self.cur_command {
            Command::Restore => {
                if !drive.track_zero() {
                    drive.step(false);
                    self.step_settle = self.step_ticks();
                } else {
                    self.track_reg = 0;
                    self.status |= STAT_TRACK_ZERO;
                    self.finish_command(&mut sig);
                }
            }
            Command::Seek => {
                if self.data_reg != self.track_reg {
                    let inward = self.data_reg > self.track_reg;
                    drive.step(inward);
                    self.track_reg = if inward {
                        self.track_reg.wrapping_add(1)
                    } else {
                        self.track_reg.wrapping_sub(1)
                    };
                    self.step_settle = self.step_ticks();
                } else {
                    if self.verify_track {
                        match drive.read_address() {
                            None => self.status |= STAT_CRC_ERROR,
                            Some((track, _sector, _side)) => {
                                if track != self.track_reg {
                                    self.status |= STAT_SEEK_ERROR;
                                } else if self.sector_reg != 0
                                    && !drive.verify_track_sector(track, self.sector_reg)
                                {
                                    // The ID field under the head never
                                    // checks out.
                                    self.status |= STAT_CRC_ERROR;
                                }
                            }
                        }
                    }
                    self.set_track_zero_from(drive);
                    self.finish_command(&mut sig);
                }
            }
            Command::Step => {
                match self.step_direction {
                    Direction::Out => {
                        if !drive.track_zero() {
                            drive.step(false);
                            self.step_settle = self.step_ticks();
                            if self.step_update {
                                self.track_reg = self.track_reg.wrapping_sub(1);
                            }
                        }
                    }
                    Direction::In => {
                        drive.step(true);
                        self.step_settle = self.step_ticks();
                        if self.step_update {
                            self.track_reg = self.track_reg.wrapping_add(1);
                        }
                    }
                }
                self.set_track_zero_from(drive);
                self.cur_command = Command::StepDone;
            }
            Command::StepDone => {
                self.set_track_zero_from(drive);
                self.finish_command(&mut sig);
            }
            _ => {}
        }

        // Data family: one byte per byte time.
        match self.cur_command {
            Command::Restore | Command::Seek | Command::Step | Command::StepDone
            | Command::None => {
                self.update_ready(bus, drive);
                if self.head_loaded {
                    self.status |= STAT_HEAD_LOADED;
                } else {
                    self.status &= !STAT_HEAD_LOADED;
                }
                if self.last_index {
                    self.status |= STAT_INDEX_PULSE;
                } else {
                    self.status &= !STAT_INDEX_PULSE;
                }
            }

            Command::ReadSector => {
                if !self.host_behind() {
                    drive.select_side(self.side);
                    let data = drive.read_data(
                        bus.double_density,
                        self.track_reg,
                        self.side,
                        self.sector_reg,
                        self.sector_pos,
                    );
                    self.advance_read_sector(data, drive, &mut sig);
                }
            }

            Command::ReadAddress => {
                if !self.host_behind() {
                    drive.select_side(self.side);
                    let data = drive.read_data(
                        bus.double_density,
                        self.track_reg,
                        self.side,
                        0xFD,
                        self.sector_pos,
                    );
                    self.advance_read_address(data, &mut sig);
                }
            }

            Command::WriteSector => {
                drive.select_side(self.side);
                let result = drive.write_data(
                    bus.double_density,
                    self.track_reg,
                    self.side,
                    self.sector_reg,
                    self.sector_pos,
                    self.data_reg,
                    self.data_ready,
                );
                self.advance_write(result, &mut sig);
            }

            Command::ReadTrack => {
                if !self.host_behind() {
                    drive.select_side(self.side);
                    let data = drive.read_data(
                        bus.double_density,
                        self.track_reg,
                        self.side,
                        0xFF,
                        self.sector_pos,
                    );
                    self.advance_read_track(data, &mut sig);
                }
            }

            Command::WriteTrack => {
                drive.select_side(self.side);
                let result = drive.write_data(
                    bus.double_density,
                    self.track_reg,
                    self.side,
                    0xFF,
                    self.sector_pos,
                    self.data_reg,
                    self.data_ready,
                );
                self.advance_write(result, &mut sig);
            }
        }

        bus.drive = Some(drive);
        sig
    }

    /// Per-step settle from the programmed step rate.
    fn step_ticks(&self) -> u64 {
        self.seek_speed_ms as u64 * TICKS_PER_MS
    }

    fn set_track_zero_from(&mut self, drive: &FloppyDrive) {
        if drive.track_zero() {
            self.status |= STAT_TRACK_ZERO;
        } else {
            self.status &= !STAT_TRACK_ZERO;
        }
    }

    fn advance_read_sector(&mut self, data: i32, drive: &FloppyDrive, sig: &mut Signals) {
        match data {
            format::NO_DATA => {
                // The addressed sector never came around.
                if self.index_count >= 2 {
                    self.status |= STAT_RECORD_NOT_FOUND;
                    self.sector_pos = SECTOR_POS_DONE;
                    self.finish_command(sig);
                }
            }
            format::DATA_AM => self.sector_pos = 0,
            format::CRC => {
                let max = drive.max_sectors(self.side, self.track_reg);
                if !self.multiple || self.sector_reg == max {
                    self.sector_pos = SECTOR_POS_DONE;
                    self.finish_command(sig);
                } else {
                    self.sector_reg = self.sector_reg.wrapping_add(1);
                    self.sector_pos = SECTOR_POS_INITIAL;
                }
            }
            d if d < 0 => {
                self.sector_pos = SECTOR_POS_DONE;
                self.status |= STAT_CRC_ERROR;
                self.finish_command(sig);
            }
            d => {
                self.transfer_data(d as u8, sig);
                self.sector_pos += 1;
            }
        }
    }

    fn advance_read_address(&mut self, data: i32, sig: &mut Signals) {
        match data {
            format::NO_DATA => {
                if self.index_count >= 2 {
                    self.status |= STAT_RECORD_NOT_FOUND;
                    self.sector_pos = SECTOR_POS_DONE;
                    self.finish_command(sig);
                }
            }
            format::ID_AM => self.sector_pos = 0,
            format::CRC => {
                info!("read address done");
                self.sector_pos = SECTOR_POS_DONE;
                self.finish_command(sig);
            }
            d if d < 0 => {
                self.sector_pos = SECTOR_POS_DONE;
                self.status |= STAT_CRC_ERROR;
                self.finish_command(sig);
            }
            d => {
                // Chip quirk: the first ID byte (the track number) lands in
                // the sector register.
                if self.sector_pos == 0 {
                    self.sector_reg = d as u8;
                }
                self.transfer_data(d as u8, sig);
                self.sector_pos += 1;
            }
        }
    }

    fn advance_read_track(&mut self, data: i32, sig: &mut Signals) {
        match data {
            format::NO_DATA => {}
            format::INDEX_AM => self.sector_pos = 0,
            format::CRC => {
                self.sector_pos = SECTOR_POS_DONE;
                self.finish_command(sig);
            }
            d if d < 0 => {
                self.sector_pos = SECTOR_POS_DONE;
                self.status |= STAT_CRC_ERROR;
                self.finish_command(sig);
            }
            d => {
                self.transfer_data(d as u8, sig);
                self.sector_pos += 1;
            }
        }
    }

    fn advance_write(&mut self, result: i32, sig: &mut Signals) {
        match result {
            format::NO_DATA => {
                // Waiting for the sector or for the host; keep DRQ up so the
                // host can deliver the next byte.
                if self.sector_pos >= 0 && !self.drq_raised {
                    self.raise_drq(sig);
                }
            }
            format::DATA_AM | format::INDEX_AM => self.sector_pos = 0,
            format::CRC => {
                self.sector_pos = SECTOR_POS_DONE;
                self.finish_command(sig);
            }
            r if r < 0 => {
                self.sector_pos = SECTOR_POS_DONE;
                self.status |= STAT_WRITE_FAULT;
                self.finish_command(sig);
            }
            _ => {
                self.data_ready = false;
                self.sector_pos += 1;
                self.raise_drq(sig);
            }
        }
    }

    /// Re-raise INTRQ on events armed by a previous force-interrupt.
    fn check_event_triggers(&mut self, index_edge: bool, ready: bool, sig: &mut Signals) {
        let was_ready = self.last_ready;
        self.last_ready = ready;
        if self.intrq_event_mask == 0 {
            return;
        }
        let fire = (index_edge && self.intrq_event_mask & OPT_INDEX_PULSE_INT != 0)
            || (was_ready && !ready && self.intrq_event_mask & OPT_READY_TO_NOT_READY != 0)
            || (!was_ready && ready && self.intrq_event_mask & OPT_NOT_READY_TO_READY != 0);
        if fire {
            self.raise_intrq(sig);
        }
    }
}

impl Default for Wd1797 {
    fn default() -> Self {
        Self::new()
    }
}
