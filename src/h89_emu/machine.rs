//! The complete H89: CPU plus the machine body the CPU's bus reaches.
//!
//! The body owns every device; the machine owns the body and the CPU side
//! by side so an executing instruction can borrow the body while the CPU
//! state stays separate.  Per-instruction elapsed T-states fan out to the
//! clock-driven peripherals through `Body::advance_clock`; the 2 ms
//! real-time thread calls `Machine::timer_event` between instructions.

use log::{info, warn};

use crate::config::Config;
use crate::cpu::{Bus, StepResult, Z80};
use crate::disk::disk::load_disk_image;
use crate::disk::drive::{DriveType, FloppyDrive};
use crate::disk::h17::{H17, H17_NUM_PORTS};
use crate::disk::h37::{H37, H37_NUM_PORTS};
use crate::disk::mms77316::{Mms77316, MMS77316_NUM_PORTS};

use super::address_bus::{AddressBus, MemoryDecoder};
use super::gpp::{GeneralPurposePort, GPP_BASE, GPP_NUM_PORTS};
use super::interrupt::InterruptBus;
use super::io_bus::{IoBus, PortDevice};
use super::nmi::{NmiPort, NMI_BASE_1, NMI_BASE_2, NMI_NUM_PORTS};
use super::timer::TwoMsTimer;
use super::uart::{
    Ins8250, UART_AUX_BASE, UART_CONSOLE_BASE, UART_CONSOLE_INT_LEVEL, UART_LP_BASE,
    UART_MODEM_BASE, UART_NUM_PORTS,
};
use super::wallclock::WallClock;

/// Port bases for the disk controllers.
pub const H17_BASE: u8 = 0x7C;
pub const H37_BASE: u8 = 0x78;
pub const MMS77316_BASE: u8 = 0x38;

/// The MMS77316 WAIT hardware gives up after 16 bus clocks.
const BURST_WAIT_LIMIT: u32 = 16;

pub struct Body {
    pub clock: WallClock,
    pub mem: AddressBus,
    pub ports: IoBus,
    pub intr: InterruptBus,
    pub gpp: GeneralPurposePort,
    pub timer: TwoMsTimer,
    pub nmi: NmiPort,
    pub uart_console: Ins8250,
    pub uart_aux: Ins8250,
    pub uart_modem: Ins8250,
    pub uart_lp: Ins8250,
    pub h17: Option<H17>,
    pub h37: Option<H37>,
    pub mms: Option<Mms77316>,

    nmi_pending: bool,
    /// GPP speed-select change waiting to be applied to the CPU.
    speed_request: Option<bool>,
}

impl Body {
    /// Deliver ticks to the clock and every clock-driven device, in
    /// installation order.
    fn distribute_ticks(&mut self, ticks: u32) {
        self.clock.add_ticks(ticks);
        if let Some(h17) = self.h17.as_mut() {
            h17.tick(ticks);
        }
        if let Some(h37) = self.h37.as_mut() {
            h37.tick(ticks, &mut self.intr);
        }
        if let Some(mms) = self.mms.as_mut() {
            mms.tick(ticks, &mut self.intr);
        }
    }

    /// Bounded wait-state spin for the MMS77316 burst mode: burn single
    /// cycles until the controller produces DRQ/INTRQ or the hardware
    /// timeout expires.
    fn burst_spin(&mut self, offset: u8) {
        let mut timeout = 0;
        while timeout < BURST_WAIT_LIMIT {
            let waiting = self
                .mms
                .as_ref()
                .map(|mms| mms.burst_wait(offset))
                .unwrap_or(false);
            if !waiting {
                break;
            }
            self.distribute_ticks(1);
            timeout += 1;
        }
    }

    fn apply_gpp_write(&mut self, val: u8) {
        // Writing the port acknowledges the 2 ms interrupt.
        self.intr.lower_interrupt(self.timer.int_level());

        let fx = self.gpp.write(val);
        self.timer.set_int_enabled(fx.timer_int_enabled, &mut self.intr);
        if let Some(disabled) = fx.rom_disabled {
            if disabled {
                self.mem.decoder_mut().disable_rom();
            } else {
                self.mem.decoder_mut().enable_rom();
            }
        }
        if let Some(h17) = self.h17.as_mut() {
            h17.select_side(fx.h17_side);
        }
        if let Some(fast) = fx.fast_speed {
            self.speed_request = Some(fast);
        }
    }

    pub(crate) fn take_speed_request(&mut self) -> Option<bool> {
        self.speed_request.take()
    }
}

impl Bus for Body {
    fn read_byte(&mut self, addr: u16) -> u8 {
        self.mem.read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, val: u8) {
        self.mem.write_byte(addr, val);
    }

    fn port_in(&mut self, port: u8) -> u8 {
        let Some((device, offset)) = self.ports.lookup(port) else {
            IoBus::log_unclaimed(port, false);
            return 0;
        };
        match device {
            PortDevice::Gpp => self.gpp.read(),
            PortDevice::NmiPort => {
                self.nmi_pending = true;
                self.nmi.read()
            }
            PortDevice::H17 => self.h17.as_mut().map(|c| c.port_in(offset)).unwrap_or(0),
            PortDevice::H37 => match self.h37.as_mut() {
                Some(c) => c.port_in(offset, &mut self.intr),
                None => 0,
            },
            PortDevice::Mms77316 => {
                self.burst_spin(offset);
                match self.mms.as_mut() {
                    Some(c) => c.port_in(offset, &mut self.intr),
                    None => 0,
                }
            }
            PortDevice::UartConsole => self.uart_console.read(offset, &mut self.intr),
            PortDevice::UartAux => self.uart_aux.read(offset, &mut self.intr),
            PortDevice::UartModem => self.uart_modem.read(offset, &mut self.intr),
            PortDevice::UartLp => self.uart_lp.read(offset, &mut self.intr),
        }
    }

    fn port_out(&mut self, port: u8, val: u8) {
        let Some((device, offset)) = self.ports.lookup(port) else {
            IoBus::log_unclaimed(port, true);
            return;
        };
        match device {
            PortDevice::Gpp => self.apply_gpp_write(val),
            PortDevice::NmiPort => {
                self.nmi_pending = true;
            }
            PortDevice::H17 => {
                if let Some(c) = self.h17.as_mut() {
                    c.port_out(offset, val);
                    let enabled = c.ram_write_enabled();
                    self.mem.decoder_mut().set_h17_ram_write_enabled(enabled);
                }
            }
            PortDevice::H37 => {
                if let Some(c) = self.h37.as_mut() {
                    c.port_out(offset, val, &mut self.intr);
                }
            }
            PortDevice::Mms77316 => {
                self.burst_spin(offset);
                if let Some(c) = self.mms.as_mut() {
                    c.port_out(offset, val, &mut self.intr);
                }
            }
            PortDevice::UartConsole => self.uart_console.write(offset, val, &mut self.intr),
            PortDevice::UartAux => self.uart_aux.write(offset, val, &mut self.intr),
            PortDevice::UartModem => self.uart_modem.write(offset, val, &mut self.intr),
            PortDevice::UartLp => self.uart_lp.write(offset, val, &mut self.intr),
        }
    }

    fn int_ack(&mut self) -> u8 {
        self.intr.read_data_bus()
    }

    fn int_asserted(&self) -> bool {
        self.intr.int_line()
    }

    fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    fn advance_clock(&mut self, ticks: u32) {
        self.distribute_ticks(ticks);
    }
}

pub struct Machine {
    pub cpu: Z80,
    pub body: Body,
}

impl Machine {
    /// Assemble the machine from configuration: memory, motherboard
    /// devices, and whichever disk controllers the properties name.
    pub fn build(config: &Config) -> Result<Self, String> {
        let cpu = Z80::new();

        let mut mem = MemoryDecoder::new();
        if let Some(path) = &config.monitor_rom {
            let image = std::fs::read(path).map_err(|e| format!("{}: {}", path, e))?;
            mem.load_monitor_rom(&image);
        }
        if let Some(path) = &config.h17_rom {
            let image = std::fs::read(path).map_err(|e| format!("{}: {}", path, e))?;
            mem.load_h17_rom(&image);
        }

        let mut ports = IoBus::new();
        ports.add_device(PortDevice::Gpp, GPP_BASE, GPP_NUM_PORTS)?;
        ports.add_device(PortDevice::NmiPort, NMI_BASE_1, NMI_NUM_PORTS)?;
        ports.add_device(PortDevice::NmiPort, NMI_BASE_2, NMI_NUM_PORTS)?;
        ports.add_device(PortDevice::UartConsole, UART_CONSOLE_BASE, UART_NUM_PORTS)?;
        ports.add_device(PortDevice::UartAux, UART_AUX_BASE, UART_NUM_PORTS)?;
        ports.add_device(PortDevice::UartModem, UART_MODEM_BASE, UART_NUM_PORTS)?;
        ports.add_device(PortDevice::UartLp, UART_LP_BASE, UART_NUM_PORTS)?;

        let mut intr = InterruptBus::new();

        let h17 = if config.has_card("h17") {
            ports.add_device(PortDevice::H17, H17_BASE, H17_NUM_PORTS)?;
            let mut card = H17::new();
            Self::populate_drives(config, "h17", clock_tps(&cpu), |unit, drive| {
                card.connect_drive(unit, drive)
            })?;
            Some(card)
        } else {
            None
        };

        let h37 = if config.has_card("h37") {
            ports.add_device(PortDevice::H37, H37_BASE, H37_NUM_PORTS)?;
            let mut card = H37::new();
            Self::populate_drives(config, "h37", clock_tps(&cpu), |unit, drive| {
                card.connect_drive(unit, drive)
            })?;
            Some(card)
        } else {
            None
        };

        let mms = if config.has_card("mms77316") {
            ports.add_device(PortDevice::Mms77316, MMS77316_BASE, MMS77316_NUM_PORTS)?;
            let mut card = Mms77316::new();
            Self::populate_drives(config, "mms77316", clock_tps(&cpu), |unit, drive| {
                card.connect_drive(unit, drive)
            })?;
            Some(card)
        } else {
            None
        };

        // The disk cards splice their own logic into the interrupt
        // acknowledge path.
        match (&mms, &h37) {
            (Some(_), Some(_)) => {
                warn!("both MMS77316 and H37 configured; MMS77316 takes the interrupt chain");
                intr.chain_mms316();
            }
            (Some(_), None) => intr.chain_mms316(),
            (None, Some(_)) => intr.chain_h37(),
            (None, None) => {}
        }

        if config.has_card("mms77320") {
            info!("mms77320 (SASI) configuration present but the adapter is not fitted");
        }

        let clock = WallClock::new(cpu.clock_rate());

        let mut machine = Self {
            cpu,
            body: Body {
                clock,
                mem: AddressBus::new(mem),
                ports,
                intr,
                gpp: GeneralPurposePort::new(config.gpp_dipsw),
                timer: TwoMsTimer::new(),
                nmi: NmiPort,
                uart_console: Ins8250::new(Some(UART_CONSOLE_INT_LEVEL)),
                uart_aux: Ins8250::new(None),
                uart_modem: Ins8250::new(None),
                uart_lp: Ins8250::new(None),
                h17,
                h37,
                mms,
                nmi_pending: false,
                speed_request: None,
            },
        };

        // Pre-insert configured diskettes.
        machine.mount_configured(config)?;
        Ok(machine)
    }

    fn populate_drives(
        config: &Config,
        card: &str,
        tps: u64,
        mut connect: impl FnMut(usize, FloppyDrive) -> bool,
    ) -> Result<(), String> {
        for (unit, spec) in config.card_drives(card) {
            let kind = DriveType::from_config(&spec)
                .ok_or_else(|| format!("unknown drive type {:?} for {}", spec, card))?;
            if !connect(unit, FloppyDrive::new(kind, tps)) {
                return Err(format!("cannot connect {} drive {}", card, unit + 1));
            }
        }
        Ok(())
    }

    fn mount_configured(&mut self, config: &Config) -> Result<(), String> {
        for (card, unit, args) in config.card_disks() {
            let ident = format!("{}-{}", card_display_name(&card), unit + 1);
            match load_disk_image(&args) {
                Ok(disk) => {
                    let Some(drive) = self.drive_mut(&ident) else {
                        warn!("disk configured for missing drive {}", ident);
                        continue;
                    };
                    drive.insert_disk(disk);
                }
                Err(e) => warn!("cannot mount {} on {}: {}", args.join(" "), ident, e),
            }
        }
        Ok(())
    }

    // ── Execution ─────────────────────────────────────────────

    /// Execute one main-loop iteration.  Returns `OutOfBudget` when the
    /// slice is spent and the caller should sleep until the timer tick.
    pub fn step_instruction(&mut self) -> StepResult {
        let result = self.cpu.step(&mut self.body);
        if let Some(fast) = self.body.take_speed_request() {
            self.cpu.set_speed(fast);
            self.body.clock.set_ticks_per_second(self.cpu.clock_rate());
        }
        result
    }

    /// The 2 ms boundary: fold the slice into the wall clock, refill the
    /// CPU budget, and let the timer interrupt if it is enabled.
    pub fn timer_event(&mut self) {
        self.body.clock.add_timer_event();
        self.cpu.add_clock_ticks();
        self.body.timer.expired(&mut self.body.intr);

        // With no terminal attached, guest serial output is still visible
        // in the trace log.
        let tx = self.body.uart_console.take_transmitted();
        if !tx.is_empty() {
            log::trace!("console tx: {}", String::from_utf8_lossy(&tx));
        }
    }

    pub fn reset(&mut self) {
        info!("machine reset");
        self.cpu.reset();
        self.body.clock.set_ticks_per_second(self.cpu.clock_rate());
        self.body.mem.reset();
        self.body.intr.reset();
        self.body.timer.reset();
        let fx = self.body.gpp.reset();
        self.body
            .timer
            .set_int_enabled(fx.timer_int_enabled, &mut self.body.intr);
        self.body.uart_console.reset(&mut self.body.intr);
        self.body.uart_aux.reset(&mut self.body.intr);
        self.body.uart_modem.reset(&mut self.body.intr);
        self.body.uart_lp.reset(&mut self.body.intr);
        if let Some(h17) = self.body.h17.as_mut() {
            h17.reset();
        }
        if let Some(h37) = self.body.h37.as_mut() {
            h37.reset(&mut self.body.intr);
        }
        if let Some(mms) = self.body.mms.as_mut() {
            mms.reset(&mut self.body.intr);
        }
        self.body.nmi_pending = false;
        self.body.speed_request = None;
    }

    // ── Operator surface ──────────────────────────────────────

    /// Resolve a `<Controller>-<1-based-unit>` drive identifier.
    pub fn drive_mut(&mut self, ident: &str) -> Option<&mut FloppyDrive> {
        let (card, index) = ident.rsplit_once('-')?;
        let unit = index.parse::<usize>().ok()?.checked_sub(1)?;
        match card {
            "H17" => self.body.h17.as_mut()?.drive_mut(unit),
            "H37" => self.body.h37.as_mut()?.drive_mut(unit),
            "MMS77316" => self.body.mms.as_mut()?.drive_mut(unit),
            _ => None,
        }
    }

    /// `drive=media;drive=media;...` across every installed controller.
    pub fn disk_listing(&self) -> String {
        let mut entries = Vec::new();
        if let Some(h17) = &self.body.h17 {
            for unit in 0..h17.num_drives() {
                if let Some(media) = h17.drive_media(unit) {
                    entries.push(format!("H17-{}={}", unit + 1, media));
                }
            }
        }
        if let Some(h37) = &self.body.h37 {
            for unit in 0..h37.num_drives() {
                if let Some(media) = h37.drive_media(unit) {
                    entries.push(format!("H37-{}={}", unit + 1, media));
                }
            }
        }
        if let Some(mms) = &self.body.mms {
            for unit in 0..mms.num_drives() {
                if let Some(media) = mms.drive_media(unit) {
                    entries.push(format!("MMS77316-{}={}", unit + 1, media));
                }
            }
        }
        entries.join(";")
    }

    pub fn dump_cpu(&self) -> String {
        self.cpu.dump_debug()
    }

    pub fn dump_machine(&self) -> String {
        format!(
            "CLOCK={} TPS={}\n{}{}TIMER-COUNT={}\n",
            self.body.clock.get_clock(),
            self.body.clock.ticks_per_second(),
            self.body.gpp.dump_debug(),
            self.body.intr.dump_debug(),
            self.body.timer.count(),
        )
    }

    pub fn dump_disk(&self, name: &str) -> Option<String> {
        match name {
            "H17" => self.body.h17.as_ref().map(|c| c.dump_debug()),
            "H37" => self.body.h37.as_ref().map(|c| c.dump_debug()),
            "MMS77316" => self.body.mms.as_ref().map(|c| c.dump_debug()),
            _ => None,
        }
    }
}

fn clock_tps(cpu: &Z80) -> u64 {
    cpu.clock_rate()
}

fn card_display_name(key: &str) -> &'static str {
    match key {
        "h17" => "H17",
        "h37" => "H37",
        _ => "MMS77316",
    }
}
