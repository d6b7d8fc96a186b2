//! 8-bit port address space: a 256-entry map from port to device.

use log::warn;

/// Devices a port can dispatch to.  The machine routes each to the actual
/// device field; this table only records the claim and the base port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDevice {
    Gpp,
    NmiPort,
    H17,
    H37,
    Mms77316,
    UartConsole,
    UartAux,
    UartModem,
    UartLp,
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    device: PortDevice,
    base: u8,
}

pub struct IoBus {
    ports: [Option<Claim>; 256],
}

impl IoBus {
    pub fn new() -> Self {
        Self { ports: [None; 256] }
    }

    /// Claim `count` consecutive ports for a device.  Overlap is an
    /// installation error and rejects the whole claim.
    pub fn add_device(&mut self, device: PortDevice, base: u8, count: u8) -> Result<(), String> {
        let end = base as usize + count as usize;
        if end > 256 {
            return Err(format!(
                "{:?} range {:#04x}+{} exceeds the port space",
                device, base, count
            ));
        }
        for port in base as usize..end {
            if let Some(existing) = self.ports[port] {
                return Err(format!(
                    "port {:#04x} already claimed by {:?}",
                    port, existing.device
                ));
            }
        }
        for port in base as usize..end {
            self.ports[port] = Some(Claim { device, base });
        }
        Ok(())
    }

    /// Resolve a port to its device and the offset within its range.
    pub fn lookup(&self, port: u8) -> Option<(PortDevice, u8)> {
        self.ports[port as usize].map(|c| (c.device, port - c.base))
    }

    /// Unclaimed port access: reads return zero, writes vanish.
    pub fn log_unclaimed(port: u8, write: bool) {
        warn!(
            "{} of unclaimed port {:#04x}",
            if write { "write" } else { "read" },
            port
        );
    }
}

impl Default for IoBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_device_and_offset() {
        let mut bus = IoBus::new();
        bus.add_device(PortDevice::H37, 0x78, 4).unwrap();
        assert_eq!(bus.lookup(0x78), Some((PortDevice::H37, 0)));
        assert_eq!(bus.lookup(0x7B), Some((PortDevice::H37, 3)));
        assert_eq!(bus.lookup(0x7C), None);
    }

    #[test]
    fn overlap_is_rejected() {
        let mut bus = IoBus::new();
        bus.add_device(PortDevice::H37, 0x78, 4).unwrap();
        assert!(bus.add_device(PortDevice::H17, 0x7B, 4).is_err());
        // The failed claim must not have landed partially.
        assert_eq!(bus.lookup(0x7E), None);
    }

    #[test]
    fn range_must_fit_the_port_space() {
        let mut bus = IoBus::new();
        assert!(bus.add_device(PortDevice::Gpp, 0xFF, 2).is_err());
    }
}
