//! Identity of the local controller as kept in firmware RAM.

use crate::error::Result;
use crate::memory::GuardedMemory;
use crate::transport::Transport;
use chip_profiles::{ConnectionTableView, DeviceInfo};
use core::fmt;

/// Longest local name the firmware keeps, including the terminator
pub const MAX_NAME_LENGTH: usize = 248;

pub const BD_ADDR_LENGTH: usize = 6;

/// Bluetooth device address, most significant byte first
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr(pub [u8; BD_ADDR_LENGTH]);

impl BdAddr {
    /// From the little endian layout used in controller memory
    pub fn from_le_bytes(mut bytes: [u8; BD_ADDR_LENGTH]) -> Self {
        bytes.reverse();
        BdAddr(bytes)
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub fn read_bd_addr<T: Transport + ?Sized>(
    memory: &mut GuardedMemory<'_, '_, T>,
    info: &DeviceInfo,
) -> Result<BdAddr> {
    let mut bytes = [0; BD_ADDR_LENGTH];
    bytes.copy_from_slice(&memory.read(info.bd_addr_address, BD_ADDR_LENGTH)?);
    Ok(BdAddr::from_le_bytes(bytes))
}

/// Reads the NUL terminated local name. Invalid UTF-8 is replaced.
pub fn read_device_name<T: Transport + ?Sized>(
    memory: &mut GuardedMemory<'_, '_, T>,
    info: &DeviceInfo,
) -> Result<String> {
    let raw = memory.read(info.name_address, MAX_NAME_LENGTH)?;
    let end = raw.iter().position(|byte| *byte == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

/// Raw bytes of one connection record
pub fn read_connection_record<T: Transport + ?Sized>(
    memory: &mut GuardedMemory<'_, '_, T>,
    table: &ConnectionTableView,
    index: usize,
) -> Result<Vec<u8>> {
    let address = table.record_address(index)?;
    memory.read(address, table.record_length())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::EmulatedDevice;
    use crate::error::Error;
    use chip_profiles::{profiles, IndexOutOfRange};

    #[test]
    fn test_identity() {
        let profile = profiles::cyw27035b1().unwrap();
        let info = profile.device_info();
        let mut device = EmulatedDevice::new();
        device.load(info.bd_addr_address, &[0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);
        device.load(info.name_address, b"CYW927035\0garbage");

        let mut memory = GuardedMemory::new(profile.memory_map(), &mut device);
        let bd_addr = read_bd_addr(&mut memory, info).unwrap();
        assert_eq!(bd_addr, BdAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]));
        assert_eq!(bd_addr.to_string(), "11:22:33:44:55:66");
        assert_eq!(read_device_name(&mut memory, info).unwrap(), "CYW927035");
    }

    #[test]
    fn test_connection_record() {
        let profile = profiles::cyw27035b1().unwrap();
        let view = profile.connection_table();
        let mut device = EmulatedDevice::new();
        device.load(0x217100.into(), &[0xab; 0x168]);

        let mut memory = GuardedMemory::new(profile.memory_map(), &mut device);
        let record = read_connection_record(&mut memory, &view, 1).unwrap();
        assert_eq!(record.len(), 0x168);
        assert!(record.iter().all(|byte| *byte == 0xab));

        assert_eq!(
            read_connection_record(&mut memory, &view, 11),
            Err(Error::Connection(IndexOutOfRange { index: 11, max: 11 }))
        );
    }
}
