//! Byte granular device memory access checked against the memory map.

use crate::error::Result;
use crate::transport::Transport;
use chip_profiles::MemoryMap;
use data_types::{PhysicalAddress, WORD_SIZE};
use log::debug;

/// Reads and writes arbitrary byte ranges. The device is accessed in whole
/// words, and every word the access touches is validated before the first
/// one is transferred, so a rejected access leaves the device unchanged.
pub struct GuardedMemory<'m, 't, T: Transport + ?Sized> {
    map: &'m MemoryMap,
    transport: &'t mut T,
}

impl<'m, 't, T: Transport + ?Sized> GuardedMemory<'m, 't, T> {
    pub fn new(map: &'m MemoryMap, transport: &'t mut T) -> Self {
        GuardedMemory { map, transport }
    }

    pub fn map(&self) -> &MemoryMap {
        self.map
    }

    pub fn read(&mut self, address: PhysicalAddress, length: usize) -> Result<Vec<u8>> {
        let (first, span) = word_span(address, length);
        self.map.check_read(first, span)?;

        let mut bytes = Vec::with_capacity(length);
        let mut cursor = address;
        while bytes.len() < length {
            let word_address = cursor.align_word();
            let offset = cursor.word_offset();
            let take = (WORD_SIZE - offset).min(length - bytes.len());

            let word = self.transport.read_word(word_address)?;
            bytes.extend_from_slice(&word[offset..offset + take]);

            match word_address.checked_add(WORD_SIZE as u32) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        Ok(bytes)
    }

    pub fn read_u32(&mut self, address: PhysicalAddress) -> Result<u32> {
        let mut word = [0; WORD_SIZE];
        word.copy_from_slice(&self.read(address, WORD_SIZE)?);
        Ok(u32::from_le_bytes(word))
    }

    /// Writes `bytes` to `address`. Words only partially covered by the
    /// range are read back first.
    pub fn write(&mut self, address: PhysicalAddress, bytes: &[u8]) -> Result<()> {
        let (first, span) = word_span(address, bytes.len());
        self.map.check_write(first, span)?;
        debug!("writing {} bytes to {}", bytes.len(), address);

        let mut cursor = address;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let word_address = cursor.align_word();
            let offset = cursor.word_offset();
            let take = (WORD_SIZE - offset).min(remaining.len());
            let (chunk, rest) = remaining.split_at(take);

            let mut word = if take == WORD_SIZE {
                [0; WORD_SIZE]
            } else {
                self.transport.read_word(word_address)?
            };
            word[offset..offset + take].copy_from_slice(chunk);
            self.transport.write_word(word_address, word)?;

            remaining = rest;
            match word_address.checked_add(WORD_SIZE as u32) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        Ok(())
    }

    pub fn write_u32(&mut self, address: PhysicalAddress, value: u32) -> Result<()> {
        self.write(address, &value.to_le_bytes())
    }
}

/// Widens a byte range to the words that carry it. Ranges that run past the
/// end of the bus are returned unchanged for the map to reject.
fn word_span(address: PhysicalAddress, length: usize) -> (PhysicalAddress, usize) {
    let last = length
        .checked_sub(1)
        .and_then(|extent| u32::try_from(extent).ok())
        .and_then(|extent| address.checked_add(extent));

    match last {
        Some(last) => {
            let first = address.align_word();
            let span = (last.align_word().to_const() - first.to_const()) as usize + WORD_SIZE;
            (first, span)
        }
        None => (address, length),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::EmulatedDevice;
    use crate::error::Error;
    use chip_profiles::{profiles, MemoryError, MemorySection};

    fn map() -> MemoryMap {
        MemoryMap::new(profiles::CYW27035B1_SECTIONS.iter().cloned()).unwrap()
    }

    #[test]
    fn test_unaligned_write_preserves_neighbours() {
        let map = map();
        let mut device = EmulatedDevice::new();
        device.load(0x271A00.into(), &[0x11; 12]);

        GuardedMemory::new(&map, &mut device)
            .write(0x271A03.into(), &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
            .unwrap();

        assert_eq!(
            device.peek(0x271A00.into(), 12),
            [0x11, 0x11, 0x11, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x11, 0x11, 0x11]
        );
        // one partial word on each end, one full word in between
        assert_eq!(device.writes().len(), 3);
        assert_eq!(device.read_count(), 2);
    }

    #[test]
    fn test_read_range() {
        let map = map();
        let mut device = EmulatedDevice::new();
        device.load(0x280CA4.into(), &[1, 2, 3, 4, 5, 6, 7]);

        let mut memory = GuardedMemory::new(&map, &mut device);
        assert_eq!(memory.read(0x280CA5.into(), 5).unwrap(), [2, 3, 4, 5, 6]);
        assert_eq!(memory.read_u32(0x280CA4.into()).unwrap(), 0x04030201);
        assert!(memory.read(0x280CA4.into(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_rom_write_changes_nothing() {
        let map = map();
        let mut device = EmulatedDevice::new();

        let result = GuardedMemory::new(&map, &mut device).write(0x000B08D8.into(), &[0x70, 0x47]);

        assert_eq!(
            result,
            Err(Error::Memory(MemoryError::WriteProtected(0x000B08D8.into())))
        );
        assert!(device.writes().is_empty());
        assert_eq!(device.read_count(), 0);
    }

    #[test]
    fn test_partially_unmapped_write_changes_nothing() {
        let map = map();
        let mut device = EmulatedDevice::new();

        let result = GuardedMemory::new(&map, &mut device).write(0x283ffc.into(), &[0; 8]);

        assert_eq!(
            result,
            Err(Error::Memory(MemoryError::OutOfRange(0x284000.into())))
        );
        assert!(device.writes().is_empty());
    }

    #[test]
    fn test_single_word_register() {
        let map = map();
        let mut device = EmulatedDevice::new();
        let mut memory = GuardedMemory::new(&map, &mut device);

        memory.write_u32(0x370000.into(), 0xdeadbeef).unwrap();
        assert_eq!(memory.read_u32(0x370000.into()).unwrap(), 0xdeadbeef);
        assert_eq!(
            memory.write_u32(0x370002.into(), 0),
            Err(Error::Memory(MemoryError::OutOfRange(0x370004.into())))
        );
    }

    #[test]
    fn test_partial_write_stays_in_mapped_words() {
        let map = map();
        let mut device = EmulatedDevice::new();

        // last mapped word of EPM RAM
        GuardedMemory::new(&map, &mut device)
            .write(0x51a000.into(), &[0xaa])
            .unwrap();
        assert_eq!(
            device.writes(),
            [(PhysicalAddress::from_const(0x51a000), [0xaa, 0, 0, 0])]
        );
        device.clear_log();

        assert_eq!(
            GuardedMemory::new(&map, &mut device).write(0x51a003.into(), &[0xbb, 0xcc]),
            Err(Error::Memory(MemoryError::OutOfRange(0x51a004.into())))
        );
        assert!(device.writes().is_empty());
    }

    #[test]
    fn test_surrounding_word_must_be_mapped() {
        let map = MemoryMap::new([MemorySection::new(0x1002, 0x1fff, false, true)]).unwrap();
        let mut device = EmulatedDevice::new();
        let mut memory = GuardedMemory::new(&map, &mut device);

        assert_eq!(
            memory.write(0x1003.into(), &[0xaa]),
            Err(Error::Memory(MemoryError::OutOfRange(0x1000.into())))
        );
        assert_eq!(
            memory.read(0x1002.into(), 2),
            Err(Error::Memory(MemoryError::OutOfRange(0x1000.into())))
        );
        assert!(memory.write(0x1004.into(), &[0xaa]).is_ok());
        assert_eq!(device.writes().len(), 1);
        assert_eq!(device.read_count(), 1);
    }

    #[test]
    fn test_unreliable_read_rejected() {
        let map = MemoryMap::new([
            MemorySection::new(0x300000, 0x307fff, false, true),
            MemorySection::new(0x308000, 0x337fff, false, true).unreliable(),
        ])
        .unwrap();
        let mut device = EmulatedDevice::new();
        let mut memory = GuardedMemory::new(&map, &mut device);

        assert_eq!(
            memory.read(0x310000.into(), 4),
            Err(Error::Memory(MemoryError::UnreliableRead(0x310000.into())))
        );
        assert!(memory.write_u32(0x310000.into(), 1).is_ok());
        assert_eq!(device.read_count(), 0);
    }
}
