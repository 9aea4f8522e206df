//! In-memory stand in for a controller.
//!
//! Memory is sparse, every word that was never written reads as zero. Faults
//! can be armed per address and fire exactly once.

use crate::transport::{Transport, TransportError};
use data_types::{PhysicalAddress, Word, WORD_SIZE};
use log::trace;
use std::collections::{BTreeMap, BTreeSet};

/// How an armed write fault behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// The write never reaches the device
    Lost,
    /// The device applies the write but the acknowledgement is lost
    AppliedButUnacknowledged,
}

#[derive(Debug, Default, Clone)]
pub struct EmulatedDevice {
    memory: BTreeMap<PhysicalAddress, Word>,
    write_faults: BTreeMap<PhysicalAddress, WriteFault>,
    read_faults: BTreeSet<PhysicalAddress>,
    writes: Vec<(PhysicalAddress, Word)>,
    reads: usize,
}

impl EmulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `bytes` at `address` without going through the transport
    pub fn load(&mut self, address: PhysicalAddress, bytes: &[u8]) {
        let mut cursor = address;
        for byte in bytes {
            let word = self.memory.entry(cursor.align_word()).or_insert([0; WORD_SIZE]);
            word[cursor.word_offset()] = *byte;
            match cursor.checked_add(1) {
                Some(next) => cursor = next,
                None => break,
            }
        }
    }

    pub fn load_u32(&mut self, address: PhysicalAddress, value: u32) {
        self.load(address, &value.to_le_bytes());
    }

    /// Reads `length` bytes without going through the transport
    pub fn peek(&self, address: PhysicalAddress, length: usize) -> Vec<u8> {
        (0..length)
            .map_while(|i| address.checked_add(u32::try_from(i).ok()?))
            .map(|at| {
                self.memory
                    .get(&at.align_word())
                    .map(|word| word[at.word_offset()])
                    .unwrap_or(0)
            })
            .collect()
    }

    pub fn peek_u32(&self, address: PhysicalAddress) -> u32 {
        let mut word = [0; WORD_SIZE];
        word.copy_from_slice(&self.peek(address, WORD_SIZE));
        u32::from_le_bytes(word)
    }

    /// The next write to `address` fails as described by `fault`
    pub fn fail_next_write(&mut self, address: PhysicalAddress, fault: WriteFault) {
        self.write_faults.insert(address.align_word(), fault);
    }

    /// The next read of `address` fails
    pub fn fail_next_read(&mut self, address: PhysicalAddress) {
        self.read_faults.insert(address.align_word());
    }

    /// Every acknowledged or applied write, oldest first
    pub fn writes(&self) -> &[(PhysicalAddress, Word)] {
        &self.writes
    }

    pub fn read_count(&self) -> usize {
        self.reads
    }

    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.reads = 0;
    }
}

impl Transport for EmulatedDevice {
    fn read_word(&mut self, address: PhysicalAddress) -> Result<Word, TransportError> {
        if self.read_faults.remove(&address) {
            trace!("read  {} -> fault", address);
            return Err(TransportError::ReadFailed {
                address,
                reason: "injected fault".into(),
            });
        }

        self.reads += 1;
        let value = self.memory.get(&address).copied().unwrap_or([0; WORD_SIZE]);
        trace!("read  {} -> {:08x}", address, u32::from_le_bytes(value));
        Ok(value)
    }

    fn write_word(&mut self, address: PhysicalAddress, value: Word) -> Result<(), TransportError> {
        let fault = self.write_faults.remove(&address);

        if fault != Some(WriteFault::Lost) {
            self.memory.insert(address, value);
            self.writes.push((address, value));
        }
        trace!(
            "write {} <- {:08x}{}",
            address,
            u32::from_le_bytes(value),
            if fault.is_some() { " (fault)" } else { "" }
        );

        match fault {
            None => Ok(()),
            Some(_) => Err(TransportError::WriteFailed {
                address,
                reason: "injected fault".into(),
            }),
        }
    }
}
