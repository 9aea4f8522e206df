//! Word level access to the controller.
//!
//! Everything this crate does to a device goes through these two primitives.
//! Implementations sit on top of HCI vendor commands, a debug probe or the
//! in-memory [`EmulatedDevice`](crate::emulation::EmulatedDevice).

use data_types::{PhysicalAddress, Word};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("reading {address} failed: {reason}")]
    ReadFailed {
        address: PhysicalAddress,
        reason: String,
    },
    /// The write may or may not have reached the device
    #[error("writing {address} failed: {reason}")]
    WriteFailed {
        address: PhysicalAddress,
        reason: String,
    },
}

impl TransportError {
    pub fn address(&self) -> PhysicalAddress {
        match self {
            TransportError::ReadFailed { address, .. } => *address,
            TransportError::WriteFailed { address, .. } => *address,
        }
    }
}

/// Reads and writes single words of device memory. Addresses passed in are
/// always word aligned.
pub trait Transport {
    fn read_word(&mut self, address: PhysicalAddress) -> Result<Word, TransportError>;

    fn write_word(&mut self, address: PhysicalAddress, value: Word) -> Result<(), TransportError>;

    fn read_u32(&mut self, address: PhysicalAddress) -> Result<u32, TransportError> {
        self.read_word(address).map(u32::from_le_bytes)
    }

    fn write_u32(&mut self, address: PhysicalAddress, value: u32) -> Result<(), TransportError> {
        self.write_word(address, value.to_le_bytes())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_word(&mut self, address: PhysicalAddress) -> Result<Word, TransportError> {
        (**self).read_word(address)
    }

    fn write_word(&mut self, address: PhysicalAddress, value: Word) -> Result<(), TransportError> {
        (**self).write_word(address, value)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_word(&mut self, address: PhysicalAddress) -> Result<Word, TransportError> {
        (**self).read_word(address)
    }

    fn write_word(&mut self, address: PhysicalAddress, value: Word) -> Result<(), TransportError> {
        (**self).write_word(address, value)
    }
}
