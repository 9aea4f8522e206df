use crate::slot_table::SlotStatus;
use crate::transport::TransportError;
use chip_profiles::{IndexOutOfRange, MemoryError};
use data_types::{PatchSlotIndex, PhysicalAddress};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("slot {slot} does not exist, the chip has {slot_count} slots")]
    InvalidSlot {
        slot: PatchSlotIndex,
        slot_count: usize,
    },
    #[error("target {target} is not word aligned")]
    Alignment { target: PhysicalAddress },
    #[error("all patchram slots are in use")]
    NoFreeSlot,
    #[error("target {target} is already redirected by slot {slot}")]
    Conflict {
        target: PhysicalAddress,
        slot: PatchSlotIndex,
    },
    #[error("can not {operation} slot {slot} while it is {state}")]
    InvalidState {
        slot: PatchSlotIndex,
        state: SlotStatus,
        operation: &'static str,
    },
    #[error("hook needs {required} bytes but only {available} are free")]
    InsufficientSpace { required: usize, available: usize },
    #[error("side data must be {expected} bytes, got {actual}")]
    MalformedSideData { expected: usize, actual: usize },
    #[error("branch from {from} to {to} is not encodable")]
    BranchOutOfRange {
        from: PhysicalAddress,
        to: PhysicalAddress,
    },
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Connection(#[from] IndexOutOfRange),
}

pub type Result<T> = core::result::Result<T, Error>;
