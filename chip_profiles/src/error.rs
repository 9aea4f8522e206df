use data_types::PhysicalAddress;
use thiserror::Error;

/// Errors raised while constructing a chip profile. A profile that fails
/// validation is never handed out.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("memory section {start}-{end} ends before it starts")]
    InvertedSection {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("memory section {first_start}-{first_end} overlaps {second_start}-{second_end}")]
    OverlappingSections {
        first_start: PhysicalAddress,
        first_end: PhysicalAddress,
        second_start: PhysicalAddress,
        second_end: PhysicalAddress,
    },
    #[error("patchram must provide at least one slot")]
    NoPatchSlots,
    #[error("patchram {first} table overlaps the {second} table")]
    OverlappingPatchramTables {
        first: &'static str,
        second: &'static str,
    },
    #[error("{what} starting at {base} runs past the end of the address space")]
    LayoutOverflow {
        what: &'static str,
        base: PhysicalAddress,
    },
    #[error("no profile registered for chip '{0}'")]
    UnknownChip(String),
    #[error("malformed profile description: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when an access is checked against the memory map.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {0} is not covered by any memory section")]
    OutOfRange(PhysicalAddress),
    #[error("address {0} lies in a read only section")]
    WriteProtected(PhysicalAddress),
    #[error("address {0} lies in a section that faults on read")]
    UnreliableRead(PhysicalAddress),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("connection index {index} is outside of [0, {max})")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub max: usize,
}

pub type Result<T> = core::result::Result<T, ProfileError>;
