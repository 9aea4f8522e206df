use core::fmt;
use core::ops::{Add, Sub};

/// Size of a single bus word of the controller in bytes.
pub const WORD_SIZE: usize = 4;

/// A single little endian bus word as transferred by the diagnostic channel.
pub type Word = [u8; WORD_SIZE];

// An address in the physical address space of the controller.
// ROM starts at 0, RAM, register files and memory mapped peripherals follow.
// The bus is 32 bit wide, so every address fits into an u32.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PhysicalAddress(u32);
impl PhysicalAddress {
    pub const fn from_const(value: u32) -> Self {
        PhysicalAddress(value)
    }

    /// only use this function for specifying consts
    pub const fn to_const(self) -> u32 {
        self.0
    }

    pub const fn is_word_aligned(&self) -> bool {
        self.0 % WORD_SIZE as u32 == 0
    }

    /// Start of the bus word containing this address.
    pub const fn align_word(&self) -> Self {
        PhysicalAddress(self.0 & !(WORD_SIZE as u32 - 1))
    }

    /// Offset of this address inside its bus word.
    pub const fn word_offset(&self) -> usize {
        (self.0 % WORD_SIZE as u32) as usize
    }

    pub const fn checked_add(self, offset: u32) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(value) => Some(PhysicalAddress(value)),
            None => None,
        }
    }

    pub const fn checked_sub(self, offset: u32) -> Option<Self> {
        match self.0.checked_sub(offset) {
            Some(value) => Some(PhysicalAddress(value)),
            None => None,
        }
    }

    /// Number of bytes from `base` up to this address, None if below `base`.
    pub const fn distance_from(self, base: PhysicalAddress) -> Option<u32> {
        self.0.checked_sub(base.0)
    }

    pub const ZERO: PhysicalAddress = PhysicalAddress::from_const(0);
    pub const MIN: PhysicalAddress = PhysicalAddress::ZERO;
    pub const MAX: PhysicalAddress = PhysicalAddress::from_const(u32::MAX);
}
impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
impl From<u32> for PhysicalAddress {
    fn from(value: u32) -> Self {
        PhysicalAddress::from_const(value)
    }
}
impl From<PhysicalAddress> for u32 {
    fn from(value: PhysicalAddress) -> Self {
        value.0
    }
}
impl From<&PhysicalAddress> for PhysicalAddress {
    fn from(value: &PhysicalAddress) -> Self {
        *value
    }
}
impl Add<u32> for PhysicalAddress {
    type Output = Self;

    #[track_caller]
    fn add(self, other: u32) -> Self {
        match self.checked_add(other) {
            Some(address) => address,
            None => panic!("Address overflow. {} + {:x} exceeds the 32 bit bus.", self, other),
        }
    }
}
impl Sub<u32> for PhysicalAddress {
    type Output = Self;

    #[track_caller]
    fn sub(self, other: u32) -> Self {
        match self.checked_sub(other) {
            Some(address) => address,
            None => panic!("Address underflow. {} - {:x} is below zero.", self, other),
        }
    }
}

/// A patchram slot index. Slots are labeled with an index starting at 0.
/// Every slot owns one word in the target table, one word in the value table
/// and one bit in the enable bitmap.
/// The upper bound depends on the chip, so it is checked by the slot table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PatchSlotIndex(usize);
impl PatchSlotIndex {
    pub const fn from_const(value: usize) -> Self {
        PatchSlotIndex(value)
    }

    pub const fn index(&self) -> usize {
        self.0
    }

    /// Byte offset of this slot's entry in the target and value tables.
    pub const fn table_offset(&self) -> u32 {
        (self.0 * WORD_SIZE) as u32
    }

    /// Index of the 32 bit bitmap word holding this slot's enable bit.
    pub const fn bitmap_word(&self) -> usize {
        self.0 / 32
    }

    /// Mask of this slot's enable bit inside its bitmap word.
    pub const fn bitmap_mask(&self) -> u32 {
        1 << (self.0 % 32)
    }

    pub const ZERO: Self = PatchSlotIndex::from_const(0);
    pub const MIN: Self = PatchSlotIndex::ZERO;
}
impl fmt::Display for PatchSlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:03}", self.0)
    }
}
impl fmt::Debug for PatchSlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:03}", self.0)
    }
}
impl From<usize> for PatchSlotIndex {
    fn from(value: usize) -> Self {
        PatchSlotIndex::from_const(value)
    }
}
impl From<PatchSlotIndex> for usize {
    fn from(value: PatchSlotIndex) -> Self {
        value.0
    }
}
impl From<&PatchSlotIndex> for PatchSlotIndex {
    fn from(value: &PatchSlotIndex) -> Self {
        *value
    }
}
impl Add<usize> for PatchSlotIndex {
    type Output = Self;

    fn add(self, other: usize) -> Self {
        PatchSlotIndex::from_const(self.0 + other)
    }
}

/// Rounds `value` up to the next multiple of the bus word size.
pub const fn align_up_to_word(value: usize) -> usize {
    value.div_ceil(WORD_SIZE) * WORD_SIZE
}
