//! Chip profiles.
//!
//! A profile bundles everything that differs between controller variants:
//! the memory map, the location and size of the patchram tables, the
//! connection table geometry and a couple of well known RAM variables.
//! The numbers are the contract with the hardware, a wrong value silently
//! corrupts the device, so every profile is validated before it is handed
//! out and never changes afterwards.

use crate::config::hex_address;
use crate::connection_table::ConnectionTableView;
use crate::error::{ProfileError, Result};
use crate::memory_map::{MemoryMap, MemorySection};
use data_types::{PatchSlotIndex, PhysicalAddress, WORD_SIZE};
use serde::{Deserialize, Serialize};

/// Location and geometry of the patchram facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchramConfig {
    /// One word per slot holding the address to redirect
    #[serde(with = "hex_address")]
    pub target_table_address: PhysicalAddress,
    /// Bit n of word n/32 enables slot n
    #[serde(with = "hex_address")]
    pub enabled_bitmap_address: PhysicalAddress,
    /// One word per slot holding the replacement value
    #[serde(with = "hex_address")]
    pub value_table_address: PhysicalAddress,
    pub slot_count: usize,
    /// Targets must be word aligned
    pub aligned_writes_required: bool,
}

impl PatchramConfig {
    pub fn target_entry_address(&self, slot: PatchSlotIndex) -> PhysicalAddress {
        self.target_table_address + slot.table_offset()
    }

    pub fn value_entry_address(&self, slot: PatchSlotIndex) -> PhysicalAddress {
        self.value_table_address + slot.table_offset()
    }

    /// Address of the bitmap word that holds the enable bit of `slot`
    pub fn bitmap_word_address(&self, slot: PatchSlotIndex) -> PhysicalAddress {
        self.enabled_bitmap_address + (slot.bitmap_word() * WORD_SIZE) as u32
    }

    pub fn bitmap_words(&self) -> usize {
        self.slot_count.div_ceil(32)
    }

    pub fn contains_slot(&self, slot: PatchSlotIndex) -> bool {
        slot.index() < self.slot_count
    }

    pub fn slots(&self) -> impl Iterator<Item = PatchSlotIndex> {
        (0..self.slot_count).map(PatchSlotIndex::from_const)
    }

    pub fn is_target_aligned(&self, target: PhysicalAddress) -> bool {
        !self.aligned_writes_required || target.is_word_aligned()
    }

    fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(ProfileError::NoPatchSlots);
        }

        let table_bytes = self.slot_count * WORD_SIZE;
        let tables = [
            ("target", self.target_table_address, table_bytes),
            ("value", self.value_table_address, table_bytes),
            ("bitmap", self.enabled_bitmap_address, self.bitmap_words() * WORD_SIZE),
        ];

        let mut extents = Vec::with_capacity(tables.len());
        for (what, base, length) in tables {
            let end = last_address(base, length).ok_or(ProfileError::LayoutOverflow {
                what: "patchram table",
                base,
            })?;
            extents.push((what, base, end));
        }

        for (i, (first, first_start, first_end)) in extents.iter().enumerate() {
            for (second, second_start, second_end) in extents.iter().skip(i + 1) {
                if first_start <= second_end && second_start <= first_end {
                    return Err(ProfileError::OverlappingPatchramTables {
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Geometry of the firmware's connection table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTableConfig {
    #[serde(with = "hex_address")]
    pub base_address: PhysicalAddress,
    pub max_connections: usize,
    pub record_length: u32,
}

impl ConnectionTableConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        let length = (self.record_length as usize).checked_mul(self.max_connections);
        length
            .and_then(|length| last_address(self.base_address, length))
            .map(|_| ())
            .ok_or(ProfileError::LayoutOverflow {
                what: "connection table",
                base: self.base_address,
            })
    }
}

/// RAM variables identifying the local device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Local device name, NUL terminated
    #[serde(with = "hex_address")]
    pub name_address: PhysicalAddress,
    /// Bluetooth device address, 6 bytes little endian
    #[serde(with = "hex_address")]
    pub bd_addr_address: PhysicalAddress,
}

/// Layout constraints for injected hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HookLayout {
    /// Exact size of the side data blob placed behind the hook code
    pub side_data_length: usize,
}

/// Immutable description of a single controller variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipProfile {
    name: String,
    memory_map: MemoryMap,
    patchram: PatchramConfig,
    connection_table: ConnectionTableConfig,
    device_info: DeviceInfo,
    hook: HookLayout,
}

impl ChipProfile {
    /// Constructs and validates a profile
    pub fn new<I: IntoIterator<Item = MemorySection>>(
        name: impl Into<String>,
        sections: I,
        patchram: PatchramConfig,
        connection_table: ConnectionTableConfig,
        device_info: DeviceInfo,
        hook: HookLayout,
    ) -> Result<Self> {
        let memory_map = MemoryMap::new(sections)?;
        patchram.validate()?;
        connection_table.validate()?;

        Ok(ChipProfile {
            name: name.into(),
            memory_map,
            patchram,
            connection_table,
            device_info,
            hook,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn memory_map(&self) -> &MemoryMap {
        &self.memory_map
    }

    pub fn patchram(&self) -> &PatchramConfig {
        &self.patchram
    }

    pub fn connection_table_config(&self) -> &ConnectionTableConfig {
        &self.connection_table
    }

    pub fn connection_table(&self) -> ConnectionTableView {
        ConnectionTableView::from_validated(self.connection_table)
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn hook_layout(&self) -> &HookLayout {
        &self.hook
    }
}

/// Last address of a `length` byte block at `base`, None if it leaves the bus
fn last_address(base: PhysicalAddress, length: usize) -> Option<PhysicalAddress> {
    match length {
        0 => Some(base),
        length => base.checked_add(u32::try_from(length - 1).ok()?),
    }
}
