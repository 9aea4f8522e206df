//! Patchram slot bookkeeping.
//!
//! Every slot redirects one target address to a replacement word. Putting a
//! redirection in place takes three device writes: the target table entry,
//! the value table entry and finally the enable bit. Only the enable bit
//! makes the slot live, so a failure anywhere before it leaves a slot that
//! is merely installed and can be installed over again.
//!
//! The table mirrors what this session did to the device. It is attached to
//! a device once by reading the enable bitmap, afterwards all methods that
//! touch the device take the transport explicitly.

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportError};
use chip_profiles::PatchramConfig;
use core::fmt;
use data_types::{PatchSlotIndex, PhysicalAddress, Word};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    /// Handed out by `allocate`, tables may hold stale or partial data
    Allocated,
    Installed {
        target: PhysicalAddress,
        value: Word,
    },
    Enabled {
        target: PhysicalAddress,
        value: Word,
    },
    /// The enable bit write failed and the device state is unknown
    Uncertain {
        target: PhysicalAddress,
        value: Word,
    },
    /// Enabled on the device before this session attached
    Reserved { target: PhysicalAddress },
}

impl SlotState {
    fn status(&self) -> SlotStatus {
        match self {
            SlotState::Free => SlotStatus::Free,
            SlotState::Allocated => SlotStatus::Allocated,
            SlotState::Installed { .. } => SlotStatus::Installed,
            SlotState::Enabled { .. } => SlotStatus::Enabled,
            SlotState::Uncertain { .. } => SlotStatus::Uncertain,
            SlotState::Reserved { .. } => SlotStatus::Reserved,
        }
    }

    fn target(&self) -> Option<PhysicalAddress> {
        match *self {
            SlotState::Installed { target, .. }
            | SlotState::Enabled { target, .. }
            | SlotState::Uncertain { target, .. }
            | SlotState::Reserved { target } => Some(target),
            SlotState::Free | SlotState::Allocated => None,
        }
    }

    fn value(&self) -> Option<Word> {
        match *self {
            SlotState::Installed { value, .. }
            | SlotState::Enabled { value, .. }
            | SlotState::Uncertain { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether the redirection may be live on the device
    fn is_live(&self) -> bool {
        matches!(
            self,
            SlotState::Enabled { .. } | SlotState::Uncertain { .. } | SlotState::Reserved { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    Free,
    Allocated,
    Installed,
    Enabled,
    Uncertain,
    Reserved,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SlotStatus::Free => "free",
            SlotStatus::Allocated => "allocated",
            SlotStatus::Installed => "installed",
            SlotStatus::Enabled => "enabled",
            SlotStatus::Uncertain => "uncertain",
            SlotStatus::Reserved => "reserved",
        };
        f.write_str(text)
    }
}

/// Snapshot of a single slot as seen by this session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSlot {
    pub index: PatchSlotIndex,
    pub status: SlotStatus,
    pub target: Option<PhysicalAddress>,
    pub value: Option<Word>,
    /// Offset of the slot's entry in the value table, set while installed
    pub value_offset: Option<u32>,
    pub enabled: bool,
}

/// Slot contents read back from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSlot {
    pub index: PatchSlotIndex,
    pub target: PhysicalAddress,
    pub value: Word,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct PatchSlotTable {
    config: PatchramConfig,
    slots: Vec<SlotState>,
}

impl PatchSlotTable {
    /// A table with every slot free. Only correct for a device without any
    /// enabled patchram slot, use [`PatchSlotTable::attach`] otherwise.
    pub fn new(config: PatchramConfig) -> Self {
        PatchSlotTable {
            config,
            slots: vec![SlotState::Free; config.slot_count],
        }
    }

    /// Builds the table from the device's enable bitmap. Slots enabled on the
    /// device are reserved, everything else starts out free.
    pub fn attach<T: Transport + ?Sized>(config: PatchramConfig, transport: &mut T) -> Result<Self> {
        let mut table = Self::new(config);

        for word in 0..config.bitmap_words() {
            let address = config.enabled_bitmap_address + (word * 4) as u32;
            let bits = transport.read_u32(address)?;
            if bits == 0 {
                continue;
            }

            for slot in (word * 32..(word + 1) * 32).map(PatchSlotIndex::from_const) {
                if !config.contains_slot(slot) || bits & slot.bitmap_mask() == 0 {
                    continue;
                }
                let raw = transport.read_u32(config.target_entry_address(slot))?;
                let target = PhysicalAddress::from_const(raw);
                debug!("slot {} already redirects {}", slot, target);
                table.slots[slot.index()] = SlotState::Reserved { target };
            }
        }

        let reserved = table.count(SlotStatus::Reserved);
        if reserved > 0 {
            info!("{} of {} patchram slots are in use by the firmware", reserved, config.slot_count);
        }

        Ok(table)
    }

    pub fn config(&self) -> &PatchramConfig {
        &self.config
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, slot: PatchSlotIndex) -> Result<PatchSlot> {
        let state = self.state(slot)?;
        Ok(self.describe(slot, &state))
    }

    pub fn slots(&self) -> impl Iterator<Item = PatchSlot> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, state)| self.describe(PatchSlotIndex::from_const(index), state))
    }

    pub fn count(&self, status: SlotStatus) -> usize {
        self.slots.iter().filter(|state| state.status() == status).count()
    }

    /// Slot holding a possibly live redirection of `target`
    pub fn find_live(&self, target: PhysicalAddress) -> Option<PatchSlotIndex> {
        self.slots
            .iter()
            .position(|state| state.is_live() && state.target() == Some(target))
            .map(PatchSlotIndex::from_const)
    }

    /// Hands out the lowest free slot
    pub fn allocate(&mut self) -> Result<PatchSlotIndex> {
        let index = self
            .slots
            .iter()
            .position(|state| *state == SlotState::Free)
            .ok_or(Error::NoFreeSlot)?;

        self.slots[index] = SlotState::Allocated;
        let slot = PatchSlotIndex::from_const(index);
        debug!("allocated slot {}", slot);
        Ok(slot)
    }

    /// Writes target and value table entries of an allocated slot. The slot
    /// stays disabled. A slot left uncertain by a failed enable is disabled
    /// on the device first.
    pub fn install<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        slot: PatchSlotIndex,
        target: PhysicalAddress,
        value: Word,
    ) -> Result<()> {
        match self.state(slot)? {
            SlotState::Allocated | SlotState::Installed { .. } => {}
            SlotState::Uncertain { target, value } => {
                warn!("settling uncertain slot {} before reuse", slot);
                self.settle(transport, slot, target, value)?;
            }
            state => return Err(self.invalid_state(slot, state, "install")),
        }

        if !self.config.is_target_aligned(target) {
            return Err(Error::Alignment { target });
        }
        self.check_conflict(slot, target)?;

        // any failure from here on leaves a slot that has to be installed again
        self.slots[slot.index()] = SlotState::Allocated;

        let target_entry = self.config.target_entry_address(slot);
        debug!("slot {}: target entry {} <- {}", slot, target_entry, target);
        transport.write_u32(target_entry, target.to_const())?;

        let value_entry = self.config.value_entry_address(slot);
        debug!(
            "slot {}: value entry {} <- {:08x}",
            slot,
            value_entry,
            u32::from_le_bytes(value)
        );
        transport.write_word(value_entry, value)?;

        self.slots[slot.index()] = SlotState::Installed { target, value };
        Ok(())
    }

    /// Sets the enable bit of an installed slot. This makes the redirection
    /// live. If the bit can not be written, the bit is cleared again so the
    /// slot stays installed but disabled.
    pub fn enable<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        slot: PatchSlotIndex,
    ) -> Result<()> {
        let (target, value) = match self.state(slot)? {
            SlotState::Installed { target, value } => (target, value),
            state => return Err(self.invalid_state(slot, state, "enable")),
        };
        self.check_conflict(slot, target)?;

        let address = self.config.bitmap_word_address(slot);
        let bits = transport.read_u32(address)?;

        if let Err(err) = transport.write_u32(address, bits | slot.bitmap_mask()) {
            match transport.write_u32(address, bits & !slot.bitmap_mask()) {
                Ok(()) => {
                    warn!("enabling slot {} failed, rolled back: {}", slot, err);
                }
                Err(rollback) => {
                    warn!(
                        "enabling slot {} failed and the rollback failed as well: {}",
                        slot, rollback
                    );
                    self.slots[slot.index()] = SlotState::Uncertain { target, value };
                }
            }
            return Err(err.into());
        }

        self.slots[slot.index()] = SlotState::Enabled { target, value };
        info!("slot {} enabled, {} redirected", slot, target);
        Ok(())
    }

    /// Clears the enable bit. Target and value stay installed.
    pub fn disable<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        slot: PatchSlotIndex,
    ) -> Result<()> {
        let (target, value) = match self.state(slot)? {
            SlotState::Installed { .. } => return Ok(()),
            SlotState::Enabled { target, value } | SlotState::Uncertain { target, value } => {
                (target, value)
            }
            state => return Err(self.invalid_state(slot, state, "disable")),
        };

        self.settle(transport, slot, target, value)?;
        info!("slot {} disabled", slot);
        Ok(())
    }

    /// Frees a disabled slot
    pub fn uninstall(&mut self, slot: PatchSlotIndex) -> Result<()> {
        match self.state(slot)? {
            SlotState::Allocated | SlotState::Installed { .. } => {}
            state => return Err(self.invalid_state(slot, state, "uninstall")),
        }

        self.slots[slot.index()] = SlotState::Free;
        info!("slot {} uninstalled", slot);
        Ok(())
    }

    /// Takes over a slot found enabled on attach, so it can be disabled and
    /// reused.
    pub fn adopt<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        slot: PatchSlotIndex,
    ) -> Result<()> {
        let target = match self.state(slot)? {
            SlotState::Reserved { target } => target,
            state => return Err(self.invalid_state(slot, state, "adopt")),
        };

        let value = transport.read_word(self.config.value_entry_address(slot))?;
        self.slots[slot.index()] = SlotState::Enabled { target, value };
        info!("adopted slot {} redirecting {}", slot, target);
        Ok(())
    }

    /// Reads every slot back from the device, regardless of its state here
    pub fn read_device_state<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<Vec<DeviceSlot>> {
        let bitmap: Vec<u32> = (0..self.config.bitmap_words())
            .map(|word| transport.read_u32(self.config.enabled_bitmap_address + (word * 4) as u32))
            .collect::<core::result::Result<_, _>>()?;

        self.config
            .slots()
            .map(|slot| -> Result<DeviceSlot> {
                let raw = transport.read_u32(self.config.target_entry_address(slot))?;
                let value = transport.read_word(self.config.value_entry_address(slot))?;
                Ok(DeviceSlot {
                    index: slot,
                    target: PhysicalAddress::from_const(raw),
                    value,
                    enabled: bitmap[slot.bitmap_word()] & slot.bitmap_mask() != 0,
                })
            })
            .collect()
    }

    /// Clears the enable bit of a possibly live slot. Leaves the slot
    /// installed on success, uncertain if the bit could not be written.
    fn settle<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        slot: PatchSlotIndex,
        target: PhysicalAddress,
        value: Word,
    ) -> core::result::Result<(), TransportError> {
        let address = self.config.bitmap_word_address(slot);
        let bits = transport.read_u32(address)?;

        if let Err(err) = transport.write_u32(address, bits & !slot.bitmap_mask()) {
            self.slots[slot.index()] = SlotState::Uncertain { target, value };
            return Err(err);
        }

        self.slots[slot.index()] = SlotState::Installed { target, value };
        Ok(())
    }

    fn check_conflict(&self, slot: PatchSlotIndex, target: PhysicalAddress) -> Result<()> {
        let conflict = self
            .slots
            .iter()
            .enumerate()
            .find(|(index, state)| {
                *index != slot.index() && state.is_live() && state.target() == Some(target)
            });

        match conflict {
            Some((index, _)) => Err(Error::Conflict {
                target,
                slot: PatchSlotIndex::from_const(index),
            }),
            None => Ok(()),
        }
    }

    fn state(&self, slot: PatchSlotIndex) -> Result<SlotState> {
        self.slots
            .get(slot.index())
            .copied()
            .ok_or(Error::InvalidSlot {
                slot,
                slot_count: self.slots.len(),
            })
    }

    fn invalid_state(&self, slot: PatchSlotIndex, state: SlotState, operation: &'static str) -> Error {
        Error::InvalidState {
            slot,
            state: state.status(),
            operation,
        }
    }

    fn describe(&self, slot: PatchSlotIndex, state: &SlotState) -> PatchSlot {
        let value_offset = state.value().map(|_| slot.table_offset());
        PatchSlot {
            index: slot,
            status: state.status(),
            target: state.target(),
            value: state.value(),
            value_offset,
            enabled: matches!(state, SlotState::Enabled { .. } | SlotState::Reserved { .. }),
        }
    }
}
