use crate::error::Result;
use crate::slot_table::{PatchSlotTable, SlotStatus};
use crate::transport::Transport;
use data_types::{PatchSlotIndex, PhysicalAddress, Word};
use log::warn;

/// Owns a freshly allocated slot until [`SlotGuard::commit`] is called.
/// Dropping the guard before that disables and frees the slot again.
pub struct SlotGuard<'a, T: Transport + ?Sized> {
    table: &'a mut PatchSlotTable,
    transport: &'a mut T,
    slot: PatchSlotIndex,
    armed: bool,
}

impl<'a, T: Transport + ?Sized> SlotGuard<'a, T> {
    /// Allocates a slot guarded by the returned value
    pub fn allocate(table: &'a mut PatchSlotTable, transport: &'a mut T) -> Result<Self> {
        let slot = table.allocate()?;
        Ok(SlotGuard {
            table,
            transport,
            slot,
            armed: true,
        })
    }

    pub fn slot(&self) -> PatchSlotIndex {
        self.slot
    }

    pub fn install(&mut self, target: PhysicalAddress, value: Word) -> Result<()> {
        self.table.install(&mut *self.transport, self.slot, target, value)
    }

    pub fn enable(&mut self) -> Result<()> {
        self.table.enable(&mut *self.transport, self.slot)
    }

    /// Access to the device while the slot is held, e.g. to place hook code
    pub fn transport(&mut self) -> &mut T {
        &mut *self.transport
    }

    /// Keeps the slot in whatever state it reached
    pub fn commit(mut self) -> PatchSlotIndex {
        self.armed = false;
        self.slot
    }

    fn rollback(&mut self) -> Result<()> {
        let status = self.table.slot(self.slot)?.status;
        if matches!(status, SlotStatus::Enabled | SlotStatus::Uncertain) {
            self.table.disable(&mut *self.transport, self.slot)?;
        }
        self.table.uninstall(self.slot)
    }
}

impl<T: Transport + ?Sized> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        match self.rollback() {
            Ok(()) => warn!("released slot {} after a failed patch", self.slot),
            Err(err) => warn!("slot {} could not be released: {}", self.slot, err),
        }
    }
}
