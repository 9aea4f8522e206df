//! # Patchram
//!
//! Redirects ROM code of a Bluetooth controller through its patchram slots.
//! A [`Patchram`] session pairs a [`ChipProfile`] with a [`Transport`] to the
//! device and keeps the slot bookkeeping in a [`PatchSlotTable`].
//!
//! Writes into the firmware's RAM go through [`GuardedMemory`] and are
//! checked against the memory map. The patchram registers themselves are
//! written directly, they are not part of the dumpable memory map.

pub mod device;
#[cfg(any(test, feature = "emulation"))]
pub mod emulation;
pub mod error;
pub mod guard;
pub mod hook;
pub mod memory;
pub mod shared;
pub mod slot_table;
pub mod transport;

pub use device::BdAddr;
pub use error::{Error, Result};
pub use guard::SlotGuard;
pub use hook::{HookDescriptor, HookInjectionBuilder, HookPlan, InstallRequest, LmpTableEntry, Placement};
pub use memory::GuardedMemory;
pub use shared::SharedPatchram;
pub use slot_table::{DeviceSlot, PatchSlot, PatchSlotTable, SlotStatus};
pub use transport::{Transport, TransportError};

use chip_profiles::ChipProfile;
use data_types::{PatchSlotIndex, PhysicalAddress, Word};
use log::info;

/// A patching session on one device
pub struct Patchram<'p, T: Transport> {
    profile: &'p ChipProfile,
    transport: T,
    table: PatchSlotTable,
}

impl<'p, T: Transport> Patchram<'p, T> {
    /// Starts a session, slots already enabled on the device are left alone
    pub fn attach(profile: &'p ChipProfile, mut transport: T) -> Result<Self> {
        let table = PatchSlotTable::attach(*profile.patchram(), &mut transport)?;
        info!(
            "attached to {}, {} of {} patchram slots free",
            profile.name(),
            table.count(SlotStatus::Free),
            table.slot_count()
        );

        Ok(Patchram {
            profile,
            transport,
            table,
        })
    }

    pub fn profile(&self) -> &'p ChipProfile {
        self.profile
    }

    pub fn table(&self) -> &PatchSlotTable {
        &self.table
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Memory access checked against the profile's memory map
    pub fn memory(&mut self) -> GuardedMemory<'p, '_, T> {
        let profile = self.profile;
        GuardedMemory::new(profile.memory_map(), &mut self.transport)
    }

    pub fn allocate(&mut self) -> Result<PatchSlotIndex> {
        self.table.allocate()
    }

    pub fn install(&mut self, slot: PatchSlotIndex, target: PhysicalAddress, value: Word) -> Result<()> {
        self.table.install(&mut self.transport, slot, target, value)
    }

    pub fn enable(&mut self, slot: PatchSlotIndex) -> Result<()> {
        self.table.enable(&mut self.transport, slot)
    }

    pub fn disable(&mut self, slot: PatchSlotIndex) -> Result<()> {
        self.table.disable(&mut self.transport, slot)
    }

    pub fn uninstall(&mut self, slot: PatchSlotIndex) -> Result<()> {
        self.table.uninstall(slot)
    }

    pub fn adopt(&mut self, slot: PatchSlotIndex) -> Result<()> {
        self.table.adopt(&mut self.transport, slot)
    }

    pub fn read_device_state(&mut self) -> Result<Vec<DeviceSlot>> {
        self.table.read_device_state(&mut self.transport)
    }

    /// Allocates, installs and enables a slot in one go. On failure the slot
    /// is released again.
    pub fn patch(&mut self, target: PhysicalAddress, value: Word) -> Result<PatchSlotIndex> {
        let mut guard = SlotGuard::allocate(&mut self.table, &mut self.transport)?;
        guard.install(target, value)?;
        guard.enable()?;
        Ok(guard.commit())
    }

    /// Disables and frees a slot
    pub fn unpatch(&mut self, slot: PatchSlotIndex) -> Result<()> {
        self.disable(slot)?;
        self.uninstall(slot)
    }

    /// Writes the hook code and side data and installs the redirect into a
    /// new slot. The slot is not enabled, that is up to the caller.
    pub fn install_hook(&mut self, plan: &HookPlan) -> Result<PatchSlotIndex> {
        let profile = self.profile;
        let mut guard = SlotGuard::allocate(&mut self.table, &mut self.transport)?;

        let mut memory = GuardedMemory::new(profile.memory_map(), guard.transport());
        memory.write(plan.code.address, &plan.code.bytes)?;
        memory.write(plan.side_data.address, &plan.side_data.bytes)?;

        guard.install(plan.install.target, plan.install.value)?;
        let slot = guard.commit();
        info!("hook at {} installed in slot {}", plan.install.target, slot);
        Ok(slot)
    }

    pub fn bd_addr(&mut self) -> Result<BdAddr> {
        let info = *self.profile.device_info();
        device::read_bd_addr(&mut self.memory(), &info)
    }

    pub fn device_name(&mut self) -> Result<String> {
        let info = *self.profile.device_info();
        device::read_device_name(&mut self.memory(), &info)
    }

    pub fn connection_record(&mut self, index: usize) -> Result<Vec<u8>> {
        let view = self.profile.connection_table();
        device::read_connection_record(&mut self.memory(), &view, index)
    }
}
