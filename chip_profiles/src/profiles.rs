//! Built-in chip profiles.

use crate::error::{ProfileError, Result};
use crate::memory_map::MemorySection;
use crate::profile::{ChipProfile, ConnectionTableConfig, DeviceInfo, HookLayout, PatchramConfig};
use data_types::PhysicalAddress;
use log::debug;

/// Evaluation kit CYW927035
pub const CYW27035B1_NAME: &str = "CYW27035B1";

pub const CYW27035B1_SECTIONS: &[MemorySection] = &[
    MemorySection::described(0x00000000, 0x001fffff, true, false, "Internal ROM"),
    MemorySection::described(0x00200000, 0x0024ffff, false, true, "Internal Memory Cortex M3"),
    MemorySection::described(0x00270000, 0x0027ffff, false, true, "Internal Memory Patchram Contents"),
    MemorySection::described(0x00280000, 0x00283fff, false, true, "ToRam"),
    // 0x308000-0x337fff faults when dumped
    MemorySection::described(0x00300000, 0x00307fff, false, true, "HW Regs Cortex M3 (readable)"),
    MemorySection::described(0x00342000, 0x00342fff, false, true, "Pka Top"),
    MemorySection::described(0x00370000, 0x00370000, false, true, "RTX FIFO"),
    MemorySection::described(0x00390000, 0x00397fff, false, true, "Power WD"),
    // EF registers at 0x404000-0x407fff are sometimes unavailable
    MemorySection::described(0x00410000, 0x00413fff, false, true, "BT Modem Registers"),
    MemorySection::described(0x00420000, 0x00423fff, false, true, "FM Modem Registers"),
    MemorySection::described(0x00430000, 0x00433fff, false, true, "MAC 15.4"),
    MemorySection::described(0x00440000, 0x00443fff, false, true, "SecEng Top"),
    MemorySection::described(0x00450000, 0x00453fff, false, true, "Capscan Top"),
    // EPM RAM spans up to 0x5fffff, only this part is readable
    MemorySection::described(0x00500000, 0x0051a000, false, true, "EPM RAM (readable)"),
    MemorySection::described(0x00600000, 0x00600100, false, true, "RF Regs"),
    MemorySection::described(0x00640000, 0x00640400, false, true, "CLB Regs"),
    MemorySection::described(0x00650000, 0x00650400, false, true, "GCI Regs"),
    MemorySection::described(0x20000000, 0x20250000, false, true, "SRAM"),
    MemorySection::described(0x42000000, 0x4207ffff, false, true, "ToRam Bits"),
    MemorySection::described(0x40000000, 0x40003fff, false, true, "ToRam Alias / Peripherals"),
    MemorySection::described(0x60000000, 0x60000000, false, true, "Extern BlueRF SRAM"),
    MemorySection::described(0xa0000000, 0xa0000000, false, true, "Extern Device Address"),
    MemorySection::described(0xe0000000, 0xe0100000, false, true, "Base PPB Address"),
];

pub const CYW27035B1_PATCHRAM: PatchramConfig = PatchramConfig {
    target_table_address: PhysicalAddress::from_const(0x310000),
    enabled_bitmap_address: PhysicalAddress::from_const(0x310404),
    value_table_address: PhysicalAddress::from_const(0x270000),
    slot_count: 192,
    aligned_writes_required: false,
};

pub const CYW27035B1_CONNECTION_TABLE: ConnectionTableConfig = ConnectionTableConfig {
    base_address: PhysicalAddress::from_const(0x216F98),
    max_connections: 11,
    record_length: 0x168,
};

pub const CYW27035B1_DEVICE_INFO: DeviceInfo = DeviceInfo {
    name_address: PhysicalAddress::from_const(0x280CD0),
    bd_addr_address: PhysicalAddress::from_const(0x280CA4),
};

/// The LMP send hook carries one 8 byte handler table entry
pub const CYW27035B1_HOOK: HookLayout = HookLayout {
    side_data_length: 8,
};

/// ROM location redirected to inject LMP packets
pub const CYW27035B1_LMP_HOOK_ADDRESS: PhysicalAddress = PhysicalAddress::from_const(0xB08D8);
/// Patchram contents area not used by the vendor patches
pub const CYW27035B1_LMP_CODE_BASE: PhysicalAddress = PhysicalAddress::from_const(0x271A00);

pub fn cyw27035b1() -> Result<ChipProfile> {
    ChipProfile::new(
        CYW27035B1_NAME,
        CYW27035B1_SECTIONS.iter().cloned(),
        CYW27035B1_PATCHRAM,
        CYW27035B1_CONNECTION_TABLE,
        CYW27035B1_DEVICE_INFO,
        CYW27035B1_HOOK,
    )
}

/// Set of known profiles, looked up by chip name
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    profiles: Vec<ChipProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in profile
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(cyw27035b1()?);
        Ok(registry)
    }

    /// Adds a profile, replacing one with the same name
    pub fn register(&mut self, profile: ChipProfile) {
        debug!("registering chip profile {}", profile.name());
        self.profiles.retain(|known| known.name() != profile.name());
        self.profiles.push(profile);
    }

    pub fn lookup(&self, name: &str) -> Result<&ChipProfile> {
        self.profiles
            .iter()
            .find(|profile| profile.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ProfileError::UnknownChip(name.to_owned()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(ChipProfile::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_types::PatchSlotIndex;

    #[test]
    fn test_builtin_profile_is_valid() {
        let profile = cyw27035b1().unwrap();

        assert_eq!(profile.name(), "CYW27035B1");
        assert_eq!(profile.memory_map().sections().len(), 23);
        assert_eq!(profile.patchram().slot_count, 192);
        assert!(!profile.patchram().aligned_writes_required);
        assert_eq!(profile.connection_table().len(), 11);
        assert_eq!(profile.hook_layout().side_data_length, 8);
    }

    #[test]
    fn test_builtin_layout() {
        let profile = cyw27035b1().unwrap();
        let map = profile.memory_map();

        assert!(map.resolve(0x000B08D8.into()).unwrap().is_rom());
        assert_eq!(
            map.resolve(CYW27035B1_LMP_CODE_BASE).unwrap().name(),
            "Internal Memory Patchram Contents"
        );
        // patchram registers are not part of the dumpable map
        assert!(map.resolve(0x310000.into()).is_none());
        assert!(map.resolve(0x404000.into()).is_none());
        assert!(map.resolve(0x51a004.into()).is_none());

        let patchram = profile.patchram();
        let last = PatchSlotIndex::from_const(191);
        assert_eq!(patchram.value_entry_address(last), 0x2702fc.into());
        assert!(map.is_writable(patchram.value_entry_address(last)));

        for address in profile.connection_table().enumerate() {
            assert!(map.is_readable(address));
        }
        assert!(map.is_writable(profile.device_info().name_address));
        assert!(map.is_writable(profile.device_info().bd_addr_address));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProfileRegistry::builtin().unwrap();

        assert_eq!(registry.lookup("CYW27035B1").unwrap().name(), "CYW27035B1");
        assert_eq!(registry.lookup("cyw27035b1").unwrap().name(), "CYW27035B1");
        assert!(matches!(
            registry.lookup("BCM4335C0"),
            Err(ProfileError::UnknownChip(name)) if name == "BCM4335C0"
        ));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["CYW27035B1"]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ProfileRegistry::builtin().unwrap();
        let custom = ChipProfile::new(
            "CYW27035B1",
            CYW27035B1_SECTIONS.iter().cloned(),
            PatchramConfig {
                aligned_writes_required: true,
                ..CYW27035B1_PATCHRAM
            },
            CYW27035B1_CONNECTION_TABLE,
            CYW27035B1_DEVICE_INFO,
            CYW27035B1_HOOK,
        )
        .unwrap();
        registry.register(custom);

        assert_eq!(registry.names().count(), 1);
        assert!(
            registry
                .lookup("CYW27035B1")
                .unwrap()
                .patchram()
                .aligned_writes_required
        );
    }
}
