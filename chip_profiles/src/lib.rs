//! # Chip profiles
//!
//! Static knowledge about Bluetooth controller variants: the physical memory
//! map, where the patchram tables live, how the connection table is laid out
//! and where the device identity is kept in RAM.
//! Built-in profiles are in [`profiles`], further ones can be loaded from JSON.

pub mod config;
pub mod connection_table;
pub mod error;
pub mod memory_map;
pub mod profile;
pub mod profiles;

pub use config::{ProfileDefinition, SectionDefinition};
pub use connection_table::{ConnectionTableView, RecordAddresses};
pub use error::{IndexOutOfRange, MemoryError, ProfileError, Result};
pub use memory_map::{MemoryMap, MemorySection, SectionFlags};
pub use profile::{ChipProfile, ConnectionTableConfig, DeviceInfo, HookLayout, PatchramConfig};
pub use profiles::ProfileRegistry;
