//! Profile descriptions in JSON.
//!
//! Besides the built-in profiles, a profile can be supplied as a JSON
//! document. Addresses are written as hex strings ("0x310000"), plain numbers
//! are accepted as well. Loading always runs the full validation of
//! [`ChipProfile::new`].

use crate::error::Result;
use crate::memory_map::{MemorySection, SectionFlags};
use crate::profile::{ChipProfile, ConnectionTableConfig, DeviceInfo, HookLayout, PatchramConfig};
use data_types::PhysicalAddress;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Serialized form of a memory section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDefinition {
    #[serde(with = "hex_address")]
    pub start: PhysicalAddress,
    /// inclusive
    #[serde(with = "hex_address")]
    pub end: PhysicalAddress,
    pub rom: bool,
    pub ram: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unreliable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl From<&MemorySection> for SectionDefinition {
    fn from(section: &MemorySection) -> Self {
        SectionDefinition {
            start: section.start(),
            end: section.end(),
            rom: section.is_rom(),
            ram: section.is_ram(),
            unreliable: section.is_unreliable(),
            name: section.name().to_owned(),
        }
    }
}

impl From<SectionDefinition> for MemorySection {
    fn from(definition: SectionDefinition) -> Self {
        let mut flags = SectionFlags::empty();
        flags.set(SectionFlags::ROM, definition.rom);
        flags.set(SectionFlags::RAM, definition.ram);
        flags.set(SectionFlags::UNRELIABLE, definition.unreliable);
        MemorySection::with_flags(definition.start, definition.end, flags, definition.name)
    }
}

/// Serialized form of a chip profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub name: String,
    pub device_info: DeviceInfo,
    pub sections: Vec<SectionDefinition>,
    pub patchram: PatchramConfig,
    pub connection_table: ConnectionTableConfig,
    #[serde(default)]
    pub hook: HookLayout,
}

impl ProfileDefinition {
    pub fn build(self) -> Result<ChipProfile> {
        ChipProfile::new(
            self.name,
            self.sections.into_iter().map(MemorySection::from),
            self.patchram,
            self.connection_table,
            self.device_info,
            self.hook,
        )
    }
}

impl From<&ChipProfile> for ProfileDefinition {
    fn from(profile: &ChipProfile) -> Self {
        ProfileDefinition {
            name: profile.name().to_owned(),
            device_info: *profile.device_info(),
            sections: profile
                .memory_map()
                .sections()
                .iter()
                .map(SectionDefinition::from)
                .collect(),
            patchram: *profile.patchram(),
            connection_table: *profile.connection_table_config(),
            hook: *profile.hook_layout(),
        }
    }
}

impl ChipProfile {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let definition: ProfileDefinition = serde_json::from_str(json)?;
        definition.build()
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let definition: ProfileDefinition = serde_json::from_reader(reader)?;
        definition.build()
    }

    pub fn from_file<A: AsRef<Path>>(path: A) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_json_reader(BufReader::new(file))
    }

    pub fn to_json_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &ProfileDefinition::from(self))?;
        Ok(())
    }

    pub fn save<A: AsRef<Path>>(&self, path: A) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.to_json_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// (De)serializes a [`PhysicalAddress`] as a hex string for human readable
/// formats and as a plain number otherwise.
pub mod hex_address {
    use data_types::PhysicalAddress;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    pub fn serialize<S>(address: &PhysicalAddress, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&format!("0x{:X}", address.to_const()))
        } else {
            address.to_const().serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PhysicalAddress, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(PhysicalAddress::from_const(value)),
            Raw::Text(text) => parse(&text).map_err(serde::de::Error::custom),
        }
    }

    pub fn parse(text: &str) -> Result<PhysicalAddress, String> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        let digits = digits.replace('_', "");
        u32::from_str_radix(&digits, 16)
            .map(PhysicalAddress::from_const)
            .map_err(|err| format!("invalid address '{}': {}", text, err))
    }
}
