//! Planning of hook injections.
//!
//! A hook consists of pre-assembled code placed in a free RAM window, an
//! optional side data blob behind it and one patchram slot that redirects the
//! hooked ROM location into the code. The builder only computes where things
//! go and what the slot has to contain, it never touches the device.

use crate::error::{Error, Result};
use chip_profiles::ChipProfile;
use data_types::{align_up_to_word, PhysicalAddress, Word};
use log::debug;

/// What to hook and with what
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor {
    /// ROM location to redirect
    pub entry_address: PhysicalAddress,
    /// Pre-assembled hook code, not inspected
    pub code: Vec<u8>,
    /// Start of the free RAM window the code is placed in
    pub code_base: PhysicalAddress,
    /// Fixed layout data consumed by the hook code
    pub side_data: Vec<u8>,
}

/// Bytes and the address they belong at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub address: PhysicalAddress,
    pub bytes: Vec<u8>,
}

impl Placement {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Slot contents that redirect `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallRequest {
    pub target: PhysicalAddress,
    pub value: Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookPlan {
    pub code: Placement,
    pub side_data: Placement,
    pub install: InstallRequest,
}

impl HookPlan {
    /// Bytes used in the RAM window, including alignment padding
    pub fn footprint(&self) -> usize {
        if self.side_data.is_empty() {
            self.code.len()
        } else {
            align_up_to_word(self.code.len()) + self.side_data.len()
        }
    }
}

/// Handler table entry consumed by the LMP send hook: the handler address
/// followed by the packet length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LmpTableEntry {
    pub handler: PhysicalAddress,
    pub length: u8,
}

impl LmpTableEntry {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[..4].copy_from_slice(&self.handler.to_const().to_le_bytes());
        bytes[4] = self.length;
        bytes
    }
}

impl From<LmpTableEntry> for Vec<u8> {
    fn from(entry: LmpTableEntry) -> Self {
        entry.to_bytes().to_vec()
    }
}

pub struct HookInjectionBuilder<'p> {
    profile: &'p ChipProfile,
    window_length: usize,
}

impl<'p> HookInjectionBuilder<'p> {
    /// `window_length` is the number of free bytes at the code base the
    /// caller vouches for.
    pub fn new(profile: &'p ChipProfile, window_length: usize) -> Self {
        HookInjectionBuilder {
            profile,
            window_length,
        }
    }

    pub fn build(&self, hook: &HookDescriptor) -> Result<HookPlan> {
        let expected = self.profile.hook_layout().side_data_length;
        if hook.side_data.len() != expected {
            return Err(Error::MalformedSideData {
                expected,
                actual: hook.side_data.len(),
            });
        }

        let side_data_offset = align_up_to_word(hook.code.len());
        let required = if hook.side_data.is_empty() {
            hook.code.len()
        } else {
            side_data_offset + hook.side_data.len()
        };
        if required > self.window_length {
            return Err(Error::InsufficientSpace {
                required,
                available: self.window_length,
            });
        }

        self.profile
            .memory_map()
            .check_write(hook.code_base, self.window_length)?;

        // the window check above covers the whole side data range
        let side_data_address = hook.code_base + side_data_offset as u32;
        let value = thumb_branch(hook.entry_address, hook.code_base)?;

        debug!(
            "hook {} -> {}: {} bytes code, {} bytes side data at {}",
            hook.entry_address,
            hook.code_base,
            hook.code.len(),
            hook.side_data.len(),
            side_data_address
        );

        Ok(HookPlan {
            code: Placement {
                address: hook.code_base,
                bytes: hook.code.clone(),
            },
            side_data: Placement {
                address: side_data_address,
                bytes: hook.side_data.clone(),
            },
            install: InstallRequest {
                target: hook.entry_address,
                value,
            },
        })
    }
}

/// Encodes a Thumb-2 `B.W` located at `from` that jumps to `to`
pub fn thumb_branch(from: PhysicalAddress, to: PhysicalAddress) -> Result<Word> {
    let out_of_range = Error::BranchOutOfRange { from, to };

    if from.to_const() % 2 != 0 || to.to_const() % 2 != 0 {
        return Err(out_of_range);
    }

    // the pc reads 4 bytes ahead
    let offset = i64::from(to.to_const()) - (i64::from(from.to_const()) + 4);
    if !(-(1 << 24)..(1 << 24)).contains(&offset) {
        return Err(out_of_range);
    }

    let bits = (offset as u32) & 0x01ff_ffff;
    let sign = u32::from(offset < 0);
    let imm10 = (bits >> 12) & 0x3ff;
    let imm11 = (bits >> 1) & 0x7ff;
    let i1 = (bits >> 23) & 1;
    let i2 = (bits >> 22) & 1;
    let j1 = (!i1 & 1) ^ sign;
    let j2 = (!i2 & 1) ^ sign;

    let high = (0xf000 | (sign << 10) | imm10) as u16;
    let low = (0x9000 | (j1 << 13) | (j2 << 11) | imm11) as u16;

    let mut word = [0; 4];
    word[..2].copy_from_slice(&high.to_le_bytes());
    word[2..].copy_from_slice(&low.to_le_bytes());
    Ok(word)
}
