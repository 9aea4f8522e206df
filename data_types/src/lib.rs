//! Shared address types for patchram tooling.
//!
//! Addresses are wrapped in newtypes so that physical bus addresses and
//! patchram slot indexes can not be mixed up by accident.

pub mod addresses;

pub use addresses::{align_up_to_word, PatchSlotIndex, PhysicalAddress, Word, WORD_SIZE};
