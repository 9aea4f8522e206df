//! Physical address space of a controller.
//!
//! A memory map is an ordered set of non overlapping sections. Each section
//! is tagged as ROM or RAM. Lookups are done with a binary search over the
//! section starts, the map is never modified after construction.

use crate::error::{MemoryError, ProfileError};
use data_types::{PhysicalAddress, WORD_SIZE};
use itertools::Itertools;
use std::borrow::Cow;

bitflags::bitflags! {
    /// Attributes of a memory section
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u8 {
        /// Content is mask ROM, writes are rejected
        const ROM = 1 << 0;
        /// Content is RAM or a register file
        const RAM = 1 << 1;
        /// Reads were observed to fault on real hardware
        const UNRELIABLE = 1 << 2;
    }
}

/// A contiguous range of the address space. `end` is inclusive and names the
/// last bus word of the section, so a section with `start == end` is a single
/// addressable word (e.g. a FIFO register).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySection {
    start: PhysicalAddress,
    end: PhysicalAddress,
    flags: SectionFlags,
    name: Cow<'static, str>,
}

impl MemorySection {
    pub const fn new(start: u32, end: u32, is_rom: bool, is_ram: bool) -> Self {
        Self::described(start, end, is_rom, is_ram, "")
    }

    pub const fn described(
        start: u32,
        end: u32,
        is_rom: bool,
        is_ram: bool,
        name: &'static str,
    ) -> Self {
        let mut flags = SectionFlags::empty();
        if is_rom {
            flags = flags.union(SectionFlags::ROM);
        }
        if is_ram {
            flags = flags.union(SectionFlags::RAM);
        }

        MemorySection {
            start: PhysicalAddress::from_const(start),
            end: PhysicalAddress::from_const(end),
            flags,
            name: Cow::Borrowed(name),
        }
    }

    pub const fn unreliable(mut self) -> Self {
        self.flags = self.flags.union(SectionFlags::UNRELIABLE);
        self
    }

    pub fn with_flags(
        start: PhysicalAddress,
        end: PhysicalAddress,
        flags: SectionFlags,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        MemorySection {
            start,
            end,
            flags,
            name: name.into(),
        }
    }

    pub fn start(&self) -> PhysicalAddress {
        self.start
    }

    /// End address as declared (inclusive)
    pub fn end(&self) -> PhysicalAddress {
        self.end
    }

    /// Last byte covered, the final byte of the word `end` lies in
    pub fn last(&self) -> PhysicalAddress {
        // align_word is at most 0xffff_fffc
        self.end.align_word() + (WORD_SIZE as u32 - 1)
    }

    /// Number of addressable bytes. A u64, since a section may span the
    /// whole 32 bit bus.
    pub fn len(&self) -> u64 {
        u64::from(self.last().to_const()) - u64::from(self.start.to_const()) + 1
    }

    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_rom(&self) -> bool {
        self.flags.contains(SectionFlags::ROM)
    }

    pub fn is_ram(&self) -> bool {
        self.flags.contains(SectionFlags::RAM)
    }

    pub fn is_unreliable(&self) -> bool {
        self.flags.contains(SectionFlags::UNRELIABLE)
    }

    pub fn contains(&self, address: PhysicalAddress) -> bool {
        self.start <= address && address <= self.last()
    }

    fn overlaps(&self, other: &MemorySection) -> bool {
        self.start <= other.last() && other.start <= self.last()
    }
}

/// Validated, immutable set of memory sections sorted by start address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap {
    sections: Vec<MemorySection>,
}

impl MemoryMap {
    /// Builds a memory map. Fails if a section ends before it starts or if
    /// any two sections overlap. The input order does not matter.
    pub fn new<I: IntoIterator<Item = MemorySection>>(sections: I) -> Result<Self, ProfileError> {
        let mut sections = sections.into_iter().collect_vec();

        if let Some(section) = sections.iter().find(|s| s.start > s.end) {
            return Err(ProfileError::InvertedSection {
                start: section.start,
                end: section.end,
            });
        }

        sections.sort_by_key(|section| section.start);

        // sorted by start, so checking neighbours is sufficient
        if let Some((first, second)) = sections
            .iter()
            .tuple_windows()
            .find(|(first, second)| first.overlaps(second))
        {
            return Err(ProfileError::OverlappingSections {
                first_start: first.start,
                first_end: first.end,
                second_start: second.start,
                second_end: second.end,
            });
        }

        Ok(MemoryMap { sections })
    }

    pub fn sections(&self) -> &[MemorySection] {
        &self.sections
    }

    /// Returns the section covering `address`, if any
    pub fn resolve(&self, address: PhysicalAddress) -> Option<&MemorySection> {
        let index = self
            .sections
            .partition_point(|section| section.start <= address);
        let section = self.sections.get(index.checked_sub(1)?)?;
        section.contains(address).then_some(section)
    }

    pub fn is_writable(&self, address: PhysicalAddress) -> bool {
        self.resolve(address)
            .map(|section| !section.is_rom())
            .unwrap_or(false)
    }

    pub fn is_readable(&self, address: PhysicalAddress) -> bool {
        self.resolve(address)
            .map(|section| !section.is_unreliable())
            .unwrap_or(false)
    }

    /// Checks that `length` bytes starting at `address` may be written.
    /// The range may cross adjacent sections, but every byte must be covered
    /// and none may be ROM.
    pub fn check_write(&self, address: PhysicalAddress, length: usize) -> Result<(), MemoryError> {
        self.check_range(address, length, |section, at| {
            if section.is_rom() {
                Err(MemoryError::WriteProtected(at))
            } else {
                Ok(())
            }
        })
    }

    /// Checks that `length` bytes starting at `address` can be read without
    /// touching unmapped or faulting memory.
    pub fn check_read(&self, address: PhysicalAddress, length: usize) -> Result<(), MemoryError> {
        self.check_range(address, length, |section, at| {
            if section.is_unreliable() {
                Err(MemoryError::UnreliableRead(at))
            } else {
                Ok(())
            }
        })
    }

    fn check_range<F>(
        &self,
        address: PhysicalAddress,
        length: usize,
        check: F,
    ) -> Result<(), MemoryError>
    where
        F: Fn(&MemorySection, PhysicalAddress) -> Result<(), MemoryError>,
    {
        if length == 0 {
            return Ok(());
        }

        let last = u32::try_from(length - 1)
            .ok()
            .and_then(|extent| address.checked_add(extent))
            .ok_or(MemoryError::OutOfRange(address))?;

        let mut cursor = address;
        loop {
            let section = self.resolve(cursor).ok_or(MemoryError::OutOfRange(cursor))?;
            check(section, cursor)?;

            if section.last() >= last {
                return Ok(());
            }
            // section.last() < last <= u32::MAX, so this can not overflow
            cursor = section.last() + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::CYW27035B1_SECTIONS;

    fn cyw27035b1() -> MemoryMap {
        MemoryMap::new(CYW27035B1_SECTIONS.iter().cloned()).unwrap()
    }

    fn brute_force<'a>(
        sections: &'a [MemorySection],
        address: PhysicalAddress,
    ) -> Option<&'a MemorySection> {
        sections.iter().find(|section| section.contains(address))
    }

    #[test]
    fn test_sections_sorted_and_disjoint() {
        let map = cyw27035b1();
        for (first, second) in map.sections().iter().tuple_windows() {
            assert!(first.start() <= first.end());
            assert!(first.end() < second.start(), "{:?} / {:?}", first, second);
        }
    }

    #[test]
    fn test_resolve_matches_brute_force() {
        let map = cyw27035b1();

        let mut probes = Vec::new();
        for section in CYW27035B1_SECTIONS {
            let start = section.start();
            let end = section.end();
            probes.push(start);
            probes.push(end);
            probes.extend(start.checked_sub(1));
            probes.extend(end.checked_add(1));
        }
        probes.extend([PhysicalAddress::ZERO, PhysicalAddress::MAX]);
        probes.extend((0..0x1000u32).map(|i| PhysicalAddress::from_const(i.wrapping_mul(0x0010_0ffb))));

        for probe in probes {
            assert_eq!(
                map.resolve(probe),
                brute_force(map.sections(), probe),
                "resolve({}) disagrees with linear scan",
                probe
            );
        }
    }

    #[test]
    fn test_single_word_section() {
        let map = cyw27035b1();
        let fifo = PhysicalAddress::from_const(0x00370000);

        let section = map.resolve(fifo).unwrap();
        assert_eq!(section.start(), section.end());
        assert_eq!(section.last(), fifo + 3);
        assert_eq!(section.len(), 4);
        assert_eq!(map.resolve(fifo + 3), Some(section));
        assert!(map.resolve(fifo + 4).is_none());
        assert!(map.resolve(fifo - 1).is_none());
        assert!(map.check_write(fifo, 4).is_ok());
        assert!(map.check_read(fifo, 4).is_ok());
        assert_eq!(
            map.check_write(fifo, 5),
            Err(MemoryError::OutOfRange(fifo + 4))
        );

        for single in [0x60000000, 0xa0000000] {
            assert!(map.check_write(single.into(), 4).is_ok());
        }
    }

    #[test]
    fn test_rejects_overlap() {
        let result = MemoryMap::new([
            MemorySection::new(0x0000, 0x0fff, true, false),
            MemorySection::new(0x2000, 0x2fff, false, true),
            MemorySection::new(0x0800, 0x1fff, false, true),
        ]);
        assert!(matches!(
            result,
            Err(ProfileError::OverlappingSections { .. })
        ));

        // sharing a single boundary address is an overlap as well
        let result = MemoryMap::new([
            MemorySection::new(0x0000, 0x1000, true, false),
            MemorySection::new(0x1000, 0x1fff, false, true),
        ]);
        assert!(matches!(
            result,
            Err(ProfileError::OverlappingSections { .. })
        ));

        // a one-word section owns its whole word
        let result = MemoryMap::new([
            MemorySection::new(0x1000, 0x1000, false, true),
            MemorySection::new(0x1002, 0x1fff, false, true),
        ]);
        assert!(matches!(
            result,
            Err(ProfileError::OverlappingSections { .. })
        ));
    }

    #[test]
    fn test_rejects_inverted_section() {
        let result = MemoryMap::new([MemorySection::new(0x2000, 0x1fff, false, true)]);
        assert!(matches!(result, Err(ProfileError::InvertedSection { .. })));
    }

    #[test]
    fn test_writability() {
        let map = cyw27035b1();

        assert!(!map.is_writable(0x000B08D8.into()));
        assert!(map.is_writable(0x00271A00.into()));
        assert!(!map.is_writable(0x00310000.into()));

        assert_eq!(
            map.check_write(0x000B08D8.into(), 4),
            Err(MemoryError::WriteProtected(0x000B08D8.into()))
        );
        assert_eq!(
            map.check_write(0x00310000.into(), 4),
            Err(MemoryError::OutOfRange(0x00310000.into()))
        );
        // patchram contents and ToRam are adjacent
        assert!(map.check_write(0x0027fffe.into(), 4).is_ok());
        // the last EPM RAM word is mapped, the one after it is not
        assert!(map.check_write(0x0051a000.into(), 4).is_ok());
        assert_eq!(
            map.check_write(0x0051a002.into(), 4),
            Err(MemoryError::OutOfRange(0x0051a004.into()))
        );
        assert!(map.check_write(0x00271A00.into(), 0x600).is_ok());
    }

    #[test]
    fn test_range_crosses_adjacent_sections() {
        let map = MemoryMap::new([
            MemorySection::new(0x1000, 0x1fff, false, true),
            MemorySection::new(0x2000, 0x2fff, false, true),
            MemorySection::new(0x3000, 0x3fff, true, false),
        ])
        .unwrap();

        assert!(map.check_write(0x1ff0.into(), 0x20).is_ok());
        assert_eq!(
            map.check_write(0x2ff0.into(), 0x20),
            Err(MemoryError::WriteProtected(0x3000.into()))
        );
        assert!(map.check_read(0x2ff0.into(), 0x20).is_ok());
        assert!(map.check_write(0x1000.into(), 0).is_ok());
    }

    #[test]
    fn test_range_overflowing_bus() {
        let map = MemoryMap::new([MemorySection::new(0xffff_f000, 0xffff_ffff, false, true)])
            .unwrap();

        assert!(map.check_write(0xffff_fff0.into(), 0x10).is_ok());
        assert_eq!(
            map.check_write(0xffff_fff0.into(), 0x11),
            Err(MemoryError::OutOfRange(0xffff_fff0.into()))
        );
    }

    #[test]
    fn test_unreliable_sections() {
        let map = MemoryMap::new([
            MemorySection::new(0x300000, 0x307fff, false, true),
            MemorySection::new(0x308000, 0x337fff, false, true).unreliable(),
        ])
        .unwrap();

        assert!(map.is_readable(0x300000.into()));
        assert!(!map.is_readable(0x310000.into()));
        assert!(map.is_writable(0x310000.into()));
        assert_eq!(
            map.check_read(0x307ffc.into(), 8),
            Err(MemoryError::UnreliableRead(0x308000.into()))
        );
    }
}
