// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-table entry encoding shared by the kernel and the read-only mirror.

use core::fmt;

use bitflags::bitflags;
use static_assertions::assert_eq_size;

use crate::layout::PGSHIFT;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    /// Flags stored in the low 12 bits of a page-directory or page-table entry.
    pub struct PteFlags: u32 {
        /// Entry is valid.
        const PRESENT = 0x001;
        /// Page is writable.
        const WRITE = 0x002;
        /// Page is accessible from user mode.
        const USER = 0x004;
        /// Write-through caching.
        const WRITE_THROUGH = 0x008;
        /// Caching disabled.
        const CACHE_DISABLE = 0x010;
        /// Set by hardware on access.
        const ACCESSED = 0x020;
        /// Set by hardware on write.
        const DIRTY = 0x040;
        /// Not flushed on address-space switch.
        const GLOBAL = 0x100;
        /// Mapping is deliberately shared across fork; never made copy-on-write.
        const SHARE = 0x400;
        /// Mapping is copy-on-write; a write fault materializes a private copy.
        const COW = 0x800;

        /// Bits reserved for software use.
        const AVAIL = 0xe00;
        /// Bits a user may pass to the mapping primitives.
        const SYSCALL = Self::AVAIL.bits()
            | Self::PRESENT.bits()
            | Self::WRITE.bits()
            | Self::USER.bits();
    }
}

/// Frames addressable by the 20-bit frame field of an entry.
pub const MAX_FRAMES: usize = 1 << (32 - PGSHIFT);

/// Raw 32-bit page-table entry: frame number in bits 12..32, flags below.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Pte(u32);

/// Page-directory entries share the table-entry encoding.
pub type Pde = Pte;

assert_eq_size!(Pte, u32);

impl Pte {
    /// The all-zero, not-present entry.
    pub const EMPTY: Self = Self(0);

    /// Builds an entry pointing at physical frame `frame`, which must be
    /// below [`MAX_FRAMES`].
    #[inline]
    pub const fn new(frame: u32, flags: PteFlags) -> Self {
        debug_assert!(
            (frame as usize) < MAX_FRAMES,
            "frame number exceeds the entry's frame field"
        );
        Self((frame << PGSHIFT) | flags.bits())
    }

    /// Wraps a raw entry value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw entry value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Physical frame number.
    #[inline]
    pub const fn frame(self) -> u32 {
        self.0 >> PGSHIFT
    }

    /// Flag bits, unknown bits dropped.
    #[inline]
    pub const fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0 & 0xfff)
    }

    /// Whether the entry is present.
    #[inline]
    pub const fn is_present(self) -> bool {
        self.0 & PteFlags::PRESENT.bits() != 0
    }

    /// Same frame, new flags.
    #[inline]
    pub const fn with_flags(self, flags: PteFlags) -> Self {
        Self::new(self.frame(), flags)
    }
}

impl fmt::Debug for Pte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pte").field("frame", &self.frame()).field("flags", &self.flags()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_frame_and_flags() {
        let pte = Pte::new(0x1234, PteFlags::PRESENT | PteFlags::USER | PteFlags::COW);
        assert_eq!(pte.raw(), 0x0123_4805);
        assert_eq!(pte.frame(), 0x1234);
        assert!(pte.is_present());
        assert!(pte.flags().contains(PteFlags::COW));
        assert!(!pte.flags().contains(PteFlags::WRITE));
    }

    #[test]
    fn syscall_mask_covers_software_bits() {
        assert!(PteFlags::SYSCALL.contains(PteFlags::COW | PteFlags::SHARE));
        assert!(!PteFlags::SYSCALL.contains(PteFlags::DIRTY));
        assert_eq!(PteFlags::SYSCALL.bits(), 0xe07);
    }

    #[test]
    fn highest_frame_roundtrips() {
        let top = (MAX_FRAMES - 1) as u32;
        assert_eq!(Pte::new(top, PteFlags::PRESENT).frame(), top);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "frame field")]
    fn oversized_frame_is_rejected() {
        let _ = Pte::new(MAX_FRAMES as u32, PteFlags::PRESENT);
    }

    #[test]
    fn empty_entry_is_absent() {
        assert!(!Pte::EMPTY.is_present());
        assert_eq!(Pte::EMPTY.flags(), PteFlags::empty());
    }
}
