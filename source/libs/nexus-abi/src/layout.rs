// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! User-visible virtual memory layout and paging geometry.
//!
//! ```text
//!   UTOP, UXSTACKTOP -> +------------------------------+ 0xeec00000
//!                       |     user exception stack     | one page
//!                       +------------------------------+ 0xeebff000
//!                       |       empty guard page       |
//!          USTACKTOP -> +------------------------------+ 0xeebfe000
//!                       |      normal user stack       |
//!                       +------------------------------+
//!                       .                              .
//!              UTEXT -> +------------------------------+ 0x00800000
//!             PFTEMP -> |  fault-handler scratch page  | 0x007ff000
//!                       +------------------------------+
//!              UTEMP -> +------------------------------+ 0x00400000
//!                       |       unmapped low page      |
//!                  0 -> +------------------------------+
//! ```

use static_assertions::const_assert;

/// Bytes mapped by a single page.
pub const PGSIZE: usize = 4096;
/// log2(PGSIZE).
pub const PGSHIFT: usize = 12;
/// Entries in the page directory.
pub const NPDENTRIES: usize = 1024;
/// Entries in a single page table.
pub const NPTENTRIES: usize = 1024;
/// Bytes mapped by one page-directory entry.
pub const PTSIZE: usize = PGSIZE * NPTENTRIES;
/// Shift of the directory index within a virtual address.
pub const PDXSHIFT: usize = 22;

/// Top of user-accessible memory; nothing at or above it may be mapped by a user.
pub const UTOP: usize = 0xeec0_0000;
/// Top of the one-page user exception stack.
pub const UXSTACKTOP: usize = UTOP;
/// Top of the normal user stack (one guard page below the exception stack).
pub const USTACKTOP: usize = UTOP - 2 * PGSIZE;
/// Where user programs are loaded.
pub const UTEXT: usize = 2 * PTSIZE;
/// Temporary mapping window available to user code.
pub const UTEMP: usize = PTSIZE;
/// Scratch page used by the page-fault handler while copying a frame.
pub const PFTEMP: usize = UTEMP + PTSIZE - PGSIZE;

const_assert!(PGSIZE == 1 << PGSHIFT);
const_assert!(PTSIZE == 1 << PDXSHIFT);
const_assert!(UTOP % PTSIZE == 0);
const_assert!(PFTEMP < UTEXT);

/// Page number containing `va`.
#[inline]
pub const fn pgnum(va: usize) -> usize {
    va >> PGSHIFT
}

/// Page-directory index of `va`.
#[inline]
pub const fn pdx(va: usize) -> usize {
    (va >> PDXSHIFT) & (NPDENTRIES - 1)
}

/// Page-table index of `va`.
#[inline]
pub const fn ptx(va: usize) -> usize {
    (va >> PGSHIFT) & (NPTENTRIES - 1)
}

/// Offset of `va` within its page.
#[inline]
pub const fn pgoff(va: usize) -> usize {
    va & (PGSIZE - 1)
}

/// First virtual address of page number `pn`.
#[inline]
pub const fn page_va(pn: usize) -> usize {
    pn << PGSHIFT
}

/// Rounds `va` down to its page boundary.
#[inline]
pub const fn round_down(va: usize) -> usize {
    va & !(PGSIZE - 1)
}
