// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Query-only view over the caller's page directory and page tables.
//!
//! The mirror never caches: every answer is read from the live projection, so
//! a handler that consults it after a remap sees the new state.

use nexus_abi::{PageTableMirror, Pte, PteFlags};

/// Mapping state of one page as seen through the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageInfo {
    pte: Pte,
}

impl PageInfo {
    /// State of a page whose covering table is absent.
    pub const ABSENT: Self = Self { pte: Pte::EMPTY };

    /// Wraps a raw table entry.
    pub const fn from_pte(pte: Pte) -> Self {
        Self { pte }
    }

    /// Underlying entry.
    pub const fn pte(self) -> Pte {
        self.pte
    }

    /// Entry flags.
    pub const fn flags(self) -> PteFlags {
        self.pte.flags()
    }

    /// Physical frame backing the page.
    pub const fn frame(self) -> u32 {
        self.pte.frame()
    }

    /// Present bit.
    pub fn is_present(self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }

    /// User-accessible bit.
    pub fn is_user(self) -> bool {
        self.flags().contains(PteFlags::USER)
    }

    /// Writable bit.
    pub fn is_writable(self) -> bool {
        self.flags().contains(PteFlags::WRITE)
    }

    /// Copy-on-write bit.
    pub fn is_cow(self) -> bool {
        self.flags().contains(PteFlags::COW)
    }

    /// Explicit-share bit.
    pub fn is_shared(self) -> bool {
        self.flags().contains(PteFlags::SHARE)
    }

    /// Writable and copy-on-write never hold together.
    pub fn is_consistent(self) -> bool {
        !(self.is_writable() && self.is_cow())
    }
}

/// Read-only, capability-scoped view of an address space.
pub struct AddressSpaceMirror<'a, M: PageTableMirror + ?Sized> {
    view: &'a M,
}

impl<'a, M: PageTableMirror + ?Sized> AddressSpaceMirror<'a, M> {
    /// Wraps the projection.
    pub fn new(view: &'a M) -> Self {
        Self { view }
    }

    /// Pages covered by one directory entry; the stride of an absent-table skip.
    pub fn pages_per_table(&self) -> usize {
        self.view.pages_per_table()
    }

    /// Whether the table covering page `pn` exists.
    pub fn table_present(&self, pn: usize) -> bool {
        self.view.uvpd(pn / self.pages_per_table()).is_present()
    }

    /// Raw entry for page `pn`; empty when its table is absent.
    pub fn entry(&self, pn: usize) -> Pte {
        self.page(pn).pte()
    }

    /// State of page `pn`; absent when its table is.
    pub fn page(&self, pn: usize) -> PageInfo {
        if !self.table_present(pn) {
            return PageInfo::ABSENT;
        }
        PageInfo::from_pte(self.view.uvpt(pn))
    }

    /// First present user page in `from..ceiling`.
    ///
    /// Runs covered by an absent table are skipped in one step.
    pub fn next_mapped(&self, from: usize, ceiling: usize) -> Option<(usize, PageInfo)> {
        let stride = self.pages_per_table();
        let mut pn = from;
        while pn < ceiling {
            if !self.table_present(pn) {
                pn = (pn / stride + 1) * stride;
                continue;
            }
            let info = PageInfo::from_pte(self.view.uvpt(pn));
            if info.is_present() && info.is_user() {
                return Some((pn, info));
            }
            pn += 1;
        }
        None
    }
}
