// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Two-level 32-bit page table with lazy allocation of the second level.

use nexus_abi::{pdx, ptx, Pde, Pte, PteFlags, NPDENTRIES, NPTENTRIES, PGSIZE};

use super::{MapError, PagePool};

/// Highest address representable by the 32-bit layout, plus one.
pub(crate) const VA_LIMIT: u64 = 1 << 32;

struct Table {
    frame: u32,
    entries: Box<[Pte]>,
}

/// Page directory plus the page tables it references.
///
/// Every second-level table occupies one frame of the pool so table
/// allocation is subject to the same exhaustion as data pages.
pub struct PageTable {
    dir: Vec<Option<Table>>,
}

impl PageTable {
    /// Creates an empty directory.
    pub fn new() -> Self {
        let mut dir = Vec::with_capacity(NPDENTRIES);
        dir.resize_with(NPDENTRIES, || None);
        Self { dir }
    }

    /// Directory entry `index`: present, user, writable when its table exists.
    pub fn pde(&self, index: usize) -> Pde {
        match self.dir.get(index).and_then(Option::as_ref) {
            Some(table) => {
                Pte::new(table.frame, PteFlags::PRESENT | PteFlags::WRITE | PteFlags::USER)
            }
            None => Pte::EMPTY,
        }
    }

    /// Entry for page number `pn`; empty when its table is absent.
    pub fn pte(&self, pn: usize) -> Pte {
        self.dir
            .get(pn / NPTENTRIES)
            .and_then(Option::as_ref)
            .map_or(Pte::EMPTY, |table| table.entries[pn % NPTENTRIES])
    }

    /// Mutable entry for `va` if its table exists.
    pub fn entry_mut(&mut self, va: usize) -> Option<&mut Pte> {
        let table = self.dir.get_mut(pdx(va))?.as_mut()?;
        Some(&mut table.entries[ptx(va)])
    }

    /// Mutable entry for `va`, allocating its table from `pool` if needed.
    pub fn walk_create(&mut self, va: usize, pool: &mut PagePool) -> Result<&mut Pte, MapError> {
        if va % PGSIZE != 0 {
            return Err(MapError::Unaligned);
        }
        if va as u64 >= VA_LIMIT {
            return Err(MapError::OutOfRange);
        }
        let slot = &mut self.dir[pdx(va)];
        if slot.is_none() {
            let frame = pool.alloc().ok_or(MapError::NoMem)?;
            pool.incref(frame);
            let entries = vec![Pte::EMPTY; NPTENTRIES].into_boxed_slice();
            *slot = Some(Table { frame, entries });
        }
        match slot.as_mut() {
            Some(table) => Ok(&mut table.entries[ptx(va)]),
            None => Err(MapError::NoMem),
        }
    }

    /// Number of second-level tables.
    pub fn table_count(&self) -> usize {
        self.dir.iter().filter(|slot| slot.is_some()).count()
    }

    /// Drops every table, dropping a reference on each mapped frame and on
    /// each table frame.
    pub fn clear(&mut self, pool: &mut PagePool) {
        for slot in self.dir.iter_mut() {
            let Some(table) = slot.take() else { continue };
            for pte in table.entries.iter().filter(|pte| pte.is_present()) {
                pool.decref(pte.frame());
            }
            pool.decref(table.frame);
        }
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}
