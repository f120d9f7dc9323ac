// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-environment address space: page-table bookkeeping plus frame
//! reference counting.

use nexus_abi::{pgnum, Pde, Pte, PteFlags};

use super::{page_table::PageTable, MapError, PagePool};

/// User address space of one environment.
#[derive(Default)]
pub struct AddressSpace {
    table: PageTable,
}

impl AddressSpace {
    /// Creates an empty address space.
    pub fn new() -> Self {
        Self { table: PageTable::new() }
    }

    /// Directory entry `pdx`.
    pub fn pde(&self, pdx: usize) -> Pde {
        self.table.pde(pdx)
    }

    /// Table entry for page number `pn`.
    pub fn pte(&self, pn: usize) -> Pte {
        self.table.pte(pn)
    }

    /// Present entry mapping `va`, if any.
    pub fn lookup(&self, va: usize) -> Option<Pte> {
        Some(self.table.pte(pgnum(va))).filter(|pte| pte.is_present())
    }

    /// Maps `frame` at `va` with `flags | PRESENT`, replacing any previous
    /// mapping. Re-inserting the mapped frame only changes its permissions.
    pub fn insert(
        &mut self,
        pool: &mut PagePool,
        frame: u32,
        va: usize,
        flags: PteFlags,
    ) -> Result<(), MapError> {
        let entry = self.table.walk_create(va, pool)?;
        let old = *entry;
        *entry = Pte::new(frame, flags | PteFlags::PRESENT);
        pool.incref(frame);
        if old.is_present() {
            pool.decref(old.frame());
        }
        Ok(())
    }

    /// Unmaps `va`; a no-op when nothing is mapped there.
    pub fn remove(&mut self, pool: &mut PagePool, va: usize) {
        let Some(entry) = self.table.entry_mut(va) else { return };
        let old = core::mem::replace(entry, Pte::EMPTY);
        if old.is_present() {
            pool.decref(old.frame());
        }
    }

    /// Releases every frame and table.
    pub fn teardown(&mut self, pool: &mut PagePool) {
        self.table.clear(pool);
    }

    /// Number of allocated second-level tables.
    pub fn table_count(&self) -> usize {
        self.table.table_count()
    }
}
