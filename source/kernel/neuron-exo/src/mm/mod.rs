// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Physical frames and two-level user address spaces
//! OWNERS: @kernel-mm-team
//! PUBLIC API: PagePool, PoolStats, PageTable, AddressSpace, MapError
//! DEPENDS_ON: nexus-abi (Pte, layout)
//! INVARIANTS: A frame is freed exactly when its last mapping goes away; page tables draw
//!             frames from the same pool as data pages

pub mod address_space;
pub mod page_pool;
pub mod page_table;


use nexus_abi::SysError;
use thiserror::Error;

pub use address_space::AddressSpace;
pub use page_pool::{PagePool, PoolStats};
pub use page_table::PageTable;

/// Error returned by mapping operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MapError {
    /// Virtual address is not page aligned.
    #[error("address not page aligned")]
    Unaligned,
    /// Address lies outside the 32-bit layout.
    #[error("address out of range")]
    OutOfRange,
    /// No frame left for a page table.
    #[error("out of physical frames")]
    NoMem,
}

impl From<MapError> for SysError {
    fn from(err: MapError) -> Self {
        match err {
            MapError::Unaligned | MapError::OutOfRange => SysError::Inval,
            MapError::NoMem => SysError::NoMem,
        }
    }
}
