// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Shared ABI between the exokernel and user-level libraries
//! OWNERS: @runtime
//! PUBLIC API: layout constants, PteFlags/Pte, EnvId/EnvStatus/ForkView, FaultErr/FaultRecord,
//!             SysError, Syscalls, PageTableMirror, Upcall, UserGlobals
//! DEPENDS_ON: bitflags, thiserror, static_assertions
//! INVARIANTS: Two-level 32-bit paging (1024 x 1024 x 4 KiB); EnvId 0 names the caller;
//!             user-settable PTE bits are a subset of `PteFlags::SYSCALL`
//! ADR: docs/adr/0016-kernel-libs-architecture.md

pub mod env;
pub mod fault;
pub mod layout;
pub mod pte;
pub mod syscall;

pub use env::{EnvId, EnvStatus, ForkView};
pub use fault::{FaultErr, FaultRecord};
pub use layout::*;
pub use pte::{Pde, Pte, PteFlags, MAX_FRAMES};
pub use syscall::{
    Killed, PageTableMirror, PgfaultHandler, SysError, SysResult, Syscalls, Upcall, UserGlobals,
    UserPanic,
};
