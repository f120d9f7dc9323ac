// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: User-level process duplication with lazy copy-on-write
//! OWNERS: @runtime
//! PUBLIC API: fork/resume_fork, sfork/resume_sfork, set_pgfault_handler, cow_fault,
//!             AddressSpaceMirror/PageInfo, DupPolicy/duppage, ForkError
//! DEPENDS_ON: nexus-abi (Syscalls, PageTableMirror), log, thiserror
//! INVARIANTS: A page is never writable and copy-on-write at once; the exception stack is
//!             allocated fresh per process; policy decisions read the live mirror
//! ADR: docs/adr/0016-kernel-libs-architecture.md

pub mod error;
pub mod fork;
pub mod handler;
pub mod mirror;
pub mod pgfault;
pub mod policy;

#[cfg(test)]
mod mock;

pub use error::{ForkError, Result};
pub use fork::{fork, resume_fork, resume_sfork, sfork};
pub use handler::{set_pgfault_handler, upcall};
pub use mirror::{AddressSpaceMirror, PageInfo};
pub use pgfault::{cow_fault, resolve_cow_fault};
pub use policy::{duppage, DupPolicy};
