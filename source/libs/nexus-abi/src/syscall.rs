// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Primitive interface consumed by user-level libraries.
//!
//! [`Syscalls`] is the complete set of kernel services a user environment may
//! invoke, plus the two things every process has without a kernel call: plain
//! loads/stores against its own address space and its runtime globals. The
//! read-only page-table projection is the separate [`PageTableMirror`] trait so
//! callers can be handed a query-only view.

use core::fmt;

use crate::{
    env::{EnvId, EnvStatus, ForkView},
    fault::FaultRecord,
    layout::NPTENTRIES,
    pte::{Pde, Pte, PteFlags},
};

/// Result type returned by kernel primitives.
pub type SysResult<T> = core::result::Result<T, SysError>;

/// Errors surfaced by kernel primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SysError {
    /// Unspecified or unknown problem.
    #[error("unspecified or unknown problem")]
    Unspecified,
    /// Environment does not exist or the caller may not touch it.
    #[error("bad environment")]
    BadEnv,
    /// Invalid parameter.
    #[error("invalid parameter")]
    Inval,
    /// Request failed due to memory shortage.
    #[error("out of memory")]
    NoMem,
    /// Maximum number of environments reached.
    #[error("out of environments")]
    NoFreeEnv,
    /// Memory fault.
    #[error("segmentation fault")]
    Fault,
}

impl SysError {
    /// Negative error code as returned in the syscall result register.
    pub const fn code(self) -> i32 {
        match self {
            Self::Unspecified => -1,
            Self::BadEnv => -2,
            Self::Inval => -3,
            Self::NoMem => -4,
            Self::NoFreeEnv => -5,
            Self::Fault => -6,
        }
    }
}

/// The calling environment was destroyed while an access was outstanding.
///
/// Returned by [`Syscalls::load`] and [`Syscalls::store`] when the fault they
/// raised could not be resolved; nothing further may run in that environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("environment {0} was destroyed")]
pub struct Killed(pub EnvId);

/// Terminal diagnostic raised by user code; the kernel destroys the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct UserPanic {
    message: String,
}

impl UserPanic {
    /// Creates a panic carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    /// Diagnostic text.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Signature shared by the upcall entry and registered fault handlers.
pub type PgfaultHandler = fn(&mut dyn Syscalls, &FaultRecord) -> Result<(), UserPanic>;

/// Entry point the kernel transfers control to on a user page fault.
#[derive(Clone, Copy)]
pub struct Upcall(PgfaultHandler);

impl Upcall {
    /// Wraps a trampoline.
    pub const fn new(entry: PgfaultHandler) -> Self {
        Self(entry)
    }

    /// Runs the trampoline for `record` on behalf of `sys`.
    pub fn invoke(self, sys: &mut dyn Syscalls, record: &FaultRecord) -> Result<(), UserPanic> {
        (self.0)(sys, record)
    }

    /// Address of the trampoline, for identity comparisons.
    pub fn entry_addr(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Upcall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Upcall({:#x})", self.entry_addr())
    }
}

/// Per-process runtime globals living in the process's own data segment.
///
/// A child created by [`Syscalls::exofork`] starts with a copy of its parent's
/// globals, so `thisenv` is stale there until the child re-resolves it.
#[derive(Clone, Copy, Default)]
pub struct UserGlobals {
    /// Cached identity of the running environment.
    pub thisenv: Option<EnvId>,
    /// Handler the upcall trampoline dispatches to.
    pub pgfault_handler: Option<PgfaultHandler>,
}

impl fmt::Debug for UserGlobals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserGlobals")
            .field("thisenv", &self.thisenv)
            .field("pgfault_handler", &self.pgfault_handler.map(|h| h as usize))
            .finish()
    }
}

/// Read-only projection of the caller's page directory and page tables.
pub trait PageTableMirror {
    /// Directory entry `pdx`.
    fn uvpd(&self, pdx: usize) -> Pde;

    /// Table entry for page number `pn`; empty when its table is absent.
    fn uvpt(&self, pn: usize) -> Pte;

    /// Pages covered by one directory entry.
    fn pages_per_table(&self) -> usize {
        NPTENTRIES
    }
}

/// Kernel primitives and process-local facilities available to user code.
///
/// Every primitive taking an [`EnvId`] accepts [`EnvId::SELF`] for the caller.
pub trait Syscalls: PageTableMirror {
    /// Identity of the calling environment.
    fn getenvid(&self) -> EnvId;

    /// Creates an empty, not-runnable child that will resume as a copy of the
    /// caller's registers. The caller observes [`ForkView::Parent`]; the child
    /// observes [`ForkView::Child`] when it first runs.
    fn exofork(&mut self) -> SysResult<ForkView>;

    /// Allocates a zeroed page and maps it at `va` in `env` with `perm`.
    fn page_alloc(&mut self, env: EnvId, va: usize, perm: PteFlags) -> SysResult<()>;

    /// Maps the page at `src_va` in `src_env` at `dst_va` in `dst_env` with `perm`.
    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: usize,
        dst_env: EnvId,
        dst_va: usize,
        perm: PteFlags,
    ) -> SysResult<()>;

    /// Unmaps the page at `va` in `env`; unmapped pages are ignored.
    fn page_unmap(&mut self, env: EnvId, va: usize) -> SysResult<()>;

    /// Installs the page-fault upcall for `env`.
    fn env_set_pgfault_upcall(&mut self, env: EnvId, upcall: Upcall) -> SysResult<()>;

    /// Sets the scheduling status of `env`.
    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> SysResult<()>;

    /// Reads `buf.len()` bytes at `va`, taking page faults as needed.
    fn load(&mut self, va: usize, buf: &mut [u8]) -> Result<(), Killed>;

    /// Writes `bytes` at `va`, taking page faults as needed.
    fn store(&mut self, va: usize, bytes: &[u8]) -> Result<(), Killed>;

    /// Runtime globals of the calling environment.
    fn globals(&mut self) -> &mut UserGlobals;
}
