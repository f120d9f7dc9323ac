// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-fault handler registration and the upcall trampoline.

use nexus_abi::{
    EnvId, FaultRecord, PgfaultHandler, PteFlags, Syscalls, Upcall, UserPanic, PGSIZE, UXSTACKTOP,
};

use crate::{error::SyscallExt, Result};

/// The trampoline the kernel enters on a user page fault.
pub fn upcall() -> Upcall {
    Upcall::new(pgfault_upcall)
}

fn pgfault_upcall(
    sys: &mut dyn Syscalls,
    record: &FaultRecord,
) -> core::result::Result<(), UserPanic> {
    let handler = sys.globals().pgfault_handler;
    match handler {
        Some(handler) => handler(sys, record),
        None => Err(UserPanic::new(format!(
            "unhandled page fault va {:08x} ip {:08x}",
            record.fault_va, record.eip
        ))),
    }
}

/// Makes `handler` the caller's page-fault handler.
///
/// The first registration allocates the exception stack and installs the
/// trampoline; later ones only swap the handler.
pub fn set_pgfault_handler(sys: &mut dyn Syscalls, handler: PgfaultHandler) -> Result<()> {
    if sys.globals().pgfault_handler.is_none() {
        let perm = PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITE;
        sys.page_alloc(EnvId::SELF, UXSTACKTOP - PGSIZE, perm).context("sys_page_alloc")?;
        sys.env_set_pgfault_upcall(EnvId::SELF, upcall())
            .context("sys_env_set_pgfault_upcall")?;
    }
    sys.globals().pgfault_handler = Some(handler);
    Ok(())
}
