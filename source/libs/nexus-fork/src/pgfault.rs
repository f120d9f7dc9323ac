// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Copy-on-write page-fault handler.

use log::{debug, error};
use nexus_abi::{
    pgnum, round_down, EnvId, FaultRecord, PteFlags, Syscalls, UserPanic, PFTEMP, PGSIZE,
};

use crate::{error::SyscallExt, mirror::AddressSpaceMirror, ForkError, Result};

/// Handler registered by `fork`; any failure ends the environment.
pub fn cow_fault(
    sys: &mut dyn Syscalls,
    record: &FaultRecord,
) -> core::result::Result<(), UserPanic> {
    resolve_cow_fault(sys, record).map_err(|err| {
        error!(target: "pgfault", "{err}");
        UserPanic::from(err)
    })
}

/// Replaces the copy-on-write page under `record.fault_va` with a private
/// writable copy.
///
/// The faulting page keeps its old frame until the copy is complete and the
/// remap succeeds.
pub fn resolve_cow_fault(sys: &mut dyn Syscalls, record: &FaultRecord) -> Result<()> {
    let va = round_down(record.fault_va);
    let page = AddressSpaceMirror::new(&*sys).page(pgnum(va));
    if !(record.err.is_write() && page.is_present() && page.is_user() && page.is_cow()) {
        return Err(ForkError::ProtectionViolation {
            env: sys.getenvid(),
            va: record.fault_va,
            eip: record.eip,
            err: record.err,
        });
    }

    privatize(sys, va)?;
    debug!(target: "pgfault", "privatized {va:08x} (ip {:08x})", record.eip);
    Ok(())
}

/// Moves the caller's page at `va` onto a fresh frame holding the same bytes,
/// mapped present, user and writable.
pub(crate) fn privatize(sys: &mut dyn Syscalls, va: usize) -> Result<()> {
    let perm = PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITE;
    sys.page_alloc(EnvId::SELF, PFTEMP, perm).context("sys_page_alloc")?;
    let mut copy = [0u8; PGSIZE];
    sys.load(va, &mut copy)?;
    sys.store(PFTEMP, &copy)?;
    sys.page_map(EnvId::SELF, PFTEMP, EnvId::SELF, va, perm).context("sys_page_map")?;
    sys.page_unmap(EnvId::SELF, PFTEMP).context("sys_page_unmap")?;
    Ok(())
}
