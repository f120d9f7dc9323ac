// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-page replication policy applied while duplicating an address space.

use log::trace;
use nexus_abi::{page_va, EnvId, PteFlags, Syscalls, PTSIZE, USTACKTOP};

use crate::{error::SyscallExt, mirror::PageInfo, pgfault::privatize, Result};

/// How a present user page is carried into the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupPolicy {
    /// Same frame, same permissions, in both environments.
    Share,
    /// Same frame, copy-on-write in both environments.
    Cow,
    /// Same frame, read-only in the child.
    ReadOnly,
    /// Copy-on-write page under `sfork`: the caller takes a private writable
    /// copy first, then that frame is shared writable with the child.
    ShareCopy,
}

impl DupPolicy {
    /// Permissions of a copy-on-write mapping.
    pub const COW_PERM: PteFlags =
        PteFlags::PRESENT.union(PteFlags::USER).union(PteFlags::COW);
    /// Permissions of a read-only mapping.
    pub const RO_PERM: PteFlags = PteFlags::PRESENT.union(PteFlags::USER);
    /// Permissions of a page shared writable by `sfork`.
    pub const RW_PERM: PteFlags = Self::RO_PERM.union(PteFlags::WRITE);

    /// Policy used by `fork`.
    pub fn for_page(info: PageInfo) -> Self {
        if info.is_shared() {
            Self::Share
        } else if info.is_writable() || info.is_cow() {
            Self::Cow
        } else {
            Self::ReadOnly
        }
    }

    /// Policy used by `sfork`: everything is shared except the normal stack.
    ///
    /// Copy-on-write pages outside the stack were left over by an earlier
    /// `fork`; they must stop being copy-on-write before they can be shared.
    pub fn for_shared_page(pn: usize, info: PageInfo) -> Self {
        let va = page_va(pn);
        if (USTACKTOP - PTSIZE..USTACKTOP).contains(&va) {
            Self::for_page(info)
        } else if info.is_cow() && !info.is_shared() {
            Self::ShareCopy
        } else {
            Self::Share
        }
    }
}

/// Replicates page `pn` of the caller into `child` under `policy`.
///
/// For [`DupPolicy::Cow`] the caller's own entry is re-marked copy-on-write
/// after the child mapping, whether or not it already was.
pub fn duppage(
    sys: &mut dyn Syscalls,
    child: EnvId,
    pn: usize,
    info: PageInfo,
    policy: DupPolicy,
) -> Result<()> {
    let va = page_va(pn);
    trace!(target: "fork", "duppage {va:08x} {policy:?} into {child}");
    match policy {
        DupPolicy::Share => {
            let perm = info.flags() & PteFlags::SYSCALL;
            sys.page_map(EnvId::SELF, va, child, va, perm).context("sys_page_map")?;
        }
        DupPolicy::Cow => {
            sys.page_map(EnvId::SELF, va, child, va, DupPolicy::COW_PERM)
                .context("sys_page_map")?;
            sys.page_map(EnvId::SELF, va, EnvId::SELF, va, DupPolicy::COW_PERM)
                .context("sys_page_map")?;
        }
        DupPolicy::ReadOnly => {
            sys.page_map(EnvId::SELF, va, child, va, DupPolicy::RO_PERM)
                .context("sys_page_map")?;
        }
        DupPolicy::ShareCopy => {
            privatize(sys, va)?;
            sys.page_map(EnvId::SELF, va, child, va, DupPolicy::RW_PERM)
                .context("sys_page_map")?;
        }
    }
    Ok(())
}
