// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Duplication driver.
//!
//! `exofork` returns twice: once in the caller with [`ForkView::Parent`] and
//! once, when the child is first scheduled, with [`ForkView::Child`]. The
//! `resume_*` functions are the code that runs after that return, so the
//! kernel can continue a freshly scheduled child exactly where its parent
//! stood.

use log::{debug, info};
use nexus_abi::{
    pgnum, EnvId, EnvStatus, ForkView, PteFlags, Syscalls, PGSIZE, UXSTACKTOP,
};

use crate::{
    error::SyscallExt,
    handler::{set_pgfault_handler, upcall},
    mirror::{AddressSpaceMirror, PageInfo},
    pgfault::cow_fault,
    policy::{duppage, DupPolicy},
    Result,
};

/// Pages below this number are candidates for duplication; the exception
/// stack page sits exactly at it.
const CEILING: usize = pgnum(UXSTACKTOP - PGSIZE);

/// Creates a copy-on-write clone of the caller.
///
/// The parent gets [`ForkView::Parent`] with the child's identity. The child,
/// once scheduled, continues through [`resume_fork`] with [`ForkView::Child`].
pub fn fork(sys: &mut dyn Syscalls) -> Result<ForkView> {
    set_pgfault_handler(sys, cow_fault)?;
    let view = sys.exofork().context("sys_exofork")?;
    resume_fork(sys, view)
}

/// Finishes [`fork`] after `exofork` returned `view`.
pub fn resume_fork(sys: &mut dyn Syscalls, view: ForkView) -> Result<ForkView> {
    match view {
        ForkView::Child => Ok(enter_child(sys)),
        ForkView::Parent(child) => {
            duplicate(sys, child, |_, page| DupPolicy::for_page(page))?;
            info!(target: "fork", "{} forked {child}", sys.getenvid());
            Ok(view)
        }
    }
}

/// Like [`fork`], but the child shares every page with the parent except the
/// normal user stack, which is copy-on-write.
pub fn sfork(sys: &mut dyn Syscalls) -> Result<ForkView> {
    set_pgfault_handler(sys, cow_fault)?;
    let view = sys.exofork().context("sys_exofork")?;
    resume_sfork(sys, view)
}

/// Finishes [`sfork`] after `exofork` returned `view`.
pub fn resume_sfork(sys: &mut dyn Syscalls, view: ForkView) -> Result<ForkView> {
    match view {
        ForkView::Child => Ok(enter_child(sys)),
        ForkView::Parent(child) => {
            duplicate(sys, child, DupPolicy::for_shared_page)?;
            info!(target: "fork", "{} sforked {child}", sys.getenvid());
            Ok(view)
        }
    }
}

// Inherited globals still name the parent.
fn enter_child(sys: &mut dyn Syscalls) -> ForkView {
    let me = sys.getenvid();
    sys.globals().thisenv = Some(me);
    debug!(target: "fork", "child {me} running");
    ForkView::Child
}

fn duplicate(
    sys: &mut dyn Syscalls,
    child: EnvId,
    choose: fn(usize, PageInfo) -> DupPolicy,
) -> Result<()> {
    let mut pn = 0;
    let mut pages = 0usize;
    loop {
        let next = AddressSpaceMirror::new(&*sys).next_mapped(pn, CEILING);
        let Some((page, info)) = next else { break };
        duppage(sys, child, page, info, choose(page, info))?;
        pages += 1;
        pn = page + 1;
    }

    let perm = PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITE;
    sys.page_alloc(child, UXSTACKTOP - PGSIZE, perm).context("sys_page_alloc")?;
    sys.env_set_pgfault_upcall(child, upcall()).context("sys_env_set_pgfault_upcall")?;
    sys.env_set_status(child, EnvStatus::Runnable).context("sys_env_set_status")?;
    debug!(target: "fork", "{child}: {pages} pages replicated");
    Ok(())
}
