// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the kernel integration tests.

#![allow(dead_code)]

use neuron_exo::{Kernel, KernelConfig};
use nexus_abi::{EnvId, PteFlags, Syscalls, PTSIZE, UTEXT};

pub const RW: PteFlags = PteFlags::PRESENT.union(PteFlags::USER).union(PteFlags::WRITE);
pub const RO: PteFlags = PteFlags::PRESENT.union(PteFlags::USER);
pub const COW: PteFlags = PteFlags::PRESENT.union(PteFlags::USER).union(PteFlags::COW);
pub const SHARED_RW: PteFlags = RW.union(PteFlags::SHARE);

/// Writable page.
pub const P0: usize = UTEXT;
/// Read-only page.
pub const P1: usize = UTEXT + nexus_abi::PGSIZE;
/// Start of a table-sized run that stays unmapped.
pub const GAP: usize = 3 * PTSIZE;
/// Explicitly shared writable page, beyond the gap.
pub const P3: usize = 4 * PTSIZE;

pub fn kernel() -> Kernel {
    Kernel::new(KernelConfig::default()).expect("default config")
}

/// Host-driven environment laid out as: P0 writable (0x10), P1 read-only
/// (0x11), GAP absent, P3 shared writable (0x13).
pub fn scenario_env(k: &mut Kernel) -> EnvId {
    let env = k.create_env(None).expect("create env");
    k.with_user(env, |u| {
        u.page_alloc(EnvId::SELF, P0, RW).expect("alloc P0");
        u.store(P0, &[0x10]).expect("store P0");
        u.page_alloc(EnvId::SELF, P1, RW).expect("alloc P1");
        u.store(P1, &[0x11]).expect("store P1");
        u.page_map(EnvId::SELF, P1, EnvId::SELF, P1, RO).expect("downgrade P1");
        u.page_alloc(EnvId::SELF, P3, SHARED_RW).expect("alloc P3");
        u.store(P3, &[0x13]).expect("store P3");
    })
    .expect("run as env");
    env
}

/// Forks `parent` from the host and returns the child.
pub fn fork_from(k: &mut Kernel, parent: EnvId) -> EnvId {
    k.with_user(parent, |u| nexus_fork::fork(u))
        .expect("run as parent")
        .expect("fork")
        .child()
        .expect("parent view")
}
