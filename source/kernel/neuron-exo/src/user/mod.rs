// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: User-mode execution context handed to user-level libraries
//! OWNERS: @runtime
//! PUBLIC API: UserEnv (Syscalls + PageTableMirror), Program, Op
//! DEPENDS_ON: kernel::Kernel, syscall::api, trap
//! INVARIANTS: Loads and stores go through the environment's page table and fault exactly
//!             where hardware would; a destroyed environment observes `Killed` on every access

pub mod program;

use log::debug;
use nexus_abi::{
    pgoff, EnvId, EnvStatus, FaultErr, ForkView, Killed, PageTableMirror, Pde, Pte, PteFlags,
    SysResult, Syscalls, Upcall, UserGlobals, PGSIZE,
};

use crate::{
    env::Trapframe,
    kernel::{ExitReason, Kernel},
    mm::page_table::VA_LIMIT,
    syscall::{api, Sysno},
    trap,
};

pub use program::{Op, Program};

/// Accesses to one page that still fault after this many resolved upcalls
/// kill the environment.
pub const MAX_FAULT_RETRIES: usize = 4;

/// The running environment's view of the machine.
pub struct UserEnv<'k> {
    pub(crate) kernel: &'k mut Kernel,
    pub(crate) me: EnvId,
    detached: UserGlobals,
}

impl<'k> UserEnv<'k> {
    pub(crate) fn new(kernel: &'k mut Kernel, me: EnvId) -> Self {
        Self { kernel, me, detached: UserGlobals::default() }
    }

    /// Saved registers of the running environment.
    pub fn trapframe(&self) -> Option<Trapframe> {
        self.kernel.envs.get(self.me).map(|env| env.tf)
    }

    pub(crate) fn update_tf(&mut self, f: impl FnOnce(&mut Trapframe)) {
        if let Some(env) = self.kernel.envs.get_mut(self.me) {
            f(&mut env.tf);
        }
    }

    fn syscall<T>(
        &mut self,
        sysno: Sysno,
        f: impl FnOnce(&mut Kernel, EnvId) -> SysResult<T>,
    ) -> SysResult<T> {
        self.kernel.stats.syscalls[sysno as usize] += 1;
        let result = f(&mut *self.kernel, self.me);
        if let Err(err) = &result {
            debug!(target: "syscall", "[{}] {}: {err}", self.me, sysno.name());
        }
        result
    }

    /// Frame backing `va` once it is accessible for the requested access,
    /// delivering page faults until it is.
    fn translate(&mut self, va: usize, write: bool) -> Result<u32, Killed> {
        if va as u64 >= VA_LIMIT {
            let why = format!("[{}] access va {va:#x} outside the 32-bit address space", self.me);
            self.kernel.destroy(self.me, ExitReason::Killed(why));
            return Err(Killed(self.me));
        }
        let mut faults = 0;
        loop {
            let env = self.kernel.envs.get(self.me).filter(|env| env.is_live());
            let pte = env.ok_or(Killed(self.me))?.space.lookup(va);
            let mut err = match pte {
                Some(pte) if accessible(pte, write) => return Ok(pte.frame()),
                Some(_) => FaultErr::USER | FaultErr::PROTECTION,
                None => FaultErr::USER,
            };
            if write {
                err |= FaultErr::WRITE;
            }
            if faults == MAX_FAULT_RETRIES {
                let pc = self.trapframe().map_or(0, |tf| tf.pc);
                let why = format!(
                    "[{}] fault va {va:08x} ip {pc:08x} {err} persists after {faults} upcalls",
                    self.me
                );
                self.kernel.destroy(self.me, ExitReason::Killed(why));
                return Err(Killed(self.me));
            }
            faults += 1;
            trap::page_fault(self, va, err)?;
        }
    }
}

fn accessible(pte: Pte, write: bool) -> bool {
    let flags = pte.flags();
    flags.contains(PteFlags::USER) && (!write || flags.contains(PteFlags::WRITE))
}

impl PageTableMirror for UserEnv<'_> {
    fn uvpd(&self, pdx: usize) -> Pde {
        self.kernel.envs.get(self.me).map_or(Pte::EMPTY, |env| env.space.pde(pdx))
    }

    fn uvpt(&self, pn: usize) -> Pte {
        self.kernel.envs.get(self.me).map_or(Pte::EMPTY, |env| env.space.pte(pn))
    }
}

impl Syscalls for UserEnv<'_> {
    fn getenvid(&self) -> EnvId {
        self.me
    }

    fn exofork(&mut self) -> SysResult<ForkView> {
        self.syscall(Sysno::Exofork, api::sys_exofork).map(ForkView::Parent)
    }

    fn page_alloc(&mut self, env: EnvId, va: usize, perm: PteFlags) -> SysResult<()> {
        self.syscall(Sysno::PageAlloc, |k, me| api::sys_page_alloc(k, me, env, va, perm))
    }

    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: usize,
        dst_env: EnvId,
        dst_va: usize,
        perm: PteFlags,
    ) -> SysResult<()> {
        self.syscall(Sysno::PageMap, |k, me| {
            api::sys_page_map(k, me, src_env, src_va, dst_env, dst_va, perm)
        })
    }

    fn page_unmap(&mut self, env: EnvId, va: usize) -> SysResult<()> {
        self.syscall(Sysno::PageUnmap, |k, me| api::sys_page_unmap(k, me, env, va))
    }

    fn env_set_pgfault_upcall(&mut self, env: EnvId, upcall: Upcall) -> SysResult<()> {
        self.syscall(Sysno::EnvSetPgfaultUpcall, |k, me| {
            api::sys_env_set_pgfault_upcall(k, me, env, upcall)
        })
    }

    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> SysResult<()> {
        self.syscall(Sysno::EnvSetStatus, |k, me| api::sys_env_set_status(k, me, env, status))
    }

    fn load(&mut self, va: usize, buf: &mut [u8]) -> Result<(), Killed> {
        let mut done = 0;
        while done < buf.len() {
            let addr = va + done;
            let frame = self.translate(addr, false)?;
            let off = pgoff(addr);
            let n = (PGSIZE - off).min(buf.len() - done);
            let bytes = self.kernel.pool.bytes(frame).ok_or(Killed(self.me))?;
            buf[done..done + n].copy_from_slice(&bytes[off..off + n]);
            done += n;
        }
        Ok(())
    }

    fn store(&mut self, va: usize, bytes: &[u8]) -> Result<(), Killed> {
        let mut done = 0;
        while done < bytes.len() {
            let addr = va + done;
            let frame = self.translate(addr, true)?;
            let off = pgoff(addr);
            let n = (PGSIZE - off).min(bytes.len() - done);
            let dst = self.kernel.pool.bytes_mut(frame).ok_or(Killed(self.me))?;
            dst[off..off + n].copy_from_slice(&bytes[done..done + n]);
            done += n;
        }
        Ok(())
    }

    fn globals(&mut self) -> &mut UserGlobals {
        match self.kernel.envs.get_mut(self.me) {
            Some(env) if env.is_live() => &mut env.globals,
            _ => &mut self.detached,
        }
    }
}
