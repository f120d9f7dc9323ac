// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Recording `Syscalls` implementation for unit tests.

use std::cell::Cell;
use std::collections::BTreeMap;

use nexus_abi::{
    pgnum, pgoff, EnvId, EnvStatus, ForkView, Killed, PageTableMirror, Pde, Pte, PteFlags,
    SysError, SysResult, Syscalls, Upcall, UserGlobals, NPTENTRIES, PGSIZE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Exofork,
    Alloc { env: EnvId, va: usize, perm: PteFlags },
    Map { src: EnvId, src_va: usize, dst: EnvId, dst_va: usize, perm: PteFlags },
    Unmap { env: EnvId, va: usize },
    SetUpcall { env: EnvId },
    SetStatus { env: EnvId, status: EnvStatus },
}

pub(crate) struct MockSys {
    me: EnvId,
    next_env: usize,
    span: usize,
    ptes: BTreeMap<(EnvId, usize), Pte>,
    frames: BTreeMap<u32, Vec<u8>>,
    next_frame: u32,
    upcalls: BTreeMap<EnvId, usize>,
    statuses: BTreeMap<EnvId, EnvStatus>,
    calls: Vec<Call>,
    fail_alloc: Option<SysError>,
    fail_map: Option<SysError>,
    fail_exofork: Option<SysError>,
    globals: UserGlobals,
    probes: Cell<usize>,
}

impl MockSys {
    pub fn new() -> Self {
        Self {
            me: EnvId::compose(1, 0),
            next_env: 1,
            span: NPTENTRIES,
            ptes: BTreeMap::new(),
            frames: BTreeMap::new(),
            next_frame: 1,
            upcalls: BTreeMap::new(),
            statuses: BTreeMap::new(),
            calls: Vec::new(),
            fail_alloc: None,
            fail_map: None,
            fail_exofork: None,
            globals: UserGlobals::default(),
            probes: Cell::new(0),
        }
    }

    pub fn with_table_span(mut self, span: usize) -> Self {
        self.span = span;
        self
    }

    fn resolve(&self, env: EnvId) -> EnvId {
        if env.is_self() {
            self.me
        } else {
            env
        }
    }

    fn new_frame(&mut self) -> u32 {
        let frame = self.next_frame;
        self.next_frame += 1;
        self.frames.insert(frame, vec![0; PGSIZE]);
        frame
    }

    /// Maps a fresh zeroed frame at `va` in the current env without recording a call.
    pub fn map_fresh(&mut self, va: usize, perm: PteFlags) {
        let frame = self.new_frame();
        self.ptes.insert((self.me, pgnum(va)), Pte::new(frame, perm));
    }

    pub fn spawn_child(&mut self) -> EnvId {
        let child = EnvId::compose(1, self.next_env);
        self.next_env += 1;
        self.statuses.insert(child, EnvStatus::NotRunnable);
        child
    }

    pub fn become_env(&mut self, env: EnvId) {
        self.me = env;
    }

    pub fn fill(&mut self, va: usize, byte: u8) {
        let pte = self.ptes[&(self.me, pgnum(va))];
        if let Some(frame) = self.frames.get_mut(&pte.frame()) {
            frame.fill(byte);
        }
    }

    pub fn byte(&self, va: usize) -> u8 {
        let pte = self.ptes[&(self.me, pgnum(va))];
        self.frames[&pte.frame()][pgoff(va)]
    }

    pub fn info(&self, pn: usize) -> crate::PageInfo {
        crate::PageInfo::from_pte(self.ptes.get(&(self.me, pn)).copied().unwrap_or(Pte::EMPTY))
    }

    pub fn child_pte(&self, child: EnvId, pn: usize) -> Pte {
        self.ptes.get(&(child, pn)).copied().unwrap_or(Pte::EMPTY)
    }

    pub fn status_of(&self, env: EnvId) -> Option<EnvStatus> {
        self.statuses.get(&self.resolve(env)).copied()
    }

    pub fn upcall_of(&self, env: EnvId) -> Option<usize> {
        self.upcalls.get(&self.resolve(env)).copied()
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn pte_probes(&self) -> usize {
        self.probes.get()
    }

    pub fn reset_probes(&self) {
        self.probes.set(0);
    }

    pub fn fail_next_alloc(&mut self, err: SysError) {
        self.fail_alloc = Some(err);
    }

    pub fn fail_next_map(&mut self, err: SysError) {
        self.fail_map = Some(err);
    }

    pub fn fail_exofork(&mut self, err: SysError) {
        self.fail_exofork = Some(err);
    }
}

impl PageTableMirror for MockSys {
    fn uvpd(&self, pdx: usize) -> Pde {
        let lo = pdx * self.span;
        let present =
            self.ptes.range((self.me, lo)..(self.me, lo + self.span)).next().is_some();
        if present {
            Pte::new(0, PteFlags::PRESENT | PteFlags::WRITE | PteFlags::USER)
        } else {
            Pte::EMPTY
        }
    }

    fn uvpt(&self, pn: usize) -> Pte {
        self.probes.set(self.probes.get() + 1);
        self.ptes.get(&(self.me, pn)).copied().unwrap_or(Pte::EMPTY)
    }

    fn pages_per_table(&self) -> usize {
        self.span
    }
}

impl Syscalls for MockSys {
    fn getenvid(&self) -> EnvId {
        self.me
    }

    fn exofork(&mut self) -> SysResult<ForkView> {
        self.calls.push(Call::Exofork);
        if let Some(err) = self.fail_exofork.take() {
            return Err(err);
        }
        Ok(ForkView::Parent(self.spawn_child()))
    }

    fn page_alloc(&mut self, env: EnvId, va: usize, perm: PteFlags) -> SysResult<()> {
        self.calls.push(Call::Alloc { env, va, perm });
        if let Some(err) = self.fail_alloc.take() {
            return Err(err);
        }
        let frame = self.new_frame();
        let env = self.resolve(env);
        self.ptes.insert((env, pgnum(va)), Pte::new(frame, perm));
        Ok(())
    }

    fn page_map(
        &mut self,
        src_env: EnvId,
        src_va: usize,
        dst_env: EnvId,
        dst_va: usize,
        perm: PteFlags,
    ) -> SysResult<()> {
        self.calls.push(Call::Map { src: src_env, src_va, dst: dst_env, dst_va, perm });
        if let Some(err) = self.fail_map.take() {
            return Err(err);
        }
        let src = self.resolve(src_env);
        let dst = self.resolve(dst_env);
        let pte = self.ptes.get(&(src, pgnum(src_va))).copied().ok_or(SysError::Inval)?;
        self.ptes.insert((dst, pgnum(dst_va)), pte.with_flags(perm));
        Ok(())
    }

    fn page_unmap(&mut self, env: EnvId, va: usize) -> SysResult<()> {
        self.calls.push(Call::Unmap { env, va });
        let env = self.resolve(env);
        self.ptes.remove(&(env, pgnum(va)));
        Ok(())
    }

    fn env_set_pgfault_upcall(&mut self, env: EnvId, upcall: Upcall) -> SysResult<()> {
        self.calls.push(Call::SetUpcall { env });
        let env = self.resolve(env);
        self.upcalls.insert(env, upcall.entry_addr());
        Ok(())
    }

    fn env_set_status(&mut self, env: EnvId, status: EnvStatus) -> SysResult<()> {
        self.calls.push(Call::SetStatus { env, status });
        let env = self.resolve(env);
        self.statuses.insert(env, status);
        Ok(())
    }

    fn load(&mut self, va: usize, buf: &mut [u8]) -> Result<(), Killed> {
        let pte = self.ptes.get(&(self.me, pgnum(va))).copied().ok_or(Killed(self.me))?;
        let frame = &self.frames[&pte.frame()];
        let off = pgoff(va);
        buf.copy_from_slice(&frame[off..off + buf.len()]);
        Ok(())
    }

    fn store(&mut self, va: usize, bytes: &[u8]) -> Result<(), Killed> {
        let pte = self.ptes.get(&(self.me, pgnum(va))).copied().ok_or(Killed(self.me))?;
        let off = pgoff(va);
        let frame = self.frames.get_mut(&pte.frame()).ok_or(Killed(self.me))?;
        frame[off..off + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn globals(&mut self) -> &mut UserGlobals {
        &mut self.globals
    }
}
