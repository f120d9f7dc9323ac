// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Environment table and per-environment state
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Env, EnvTable (alloc/get/get_mut/resolve/free), Trapframe
//! DEPENDS_ON: mm::AddressSpace, user::Program, nexus-abi (EnvId, UserGlobals, Upcall)
//! INVARIANTS: An EnvId resolves only while its slot holds the same generation; only the
//!             environment itself and its immediate parent may manipulate it

use std::sync::Arc;

use log::debug;
use nexus_abi::{EnvId, EnvStatus, SysError, SysResult, Upcall, UserGlobals, USTACKTOP};

use crate::{mm::AddressSpace, user::Program};

/// Generation values live in the bits above the slot index.
const GENERATION_LIMIT: u32 = 1 << (32 - nexus_abi::env::ENVGENSHIFT);

/// Saved user register state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trapframe {
    /// Index of the next operation to execute.
    pub pc: usize,
    /// User stack pointer.
    pub esp: usize,
    /// Result register of the last system call.
    pub retval: u32,
    /// Set on a fresh child: the environment still has to observe the child
    /// side of the process-creation call at `pc`.
    pub resume_child: bool,
}

impl Default for Trapframe {
    fn default() -> Self {
        Self { pc: 0, esp: USTACKTOP, retval: 0, resume_child: false }
    }
}

/// A single environment (process).
pub struct Env {
    id: EnvId,
    parent: Option<EnvId>,
    /// Scheduling state.
    pub status: EnvStatus,
    /// User address space.
    pub space: AddressSpace,
    /// Saved registers.
    pub tf: Trapframe,
    /// Registered page-fault entry.
    pub upcall: Option<Upcall>,
    /// Process-local runtime globals.
    pub globals: UserGlobals,
    /// Code the scheduler runs; host-driven environments have none.
    pub program: Option<Arc<Program>>,
    /// Times the environment has been scheduled.
    pub runs: u64,
}

impl Env {
    /// Identity.
    pub fn id(&self) -> EnvId {
        self.id
    }

    /// Creator, if any.
    pub fn parent(&self) -> Option<EnvId> {
        self.parent
    }

    /// Whether the environment may still execute or be manipulated.
    pub fn is_live(&self) -> bool {
        !matches!(self.status, EnvStatus::Free | EnvStatus::Dying)
    }
}

/// Fixed-capacity environment table.
pub struct EnvTable {
    slots: Vec<Option<Env>>,
    generations: Vec<u32>,
}

impl EnvTable {
    /// Creates a table with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, generations: vec![0; capacity] }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Allocates an empty, not-runnable environment.
    pub fn alloc(&mut self, parent: Option<EnvId>) -> SysResult<EnvId> {
        let slot = self.slots.iter().position(Option::is_none).ok_or(SysError::NoFreeEnv)?;
        let mut generation = self.generations[slot] + 1;
        if generation >= GENERATION_LIMIT {
            generation = 1;
        }
        self.generations[slot] = generation;
        let id = EnvId::compose(generation, slot);
        self.slots[slot] = Some(Env {
            id,
            parent,
            status: EnvStatus::NotRunnable,
            space: AddressSpace::new(),
            tf: Trapframe::default(),
            upcall: None,
            globals: UserGlobals::default(),
            program: None,
            runs: 0,
        });
        debug!(target: "env", "alloc {id} parent {parent:?}");
        Ok(id)
    }

    /// Environment named by `id`, dying ones included.
    pub fn get(&self, id: EnvId) -> Option<&Env> {
        self.slots.get(id.index())?.as_ref().filter(|env| env.id == id)
    }

    /// Mutable environment named by `id`, dying ones included.
    pub fn get_mut(&mut self, id: EnvId) -> Option<&mut Env> {
        self.slots.get_mut(id.index())?.as_mut().filter(|env| env.id == id)
    }

    /// Translates `id` as passed by `caller` to a live environment.
    ///
    /// `EnvId::SELF` names the caller. With `check_perm`, the target must be
    /// the caller or one of its immediate children.
    pub fn resolve(&self, caller: EnvId, id: EnvId, check_perm: bool) -> SysResult<EnvId> {
        let id = if id.is_self() { caller } else { id };
        let env = self.get(id).filter(|env| env.is_live()).ok_or(SysError::BadEnv)?;
        if check_perm && id != caller && env.parent != Some(caller) {
            return Err(SysError::BadEnv);
        }
        Ok(id)
    }

    /// Removes `id` from the table, handing back its state.
    pub fn free(&mut self, id: EnvId) -> Option<Env> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.as_ref().map(|env| env.id) != Some(id) {
            return None;
        }
        slot.take()
    }

    /// Identities of all occupied slots in slot order.
    pub fn ids(&self) -> Vec<EnvId> {
        self.slots.iter().flatten().map(|env| env.id).collect()
    }

    /// Identity held by `slot`, if occupied.
    pub fn id_at(&self, slot: usize) -> Option<EnvId> {
        self.slots.get(slot)?.as_ref().map(|env| env.id)
    }
}
