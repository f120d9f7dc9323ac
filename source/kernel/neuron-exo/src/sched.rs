// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Round-robin environment scheduler
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Scheduler (new/pick)
//! DEPENDS_ON: env::EnvTable
//! INVARIANTS: Only runnable environments with a program are picked; the search starts after
//!             the previously picked slot so every candidate is reached within one sweep

use nexus_abi::{EnvId, EnvStatus};

use crate::env::EnvTable;

/// Circular sweep over environment slots.
#[derive(Debug, Default)]
pub struct Scheduler {
    next_slot: usize,
}

impl Scheduler {
    /// Creates a scheduler starting at slot zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next environment to run, if any is eligible.
    pub fn pick(&mut self, envs: &EnvTable) -> Option<EnvId> {
        let slots = envs.capacity();
        for offset in 0..slots {
            let slot = (self.next_slot + offset) % slots;
            let Some(id) = envs.id_at(slot) else { continue };
            let eligible = envs
                .get(id)
                .is_some_and(|env| env.status == EnvStatus::Runnable && env.program.is_some());
            if eligible {
                self.next_slot = (slot + 1) % slots;
                return Some(id);
            }
        }
        None
    }
}
