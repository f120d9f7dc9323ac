// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: User page-fault delivery
//! OWNERS: @kernel-team
//! PUBLIC API: page_fault (crate-internal)
//! DEPENDS_ON: kernel::Kernel, user::UserEnv
//! INVARIANTS: A fault record is only ever written to a present, user-writable exception stack
//!             page; a nested fault leaves one scratch word below the interrupted frame; an
//!             environment without an upcall, or whose exception stack overflows, is destroyed

use log::trace;
use nexus_abi::{pgoff, FaultErr, FaultRecord, Killed, PteFlags, PGSIZE, UXSTACKTOP};

use crate::{kernel::ExitReason, user::UserEnv};

/// Bytes left free between nested fault frames.
const SCRATCH_WORD: usize = 4;

/// Delivers a page fault at `fault_va` to the running environment's upcall.
///
/// Returns once the upcall finished; the caller retries the access. Any
/// failure destroys the environment.
pub(crate) fn page_fault(
    user: &mut UserEnv<'_>,
    fault_va: usize,
    err: FaultErr,
) -> Result<(), Killed> {
    let me = user.me;
    let Some(env) = user.kernel.envs.get(me) else { return Err(Killed(me)) };
    let (upcall, trap_esp, pc) = (env.upcall, env.tf.esp, env.tf.pc);
    let kill = |user: &mut UserEnv<'_>, why: &str| {
        let reason = format!("[{me}] user fault va {fault_va:08x} ip {pc:08x} {err}: {why}");
        user.kernel.destroy(me, ExitReason::Killed(reason));
        Killed(me)
    };

    let Some(upcall) = upcall else { return Err(kill(user, "no page fault upcall")) };

    let xstack = UXSTACKTOP - PGSIZE..UXSTACKTOP;
    let top = if xstack.contains(&trap_esp) { trap_esp - SCRATCH_WORD } else { UXSTACKTOP };
    let Some(esp) = top.checked_sub(FaultRecord::FRAME_SIZE).filter(|esp| xstack.contains(esp))
    else {
        return Err(kill(user, "exception stack overflow"));
    };

    let record = FaultRecord { fault_va, err, eip: pc, esp: trap_esp };
    if !push_record(user, esp, &record) {
        return Err(kill(user, "exception stack not mapped user-writable"));
    }

    user.kernel.stats.faults += 1;
    trace!(target: "trap", "[{me}] fault va {fault_va:08x} {err} -> upcall {upcall:?} esp {esp:08x}");
    user.update_tf(|tf| tf.esp = esp);
    let outcome = upcall.invoke(user, &record);
    user.update_tf(|tf| tf.esp = trap_esp);

    match outcome {
        Ok(()) => Ok(()),
        Err(panic) => {
            user.kernel.destroy(me, ExitReason::Killed(panic.message().to_string()));
            Err(Killed(me))
        }
    }
}

fn push_record(user: &mut UserEnv<'_>, esp: usize, record: &FaultRecord) -> bool {
    let Some(env) = user.kernel.envs.get(user.me) else { return false };
    let writable = PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITE;
    let Some(pte) = env.space.lookup(esp).filter(|pte| pte.flags().contains(writable)) else {
        return false;
    };
    let Some(bytes) = user.kernel.pool.bytes_mut(pte.frame()) else { return false };
    let off = pgoff(esp);
    bytes[off..off + FaultRecord::FRAME_SIZE].copy_from_slice(&record.to_le_bytes());
    true
}
