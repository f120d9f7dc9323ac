// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Handlers for the environment and page primitives.
//!
//! Each handler runs on behalf of `caller` and validates its arguments
//! before touching any state, so a rejected call leaves nothing behind.

use log::info;
use nexus_abi::{EnvId, EnvStatus, PteFlags, SysError, SysResult, Upcall};

use super::{check_perm, check_user_va};
use crate::kernel::Kernel;

/// Creates a not-runnable child whose registers and globals copy the caller's.
pub fn sys_exofork(k: &mut Kernel, caller: EnvId) -> SysResult<EnvId> {
    let caller = k.envs.resolve(caller, EnvId::SELF, false)?;
    let child = k.envs.alloc(Some(caller))?;
    let (tf, globals, program) = match k.envs.get(caller) {
        Some(parent) => (parent.tf, parent.globals, parent.program.clone()),
        None => return Err(SysError::BadEnv),
    };
    if let Some(env) = k.envs.get_mut(child) {
        env.tf = tf;
        env.tf.retval = 0;
        env.tf.resume_child = true;
        env.globals = globals;
        env.program = program;
    }
    k.stats.envs_created += 1;
    info!(target: "env", "[{caller}] new env {child}");
    Ok(child)
}

/// Allocates a zeroed frame and maps it at `va` in `env`.
pub fn sys_page_alloc(
    k: &mut Kernel,
    caller: EnvId,
    env: EnvId,
    va: usize,
    perm: PteFlags,
) -> SysResult<()> {
    let target = k.envs.resolve(caller, env, true)?;
    check_user_va(va)?;
    check_perm(perm)?;
    let frame = k.pool.alloc().ok_or(SysError::NoMem)?;
    let Kernel { envs, pool, .. } = k;
    let space = &mut envs.get_mut(target).ok_or(SysError::BadEnv)?.space;
    if let Err(err) = space.insert(pool, frame, va, perm) {
        pool.release(frame);
        return Err(err.into());
    }
    Ok(())
}

/// Maps the frame behind `src_va` in `src` at `dst_va` in `dst`.
pub fn sys_page_map(
    k: &mut Kernel,
    caller: EnvId,
    src: EnvId,
    src_va: usize,
    dst: EnvId,
    dst_va: usize,
    perm: PteFlags,
) -> SysResult<()> {
    let src = k.envs.resolve(caller, src, true)?;
    let dst = k.envs.resolve(caller, dst, true)?;
    check_user_va(src_va)?;
    check_user_va(dst_va)?;
    check_perm(perm)?;
    let pte = k
        .envs
        .get(src)
        .and_then(|env| env.space.lookup(src_va))
        .ok_or(SysError::Inval)?;
    if perm.contains(PteFlags::WRITE) && !pte.flags().contains(PteFlags::WRITE) {
        return Err(SysError::Inval);
    }
    let Kernel { envs, pool, .. } = k;
    let space = &mut envs.get_mut(dst).ok_or(SysError::BadEnv)?.space;
    space.insert(pool, pte.frame(), dst_va, perm)?;
    Ok(())
}

/// Removes the mapping at `va` in `env`, if any.
pub fn sys_page_unmap(k: &mut Kernel, caller: EnvId, env: EnvId, va: usize) -> SysResult<()> {
    let target = k.envs.resolve(caller, env, true)?;
    check_user_va(va)?;
    let Kernel { envs, pool, .. } = k;
    if let Some(env) = envs.get_mut(target) {
        env.space.remove(pool, va);
    }
    Ok(())
}

/// Registers the page-fault entry of `env`.
pub fn sys_env_set_pgfault_upcall(
    k: &mut Kernel,
    caller: EnvId,
    env: EnvId,
    upcall: Upcall,
) -> SysResult<()> {
    let target = k.envs.resolve(caller, env, true)?;
    let env = k.envs.get_mut(target).ok_or(SysError::BadEnv)?;
    env.upcall = Some(upcall);
    Ok(())
}

/// Makes `env` runnable or not runnable.
pub fn sys_env_set_status(
    k: &mut Kernel,
    caller: EnvId,
    env: EnvId,
    status: EnvStatus,
) -> SysResult<()> {
    if !matches!(status, EnvStatus::Runnable | EnvStatus::NotRunnable) {
        return Err(SysError::Inval);
    }
    let target = k.envs.resolve(caller, env, true)?;
    let env = k.envs.get_mut(target).ok_or(SysError::BadEnv)?;
    env.status = status;
    Ok(())
}
