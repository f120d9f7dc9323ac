// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Model kernel facade: environment lifecycle, scheduling loop, inspection
//! OWNERS: @kernel-team
//! PUBLIC API: Kernel (new/create_env/with_user/run/destroy/lookup/read_byte/status/exits/stats),
//!             EnvExit, ExitReason, KernelStats, RunSummary
//! DEPENDS_ON: config, env, mm, sched, syscall, user
//! INVARIANTS: Destroyed environments are marked dying first and reclaimed only once control
//!             is back in the kernel loop; every reclaimed frame returns to the pool

use std::sync::Arc;

use log::{error, info, trace};
use nexus_abi::{
    pgoff, EnvId, EnvStatus, Pte, PteFlags, SysError, SysResult, Upcall, UserGlobals, PGSIZE,
    USTACKTOP,
};

use crate::{
    config::{ConfigError, KernelConfig},
    env::EnvTable,
    mm::{PagePool, PoolStats},
    sched::Scheduler,
    syscall::Sysno,
    user::{program::Step, Program, UserEnv},
};

/// Why an environment stopped existing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The program exited with a status code.
    Exited(i32),
    /// The kernel destroyed the environment; carries the diagnostic.
    Killed(String),
}

/// Record of a destroyed environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvExit {
    /// Destroyed environment.
    pub env: EnvId,
    /// Cause.
    pub reason: ExitReason,
}

/// Counters maintained by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStats {
    /// Frame pool counters.
    pub pool: PoolStats,
    /// Page faults delivered to user upcalls.
    pub faults: u64,
    /// Environments created.
    pub envs_created: u64,
    /// Environments destroyed.
    pub envs_destroyed: u64,
    /// Operations executed by the scheduler loop.
    pub steps: u64,
    /// Invocations per system call, indexed by [`Sysno`].
    pub syscalls: [u64; Sysno::COUNT],
}

impl KernelStats {
    /// Invocations of `sysno`.
    pub fn syscall_count(&self, sysno: Sysno) -> u64 {
        self.syscalls[sysno as usize]
    }
}

/// Outcome of [`Kernel::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Operations executed.
    pub steps: usize,
    /// True when the loop stopped because nothing was runnable, false when
    /// the step budget ran out.
    pub idle: bool,
}

/// The model exokernel.
pub struct Kernel {
    pub(crate) config: KernelConfig,
    pub(crate) pool: PagePool,
    pub(crate) envs: EnvTable,
    pub(crate) sched: Scheduler,
    pub(crate) exits: Vec<EnvExit>,
    pub(crate) stats: KernelStats,
}

impl Kernel {
    /// Boots a kernel sized by `config`.
    pub fn new(config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            target: "env",
            "kernel up: {} frames, {} env slots",
            config.phys_pages, config.max_envs
        );
        Ok(Self {
            pool: PagePool::new(config.phys_pages),
            envs: EnvTable::new(config.max_envs),
            sched: Scheduler::new(),
            exits: Vec::new(),
            stats: KernelStats::default(),
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Creates a root environment with one user stack page below `USTACKTOP`.
    ///
    /// With a program the environment is runnable right away; without one it
    /// is driven from the host through [`Kernel::with_user`].
    pub fn create_env(&mut self, program: Option<Program>) -> SysResult<EnvId> {
        let id = self.envs.alloc(None)?;
        let frame = match self.pool.alloc() {
            Some(frame) => frame,
            None => {
                self.envs.free(id);
                return Err(SysError::NoMem);
            }
        };
        let Self { envs, pool, .. } = self;
        let Some(env) = envs.get_mut(id) else { return Err(SysError::BadEnv) };
        let perm = PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITE;
        if let Err(err) = env.space.insert(pool, frame, USTACKTOP - PGSIZE, perm) {
            pool.release(frame);
            env.space.teardown(pool);
            envs.free(id);
            return Err(err.into());
        }
        env.globals.thisenv = Some(id);
        if let Some(program) = program {
            env.program = Some(Arc::new(program));
            env.status = EnvStatus::Runnable;
        }
        self.stats.envs_created += 1;
        info!(target: "env", "created {id}");
        Ok(id)
    }

    /// Runs `f` as environment `env`, then reclaims anything it destroyed.
    pub fn with_user<R>(
        &mut self,
        env: EnvId,
        f: impl FnOnce(&mut UserEnv<'_>) -> R,
    ) -> SysResult<R> {
        let env = self.envs.resolve(env, EnvId::SELF, false)?;
        let result = f(&mut UserEnv::new(self, env));
        self.reap();
        Ok(result)
    }

    /// Destroys `env`, recording `reason`. Repeated calls keep the first reason.
    pub fn destroy(&mut self, env: EnvId, reason: ExitReason) {
        let Some(target) = self.envs.get_mut(env) else { return };
        if !target.is_live() {
            return;
        }
        target.status = EnvStatus::Dying;
        match &reason {
            ExitReason::Exited(code) => info!(target: "env", "[{env}] exiting with {code}"),
            ExitReason::Killed(why) => error!(target: "env", "[{env}] destroyed: {why}"),
        }
        self.exits.push(EnvExit { env, reason });
        self.stats.envs_destroyed += 1;
    }

    /// Frees every dying environment.
    pub(crate) fn reap(&mut self) {
        for id in self.envs.ids() {
            let dying = self.envs.get(id).is_some_and(|env| env.status == EnvStatus::Dying);
            if !dying {
                continue;
            }
            if let Some(mut env) = self.envs.free(id) {
                env.space.teardown(&mut self.pool);
                trace!(target: "env", "[{id}] freed");
            }
        }
    }

    /// Schedules runnable environments until none is left or the step budget
    /// is spent.
    pub fn run(&mut self) -> RunSummary {
        self.reap();
        let mut steps = 0;
        while steps < self.config.max_steps {
            let Some(id) = self.sched.pick(&self.envs) else {
                return RunSummary { steps, idle: true };
            };
            steps += self.run_slice(id, self.config.max_steps - steps);
            self.reap();
        }
        let idle = self.sched.pick(&self.envs).is_none();
        RunSummary { steps, idle }
    }

    fn run_slice(&mut self, id: EnvId, budget: usize) -> usize {
        let Some(env) = self.envs.get_mut(id) else { return 0 };
        let Some(program) = env.program.clone() else { return 0 };
        env.status = EnvStatus::Running;
        env.runs += 1;
        trace!(target: "sched", "run {id} at {}", env.tf.pc);

        let slice = self.config.time_slice.min(budget);
        let mut executed = 0;
        while executed < slice {
            executed += 1;
            let step = crate::user::program::step(&mut UserEnv::new(self, id), &program);
            match step {
                Step::Continue => {}
                Step::Yield => break,
                Step::Exit(code) => self.destroy(id, ExitReason::Exited(code)),
                Step::Panic(panic) => {
                    self.destroy(id, ExitReason::Killed(panic.message().to_string()))
                }
                Step::Killed => {}
            }
            if self.status(id) != Some(EnvStatus::Running) {
                break;
            }
        }
        if let Some(env) = self.envs.get_mut(id) {
            if env.status == EnvStatus::Running {
                env.status = EnvStatus::Runnable;
            }
        }
        self.stats.steps += executed as u64;
        executed
    }

    /// Present mapping of `va` in `env`.
    pub fn lookup(&self, env: EnvId, va: usize) -> Option<Pte> {
        self.envs.get(env)?.space.lookup(va)
    }

    /// Byte at `va` in `env`, read through its page table without faulting.
    pub fn read_byte(&self, env: EnvId, va: usize) -> Option<u8> {
        let pte = self.lookup(env, va)?;
        self.pool.bytes(pte.frame()).map(|bytes| bytes[pgoff(va)])
    }

    /// Mappings currently referencing `frame`.
    pub fn frame_refs(&self, frame: u32) -> u32 {
        self.pool.refcount(frame)
    }

    /// Scheduling state; `None` once the environment has been reclaimed.
    pub fn status(&self, env: EnvId) -> Option<EnvStatus> {
        self.envs.get(env).map(|env| env.status)
    }

    /// Runtime globals of `env`.
    pub fn globals(&self, env: EnvId) -> Option<UserGlobals> {
        self.envs.get(env).map(|env| env.globals)
    }

    /// Registered page-fault entry of `env`.
    pub fn upcall(&self, env: EnvId) -> Option<Upcall> {
        self.envs.get(env)?.upcall
    }

    /// Creator of `env`.
    pub fn parent(&self, env: EnvId) -> Option<EnvId> {
        self.envs.get(env)?.parent()
    }

    /// Environments currently in the table.
    pub fn envs(&self) -> Vec<EnvId> {
        self.envs.ids()
    }

    /// Every destroyed environment, in destruction order.
    pub fn exits(&self) -> &[EnvExit] {
        &self.exits
    }

    /// Exit record of `env`.
    pub fn exit_of(&self, env: EnvId) -> Option<&ExitReason> {
        self.exits.iter().find(|exit| exit.env == env).map(|exit| &exit.reason)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> KernelStats {
        KernelStats { pool: self.pool.stats(), ..self.stats }
    }
}
