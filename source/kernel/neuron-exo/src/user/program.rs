// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tiny user instruction set and its interpreter.
//!
//! A program is shared by a parent and every child forked from it; each
//! environment keeps its own program counter in its trapframe.

use nexus_abi::{EnvId, ForkView, PteFlags, Syscalls, UserPanic, UTEXT};
use nexus_fork::{fork, resume_fork, resume_sfork, sfork, ForkError};

use super::UserEnv;

/// One user operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `sys_page_alloc(0, va, perm)`.
    Alloc {
        /// Target page.
        va: usize,
        /// Mapping permissions.
        perm: PteFlags,
    },
    /// Writes `byte` at `va`.
    Store {
        /// Address written.
        va: usize,
        /// Value.
        byte: u8,
    },
    /// Reads `va` and panics unless it holds `byte`.
    Expect {
        /// Address read.
        va: usize,
        /// Expected value.
        byte: u8,
    },
    /// Writes the environment's marker byte at `va`.
    StoreMarker {
        /// Address written.
        va: usize,
    },
    /// Panics unless `va` holds the environment's marker byte.
    ExpectMarker {
        /// Address read.
        va: usize,
    },
    /// `fork()`; the result register holds the child id, or 0 in the child.
    Fork,
    /// `sfork()`; same result convention as [`Op::Fork`].
    Sfork,
    /// Jumps to the target when the result register is 0.
    ChildJump(usize),
    /// Unconditional jump.
    Jump(usize),
    /// Gives up the rest of the time slice.
    Yield,
    /// Panics unless the cached `thisenv` names the running environment.
    AssertThisEnv,
    /// Exits with a status code.
    Exit(i32),
}

/// Immutable sequence of operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    ops: Vec<Op>,
}

impl Program {
    /// Wraps `ops`.
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    /// Operation at `pc`.
    pub fn get(&self, pc: usize) -> Option<&Op> {
        self.ops.get(pc)
    }

    /// Operations in order.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Program that forks `depth` times in every process, giving `2^depth`
    /// environments. Each one checks the page inherited at [`UTEXT`], writes
    /// its own marker there, yields, and checks the marker survived.
    pub fn fork_tree(depth: u32) -> Self {
        let rw = PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITE;
        let mut ops = vec![Op::Alloc { va: UTEXT, perm: rw }, Op::Store { va: UTEXT, byte: 0xaa }];
        ops.extend((0..depth).map(|_| Op::Fork));
        ops.extend([
            Op::Expect { va: UTEXT, byte: 0xaa },
            Op::AssertThisEnv,
            Op::StoreMarker { va: UTEXT },
            Op::Yield,
            Op::ExpectMarker { va: UTEXT },
            Op::Exit(0),
        ]);
        Self::new(ops)
    }
}

/// Marker byte an environment writes to identify itself.
pub fn marker(env: EnvId) -> u8 {
    (env.index() % 251) as u8 + 1
}

/// Result of executing one operation.
#[derive(Debug)]
pub(crate) enum Step {
    Continue,
    Yield,
    Exit(i32),
    Panic(UserPanic),
    Killed,
}

impl From<ForkError> for Step {
    fn from(err: ForkError) -> Self {
        match err {
            ForkError::Killed(_) => Step::Killed,
            other => Step::Panic(other.into()),
        }
    }
}

/// Executes the operation at the environment's program counter.
pub(crate) fn step(user: &mut UserEnv<'_>, program: &Program) -> Step {
    let Some(tf) = user.trapframe() else { return Step::Killed };
    let Some(op) = program.get(tf.pc) else { return Step::Exit(0) };

    if tf.resume_child {
        let resumed = match op {
            Op::Fork => resume_fork(user, ForkView::Child),
            Op::Sfork => resume_sfork(user, ForkView::Child),
            other => return Step::Panic(UserPanic::new(format!("child resumed at {other:?}"))),
        };
        user.update_tf(|tf| {
            tf.resume_child = false;
            tf.retval = 0;
            tf.pc += 1;
        });
        return match resumed {
            Ok(_) => Step::Continue,
            Err(err) => err.into(),
        };
    }

    let mut next = tf.pc + 1;
    let outcome = match *op {
        Op::Alloc { va, perm } => match user.page_alloc(EnvId::SELF, va, perm) {
            Ok(()) => Step::Continue,
            Err(err) => Step::Panic(UserPanic::new(format!("sys_page_alloc: {err}"))),
        },
        Op::Store { va, byte } => store(user, va, byte),
        Op::Expect { va, byte } => expect(user, va, byte),
        Op::StoreMarker { va } => {
            let byte = marker(user.getenvid());
            store(user, va, byte)
        }
        Op::ExpectMarker { va } => {
            let byte = marker(user.getenvid());
            expect(user, va, byte)
        }
        Op::Fork | Op::Sfork => {
            let forked = if *op == Op::Fork { fork(user) } else { sfork(user) };
            match forked {
                Ok(view) => {
                    user.update_tf(|tf| tf.retval = view.as_raw());
                    Step::Continue
                }
                Err(err) => err.into(),
            }
        }
        Op::ChildJump(target) => {
            if tf.retval == 0 {
                next = target;
            }
            Step::Continue
        }
        Op::Jump(target) => {
            next = target;
            Step::Continue
        }
        Op::Yield => Step::Yield,
        Op::AssertThisEnv => {
            let me = user.getenvid();
            match user.globals().thisenv {
                Some(cached) if cached == me => Step::Continue,
                cached => Step::Panic(UserPanic::new(format!(
                    "thisenv is {cached:?}, running as {me}"
                ))),
            }
        }
        Op::Exit(code) => Step::Exit(code),
    };
    if matches!(outcome, Step::Continue | Step::Yield) {
        user.update_tf(|tf| tf.pc = next);
    }
    outcome
}

fn store(user: &mut UserEnv<'_>, va: usize, byte: u8) -> Step {
    match user.store(va, &[byte]) {
        Ok(()) => Step::Continue,
        Err(_) => Step::Killed,
    }
}

fn expect(user: &mut UserEnv<'_>, va: usize, byte: u8) -> Step {
    let mut got = [0u8];
    if user.load(va, &mut got).is_err() {
        return Step::Killed;
    }
    if got[0] != byte {
        return Step::Panic(UserPanic::new(format!(
            "expected {byte:#04x} at {va:08x}, found {:#04x}",
            got[0]
        )));
    }
    Step::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_tree_shape() {
        let program = Program::fork_tree(2);
        assert_eq!(program.ops().iter().filter(|op| **op == Op::Fork).count(), 2);
        assert_eq!(program.ops().last(), Some(&Op::Exit(0)));
    }

    #[test]
    fn markers_are_never_zero() {
        for slot in 0..1024 {
            assert_ne!(marker(EnvId::compose(1, slot)), 0);
        }
    }
}
