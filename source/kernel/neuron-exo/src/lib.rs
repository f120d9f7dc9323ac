// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! CONTEXT: Host model of the exokernel that backs user-level copy-on-write fork
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! PUBLIC API: Kernel, KernelConfig, UserEnv, Program/Op, diag::{show_mappings, show_vmem}
//! DEPENDS_ON: nexus-abi, nexus-fork, log, thiserror, serde/toml
//! INVARIANTS: Primitives validate before mutating; faults are delivered on the user
//!             exception stack; frames are reference counted across address spaces
//! ADR: docs/adr/0001-runtime-roles-and-boundaries.md

pub mod config;
pub mod diag;
pub mod env;
pub mod kernel;
pub mod mm;
pub mod sched;
pub mod syscall;
mod trap;
pub mod user;

pub use config::{ConfigError, KernelConfig};
pub use kernel::{EnvExit, ExitReason, Kernel, KernelStats, RunSummary};
pub use user::{Op, Program, UserEnv};
