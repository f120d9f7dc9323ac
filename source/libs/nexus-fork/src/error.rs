// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Failure taxonomy of the fork library. Every variant is terminal for the
//! environment that observes it.

use nexus_abi::{EnvId, FaultErr, Killed, SysError, SysResult, UserPanic};

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, ForkError>;

/// Errors raised while duplicating an address space or resolving a fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForkError {
    /// A kernel primitive rejected the request.
    #[error("{op}: {source} ({})", .source.code())]
    Syscall {
        /// Name of the failing primitive.
        op: &'static str,
        /// Error returned by the kernel.
        #[source]
        source: SysError,
    },
    /// A fault that is not a write to a copy-on-write page.
    #[error("[{env}] user fault va {va:08x} ip {eip:08x} {err}")]
    ProtectionViolation {
        /// Faulting environment.
        env: EnvId,
        /// Faulting address.
        va: usize,
        /// Faulting instruction.
        eip: usize,
        /// Access-type bits.
        err: FaultErr,
    },
    /// The environment was destroyed underneath the operation.
    #[error(transparent)]
    Killed(#[from] Killed),
}

impl From<ForkError> for UserPanic {
    fn from(err: ForkError) -> Self {
        UserPanic::new(err.to_string())
    }
}

/// Attaches the primitive name to a kernel error.
pub(crate) trait SyscallExt<T> {
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T> SyscallExt<T> for SysResult<T> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|source| ForkError::Syscall { op, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_diagnostic_names_op_and_code() {
        let err: Result<()> = Err(SysError::NoMem).context("sys_page_alloc");
        let msg = err.unwrap_err().to_string();
        assert_eq!(msg, "sys_page_alloc: out of memory (-4)");
    }

    #[test]
    fn protection_diagnostic_names_env_address_ip_and_flags() {
        let err = ForkError::ProtectionViolation {
            env: EnvId::compose(1, 5),
            va: 0x0080_2010,
            eip: 3,
            err: FaultErr::USER | FaultErr::WRITE | FaultErr::PROTECTION,
        };
        let panic = UserPanic::from(err);
        assert_eq!(
            panic.message(),
            "[00001005] user fault va 00802010 ip 00000003 [user, write, protection]"
        );
    }
}
