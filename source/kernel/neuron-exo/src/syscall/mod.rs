// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Environment and page primitives exposed to user environments
//! OWNERS: @kernel-team
//! PUBLIC API: Sysno, api::* handlers
//! DEPENDS_ON: env::EnvTable, mm::{AddressSpace, PagePool}
//! INVARIANTS: User mappings stay below UTOP and page aligned; user permissions include
//!             PRESENT|USER, stay within PteFlags::SYSCALL and never combine WRITE with COW;
//!             a mapping can only gain WRITE if its source already has it

pub mod api;

use nexus_abi::{PteFlags, SysError, SysResult, PGSIZE, UTOP};

/// System call numbers, used for accounting and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Sysno {
    /// `sys_getenvid`
    Getenvid = 0,
    /// `sys_exofork`
    Exofork = 1,
    /// `sys_page_alloc`
    PageAlloc = 2,
    /// `sys_page_map`
    PageMap = 3,
    /// `sys_page_unmap`
    PageUnmap = 4,
    /// `sys_env_set_pgfault_upcall`
    EnvSetPgfaultUpcall = 5,
    /// `sys_env_set_status`
    EnvSetStatus = 6,
}

impl Sysno {
    /// Number of system calls.
    pub const COUNT: usize = 7;

    /// Every system call, in number order.
    pub const ALL: [Sysno; Self::COUNT] = [
        Self::Getenvid,
        Self::Exofork,
        Self::PageAlloc,
        Self::PageMap,
        Self::PageUnmap,
        Self::EnvSetPgfaultUpcall,
        Self::EnvSetStatus,
    ];

    /// Conventional name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Getenvid => "sys_getenvid",
            Self::Exofork => "sys_exofork",
            Self::PageAlloc => "sys_page_alloc",
            Self::PageMap => "sys_page_map",
            Self::PageUnmap => "sys_page_unmap",
            Self::EnvSetPgfaultUpcall => "sys_env_set_pgfault_upcall",
            Self::EnvSetStatus => "sys_env_set_status",
        }
    }
}

pub(crate) fn check_user_va(va: usize) -> SysResult<()> {
    if va >= UTOP || va % PGSIZE != 0 {
        return Err(SysError::Inval);
    }
    Ok(())
}

pub(crate) fn check_perm(perm: PteFlags) -> SysResult<()> {
    let required = PteFlags::PRESENT | PteFlags::USER;
    if !perm.contains(required)
        || !PteFlags::SYSCALL.contains(perm)
        || perm.contains(PteFlags::WRITE | PteFlags::COW)
    {
        return Err(SysError::Inval);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn va_checks() {
        assert!(check_user_va(0).is_ok());
        assert!(check_user_va(UTOP - PGSIZE).is_ok());
        assert_eq!(check_user_va(UTOP), Err(SysError::Inval));
        assert_eq!(check_user_va(PGSIZE + 8), Err(SysError::Inval));
    }

    #[test]
    fn perm_checks() {
        let pu = PteFlags::PRESENT | PteFlags::USER;
        assert!(check_perm(pu).is_ok());
        assert!(check_perm(pu | PteFlags::WRITE | PteFlags::SHARE).is_ok());
        assert!(check_perm(pu | PteFlags::COW).is_ok());
        assert_eq!(check_perm(PteFlags::PRESENT), Err(SysError::Inval));
        assert_eq!(check_perm(pu | PteFlags::DIRTY), Err(SysError::Inval));
        assert_eq!(check_perm(pu | PteFlags::WRITE | PteFlags::COW), Err(SysError::Inval));
    }

    #[test]
    fn numbers_are_dense() {
        for (index, sysno) in Sysno::ALL.iter().enumerate() {
            assert_eq!(*sysno as usize, index);
        }
    }
}
