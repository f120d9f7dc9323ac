// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fault records delivered to the user-level page-fault upcall.

use core::fmt;

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    /// Access-type bits of a page-fault error code.
    pub struct FaultErr: u32 {
        /// Set for a protection violation, clear for a not-present page.
        const PROTECTION = 0x1;
        /// Set when the faulting access was a write.
        const WRITE = 0x2;
        /// Set when the fault happened in user mode.
        const USER = 0x4;
    }
}

impl FaultErr {
    /// Whether the faulting access was a write.
    pub fn is_write(self) -> bool {
        self.contains(Self::WRITE)
    }
}

impl fmt::Display for FaultErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}]",
            if self.contains(Self::USER) { "user" } else { "kernel" },
            if self.contains(Self::WRITE) { "write" } else { "read" },
            if self.contains(Self::PROTECTION) { "protection" } else { "not-present" },
        )
    }
}

/// Snapshot handed to the upcall for a single fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultRecord {
    /// Faulting virtual address.
    pub fault_va: usize,
    /// Access-type bits.
    pub err: FaultErr,
    /// Instruction pointer of the faulting access.
    pub eip: usize,
    /// Stack pointer at the time of the fault.
    pub esp: usize,
}

impl FaultRecord {
    /// Size of a record once pushed on the exception stack.
    pub const FRAME_SIZE: usize = 4 * core::mem::size_of::<u32>();

    /// Little-endian image written onto the exception stack. Addresses are
    /// 32-bit; the kernel never delivers a fault above that range.
    pub fn to_le_bytes(&self) -> [u8; Self::FRAME_SIZE] {
        let mut out = [0u8; Self::FRAME_SIZE];
        out[0..4].copy_from_slice(&(self.fault_va as u32).to_le_bytes());
        out[4..8].copy_from_slice(&self.err.bits().to_le_bytes());
        out[8..12].copy_from_slice(&(self.eip as u32).to_le_bytes());
        out[12..16].copy_from_slice(&(self.esp as u32).to_le_bytes());
        out
    }
}
