// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Read-only inspection of environment address spaces
//! OWNERS: @kernel-team
//! PUBLIC API: show_mappings, show_vmem, Mappings, MappingRow, VmemDump
//! DEPENDS_ON: kernel::Kernel
//! INVARIANTS: Inspection never faults and never changes a mapping

use core::fmt;

use nexus_abi::{round_down, EnvId, Pte, PteFlags, SysError, SysResult, PGSIZE, UTOP};

use crate::kernel::Kernel;

/// Bytes per line of a [`VmemDump`].
const DUMP_WIDTH: usize = 16;

/// Mapping state of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingRow {
    /// Page address.
    pub va: usize,
    /// Present entry, if any.
    pub pte: Option<Pte>,
    /// Mappings sharing the frame.
    pub refs: u32,
}

/// Result of [`show_mappings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mappings {
    /// Environment inspected.
    pub env: EnvId,
    /// One row per page.
    pub rows: Vec<MappingRow>,
}

/// Lists the mapping of every page overlapping `start..end` in `env`.
///
/// The range is clipped at `UTOP`.
pub fn show_mappings(
    kernel: &Kernel,
    env: EnvId,
    start: usize,
    end: usize,
) -> SysResult<Mappings> {
    if kernel.status(env).is_none() {
        return Err(SysError::BadEnv);
    }
    let rows = (round_down(start)..end.min(UTOP))
        .step_by(PGSIZE)
        .map(|va| {
            let pte = kernel.lookup(env, va);
            let refs = pte.map_or(0, |pte| kernel.frame_refs(pte.frame()));
            MappingRow { va, pte, refs }
        })
        .collect();
    Ok(Mappings { env, rows })
}

impl fmt::Display for Mappings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "env {}", self.env)?;
        for row in &self.rows {
            match row.pte {
                None => writeln!(f, "  {:08x}: no mapping", row.va)?,
                Some(pte) => {
                    let flags = pte.flags();
                    let bit = |flag: PteFlags, c: char| if flags.contains(flag) { c } else { '-' };
                    writeln!(
                        f,
                        "  {:08x}: frame {:05x} {}{}{}{} refs {}",
                        row.va,
                        pte.frame(),
                        bit(PteFlags::USER, 'U'),
                        bit(PteFlags::WRITE, 'W'),
                        bit(PteFlags::COW, 'C'),
                        bit(PteFlags::SHARE, 'S'),
                        row.refs
                    )?
                }
            }
        }
        Ok(())
    }
}

/// Bytes of a virtual range; `None` where nothing is mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmemDump {
    /// First address dumped.
    pub start: usize,
    /// One entry per byte.
    pub bytes: Vec<Option<u8>>,
}

/// Dumps `len` bytes of `env` starting at `start`, stopping at `UTOP`.
pub fn show_vmem(kernel: &Kernel, env: EnvId, start: usize, len: usize) -> SysResult<VmemDump> {
    if kernel.status(env).is_none() {
        return Err(SysError::BadEnv);
    }
    let end = start.saturating_add(len).min(UTOP);
    let bytes = (start..end).map(|va| kernel.read_byte(env, va)).collect();
    Ok(VmemDump { start, bytes })
}

impl fmt::Display for VmemDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, chunk) in self.bytes.chunks(DUMP_WIDTH).enumerate() {
            write!(f, "{:08x}:", self.start + line * DUMP_WIDTH)?;
            for byte in chunk {
                match byte {
                    Some(byte) => write!(f, " {byte:02x}")?,
                    None => write!(f, " --")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use nexus_abi::{Syscalls, USTACKTOP};

    #[test]
    fn renders_mapped_and_unmapped_pages() {
        let mut k = Kernel::new(KernelConfig::default()).unwrap();
        let env = k.create_env(None).unwrap();
        let start = USTACKTOP - 2 * PGSIZE;
        let table = show_mappings(&k, env, start, USTACKTOP).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows[0].pte.is_none());
        let text = table.to_string();
        assert!(text.contains("eebfc000: no mapping"), "{text}");
        assert!(text.contains("eebfd000: frame"), "{text}");
        assert!(text.contains("UW-- refs 1"), "{text}");
    }

    #[test]
    fn dump_marks_unmapped_bytes() {
        let mut k = Kernel::new(KernelConfig::default()).unwrap();
        let env = k.create_env(None).unwrap();
        k.with_user(env, |user| user.store(USTACKTOP - 4, &[1, 2, 3, 4])).unwrap().unwrap();
        let dump = show_vmem(&k, env, USTACKTOP - 4, 8).unwrap();
        assert_eq!(dump.to_string(), "eebfdffc: 01 02 03 04 -- -- -- --\n");
    }

    #[test]
    fn ranges_stop_at_user_top() {
        let mut k = Kernel::new(KernelConfig::default()).unwrap();
        let env = k.create_env(None).unwrap();
        let table = show_mappings(&k, env, UTOP - 2 * PGSIZE, usize::MAX).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert!(show_mappings(&k, env, UTOP, usize::MAX).unwrap().rows.is_empty());
        let dump = show_vmem(&k, env, UTOP - 3, usize::MAX).unwrap();
        assert_eq!(dump.bytes.len(), 3);
    }

    #[test]
    fn unknown_env_is_bad_env() {
        let k = Kernel::new(KernelConfig::default()).unwrap();
        assert_eq!(show_mappings(&k, EnvId::compose(1, 3), 0, PGSIZE), Err(SysError::BadEnv));
    }
}
