// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment (process) identities and lifecycle states.

use core::fmt;

/// log2 of the maximum number of environments.
pub const LOG2NENV: u32 = 10;
/// Maximum number of environments the identity encoding can address.
pub const NENV: usize = 1 << LOG2NENV;
/// Generation counter lives above this bit.
pub const ENVGENSHIFT: u32 = 12;

/// Opaque environment identity: `generation << ENVGENSHIFT | slot`.
///
/// `EnvId::SELF` (raw zero) never names a real environment; primitives resolve
/// it to the caller.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct EnvId(u32);

impl EnvId {
    /// Names the calling environment.
    pub const SELF: Self = Self(0);

    /// Wraps a raw identity value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Composes an identity from a generation value and a table slot.
    #[inline]
    pub const fn compose(generation: u32, slot: usize) -> Self {
        Self((generation << ENVGENSHIFT) | slot as u32)
    }

    /// Raw identity value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Slot index in the environment table.
    #[inline]
    pub const fn index(self) -> usize {
        (self.0 as usize) & (NENV - 1)
    }

    /// Generation component.
    #[inline]
    pub const fn generation(self) -> u32 {
        self.0 >> ENVGENSHIFT
    }

    /// Whether this is the caller placeholder.
    #[inline]
    pub const fn is_self(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EnvId({:08x})", self.0)
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Scheduling state of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    /// Slot is unused.
    Free,
    /// Being torn down.
    Dying,
    /// Eligible to run.
    Runnable,
    /// Currently executing.
    Running,
    /// Exists but must not be scheduled yet.
    NotRunnable,
}

/// Result of a process-creation call, as seen by one of the two executions it
/// produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkView {
    /// Observed by the creator; carries the new environment's identity.
    Parent(EnvId),
    /// Observed by the new environment itself.
    Child,
}

impl ForkView {
    /// The child identity when observed from the parent.
    pub fn child(self) -> Option<EnvId> {
        match self {
            Self::Parent(child) => Some(child),
            Self::Child => None,
        }
    }

    /// Whether this is the child's view.
    pub fn is_child(self) -> bool {
        matches!(self, Self::Child)
    }

    /// The raw register value of the return: child id for the parent, 0 for the child.
    pub fn as_raw(self) -> u32 {
        match self {
            Self::Parent(child) => child.raw(),
            Self::Child => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_and_split() {
        let id = EnvId::compose(3, 17);
        assert_eq!(id.index(), 17);
        assert_eq!(id.generation(), 3);
        assert_eq!(id.raw(), (3 << ENVGENSHIFT) | 17);
        assert!(!id.is_self());
        assert!(EnvId::SELF.is_self());
    }

    #[test]
    fn fork_view_raw_values() {
        let child = EnvId::compose(1, 2);
        assert_eq!(ForkView::Parent(child).as_raw(), child.raw());
        assert_eq!(ForkView::Child.as_raw(), 0);
        assert_eq!(ForkView::Parent(child).child(), Some(child));
        assert!(ForkView::Child.is_child());
    }
}
