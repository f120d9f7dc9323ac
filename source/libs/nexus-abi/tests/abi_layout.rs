//! CONTEXT: ABI layout and encoding checks shared by the kernel model and user libraries
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 4 tests (2 property)
//!
//! TEST_SCOPE:
//!   - Page-table entry frame/flag packing
//!   - Virtual address decomposition into directory/table indices
//!   - EnvId generation/slot packing
//!
//! TEST_SCENARIOS:
//!   - pte_preserves_frame_and_flags(): any frame and flag subset survives packing
//!   - address_split_recombines(): pdx/ptx/pgoff rebuild the original address
//!   - envid_slot_and_generation(): slots never alias across generations
//!   - user_window_bounds(): user-visible windows sit below UTOP
//!
//! DEPENDENCIES:
//!   - nexus_abi::{Pte, PteFlags, EnvId}: encoded types
//!   - proptest: randomized inputs
//!
//! ADR: docs/adr/0016-kernel-libs-architecture.md
use nexus_abi::{
    env::NENV, pdx, pgoff, ptx, EnvId, Pte, PteFlags, PDXSHIFT, PFTEMP, PGSHIFT, PGSIZE, USTACKTOP,
    UTEXT, UTOP, UXSTACKTOP,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn pte_preserves_frame_and_flags(frame in 0u32..(1 << 20), bits in 0u32..0x1000) {
        let flags = PteFlags::from_bits_truncate(bits);
        let pte = Pte::new(frame, flags);
        prop_assert_eq!(pte.frame(), frame);
        prop_assert_eq!(pte.flags(), flags);
        prop_assert_eq!(pte.is_present(), flags.contains(PteFlags::PRESENT));
    }

    #[test]
    fn address_split_recombines(va in 0usize..=u32::MAX as usize) {
        let rebuilt = (pdx(va) << PDXSHIFT) | (ptx(va) << PGSHIFT) | pgoff(va);
        prop_assert_eq!(rebuilt, va);
    }
}

#[test]
fn envid_slot_and_generation() {
    let a = EnvId::compose(1, NENV - 1);
    let b = EnvId::compose(2, NENV - 1);
    assert_eq!(a.index(), b.index());
    assert_ne!(a, b);
    assert_eq!(b.generation(), 2);
    assert_eq!(format!("{a}"), "000013ff");
}

#[test]
fn user_window_bounds() {
    assert_eq!(UXSTACKTOP, UTOP);
    assert!(USTACKTOP + PGSIZE < UXSTACKTOP);
    assert!(PFTEMP + PGSIZE <= UTEXT);
}
