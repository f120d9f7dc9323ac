//! CONTEXT: Property tests for the per-page duplication policy
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 3 property tests
//!
//! TEST_SCOPE:
//!   - Policy selection from arbitrary entry flags
//!   - Permissions produced for parent and child mappings
//!
//! TEST_SCENARIOS:
//!   - policy_never_yields_writable_cow(): resulting permissions satisfy W xor COW
//!   - share_bit_always_shares(): explicit sharing overrides write/COW bits
//!   - sfork_shares_outside_stack(): sfork only copies pages in the stack window
//!
//! DEPENDENCIES:
//!   - nexus_fork::{DupPolicy, PageInfo}
//!   - proptest: randomized entries
//!
//! ADR: docs/adr/0016-kernel-libs-architecture.md
use nexus_abi::{page_va, Pte, PteFlags, PGSIZE, PTSIZE, USTACKTOP, UTOP};
use nexus_fork::{DupPolicy, PageInfo};
use proptest::prelude::*;

fn user_page(bits: u32) -> PageInfo {
    let mut flags = PteFlags::from_bits_truncate(bits) | PteFlags::PRESENT | PteFlags::USER;
    if flags.contains(PteFlags::WRITE | PteFlags::COW) {
        flags.remove(PteFlags::COW);
    }
    PageInfo::from_pte(Pte::new(7, flags))
}

proptest! {
    #[test]
    fn policy_never_yields_writable_cow(bits in 0u32..0x1000) {
        let page = user_page(bits);
        let child_perm = match DupPolicy::for_page(page) {
            DupPolicy::Share => page.flags() & PteFlags::SYSCALL,
            DupPolicy::Cow => DupPolicy::COW_PERM,
            DupPolicy::ReadOnly => DupPolicy::RO_PERM,
            DupPolicy::ShareCopy => DupPolicy::RW_PERM,
        };
        prop_assert!(!child_perm.contains(PteFlags::WRITE | PteFlags::COW));
        prop_assert!(child_perm.contains(PteFlags::PRESENT | PteFlags::USER));
    }

    #[test]
    fn share_bit_always_shares(bits in 0u32..0x1000) {
        let page = user_page(bits | PteFlags::SHARE.bits());
        prop_assert_eq!(DupPolicy::for_page(page), DupPolicy::Share);
    }

    #[test]
    fn sfork_shares_outside_stack(pn in 0usize..(UTOP / PGSIZE - 1)) {
        let page = user_page(PteFlags::WRITE.bits());
        let va = page_va(pn);
        let expected = if (USTACKTOP - PTSIZE..USTACKTOP).contains(&va) {
            DupPolicy::Cow
        } else {
            DupPolicy::Share
        };
        prop_assert_eq!(DupPolicy::for_shared_page(pn, page), expected);
    }
}
