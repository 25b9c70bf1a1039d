use proptest::prelude::*;

use mmu::{AccessRights, Mmu, MmuConfig, MmuError, Pfn, Pid, Vpn};

const NR_FRAMES: usize = 12;

#[derive(Clone, Debug)]
enum Op {
    Alloc { vpn: u32, rights: AccessRights },
    Free { vpn: u32 },
    Read { vpn: u32 },
    Write { vpn: u32 },
    Switch { pid: u32 },
}

fn rights() -> impl Strategy<Value = AccessRights> {
    prop_oneof![
        Just(AccessRights::read_only()),
        Just(AccessRights::read_write()),
        Just(AccessRights::WRITE),
        Just(AccessRights::empty()),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u32..16, rights()).prop_map(|(vpn, rights)| Op::Alloc { vpn, rights }),
        2 => (0u32..16).prop_map(|vpn| Op::Free { vpn }),
        2 => (0u32..16).prop_map(|vpn| Op::Read { vpn }),
        3 => (0u32..16).prop_map(|vpn| Op::Write { vpn }),
        1 => (0u32..4).prop_map(|pid| Op::Switch { pid }),
    ]
}

fn new_mmu() -> Mmu {
    Mmu::new(MmuConfig {
        nr_frames: NR_FRAMES,
        pte_index_bits: 2,
        tlb_entries: 16,
    })
    .expect("valid config")
}

fn is_mapped(mmu: &Mmu, vpn: Vpn) -> bool {
    mmu.page_table().entry(vpn).is_some_and(|pte| pte.valid)
}

fn lowest_free(mmu: &Mmu) -> Option<Pfn> {
    mmu.frames()
        .mapcounts()
        .iter()
        .position(|&count| count == 0)
        .map(|index| Pfn(index as u32))
}

/// Apply `op`, skipping calls that would break a caller contract.
fn apply(mmu: &mut Mmu, op: &Op) -> Result<(), TestCaseError> {
    match *op {
        Op::Alloc { vpn, rights } => {
            if is_mapped(mmu, Vpn(vpn)) {
                return Ok(());
            }
            let expected = lowest_free(mmu).ok_or(MmuError::OutOfMemory);
            prop_assert_eq!(mmu.alloc_page(Vpn(vpn), rights), expected);
        }
        Op::Free { vpn } => {
            if !is_mapped(mmu, Vpn(vpn)) {
                return Ok(());
            }
            let pfn = mmu.page_table().entry(Vpn(vpn)).map(|pte| pte.pfn).unwrap_or_default();
            let before = mmu.frames().mapcount(pfn);
            mmu.free_page(Vpn(vpn));
            prop_assert_eq!(mmu.frames().mapcount(pfn), before - 1);
        }
        Op::Read { vpn } => {
            let _ = mmu.access(Vpn(vpn), AccessRights::READ);
        }
        Op::Write { vpn } => {
            let _ = mmu.access(Vpn(vpn), AccessRights::WRITE);
        }
        Op::Switch { pid } => {
            mmu.switch_process(Pid(pid));
            prop_assert!(mmu.tlb().is_empty());
        }
    }
    Ok(())
}

fn check_invariants(mmu: &Mmu) -> Result<(), TestCaseError> {
    let mut expected = vec![0u32; NR_FRAMES];
    for process in mmu.processes() {
        for (_, pte) in process.page_table().valid_entries() {
            expected[pte.pfn.as_usize()] += 1;
            if pte.saved_rights.is_some() {
                prop_assert_eq!(
                    pte.rw,
                    AccessRights::read_only(),
                    "COW entry not read-only: {:?}",
                    pte
                );
            }
        }
    }
    prop_assert_eq!(mmu.frames().mapcounts(), &expected[..]);

    for entry in mmu.tlb().entries() {
        if is_mapped(mmu, entry.vpn) {
            prop_assert_eq!(mmu.translate(entry.vpn, entry.rw), Ok(entry.pfn));
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn frames_are_conserved_and_allocation_is_deterministic(
        ops in prop::collection::vec(op(), 1..80)
    ) {
        let mut mmu = new_mmu();
        for op in &ops {
            apply(&mut mmu, op)?;
            check_invariants(&mmu)?;
        }
    }

    #[test]
    fn write_fault_leaves_sibling_untouched(
        vpns in prop::collection::btree_set(0u32..16, 1..6),
        target in 0usize..6,
    ) {
        let mut mmu = new_mmu();
        let vpns: Vec<u32> = vpns.into_iter().collect();
        for &vpn in &vpns {
            mmu.alloc_page(Vpn(vpn), AccessRights::read_write()).expect("alloc");
        }
        mmu.switch_process(Pid(1));
        let vpn = Vpn(vpns[target % vpns.len()]);
        let parent_before = *mmu.process(Pid(0)).and_then(|p| p.page_table().entry(vpn)).expect("parent entry");

        let pfn = mmu.access(vpn, AccessRights::WRITE).expect("cow write");
        prop_assert_ne!(pfn, parent_before.pfn);
        prop_assert_eq!(mmu.translate(vpn, AccessRights::WRITE), Ok(pfn));

        let parent_after = *mmu.process(Pid(0)).and_then(|p| p.page_table().entry(vpn)).expect("parent entry");
        prop_assert_eq!(parent_after, parent_before);
        prop_assert_eq!(mmu.frames().mapcount(parent_before.pfn), 1);
    }
}
