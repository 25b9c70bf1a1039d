/// Event counters kept by an [`Mmu`](crate::Mmu).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stats {
    pub tlb_hits: u64,
    pub tlb_misses: u64,
    pub page_faults: u64,
    pub cow_copies: u64,
    pub cow_unlocks: u64,
    pub forks: u64,
    pub switches: u64,
}
