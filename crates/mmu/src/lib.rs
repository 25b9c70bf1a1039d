//! Software MMU: two-level page tables, a TLB, frame mapcounts and
//! copy-on-write fork.
//!
//! All state lives in an explicit [`Mmu`] context. A driving harness talks to
//! it through [`MemoryManagement`]:
//! - TLB lookup and refill around every simulated access,
//! - page allocation and release for the current process,
//! - page-fault resolution (genuine faults vs. COW write faults),
//! - process switch, which forks the current process for unknown pids.

mod config;
mod context;
mod error;
mod fault;
mod frame;
mod page_table;
mod process;
mod pte;
mod snapshot;
mod stats;
mod tlb;

pub use config::{ConfigError, MmuConfig};
pub use context::Mmu;
pub use error::{Fault, MmuError, Result};
pub use fault::FaultResolution;
pub use frame::FrameTable;
pub use page_table::{Directory, PageTable};
pub use process::{Process, SwitchOutcome};
pub use pte::Pte;
pub use snapshot::{PageSnapshot, ProcessSnapshot, Snapshot};
pub use stats::Stats;
pub use tlb::{Tlb, TlbEntry};
pub use types::{AccessRights, MAX_PTE_INDEX_BITS, PageLayout, Pfn, Pid, Vpn};

/// Operations a simulation harness drives on the MMU.
pub trait MemoryManagement {
    /// Cached translation of `vpn` if its cached rights cover `rw`.
    fn lookup_tlb(&self, vpn: Vpn, rw: AccessRights) -> Option<Pfn>;
    /// Cache `vpn -> pfn` with `rw`, updating an existing entry in place.
    fn insert_tlb(&mut self, vpn: Vpn, rw: AccessRights, pfn: Pfn);
    /// Map `vpn` of the current process to the lowest free frame.
    fn alloc_page(&mut self, vpn: Vpn, rw: AccessRights) -> Result<Pfn>;
    /// Unmap `vpn` of the current process. `vpn` must be mapped.
    fn free_page(&mut self, vpn: Vpn);
    /// Resolve a failed translation of `vpn` for `rw`.
    fn handle_page_fault(&mut self, vpn: Vpn, rw: AccessRights) -> Result<FaultResolution>;
    /// Switch to `pid`, forking it from the current process if it is new.
    fn switch_process(&mut self, pid: Pid) -> SwitchOutcome;
}

impl MemoryManagement for Mmu {
    fn lookup_tlb(&self, vpn: Vpn, rw: AccessRights) -> Option<Pfn> {
        Mmu::lookup_tlb(self, vpn, rw)
    }

    fn insert_tlb(&mut self, vpn: Vpn, rw: AccessRights, pfn: Pfn) {
        Mmu::insert_tlb(self, vpn, rw, pfn)
    }

    fn alloc_page(&mut self, vpn: Vpn, rw: AccessRights) -> Result<Pfn> {
        Mmu::alloc_page(self, vpn, rw)
    }

    fn free_page(&mut self, vpn: Vpn) {
        Mmu::free_page(self, vpn)
    }

    fn handle_page_fault(&mut self, vpn: Vpn, rw: AccessRights) -> Result<FaultResolution> {
        Mmu::handle_page_fault(self, vpn, rw)
    }

    fn switch_process(&mut self, pid: Pid) -> SwitchOutcome {
        Mmu::switch_process(self, pid)
    }
}
