use types::{AccessRights, Pfn, Pid, Vpn};

use crate::context::Mmu;
use crate::process::Process;
use crate::stats::Stats;
use crate::tlb::TlbEntry;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageSnapshot {
    pub vpn: Vpn,
    pub pfn: Pfn,
    pub rw: AccessRights,
    pub saved_rights: Option<AccessRights>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub pages: Vec<PageSnapshot>,
}

impl From<&Process> for ProcessSnapshot {
    fn from(process: &Process) -> Self {
        let pages = process
            .page_table()
            .valid_entries()
            .map(|(vpn, pte)| PageSnapshot {
                vpn,
                pfn: pte.pfn,
                rw: pte.rw,
                saved_rights: pte.saved_rights,
            })
            .collect();
        Self {
            pid: process.pid(),
            pages,
        }
    }
}

/// Point-in-time copy of the whole MMU state.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub current: ProcessSnapshot,
    pub ready: Vec<ProcessSnapshot>,
    pub tlb: Vec<TlbEntry>,
    pub mapcounts: Vec<u32>,
    pub stats: Stats,
}

impl Mmu {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            current: self.current().into(),
            ready: self.ready().map(ProcessSnapshot::from).collect(),
            tlb: self.tlb().entries().copied().collect(),
            mapcounts: self.frames().mapcounts().to_vec(),
            stats: *self.stats(),
        }
    }
}
