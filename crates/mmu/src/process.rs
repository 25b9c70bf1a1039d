use std::mem;

use log::debug;
use types::{PageLayout, Pid};

use crate::context::Mmu;
use crate::page_table::PageTable;

/// A simulated process: an identifier and the address space it owns.
#[derive(Clone, Debug)]
pub struct Process {
    pid: Pid,
    page_table: PageTable,
}

impl Process {
    pub fn new(pid: Pid, layout: PageLayout) -> Self {
        Self {
            pid,
            page_table: PageTable::new(layout),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub(crate) fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }
}

/// What [`Mmu::switch_process`] had to do to reach the requested pid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The pid was already current.
    Current,
    /// The pid was taken off the ready list.
    Resumed,
    /// No such process existed; it was forked from the previous one.
    Forked,
}

impl Mmu {
    /// Make `pid` the current process, forking it from the current one if it
    /// does not exist yet.
    ///
    /// The previous process goes to the tail of the ready list and the TLB is
    /// flushed unconditionally.
    pub fn switch_process(&mut self, pid: Pid) -> SwitchOutcome {
        if pid == self.current.pid {
            self.tlb.invalidate_all();
            self.stats.switches += 1;
            return SwitchOutcome::Current;
        }

        let waiting = self.ready.iter().position(|process| process.pid == pid);
        let (next, outcome) = match waiting.and_then(|index| self.ready.remove(index)) {
            Some(process) => (process, SwitchOutcome::Resumed),
            None => (self.fork(pid), SwitchOutcome::Forked),
        };

        let prev = mem::replace(&mut self.current, next);
        debug!("switch {} -> {}", prev.pid, pid);
        self.ready.push_back(prev);
        self.tlb.invalidate_all();
        self.stats.switches += 1;
        outcome
    }

    /// Build a child of the current process that shares every frame COW.
    ///
    /// Writable entries of the parent are write-protected with their rights
    /// saved before the copy, so parent and child hold identical read-only
    /// entries. Each valid child entry adds one reference to its frame.
    fn fork(&mut self, pid: Pid) -> Process {
        for pte in self.current.page_table.valid_entries_mut() {
            pte.share_for_cow();
        }

        let child = Process {
            pid,
            page_table: self.current.page_table.clone(),
        };
        for (_, pte) in child.page_table.valid_entries() {
            self.frames.share(pte.pfn);
        }

        self.stats.forks += 1;
        debug!(
            "forked {} from {} sharing {} pages",
            pid,
            self.current.pid,
            child.page_table.nr_valid()
        );
        child
    }
}
