use std::collections::VecDeque;

use log::trace;
use types::{AccessRights, Pfn, Pid, Vpn};

use crate::config::{ConfigError, MmuConfig};
use crate::error::{MmuError, Result};
use crate::fault::{self, FaultResolution};
use crate::frame::FrameTable;
use crate::page_table::PageTable;
use crate::process::Process;
use crate::stats::Stats;
use crate::tlb::Tlb;

/// Software MMU for a single simulated core.
///
/// Design at a glance:
/// - `frames` is the mapcount table shared by every address space.
/// - `current` owns the active page table; waiting processes sit in `ready`
///   in FIFO order. There is no separate page-table base pointer: the active
///   table is always `current`'s.
/// - `tlb` caches translations of `current` only and is flushed on every switch.
/// - Every operation takes `&mut self` and runs to completion, so the four
///   structures only change under the operation in progress.
#[derive(Debug)]
pub struct Mmu {
    config: MmuConfig,
    pub(crate) frames: FrameTable,
    pub(crate) tlb: Tlb,
    pub(crate) current: Process,
    pub(crate) ready: VecDeque<Process>,
    pub(crate) stats: Stats,
}

impl Mmu {
    /// Initial process id of a fresh MMU.
    pub const INIT_PID: Pid = Pid(0);

    pub fn new(config: MmuConfig) -> core::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: MmuConfig) -> Self {
        Self {
            config,
            frames: FrameTable::new(config.nr_frames),
            tlb: Tlb::new(config.tlb_entries),
            current: Process::new(Self::INIT_PID, config.layout()),
            ready: VecDeque::new(),
            stats: Stats::default(),
        }
    }

    pub fn config(&self) -> &MmuConfig {
        &self.config
    }

    pub fn current_pid(&self) -> Pid {
        self.current.pid()
    }

    pub fn current(&self) -> &Process {
        &self.current
    }

    /// Active page table.
    pub fn page_table(&self) -> &PageTable {
        self.current.page_table()
    }

    /// Processes waiting in the ready list, head first.
    pub fn ready(&self) -> impl Iterator<Item = &Process> {
        self.ready.iter()
    }

    pub fn ready_pids(&self) -> Vec<Pid> {
        self.ready.iter().map(Process::pid).collect()
    }

    /// Every process, current first.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        std::iter::once(&self.current).chain(self.ready.iter())
    }

    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes().find(|process| process.pid() == pid)
    }

    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn lookup_tlb(&self, vpn: Vpn, requested: AccessRights) -> Option<Pfn> {
        self.tlb.lookup(vpn, requested)
    }

    pub fn insert_tlb(&mut self, vpn: Vpn, rw: AccessRights, pfn: Pfn) {
        self.tlb.insert_or_update(vpn, rw, pfn);
    }

    /// Walk the active page table without consulting the TLB.
    pub fn translate(&self, vpn: Vpn, requested: AccessRights) -> Result<Pfn> {
        self.current.page_table().translate(vpn, requested)
    }

    /// Map `vpn` in the current process to the lowest free frame.
    ///
    /// A translation of `vpn` left cached by freeing a still-shared frame is
    /// dropped so it cannot shadow the new mapping.
    pub fn alloc_page(&mut self, vpn: Vpn, rw: AccessRights) -> Result<Pfn> {
        let pfn = self
            .current
            .page_table_mut()
            .allocate_page(&mut self.frames, vpn, rw)?;
        self.tlb.invalidate(vpn);
        Ok(pfn)
    }

    /// Unmap `vpn` from the current process. Panics if it is not mapped.
    pub fn free_page(&mut self, vpn: Vpn) {
        self.current
            .page_table_mut()
            .free_page(&mut self.frames, &mut self.tlb, vpn);
    }

    pub fn handle_page_fault(&mut self, vpn: Vpn, requested: AccessRights) -> Result<FaultResolution> {
        self.stats.page_faults += 1;
        fault::resolve(
            self.current.page_table_mut(),
            &mut self.frames,
            &mut self.tlb,
            &mut self.stats,
            vpn,
            requested,
        )
    }

    /// Perform one simulated access the way the hardware walker would.
    ///
    /// The TLB is consulted first. On a miss the page table is walked; a failed
    /// walk goes to the fault handler and, once resolved, is walked again. The
    /// resulting translation is cached with the rights the entry grants.
    pub fn access(&mut self, vpn: Vpn, requested: AccessRights) -> Result<Pfn> {
        if let Some(pfn) = self.tlb.lookup(vpn, requested) {
            self.stats.tlb_hits += 1;
            return Ok(pfn);
        }
        self.stats.tlb_misses += 1;
        trace!("tlb miss {} ({})", vpn, requested);

        let pfn = match self.translate(vpn, requested) {
            Ok(pfn) => pfn,
            Err(MmuError::Fault(_)) => {
                self.handle_page_fault(vpn, requested)?;
                self.translate(vpn, requested)?
            }
            Err(err) => return Err(err),
        };
        let granted = self
            .page_table()
            .entry(vpn)
            .map_or(requested, |pte| pte.rw);
        self.tlb.insert_or_update(vpn, granted, pfn);
        Ok(pfn)
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::with_valid_config(MmuConfig::default())
    }
}
