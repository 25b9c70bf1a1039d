use log::debug;
use types::{AccessRights, PageLayout, Pfn, Vpn};

use crate::error::{Fault, Result};
use crate::frame::FrameTable;
use crate::pte::Pte;
use crate::tlb::Tlb;

/// Second-level table: one PTE per low-order VPN index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directory {
    ptes: Vec<Pte>,
}

impl Directory {
    fn new(fan_out: usize) -> Self {
        Self {
            ptes: vec![Pte::default(); fan_out],
        }
    }

    pub fn ptes(&self) -> &[Pte] {
        &self.ptes
    }

    pub fn is_empty(&self) -> bool {
        !self.ptes.iter().any(|pte| pte.valid)
    }
}

/// Two-level page table owned by exactly one process.
///
/// Design at a glance:
/// - `outer` is indexed by the high VPN bits and holds an index into the
///   `directories` arena, or `None` while no page in that range exists.
/// - Directories are created on the first allocation in their range and
///   released as soon as their last valid entry is cleared. Released arena
///   slots are recycled through `free_slots`.
/// - Cloning a page table deep-copies every directory by value. Frames are the
///   only thing two page tables ever share.
#[derive(Clone, Debug)]
pub struct PageTable {
    layout: PageLayout,
    outer: Vec<Option<usize>>,
    directories: Vec<Option<Directory>>,
    free_slots: Vec<usize>,
}

impl PageTable {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            outer: vec![None; layout.fan_out()],
            directories: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    fn directory(&self, dir_index: usize) -> Option<&Directory> {
        let slot = (*self.outer.get(dir_index)?)?;
        self.directories.get(slot)?.as_ref()
    }

    /// Directory covering outer index `dir_index`, if it is materialized.
    pub fn directory_at(&self, dir_index: usize) -> Option<&Directory> {
        self.directory(dir_index)
    }

    /// Number of materialized directories.
    pub fn nr_directories(&self) -> usize {
        self.outer.iter().filter(|slot| slot.is_some()).count()
    }

    /// Entry for `vpn`, or `None` when its directory is absent or `vpn` lies
    /// outside the address space. The entry itself may still be invalid.
    pub fn entry(&self, vpn: Vpn) -> Option<&Pte> {
        if !self.layout.contains(vpn) {
            return None;
        }
        let (dir, idx) = self.layout.split(vpn);
        self.directory(dir).map(|d| &d.ptes[idx])
    }

    pub(crate) fn entry_mut(&mut self, vpn: Vpn) -> Option<&mut Pte> {
        if !self.layout.contains(vpn) {
            return None;
        }
        let (dir, idx) = self.layout.split(vpn);
        let slot = self.outer[dir]?;
        self.directories[slot].as_mut().map(|d| &mut d.ptes[idx])
    }

    /// Walk the table for `vpn` and check `requested` against the granted rights.
    ///
    /// A missing directory or invalid entry is [`Fault::NotMapped`]. A valid
    /// entry whose rights do not cover the access is [`Fault::Protection`]; the
    /// fault handler decides whether a COW backup resolves it.
    pub fn translate(&self, vpn: Vpn, requested: AccessRights) -> Result<Pfn> {
        let pte = self
            .entry(vpn)
            .filter(|pte| pte.valid)
            .ok_or(Fault::NotMapped)?;
        if !pte.rw.contains(requested) {
            return Err(Fault::Protection.into());
        }
        Ok(pte.pfn)
    }

    /// Map `vpn` to the lowest free frame with `rights`.
    ///
    /// Panics if `vpn` is outside the address space.
    pub fn allocate_page(
        &mut self,
        frames: &mut FrameTable,
        vpn: Vpn,
        rights: AccessRights,
    ) -> Result<Pfn> {
        assert!(
            self.layout.contains(vpn),
            "allocate_page: {} outside address space",
            vpn
        );
        let pfn = frames.allocate_frame()?;
        self.install(vpn, Pte::new(pfn, rights));
        debug!("mapped {} -> {} ({})", vpn, pfn, rights);
        Ok(pfn)
    }

    /// Store `pte` at `vpn`, materializing its directory if needed.
    fn install(&mut self, vpn: Vpn, pte: Pte) {
        let (dir, idx) = self.layout.split(vpn);
        let slot = match self.outer[dir] {
            Some(slot) => slot,
            None => {
                let slot = self.allocate_directory();
                self.outer[dir] = Some(slot);
                slot
            }
        };
        if let Some(directory) = self.directories[slot].as_mut() {
            directory.ptes[idx] = pte;
        }
    }

    fn allocate_directory(&mut self) -> usize {
        let directory = Directory::new(self.layout.fan_out());
        match self.free_slots.pop() {
            Some(slot) => {
                self.directories[slot] = Some(directory);
                slot
            }
            None => {
                self.directories.push(Some(directory));
                self.directories.len() - 1
            }
        }
    }

    /// Unmap `vpn` and drop its frame reference.
    ///
    /// The TLB entry for `vpn` is only invalidated once no page table maps the
    /// frame anymore. Panics if `vpn` is not mapped.
    pub fn free_page(&mut self, frames: &mut FrameTable, tlb: &mut Tlb, vpn: Vpn) {
        let pte = self
            .entry_mut(vpn)
            .filter(|pte| pte.valid)
            .unwrap_or_else(|| panic!("free_page: {} is not mapped", vpn));
        let pfn = pte.pfn;
        pte.clear();

        let remaining = frames.release(pfn);
        self.release_directory_if_empty(vpn);
        if remaining == 0 {
            tlb.invalidate(vpn);
        }
        debug!("unmapped {} (was {}, mapcount {})", vpn, pfn, remaining);
    }

    fn release_directory_if_empty(&mut self, vpn: Vpn) {
        let (dir, _) = self.layout.split(vpn);
        let Some(slot) = self.outer[dir] else {
            return;
        };
        let empty = self.directories[slot]
            .as_ref()
            .is_none_or(Directory::is_empty);
        if empty {
            self.directories[slot] = None;
            self.outer[dir] = None;
            self.free_slots.push(slot);
        }
    }

    /// Every valid entry, in VPN order.
    pub fn valid_entries(&self) -> impl Iterator<Item = (Vpn, &Pte)> + '_ {
        self.outer
            .iter()
            .enumerate()
            .filter_map(|(dir, slot)| {
                let directory = self.directories.get((*slot)?)?.as_ref()?;
                Some((dir, directory))
            })
            .flat_map(move |(dir, directory)| {
                directory
                    .ptes
                    .iter()
                    .enumerate()
                    .filter(|(_, pte)| pte.valid)
                    .map(move |(idx, pte)| (self.layout.join(dir, idx), pte))
            })
    }

    pub(crate) fn valid_entries_mut(&mut self) -> impl Iterator<Item = &mut Pte> + '_ {
        self.directories
            .iter_mut()
            .flatten()
            .flat_map(|directory| directory.ptes.iter_mut())
            .filter(|pte| pte.valid)
    }

    pub fn nr_valid(&self) -> usize {
        self.valid_entries().count()
    }
}
