use log::trace;
use types::{AccessRights, Pfn, Vpn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TlbEntry {
    pub valid: bool,
    pub vpn: Vpn,
    pub rw: AccessRights,
    pub pfn: Pfn,
}

/// Fully-associative translation cache for the active page table.
///
/// Entries carry no process identity, so the whole cache is flushed on every
/// context switch. The capacity is sized to hold every page of one address
/// space; running out of slots is an invariant violation, there is no eviction.
#[derive(Clone, Debug)]
pub struct Tlb {
    entries: Vec<TlbEntry>,
}

impl Tlb {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![TlbEntry::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find(&self, vpn: Vpn) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.valid && entry.vpn == vpn)
    }

    /// Cached frame for `vpn` if the cached rights cover `requested`.
    ///
    /// Insufficient rights are a miss, not a fault: the page table may still
    /// grant the access through COW resolution.
    pub fn lookup(&self, vpn: Vpn, requested: AccessRights) -> Option<Pfn> {
        let entry = &self.entries[self.find(vpn)?];
        if entry.rw.contains(requested) {
            trace!("tlb hit {} -> {}", vpn, entry.pfn);
            Some(entry.pfn)
        } else {
            trace!("tlb rights miss {} ({} < {})", vpn, entry.rw, requested);
            None
        }
    }

    /// Cached entry for `vpn`, regardless of rights.
    pub fn entry(&self, vpn: Vpn) -> Option<&TlbEntry> {
        self.find(vpn).map(|index| &self.entries[index])
    }

    /// Update the entry for `vpn` in place, or fill the first unused slot.
    ///
    /// Panics when every slot is taken by another page.
    pub fn insert_or_update(&mut self, vpn: Vpn, rw: AccessRights, pfn: Pfn) {
        let index = self
            .find(vpn)
            .or_else(|| self.entries.iter().position(|entry| !entry.valid))
            .unwrap_or_else(|| {
                panic!(
                    "tlb overflow inserting {}: all {} entries in use",
                    vpn,
                    self.entries.len()
                )
            });
        self.entries[index] = TlbEntry {
            valid: true,
            vpn,
            rw,
            pfn,
        };
    }

    /// Rewrite the rights, and optionally the frame, of a cached `vpn`.
    /// Does nothing when `vpn` is not cached.
    pub(crate) fn refresh(&mut self, vpn: Vpn, rw: AccessRights, pfn: Option<Pfn>) {
        if let Some(index) = self.find(vpn) {
            let entry = &mut self.entries[index];
            entry.rw = rw;
            if let Some(pfn) = pfn {
                entry.pfn = pfn;
            }
        }
    }

    /// Drop the cached translation for `vpn`.
    ///
    /// The free path only calls this once the frame has no mapping left
    /// anywhere; a page still mapped by another process keeps its entry.
    pub(crate) fn invalidate(&mut self, vpn: Vpn) {
        for entry in self.entries.iter_mut().filter(|entry| entry.vpn == vpn) {
            entry.valid = false;
        }
    }

    pub fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
    }

    /// Valid entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &TlbEntry> {
        self.entries.iter().filter(|entry| entry.valid)
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}
