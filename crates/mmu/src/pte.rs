use types::{AccessRights, Pfn};

/// Page table entry of the simulated MMU.
///
/// - `valid` gates the whole entry; the other fields are stale when it is clear.
/// - `rw` holds the rights currently granted to accesses.
/// - `pfn` is the frame the page maps to.
/// - `saved_rights` remembers the real rights while the entry is write-protected
///   for COW sharing. `None` means no COW restoration is pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pte {
    pub valid: bool,
    pub rw: AccessRights,
    pub pfn: Pfn,
    pub saved_rights: Option<AccessRights>,
}

impl Pte {
    pub fn new(pfn: Pfn, rw: AccessRights) -> Self {
        Self {
            valid: true,
            rw,
            pfn,
            saved_rights: None,
        }
    }

    pub fn grants(&self, requested: AccessRights) -> bool {
        self.valid && self.rw.contains(requested)
    }

    pub fn is_cow(&self) -> bool {
        self.valid && self.saved_rights.is_some()
    }

    /// Downgrade a writable entry to read-only, keeping its rights for a later
    /// COW fault. Entries that are not writable are left untouched.
    pub(crate) fn share_for_cow(&mut self) {
        if self.valid && self.rw.is_writable() {
            self.saved_rights = Some(self.rw);
            self.rw = AccessRights::read_only();
        }
        debug_assert!(self.saved_rights.is_none() || !self.rw.is_writable());
    }

    /// Restore the rights saved by [`Pte::share_for_cow`] if they cover
    /// `requested`. Returns the restored rights.
    pub(crate) fn unshare(&mut self, requested: AccessRights) -> Option<AccessRights> {
        let saved = self.saved_rights.filter(|saved| saved.contains(requested))?;
        self.rw = saved;
        self.saved_rights = None;
        Some(saved)
    }

    pub(crate) fn clear(&mut self) {
        *self = Pte::default();
    }
}
