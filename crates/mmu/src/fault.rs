use log::debug;
use types::{AccessRights, Pfn, Vpn};

use crate::error::{Fault, Result};
use crate::frame::FrameTable;
use crate::page_table::PageTable;
use crate::stats::Stats;
use crate::tlb::Tlb;

/// How a page fault was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultResolution {
    /// The entry already grants the access; nothing changed.
    AlreadyGranted,
    /// The page was the last mapping of its frame and was unlocked in place.
    Unlocked,
    /// The page was shared and now maps a private copy.
    Copied { from: Pfn, to: Pfn },
}

/// Resolve a translation fault on `vpn` for `requested` in `pt`.
///
/// Unmapped pages are reported as [`Fault::NotMapped`]. A mapped page whose
/// COW backup covers the access gets its rights back; if its frame is still
/// shared it is first moved to a freshly allocated frame. Anything else is a
/// [`Fault::Protection`].
///
/// When the copy cannot get a frame, `OutOfMemory` is returned and nothing is
/// modified.
pub(crate) fn resolve(
    pt: &mut PageTable,
    frames: &mut FrameTable,
    tlb: &mut Tlb,
    stats: &mut Stats,
    vpn: Vpn,
    requested: AccessRights,
) -> Result<FaultResolution> {
    let pte = pt
        .entry_mut(vpn)
        .filter(|pte| pte.valid)
        .ok_or(Fault::NotMapped)?;

    if pte.rw.contains(requested) {
        return Ok(FaultResolution::AlreadyGranted);
    }
    if !pte.saved_rights.is_some_and(|saved| saved.contains(requested)) {
        return Err(Fault::Protection.into());
    }

    let old = pte.pfn;
    let copy = if frames.mapcount(old) > 1 {
        Some(frames.allocate_frame()?)
    } else {
        None
    };
    let restored = pte.unshare(requested).ok_or(Fault::Protection)?;

    let resolution = match copy {
        Some(new) => {
            frames.release(old);
            pte.pfn = new;
            stats.cow_copies += 1;
            debug!("copy on write {}: {} -> {} ({})", vpn, old, new, restored);
            FaultResolution::Copied { from: old, to: new }
        }
        None => {
            stats.cow_unlocks += 1;
            debug!("unlocked {} in place on {} ({})", vpn, old, restored);
            FaultResolution::Unlocked
        }
    };
    tlb.refresh(vpn, restored, copy);
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MmuError;
    use types::PageLayout;

    struct Fixture {
        pt: PageTable,
        frames: FrameTable,
        tlb: Tlb,
        stats: Stats,
    }

    impl Fixture {
        fn new(nr_frames: usize) -> Self {
            Self {
                pt: PageTable::new(PageLayout::new(2)),
                frames: FrameTable::new(nr_frames),
                tlb: Tlb::new(16),
                stats: Stats::default(),
            }
        }

        fn resolve(&mut self, vpn: u32, requested: AccessRights) -> Result<FaultResolution> {
            resolve(
                &mut self.pt,
                &mut self.frames,
                &mut self.tlb,
                &mut self.stats,
                Vpn(vpn),
                requested,
            )
        }

        /// Map `vpn` writable and mark it COW-shared with `extra` other mappings.
        fn cow_page(&mut self, vpn: u32, extra: u32) -> Pfn {
            let pfn = self
                .pt
                .allocate_page(&mut self.frames, Vpn(vpn), AccessRights::read_write())
                .expect("allocate");
            for _ in 0..extra {
                self.frames.share(pfn);
            }
            self.pt
                .entry_mut(Vpn(vpn))
                .expect("entry")
                .share_for_cow();
            pfn
        }
    }

    #[test]
    fn unmapped_page_is_genuine_fault() {
        let mut fx = Fixture::new(4);
        assert_eq!(
            fx.resolve(3, AccessRights::READ),
            Err(MmuError::Fault(Fault::NotMapped))
        );
    }

    #[test]
    fn read_only_page_without_backup_is_protection_fault() {
        let mut fx = Fixture::new(4);
        fx.pt
            .allocate_page(&mut fx.frames, Vpn(0), AccessRights::read_only())
            .expect("allocate");
        assert_eq!(
            fx.resolve(0, AccessRights::WRITE),
            Err(MmuError::Fault(Fault::Protection))
        );
    }

    #[test]
    fn shared_cow_page_is_copied() {
        let mut fx = Fixture::new(4);
        let old = fx.cow_page(1, 1);
        fx.tlb
            .insert_or_update(Vpn(1), AccessRights::read_only(), old);

        let resolution = fx.resolve(1, AccessRights::WRITE).expect("cow");
        assert_eq!(resolution, FaultResolution::Copied { from: Pfn(0), to: Pfn(1) });
        assert_eq!(fx.frames.mapcount(old), 1);
        assert_eq!(fx.frames.mapcount(Pfn(1)), 1);

        let pte = fx.pt.entry(Vpn(1)).expect("entry");
        assert_eq!(pte.pfn, Pfn(1));
        assert_eq!(pte.rw, AccessRights::read_write());
        assert_eq!(pte.saved_rights, None);
        assert_eq!(fx.tlb.lookup(Vpn(1), AccessRights::WRITE), Some(Pfn(1)));
        assert_eq!(fx.stats.cow_copies, 1);
    }

    #[test]
    fn last_owner_is_unlocked_in_place() {
        let mut fx = Fixture::new(4);
        let pfn = fx.cow_page(2, 0);
        assert_eq!(fx.resolve(2, AccessRights::WRITE), Ok(FaultResolution::Unlocked));
        assert_eq!(fx.pt.translate(Vpn(2), AccessRights::WRITE), Ok(pfn));
        assert_eq!(fx.frames.free_frames(), 3);
        assert_eq!(fx.stats.cow_unlocks, 1);
    }

    #[test]
    fn copy_without_free_frame_leaves_state_untouched() {
        let mut fx = Fixture::new(1);
        fx.cow_page(0, 1);
        let before = *fx.pt.entry(Vpn(0)).expect("entry");

        assert_eq!(fx.resolve(0, AccessRights::WRITE), Err(MmuError::OutOfMemory));
        assert_eq!(*fx.pt.entry(Vpn(0)).expect("entry"), before);
        assert_eq!(fx.frames.mapcount(Pfn(0)), 2);
    }

    #[test]
    fn granted_access_is_spurious() {
        let mut fx = Fixture::new(2);
        fx.cow_page(0, 1);
        assert_eq!(
            fx.resolve(0, AccessRights::READ),
            Ok(FaultResolution::AlreadyGranted)
        );
        assert_eq!(fx.frames.mapcount(Pfn(0)), 2);
    }
}
