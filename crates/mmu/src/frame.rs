use log::debug;
use types::Pfn;

use crate::error::{MmuError, Result};

/// Physical frame pool with a mapcount per frame.
///
/// The mapcount of a frame is the number of valid PTEs, across every page
/// table, that point at it. A frame is free exactly when its count is zero.
#[derive(Clone, Debug)]
pub struct FrameTable {
    mapcounts: Vec<u32>,
}

impl FrameTable {
    pub fn new(nr_frames: usize) -> Self {
        Self {
            mapcounts: vec![0; nr_frames],
        }
    }

    pub fn nr_frames(&self) -> usize {
        self.mapcounts.len()
    }

    /// Number of valid PTEs mapping `pfn`. Frames outside the pool read as 0.
    pub fn mapcount(&self, pfn: Pfn) -> u32 {
        self.mapcounts.get(pfn.as_usize()).copied().unwrap_or(0)
    }

    pub fn mapcounts(&self) -> &[u32] {
        &self.mapcounts
    }

    pub fn free_frames(&self) -> usize {
        self.mapcounts.iter().filter(|&&count| count == 0).count()
    }

    /// Claim the lowest-numbered free frame and set its count to 1.
    pub fn allocate_frame(&mut self) -> Result<Pfn> {
        let index = self
            .mapcounts
            .iter()
            .position(|&count| count == 0)
            .ok_or(MmuError::OutOfMemory)?;
        self.mapcounts[index] = 1;
        let pfn = Pfn(index as u32);
        debug!("allocated {}", pfn);
        Ok(pfn)
    }

    /// Record one more PTE mapping `pfn`.
    pub(crate) fn share(&mut self, pfn: Pfn) {
        let count = &mut self.mapcounts[pfn.as_usize()];
        debug_assert!(*count > 0, "sharing free frame {}", pfn);
        *count += 1;
    }

    /// Drop one PTE reference to `pfn` and return the remaining count.
    pub(crate) fn release(&mut self, pfn: Pfn) -> u32 {
        let count = &mut self.mapcounts[pfn.as_usize()];
        assert!(*count > 0, "releasing unreferenced frame {}", pfn);
        *count -= 1;
        if *count == 0 {
            debug!("freed {}", pfn);
        }
        *count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_free_frame() {
        let mut frames = FrameTable::new(4);
        assert_eq!(frames.allocate_frame(), Ok(Pfn(0)));
        assert_eq!(frames.allocate_frame(), Ok(Pfn(1)));
        assert_eq!(frames.allocate_frame(), Ok(Pfn(2)));

        assert_eq!(frames.release(Pfn(1)), 0);
        assert_eq!(frames.allocate_frame(), Ok(Pfn(1)));
        assert_eq!(frames.allocate_frame(), Ok(Pfn(3)));
        assert_eq!(frames.free_frames(), 0);
    }

    #[test]
    fn exhausted_pool_reports_out_of_memory() {
        let mut frames = FrameTable::new(1);
        frames.allocate_frame().expect("first frame");
        assert_eq!(frames.allocate_frame(), Err(MmuError::OutOfMemory));
    }

    #[test]
    fn shared_frame_survives_one_release() {
        let mut frames = FrameTable::new(2);
        let pfn = frames.allocate_frame().expect("frame");
        frames.share(pfn);
        assert_eq!(frames.mapcount(pfn), 2);
        assert_eq!(frames.release(pfn), 1);
        assert_eq!(frames.allocate_frame(), Ok(Pfn(1)));
    }

    #[test]
    #[should_panic(expected = "releasing unreferenced frame")]
    fn releasing_free_frame_panics() {
        let mut frames = FrameTable::new(1);
        frames.release(Pfn(0));
    }
}
