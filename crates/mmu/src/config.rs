use thiserror::Error;
use types::{DEFAULT_NR_FRAMES, DEFAULT_PTE_INDEX_BITS, MAX_PTE_INDEX_BITS, PageLayout};

/// Fixed machine parameters of one MMU instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct MmuConfig {
    /// Physical page frames in the pool.
    pub nr_frames: usize,
    /// VPN bits consumed by each of the two page-table levels.
    pub pte_index_bits: u32,
    /// TLB slots. Must cover every page of one address space.
    pub tlb_entries: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("nr_frames must be > 0")]
    NoFrames,
    #[error("pte_index_bits must be in 1..=15, got {0}")]
    IndexBits(u32),
    #[error("tlb_entries ({entries}) must cover all {vpns} virtual pages")]
    TlbTooSmall { entries: usize, vpns: usize },
}

impl MmuConfig {
    pub fn layout(&self) -> PageLayout {
        PageLayout::new(self.pte_index_bits)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nr_frames == 0 {
            return Err(ConfigError::NoFrames);
        }
        if self.pte_index_bits == 0 || self.pte_index_bits > MAX_PTE_INDEX_BITS {
            return Err(ConfigError::IndexBits(self.pte_index_bits));
        }
        let vpns = self.layout().nr_vpns();
        if self.tlb_entries < vpns {
            return Err(ConfigError::TlbTooSmall {
                entries: self.tlb_entries,
                vpns,
            });
        }
        Ok(())
    }
}

impl Default for MmuConfig {
    fn default() -> Self {
        let layout = PageLayout::new(DEFAULT_PTE_INDEX_BITS);
        Self {
            nr_frames: DEFAULT_NR_FRAMES,
            pte_index_bits: DEFAULT_PTE_INDEX_BITS,
            tlb_entries: layout.nr_vpns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MmuConfig::default();
        assert_eq!(config.nr_frames, 128);
        assert_eq!(config.tlb_entries, 256);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_degenerate_configs() {
        let base = MmuConfig::default();
        assert_eq!(
            MmuConfig { nr_frames: 0, ..base }.validate(),
            Err(ConfigError::NoFrames)
        );
        assert_eq!(
            MmuConfig { pte_index_bits: 0, ..base }.validate(),
            Err(ConfigError::IndexBits(0))
        );
        assert_eq!(
            MmuConfig { tlb_entries: 16, ..base }.validate(),
            Err(ConfigError::TlbTooSmall { entries: 16, vpns: 256 })
        );
    }
}
