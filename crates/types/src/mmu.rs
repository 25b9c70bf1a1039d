use core::fmt;

use bitflags::bitflags;

/// Default number of bits used to index one page-table level.
pub const DEFAULT_PTE_INDEX_BITS: u32 = 4;
/// Default number of physical frames in the simulated machine.
pub const DEFAULT_NR_FRAMES: usize = 128;
/// Widest per-level index the layout accepts (keeps the VPN space in a `u32`).
pub const MAX_PTE_INDEX_BITS: u32 = 15;

bitflags! {
    /// Access rights granted by a mapping or requested by an access.
    ///
    /// A mapping created writable also carries `READ`; the COW downgrade strips
    /// only `WRITE`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct AccessRights: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl AccessRights {
    pub const fn read_only() -> Self {
        Self::READ
    }

    pub const fn read_write() -> Self {
        Self::READ.union(Self::WRITE)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }
}

impl fmt::Display for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Self::READ) { 'r' } else { '-' };
        let w = if self.contains(Self::WRITE) { 'w' } else { '-' };
        write!(f, "{r}{w}")
    }
}

/// Virtual page number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Vpn(pub u32);

/// Physical frame number.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Pfn(pub u32);

/// Process identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Pid(pub u32);

macro_rules! number_newtype {
    ($name:ident, $prefix:literal) => {
        impl $name {
            pub const fn as_u32(self) -> u32 {
                self.0
            }

            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

number_newtype!(Vpn, "vpn:");
number_newtype!(Pfn, "pfn:");
number_newtype!(Pid, "pid:");

/// Geometry of the two-level page table.
///
/// A VPN is split into an outer (directory) index taken from the high bits and
/// an inner (entry) index taken from the low `index_bits` bits. Both levels fan
/// out to `1 << index_bits` slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLayout {
    index_bits: u32,
}

impl PageLayout {
    pub const fn new(index_bits: u32) -> Self {
        Self { index_bits }
    }

    pub const fn index_bits(self) -> u32 {
        self.index_bits
    }

    /// Slots per level (directories per table and entries per directory).
    pub const fn fan_out(self) -> usize {
        1usize << self.index_bits
    }

    /// Number of addressable virtual pages.
    pub const fn nr_vpns(self) -> usize {
        1usize << (self.index_bits * 2)
    }

    pub const fn contains(self, vpn: Vpn) -> bool {
        (vpn.0 as usize) < self.nr_vpns()
    }

    /// Split `vpn` into `(directory index, entry index)`.
    pub const fn split(self, vpn: Vpn) -> (usize, usize) {
        let mask = (1u32 << self.index_bits) - 1;
        (
            ((vpn.0 >> self.index_bits) & mask) as usize,
            (vpn.0 & mask) as usize,
        )
    }

    /// Inverse of [`PageLayout::split`].
    pub const fn join(self, dir: usize, entry: usize) -> Vpn {
        Vpn(((dir as u32) << self.index_bits) | entry as u32)
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::new(DEFAULT_PTE_INDEX_BITS)
    }
}
