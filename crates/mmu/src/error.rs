use core::fmt;

use thiserror::Error;

/// Why a translation could not be completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Fault {
    /// No directory or no valid entry for the page. Resolved by allocating it.
    NotMapped,
    /// The page is mapped but its rights do not cover the access and no COW
    /// backup can grant them.
    Protection,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::NotMapped => f.write_str("page not mapped"),
            Fault::Protection => f.write_str("protection violation"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MmuError {
    #[error("out of physical page frames")]
    OutOfMemory,
    #[error("page fault: {0}")]
    Fault(Fault),
}

impl From<Fault> for MmuError {
    fn from(fault: Fault) -> Self {
        MmuError::Fault(fault)
    }
}

pub type Result<T> = core::result::Result<T, MmuError>;
