#![no_std]

pub mod mmu;
pub use mmu::*;
