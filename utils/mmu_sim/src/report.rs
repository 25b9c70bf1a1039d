use colored::*;
use mmu::{Mmu, MmuConfig, Pid, Snapshot, Stats};
use serde::Serialize;

use crate::runner::{Outcome, Step};
use crate::script::Command;

/// Everything `--format json` emits.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub config: MmuConfig,
    pub steps: &'a [Step],
    pub final_state: Snapshot,
}

/// Print one executed step; `pid` is the process that issued it.
pub fn print_step(step: &Step, pid: Pid, mmu: &Mmu) {
    let prefix = format!("{:>4} {} {}", step.line, pid, step.command);
    match &step.outcome {
        Outcome::Mapped { pfn } => println!("{} -> {}", prefix, pfn.to_string().green()),
        Outcome::Freed { pfn, mapcount } => {
            println!("{} -> released {} (mapcount {})", prefix, pfn, mapcount)
        }
        Outcome::Translated { pfn } => println!("{} -> {}", prefix, pfn.to_string().cyan()),
        Outcome::Switched { outcome } => println!("{} ({})", prefix.bold(), outcome),
        Outcome::Failed { error } => println!("{} -> {}", prefix, error.red()),
        Outcome::Rejected { reason } => println!("{} -> {} {}", prefix, "rejected:".yellow(), reason),
        Outcome::Inspected => {
            println!("{}", prefix);
            match step.command {
                Command::Show => print_page_table(mmu),
                Command::Tlb => print_tlb(mmu),
                Command::Frames => print_frames(mmu),
                _ => print_ready(mmu),
            }
        }
    }
}

fn print_page_table(mmu: &Mmu) {
    let page_table = mmu.page_table();
    println!(
        "     page table of {} ({} directories)",
        mmu.current_pid(),
        page_table.nr_directories()
    );
    for (vpn, pte) in page_table.valid_entries() {
        let cow = match pte.saved_rights {
            Some(saved) => format!(" cow({})", saved),
            None => String::new(),
        };
        println!("       {:>4} -> {:>4} {}{}", vpn.0, pte.pfn.0, pte.rw, cow.yellow());
    }
}

fn print_tlb(mmu: &Mmu) {
    println!("     tlb ({} of {} entries)", mmu.tlb().entries().count(), mmu.tlb().capacity());
    for entry in mmu.tlb().entries() {
        println!("       {:>4} -> {:>4} {}", entry.vpn.0, entry.pfn.0, entry.rw);
    }
}

fn print_frames(mmu: &Mmu) {
    let frames = mmu.frames();
    println!("     frames ({} free of {})", frames.free_frames(), frames.nr_frames());
    for (pfn, count) in frames.mapcounts().iter().enumerate().filter(|(_, c)| **c > 0) {
        println!("       {:>4} mapcount {}", pfn, count);
    }
}

fn print_ready(mmu: &Mmu) {
    let pids: Vec<String> = mmu.ready_pids().iter().map(|pid| pid.0.to_string()).collect();
    println!("     current {} ready [{}]", mmu.current_pid().0, pids.join(", "));
}

pub fn print_summary(stats: &Stats) {
    println!();
    println!("{}", "=====================================".blue());
    println!("{}", "Summary".bold().green());
    println!("{}", "=====================================".blue());
    println!("  TLB hits:     {}", stats.tlb_hits);
    println!("  TLB misses:   {}", stats.tlb_misses);
    println!("  Page faults:  {}", stats.page_faults);
    println!("  COW copies:   {}", stats.cow_copies);
    println!("  COW unlocks:  {}", stats.cow_unlocks);
    println!("  Forks:        {}", stats.forks);
    println!("  Switches:     {}", stats.switches);
}
