use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use mmu::{Mmu, MmuConfig, MAX_PTE_INDEX_BITS};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

mod report;
mod runner;
mod script;

use report::Report;
use runner::Runner;

/// Drive the software MMU through a command script
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Script to run (reads stdin when omitted)
    script: Option<PathBuf>,

    /// JSON file with the machine parameters
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of physical frames
    #[arg(long)]
    frames: Option<usize>,

    /// VPN bits per page-table level
    #[arg(long)]
    pte_bits: Option<u32>,

    /// Number of TLB entries
    #[arg(long)]
    tlb_entries: Option<usize>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Log MMU internals (same as RUST_LOG=debug)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if args.format != "text" && args.format != "json" {
        anyhow::bail!("unknown output format: {}", args.format);
    }

    let config = load_config(&args)?;
    let mmu = Mmu::new(config).context("invalid MMU configuration")?;

    let content = match &args.script {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read script from stdin")?;
            buf
        }
    };
    let lines = script::parse_script(&content)?;
    log::info!("parsed {} commands", lines.len());

    let text = args.format == "text";
    if text {
        println!("{}", "MMU Simulator v0.1.0".bold().blue());
        println!("{}", "=====================================".blue());
        println!(
            "  {} frames, {}x{} page table, {} TLB entries",
            config.nr_frames,
            config.layout().fan_out(),
            config.layout().fan_out(),
            config.tlb_entries
        );
        println!();
    }

    let mut runner = Runner::new(mmu);
    for line in &lines {
        let pid = runner.mmu().current_pid();
        runner.execute(line);
        if text {
            if let Some(step) = runner.steps().last() {
                report::print_step(step, pid, runner.mmu());
            }
        }
    }

    if text {
        report::print_summary(runner.mmu().stats());
    } else {
        let report = Report {
            config,
            steps: runner.steps(),
            final_state: runner.mmu().snapshot(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<MmuConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => MmuConfig::default(),
    };
    if let Some(frames) = args.frames {
        config.nr_frames = frames;
    }
    if let Some(bits) = args.pte_bits {
        config.pte_index_bits = bits;
        // Keep the TLB large enough for the new address space unless set explicitly.
        if args.tlb_entries.is_none() && (1..=MAX_PTE_INDEX_BITS).contains(&bits) {
            config.tlb_entries = config.layout().nr_vpns();
        }
    }
    if let Some(entries) = args.tlb_entries {
        config.tlb_entries = entries;
    }
    Ok(config)
}
