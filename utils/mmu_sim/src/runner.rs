use mmu::{AccessRights, Mmu, MmuError, Pfn, SwitchOutcome, Vpn};
use serde::Serialize;

use crate::script::{Command, ScriptLine};

/// Result of executing one script command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Mapped { pfn: Pfn },
    Freed { pfn: Pfn, mapcount: u32 },
    Translated { pfn: Pfn },
    Switched { outcome: String },
    /// The MMU rejected the operation (out of memory or a fault).
    Failed { error: String },
    /// The command broke a caller contract and was not sent to the MMU.
    Rejected { reason: String },
    Inspected,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub line: usize,
    pub command: Command,
    pub outcome: Outcome,
}

/// Drives an [`Mmu`] through a parsed script.
///
/// Commands that would break the MMU's preconditions (freeing an unmapped
/// page, remapping a mapped one, pages outside the address space) are
/// rejected here instead of being forwarded.
pub struct Runner {
    mmu: Mmu,
    steps: Vec<Step>,
}

impl Runner {
    pub fn new(mmu: Mmu) -> Self {
        Self {
            mmu,
            steps: Vec::new(),
        }
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn execute(&mut self, line: &ScriptLine) -> &Step {
        let outcome = match line.command {
            Command::Alloc { vpn, rights } => self.alloc(vpn, rights),
            Command::Free { vpn } => self.free(vpn),
            Command::Read { vpn } => self.access(vpn, AccessRights::READ),
            Command::Write { vpn } => self.access(vpn, AccessRights::WRITE),
            Command::Switch { pid } => {
                let outcome = match self.mmu.switch_process(pid) {
                    SwitchOutcome::Current => "current",
                    SwitchOutcome::Resumed => "resumed",
                    SwitchOutcome::Forked => "forked",
                };
                Outcome::Switched {
                    outcome: outcome.to_string(),
                }
            }
            Command::Show | Command::Tlb | Command::Frames | Command::Ready => Outcome::Inspected,
        };
        self.steps.push(Step {
            line: line.line,
            command: line.command,
            outcome,
        });
        let last = self.steps.len() - 1;
        &self.steps[last]
    }

    fn in_range(&self, vpn: Vpn) -> Option<Outcome> {
        let layout = self.mmu.config().layout();
        if layout.contains(vpn) {
            None
        } else {
            Some(Outcome::Rejected {
                reason: format!("{} outside the {} page address space", vpn, layout.nr_vpns()),
            })
        }
    }

    fn is_mapped(&self, vpn: Vpn) -> bool {
        self.mmu.page_table().entry(vpn).is_some_and(|pte| pte.valid)
    }

    fn alloc(&mut self, vpn: Vpn, rights: AccessRights) -> Outcome {
        if let Some(rejected) = self.in_range(vpn) {
            return rejected;
        }
        if self.is_mapped(vpn) {
            return Outcome::Rejected {
                reason: format!("{} is already mapped", vpn),
            };
        }
        match self.mmu.alloc_page(vpn, rights) {
            Ok(pfn) => Outcome::Mapped { pfn },
            Err(err) => failed(err),
        }
    }

    fn free(&mut self, vpn: Vpn) -> Outcome {
        let Some(pfn) = self
            .mmu
            .page_table()
            .entry(vpn)
            .filter(|pte| pte.valid)
            .map(|pte| pte.pfn)
        else {
            return Outcome::Rejected {
                reason: format!("{} is not mapped", vpn),
            };
        };
        self.mmu.free_page(vpn);
        Outcome::Freed {
            pfn,
            mapcount: self.mmu.frames().mapcount(pfn),
        }
    }

    fn access(&mut self, vpn: Vpn, rights: AccessRights) -> Outcome {
        match self.mmu.access(vpn, rights) {
            Ok(pfn) => Outcome::Translated { pfn },
            Err(err) => failed(err),
        }
    }
}

fn failed(err: MmuError) -> Outcome {
    Outcome::Failed {
        error: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;

    fn run(script: &str) -> Runner {
        let mut runner = Runner::new(Mmu::default());
        for line in parse_script(script).expect("valid script") {
            runner.execute(&line);
        }
        runner
    }

    #[test]
    fn cow_scenario_end_to_end() {
        let runner = run("alloc 0 rw\nalloc 1 rw\nswitch 1\nwrite 0\nread 1\n");
        let outcomes: Vec<&Outcome> = runner.steps().iter().map(|s| &s.outcome).collect();
        assert_eq!(outcomes[0], &Outcome::Mapped { pfn: Pfn(0) });
        assert_eq!(outcomes[1], &Outcome::Mapped { pfn: Pfn(1) });
        assert_eq!(outcomes[2], &Outcome::Switched { outcome: "forked".into() });
        assert_eq!(outcomes[3], &Outcome::Translated { pfn: Pfn(2) });
        assert_eq!(outcomes[4], &Outcome::Translated { pfn: Pfn(1) });
    }

    #[test]
    fn contract_violations_are_rejected() {
        let runner = run("free 3\nalloc 2 r\nalloc 2 rw\nalloc 4096 rw\n");
        let steps = runner.steps();
        assert!(matches!(steps[0].outcome, Outcome::Rejected { .. }));
        assert_eq!(steps[1].outcome, Outcome::Mapped { pfn: Pfn(0) });
        assert!(matches!(steps[2].outcome, Outcome::Rejected { .. }));
        assert!(matches!(steps[3].outcome, Outcome::Rejected { .. }));
    }

    #[test]
    fn faults_are_reported_not_fatal() {
        let runner = run("read 5\nalloc 5 r\nwrite 5\nread 5\n");
        let steps = runner.steps();
        assert_eq!(
            steps[0].outcome,
            Outcome::Failed { error: "page fault: page not mapped".into() }
        );
        assert_eq!(
            steps[2].outcome,
            Outcome::Failed { error: "page fault: protection violation".into() }
        );
        assert_eq!(steps[3].outcome, Outcome::Translated { pfn: Pfn(0) });
    }

    #[test]
    fn free_reports_remaining_mapcount() {
        let runner = run("alloc 0 rw\nswitch 1\nfree 0\n");
        assert_eq!(
            runner.steps()[2].outcome,
            Outcome::Freed { pfn: Pfn(0), mapcount: 1 }
        );
    }
}
