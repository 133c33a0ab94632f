// Harvest state machine.
//
// The scroll loop cannot know when a virtualized list is done, so it infers
// completion from two signals per cycle: new distinct ids and a change in raw
// snapshot size. The state is a value: every transition consumes the old one
// and returns the next, so the rules are testable without a page.

use std::collections::HashSet;
use std::fmt;

/// Where the harvest loop is. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestPhase {
    Idle,
    Extracting,
    Growing,
    Stagnant,
    Converged,
    Saturated,
    Exhausted,
}

impl HarvestPhase {
    pub fn termination(&self) -> Option<Termination> {
        match self {
            HarvestPhase::Converged => Some(Termination::Converged),
            HarvestPhase::Saturated => Some(Termination::Saturated),
            HarvestPhase::Exhausted => Some(Termination::Exhausted),
            _ => None,
        }
    }
}

/// Why a harvest stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Reached the target sample size.
    Saturated,
    /// No progress for `stagnation_limit` consecutive cycles.
    Converged,
    /// Ran out of cycles.
    Exhausted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Saturated => "saturated",
            Termination::Converged => "converged",
            Termination::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestLimits {
    pub target: usize,
    pub max_cycles: u32,
    pub stagnation_limit: u32,
}

/// What one successful cycle saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleObservation {
    pub candidates: Vec<String>,
    pub snapshot_size: usize,
}

#[derive(Debug, Clone)]
pub struct HarvestState {
    seen: HashSet<String>,
    order: Vec<String>,
    cycle: u32,
    stagnant_cycles: u32,
    last_snapshot_size: usize,
    phase: HarvestPhase,
    limits: HarvestLimits,
}

impl HarvestState {
    pub fn new(limits: HarvestLimits) -> Self {
        Self {
            seen: HashSet::new(),
            order: Vec::new(),
            cycle: 0,
            stagnant_cycles: 0,
            last_snapshot_size: 0,
            phase: HarvestPhase::Idle,
            limits,
        }
    }

    /// Idle -> Extracting, or straight to Exhausted when no cycle may run.
    pub fn begin(mut self) -> Self {
        if self.phase == HarvestPhase::Idle {
            self.phase = if self.limits.max_cycles == 0 {
                HarvestPhase::Exhausted
            } else {
                HarvestPhase::Extracting
            };
        }
        self
    }

    /// Fold one cycle into the state and settle on the next phase.
    ///
    /// `None` is a cycle whose snapshot or extraction failed; it counts as a
    /// stagnant cycle and leaves the size baseline untouched.
    pub fn step(mut self, observation: Option<CycleObservation>) -> Self {
        if self.is_terminal() {
            return self;
        }
        self.cycle += 1;

        let progressed = match observation {
            Some(obs) => {
                let mut added = 0;
                for id in obs.candidates {
                    if self.seen.insert(id.clone()) {
                        self.order.push(id);
                        added += 1;
                    }
                }
                let grew = obs.snapshot_size != self.last_snapshot_size;
                self.last_snapshot_size = obs.snapshot_size;
                added > 0 || grew
            }
            None => false,
        };

        if progressed {
            self.stagnant_cycles = 0;
            self.phase = HarvestPhase::Growing;
        } else {
            self.stagnant_cycles += 1;
            self.phase = HarvestPhase::Stagnant;
        }

        self.settle()
    }

    // Saturated beats Converged beats Exhausted when several hold at once.
    fn settle(mut self) -> Self {
        if self.order.len() >= self.limits.target {
            self.phase = HarvestPhase::Saturated;
        } else if self.stagnant_cycles >= self.limits.stagnation_limit {
            self.phase = HarvestPhase::Converged;
        } else if self.cycle >= self.limits.max_cycles {
            self.phase = HarvestPhase::Exhausted;
        } else {
            // Growing/Stagnant are momentary; the loop goes back to extracting.
            self.phase = match self.phase {
                HarvestPhase::Growing | HarvestPhase::Stagnant => HarvestPhase::Extracting,
                other => other,
            };
        }
        self
    }

    pub fn phase(&self) -> HarvestPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.termination().is_some()
    }

    pub fn termination(&self) -> Option<Termination> {
        self.phase.termination()
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn stagnant_cycles(&self) -> u32 {
        self.stagnant_cycles
    }

    pub fn last_snapshot_size(&self) -> usize {
        self.last_snapshot_size
    }

    pub fn discovered(&self) -> usize {
        self.order.len()
    }

    /// Ids in first-seen order, cut to the target size.
    pub fn into_ids(self) -> Vec<String> {
        let mut ids = self.order;
        ids.truncate(self.limits.target);
        ids
    }
}
