//! # Local Search Assignment Iterator
//!
//! Depth-first search over one-flip repairs starting from a reference
//! solution. Every node picks a violated constraint and branches over the
//! flips that repair it, each flip being a decision on the [`Propagator`].
//! The iterator keeps its position between calls, so a search interrupted
//! by a budget continues where it stopped.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rustsat::types::{Lit, RsHashSet};

use crate::{
    options::Parameters, propagator::Propagator, state::ProblemState, time::TimeLimit,
};

use super::{maintainer::FeasibilityMaintainer, repairer::Repairer};

/// Decision paths up to this length are stored in the transposition table
const TABLE_MAX_DECISIONS: usize = 4;
const DTIME_PER_OPERATION: f64 = 1e-8;

/// Result of advancing the iterator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// The current assignment is feasible and improves on the reference
    Feasible,
    /// The whole search tree was explored
    Exhausted,
    /// The number of explored assignments for this call is used up
    BudgetSpent,
    LimitReached,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    row: usize,
    start: usize,
    /// Number of terms of `row` already tried
    next: usize,
    decision: Option<Lit>,
}

pub(crate) struct AssignmentIterator {
    max_depth: usize,
    use_table: bool,
    use_potential_repairs: bool,
    propagator: Propagator,
    maintainer: FeasibilityMaintainer,
    repairer: Repairer,
    frames: Vec<Frame>,
    table: RsHashSet<[i32; TABLE_MAX_DECISIONS]>,
    /// The table is cleared once it holds this many paths
    table_capacity: usize,
    rng: StdRng,
    started: bool,
    /// The last returned assignment must be backtracked before resuming
    resume_backtrack: bool,
    /// A potential repair was applied on top of the deepest decision
    extra_decision: bool,
    n_explored: usize,
}

impl AssignmentIterator {
    /// Builds an iterator around the incumbent of `state`. Returns `None` if
    /// propagation alone proves that nothing improves on the incumbent.
    pub fn new(
        state: &ProblemState,
        params: &Parameters,
        max_depth: usize,
        seed: u64,
    ) -> Option<Self> {
        debug_assert!(state.solution().is_feasible());
        let problem = state.problem();
        let objective_ub = state.upper_bound() - 1;
        let mut propagator = Propagator::from_problem(problem);
        propagator.add_objective_upper_bound(problem.objective(), objective_ub);
        for lit in state.fixed_literals() {
            propagator.add_unit(lit);
        }
        for &(a, b) in state.binary_clauses() {
            propagator.add_binary_clause(a, b);
        }
        if propagator.is_model_unsat() {
            return None;
        }
        let mut maintainer = FeasibilityMaintainer::new(problem);
        maintainer.set_reference(state.solution().values(), objective_ub);
        maintainer.assign(propagator.level_zero_lits());
        Some(AssignmentIterator {
            max_depth,
            use_table: params.use_transposition_table_in_ls,
            use_potential_repairs: params.use_potential_one_flip_repairs_in_ls,
            propagator,
            maintainer,
            repairer: Repairer::new(params.max_num_broken_constraints_in_ls),
            frames: vec![],
            table: RsHashSet::default(),
            table_capacity: params
                .max_number_of_explored_assignments_per_try_in_ls
                .max(1),
            rng: StdRng::seed_from_u64(seed),
            started: false,
            resume_backtrack: false,
            extra_decision: false,
            n_explored: 0,
        })
    }

    /// The current assignment, feasible after [`Step::Feasible`]
    pub fn assignment(&self) -> &[bool] {
        self.maintainer.assignment()
    }

    /// Literals the propagator fixed without any decision
    pub fn level_zero_lits(&self) -> &[Lit] {
        self.propagator.level_zero_lits()
    }

    pub fn n_explored(&self) -> usize {
        self.n_explored
    }

    pub fn deterministic_time(&self) -> f64 {
        self.propagator.deterministic_time()
            + (self.maintainer.n_operations() + self.repairer.n_operations()) as f64
                * DTIME_PER_OPERATION
    }

    /// Explores at most `max_explored` new assignments looking for a
    /// feasible one
    pub fn next_assignment(&mut self, max_explored: usize, time_limit: &TimeLimit) -> Step {
        if self.resume_backtrack {
            self.resume_backtrack = false;
            if self.extra_decision {
                self.extra_decision = false;
                self.propagator.backtrack_one_level();
                self.maintainer.backtrack_one_level();
            }
            self.undo_top();
        }
        let budget_end = self.n_explored.saturating_add(max_explored);
        loop {
            if time_limit.limit_reached() {
                return Step::LimitReached;
            }
            if self.n_explored >= budget_end {
                return Step::BudgetSpent;
            }
            let Some(top) = self.frames.last().copied() else {
                if self.started {
                    return Step::Exhausted;
                }
                self.started = true;
                if self.maintainer.is_feasible() {
                    return Step::Feasible;
                }
                match self.repairer.select_row(&self.maintainer, &self.propagator) {
                    Some(row) => self.push_frame(row),
                    None => return Step::Exhausted,
                }
                continue;
            };
            if top.decision.is_none() {
                if !self.try_next_branch() {
                    self.frames.pop();
                    self.undo_top();
                }
                continue;
            }
            if self.maintainer.is_feasible() {
                self.resume_backtrack = true;
                return Step::Feasible;
            }
            if self.frames.len() < self.max_depth {
                if let Some(row) = self.repairer.select_row(&self.maintainer, &self.propagator) {
                    self.push_frame(row);
                    continue;
                }
            } else if self.use_potential_repairs && self.try_potential_repair() {
                self.resume_backtrack = true;
                self.extra_decision = true;
                return Step::Feasible;
            }
            self.undo_top();
        }
    }

    fn push_frame(&mut self, row: usize) {
        let start = self.rng.random_range(0..self.maintainer.row_len(row).max(1));
        self.frames.push(Frame {
            row,
            start,
            next: 0,
            decision: None,
        });
    }

    /// Undoes the decision of the deepest frame, if it has one
    fn undo_top(&mut self) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if frame.decision.take().is_some() {
            self.propagator.backtrack_one_level();
            self.maintainer.backtrack_one_level();
        }
    }

    /// Key of the decision path extended by `lit`, `None` if the path is too
    /// long to be stored
    fn table_key(&self, lit: Lit) -> Option<[i32; TABLE_MAX_DECISIONS]> {
        if self.frames.len() > TABLE_MAX_DECISIONS {
            return None;
        }
        let mut key = [0; TABLE_MAX_DECISIONS];
        let decisions = self
            .frames
            .iter()
            .filter_map(|f| f.decision)
            .chain(std::iter::once(lit));
        for (slot, dec) in key.iter_mut().zip(decisions) {
            let signed = dec.var().idx() as i32 + 1;
            *slot = if dec.is_pos() { signed } else { -signed };
        }
        key.sort_unstable();
        Some(key)
    }

    /// Takes the next untried repair of the deepest frame as a decision
    fn try_next_branch(&mut self) -> bool {
        let Some(&Frame {
            row, start, next, ..
        }) = self.frames.last()
        else {
            return false;
        };
        let n_terms = self.maintainer.row_len(row);
        let mut pos = next;
        let mut decision = None;
        while pos < n_terms {
            let term = (start + pos) % n_terms;
            pos += 1;
            let Some(lit) = self
                .repairer
                .repair_lit(&self.maintainer, &self.propagator, row, term)
            else {
                continue;
            };
            let key = if self.use_table {
                self.table_key(lit)
            } else {
                None
            };
            if let Some(key) = key {
                if self.table.len() >= self.table_capacity && !self.table.contains(&key) {
                    self.table.clear();
                }
                if !self.table.insert(key) {
                    continue;
                }
            }
            self.n_explored += 1;
            if let Some(assigned) = self.propagator.enqueue_decision(lit) {
                self.maintainer.add_backtracking_level();
                self.maintainer.assign(&assigned);
                decision = Some(lit);
                break;
            }
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.next = pos;
            frame.decision = decision;
        }
        decision.is_some()
    }

    /// Looks for a single flip below the deepest decision that makes the
    /// assignment feasible, leaving it applied if found
    fn try_potential_repair(&mut self) -> bool {
        for lit in self.maintainer.potential_one_flip_repairs() {
            if self.propagator.lit_value(lit).is_some() {
                continue;
            }
            self.n_explored += 1;
            let Some(assigned) = self.propagator.enqueue_decision(lit) else {
                continue;
            };
            self.maintainer.add_backtracking_level();
            self.maintainer.assign(&assigned);
            if self.maintainer.is_feasible() {
                return true;
            }
            self.propagator.backtrack_one_level();
            self.maintainer.backtrack_one_level();
        }
        false
    }
}
