//! # One-Flip Constraint Repairer
//!
//! Chooses the violated constraint to repair next and enumerates the flips
//! of its unassigned variables that make it hold.

use rustsat::types::Lit;

use crate::propagator::Propagator;

use super::maintainer::FeasibilityMaintainer;

#[derive(Clone, Debug, Default)]
pub(crate) struct Repairer {
    /// Maximum number of violated constraints for which repairing is tried
    max_broken: usize,
    n_operations: u64,
}

impl Repairer {
    pub fn new(max_broken: usize) -> Self {
        Repairer {
            max_broken,
            n_operations: 0,
        }
    }

    /// The flip literal if flipping the variable of `term` repairs `row` and
    /// the variable is still free in the propagator
    pub fn repair_lit(
        &mut self,
        maint: &FeasibilityMaintainer,
        prop: &Propagator,
        row: usize,
        term: usize,
    ) -> Option<Lit> {
        self.n_operations += 1;
        let var = maint.term_lit(row, term).var();
        if prop.is_assigned(var) || !maint.flip_repairs(row, term) {
            return None;
        }
        Some(if maint.value(var) {
            var.neg_lit()
        } else {
            var.pos_lit()
        })
    }

    /// The violated constraint with the fewest repairing flips. Constraints
    /// that no single flip repairs are skipped.
    pub fn select_row(
        &mut self,
        maint: &FeasibilityMaintainer,
        prop: &Propagator,
    ) -> Option<usize> {
        if maint.infeasible_rows().len() > self.max_broken {
            return None;
        }
        let mut best: Option<(usize, usize)> = None;
        for &row in maint.infeasible_rows() {
            let mut n_repairs = 0;
            for term in 0..maint.row_len(row) {
                if self.repair_lit(maint, prop, row, term).is_some() {
                    n_repairs += 1;
                    if best.is_some_and(|(_, n)| n_repairs >= n) {
                        break;
                    }
                }
            }
            if n_repairs > 0 && best.is_none_or(|(_, n)| n_repairs < n) {
                best = Some((row, n_repairs));
            }
        }
        best.map(|(row, _)| row)
    }

    pub fn n_operations(&self) -> u64 {
        self.n_operations
    }
}
