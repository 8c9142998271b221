//! # Pseudo-Boolean Propagator
//!
//! A trail based propagation engine over rows `sum(w * l) <= b` with positive
//! weights. It supports decisions, propagation and backtracking to any
//! decision level, which is what local search and the neighborhood generators
//! need. It never learns clauses: a conflicting decision is simply undone.
//!
//! Each row tracks the total weight of its literals that are currently true.
//! Whenever a literal becomes true, the rows it appears in are checked and all
//! unassigned literals whose weight exceeds the remaining slack are forced to
//! false.

use rustsat::types::{Lit, Var};

use crate::types::{LinearConstraint, LinearObjective, Problem};

/// Deterministic time charged per visited row entry
const DTIME_PER_OPERATION: f64 = 1e-8;

#[inline]
fn lit_idx(lit: Lit) -> usize {
    lit.var().idx() * 2 + usize::from(lit.is_neg())
}

#[derive(Clone, Debug)]
struct Row {
    /// Sorted by decreasing weight
    terms: Vec<(Lit, u64)>,
    bound: u64,
}

#[derive(Clone, Debug)]
pub struct Propagator {
    rows: Vec<Row>,
    /// Per literal, the rows it appears in with its weight there
    occurrences: Vec<Vec<(usize, u64)>>,
    /// Per row, the weight of the literals that are true and propagated
    true_weight: Vec<u64>,
    assignment: Vec<Option<bool>>,
    trail: Vec<Lit>,
    trail_lim: Vec<usize>,
    qhead: usize,
    unsat: bool,
    n_operations: u64,
}

impl Propagator {
    pub fn new(n_vars: usize) -> Self {
        Propagator {
            rows: vec![],
            occurrences: vec![vec![]; 2 * n_vars],
            true_weight: vec![],
            assignment: vec![None; n_vars],
            trail: vec![],
            trail_lim: vec![],
            qhead: 0,
            unsat: false,
            n_operations: 0,
        }
    }

    /// Creates a propagator holding all constraints of a problem
    pub fn from_problem(problem: &Problem) -> Self {
        let mut prop = Self::new(problem.n_vars());
        for (_, constr) in problem.constraints() {
            if !prop.add_constraint(constr) {
                break;
            }
        }
        prop
    }

    pub fn n_vars(&self) -> usize {
        self.assignment.len()
    }

    /// Adds a constraint at decision level zero, returns `false` if the
    /// propagator became unsatisfiable
    pub fn add_constraint(&mut self, constr: &LinearConstraint) -> bool {
        for (lits, bound) in constr.normalized() {
            if !self.add_row(lits, bound) {
                return false;
            }
        }
        true
    }

    /// Adds `objective <= ub` at decision level zero
    pub fn add_objective_upper_bound(&mut self, objective: &LinearObjective, ub: i64) -> bool {
        let (lits, offset) = objective.normalized();
        self.add_row(lits, ub.saturating_sub(offset))
    }

    pub fn add_binary_clause(&mut self, a: Lit, b: Lit) -> bool {
        self.add_row(vec![(!a, 1), (!b, 1)], 1)
    }

    pub fn add_unit(&mut self, lit: Lit) -> bool {
        assert_eq!(self.decision_level(), 0);
        if self.unsat {
            return false;
        }
        match self.lit_value(lit) {
            Some(true) => true,
            Some(false) => {
                self.unsat = true;
                false
            }
            None => {
                self.assign(lit);
                if !self.propagate() {
                    self.unsat = true;
                }
                !self.unsat
            }
        }
    }

    /// Adds a normalized row at decision level zero
    pub fn add_row(&mut self, mut lits: Vec<(Lit, u64)>, bound: i64) -> bool {
        assert_eq!(self.decision_level(), 0);
        if self.unsat {
            return false;
        }
        if bound < 0 {
            self.unsat = true;
            return false;
        }
        let bound = bound as u64;
        if lits.iter().map(|(_, w)| *w).sum::<u64>() <= bound {
            return true;
        }
        lits.sort_by(|a, b| b.1.cmp(&a.1));
        let row = self.rows.len();
        let mut true_weight = 0;
        for &(l, w) in &lits {
            assert!(l.var().idx() < self.n_vars());
            self.occurrences[lit_idx(l)].push((row, w));
            if self.lit_value(l) == Some(true) {
                true_weight += w;
            }
        }
        self.rows.push(Row { terms: lits, bound });
        self.true_weight.push(true_weight);
        if !self.propagate_row(row) || !self.propagate() {
            self.unsat = true;
        }
        !self.unsat
    }

    /// Takes a decision on a new level and propagates it. On conflict, the
    /// level is undone and `None` is returned, otherwise the newly assigned
    /// literals (starting with the decision) are returned.
    pub fn enqueue_decision(&mut self, lit: Lit) -> Option<Vec<Lit>> {
        debug_assert!(self.lit_value(lit).is_none());
        if self.unsat {
            return None;
        }
        let start = self.trail.len();
        self.trail_lim.push(start);
        self.assign(lit);
        if self.propagate() {
            Some(self.trail[start..].to_vec())
        } else {
            self.backtrack_one_level();
            None
        }
    }

    pub fn decision_level(&self) -> usize {
        self.trail_lim.len()
    }

    pub fn backtrack_one_level(&mut self) {
        if let Some(level) = self.decision_level().checked_sub(1) {
            self.backtrack_to(level);
        }
    }

    pub fn backtrack_all(&mut self) {
        self.backtrack_to(0);
    }

    pub fn backtrack_to(&mut self, level: usize) {
        if level >= self.decision_level() {
            return;
        }
        let new_len = self.trail_lim[level];
        self.trail_lim.truncate(level);
        while self.trail.len() > new_len {
            let pos = self.trail.len() - 1;
            let Some(lit) = self.trail.pop() else { break };
            if pos < self.qhead {
                for &(row, w) in &self.occurrences[lit_idx(lit)] {
                    self.true_weight[row] -= w;
                }
            }
            self.assignment[lit.var().idx()] = None;
        }
        self.qhead = std::cmp::min(self.qhead, new_len);
    }

    pub fn value(&self, var: Var) -> Option<bool> {
        self.assignment[var.idx()]
    }

    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.assignment[lit.var().idx()].map(|v| v != lit.is_neg())
    }

    pub fn is_assigned(&self, var: Var) -> bool {
        self.assignment[var.idx()].is_some()
    }

    pub fn trail(&self) -> &[Lit] {
        &self.trail
    }

    /// Literals implied without any decision
    pub fn level_zero_lits(&self) -> &[Lit] {
        let end = self.trail_lim.first().copied().unwrap_or(self.trail.len());
        &self.trail[..end]
    }

    pub fn is_model_unsat(&self) -> bool {
        self.unsat
    }

    pub fn deterministic_time(&self) -> f64 {
        self.n_operations as f64 * DTIME_PER_OPERATION
    }

    fn assign(&mut self, lit: Lit) {
        debug_assert!(self.assignment[lit.var().idx()].is_none());
        self.assignment[lit.var().idx()] = Some(lit.is_pos());
        self.trail.push(lit);
    }

    /// Forces the literals of a row that do not fit in its slack
    fn propagate_row(&mut self, row: usize) -> bool {
        let used = self.true_weight[row];
        let bound = self.rows[row].bound;
        if used > bound {
            return false;
        }
        let slack = bound - used;
        for t in 0..self.rows[row].terms.len() {
            self.n_operations += 1;
            let (l, w) = self.rows[row].terms[t];
            if w <= slack {
                break;
            }
            if self.lit_value(l).is_none() {
                self.assign(!l);
            }
        }
        true
    }

    fn propagate(&mut self) -> bool {
        while self.qhead < self.trail.len() {
            let lit = self.trail[self.qhead];
            self.qhead += 1;
            let li = lit_idx(lit);
            for k in 0..self.occurrences[li].len() {
                let (row, w) = self.occurrences[li][k];
                self.true_weight[row] += w;
            }
            self.n_operations += self.occurrences[li].len() as u64;
            for k in 0..self.occurrences[li].len() {
                let (row, _) = self.occurrences[li][k];
                if !self.propagate_row(row) {
                    return false;
                }
            }
        }
        true
    }
}
