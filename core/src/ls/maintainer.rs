//! # Assignment Feasibility Maintainer
//!
//! A full assignment together with the activity of every constraint and the
//! set of currently violated ones. The objective is constraint
//! [`OBJECTIVE_ROW`] with an upper bound one below the reference cost, so an
//! assignment is feasible here only if it is feasible for the problem and
//! improves on the reference.
//!
//! Flips are recorded on a stack. [`FeasibilityMaintainer::add_backtracking_level`]
//! pushes a checkpoint and backtracking undoes the flips made since.

use rustsat::types::{Lit, Var};

use crate::types::{lit_value, Problem};

/// Row index of the objective constraint
pub(crate) const OBJECTIVE_ROW: usize = 0;

#[derive(Clone, Debug)]
struct Row {
    terms: Vec<(Lit, i64)>,
    lb: i64,
    ub: i64,
}

impl Row {
    fn holds(&self, activity: i64) -> bool {
        self.lb <= activity && activity <= self.ub
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FeasibilityMaintainer {
    rows: Vec<Row>,
    /// Per variable, the rows it appears in with its term index there
    by_var: Vec<Vec<(usize, usize)>>,
    assignment: Vec<bool>,
    activities: Vec<i64>,
    infeasible: Vec<usize>,
    infeasible_pos: Vec<Option<usize>>,
    flipped: Vec<Var>,
    levels: Vec<usize>,
    n_operations: u64,
}

impl FeasibilityMaintainer {
    pub fn new(problem: &Problem) -> Self {
        let mut rows = vec![Row {
            terms: problem.objective().terms().to_vec(),
            lb: i64::MIN,
            ub: i64::MAX,
        }];
        rows.extend(problem.constraints().map(|(_, constr)| Row {
            terms: constr.terms().to_vec(),
            lb: constr.lb().unwrap_or(i64::MIN),
            ub: constr.ub().unwrap_or(i64::MAX),
        }));
        let mut by_var = vec![vec![]; problem.n_vars()];
        for (ridx, row) in rows.iter().enumerate() {
            for (tidx, (l, _)) in row.terms.iter().enumerate() {
                by_var[l.var().idx()].push((ridx, tidx));
            }
        }
        let n_rows = rows.len();
        FeasibilityMaintainer {
            rows,
            by_var,
            assignment: vec![false; problem.n_vars()],
            activities: vec![0; n_rows],
            infeasible: vec![],
            infeasible_pos: vec![None; n_rows],
            flipped: vec![],
            levels: vec![],
            n_operations: 0,
        }
    }

    /// Resets the assignment to a reference and requires the objective to be
    /// at most `objective_ub`
    pub fn set_reference(&mut self, values: &[bool], objective_ub: i64) {
        debug_assert_eq!(values.len(), self.assignment.len());
        self.assignment.clear();
        self.assignment.extend_from_slice(values);
        self.rows[OBJECTIVE_ROW].ub = objective_ub;
        self.flipped.clear();
        self.levels.clear();
        self.infeasible.clear();
        self.infeasible_pos.iter_mut().for_each(|pos| *pos = None);
        for ridx in 0..self.rows.len() {
            let row = &self.rows[ridx];
            self.activities[ridx] = row
                .terms
                .iter()
                .filter(|(l, _)| lit_value(*l, &self.assignment))
                .map(|(_, c)| *c)
                .sum();
            self.n_operations += row.terms.len() as u64;
            self.update_feasibility(ridx);
        }
    }

    pub fn assignment(&self) -> &[bool] {
        &self.assignment
    }

    pub fn value(&self, var: Var) -> bool {
        self.assignment[var.idx()]
    }

    /// Makes all given literals true
    pub fn assign(&mut self, lits: &[Lit]) {
        for &lit in lits {
            if self.assignment[lit.var().idx()] != lit.is_pos() {
                self.flip(lit.var());
                self.flipped.push(lit.var());
            }
        }
    }

    pub fn add_backtracking_level(&mut self) {
        self.levels.push(self.flipped.len());
    }

    pub fn backtrack_one_level(&mut self) {
        let Some(mark) = self.levels.pop() else {
            return;
        };
        while self.flipped.len() > mark {
            let Some(var) = self.flipped.pop() else {
                break;
            };
            self.flip(var);
        }
    }

    /// Undoes everything down to the flips made before the first level
    pub fn backtrack_all(&mut self) {
        while !self.levels.is_empty() {
            self.backtrack_one_level();
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.infeasible.is_empty()
    }

    pub fn infeasible_rows(&self) -> &[usize] {
        &self.infeasible
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row_len(&self, row: usize) -> usize {
        self.rows[row].terms.len()
    }

    pub fn term_lit(&self, row: usize, term: usize) -> Lit {
        self.rows[row].terms[term].0
    }

    pub fn activity(&self, row: usize) -> i64 {
        self.activities[row]
    }

    /// Activity change of `row` if the variable of `term` is flipped
    pub fn flip_delta(&self, row: usize, term: usize) -> i64 {
        let (l, c) = self.rows[row].terms[term];
        if lit_value(l, &self.assignment) {
            -c
        } else {
            c
        }
    }

    /// Whether flipping the variable of `term` makes `row` hold
    pub fn flip_repairs(&self, row: usize, term: usize) -> bool {
        self.rows[row].holds(self.activities[row] + self.flip_delta(row, term))
    }

    /// Flips that make the whole assignment feasible on their own
    pub fn potential_one_flip_repairs(&mut self) -> Vec<Lit> {
        let Some(&smallest) = self
            .infeasible
            .iter()
            .min_by_key(|&&row| self.rows[row].terms.len())
        else {
            return vec![];
        };
        let mut repairs = vec![];
        for term in 0..self.rows[smallest].terms.len() {
            self.n_operations += 1;
            if !self.flip_repairs(smallest, term) {
                continue;
            }
            let var = self.rows[smallest].terms[term].0.var();
            let mut n_repaired = 0;
            let mut breaks = false;
            for &(row, t) in &self.by_var[var.idx()] {
                self.n_operations += 1;
                let after = self.rows[row].holds(self.activities[row] + self.flip_delta(row, t));
                match (self.infeasible_pos[row].is_some(), after) {
                    (true, true) => n_repaired += 1,
                    (false, false) => breaks = true,
                    _ => (),
                }
            }
            if !breaks && n_repaired == self.infeasible.len() {
                repairs.push(if self.assignment[var.idx()] {
                    var.neg_lit()
                } else {
                    var.pos_lit()
                });
            }
        }
        repairs
    }

    pub fn n_operations(&self) -> u64 {
        self.n_operations
    }

    fn flip(&mut self, var: Var) {
        let value = &mut self.assignment[var.idx()];
        *value = !*value;
        for k in 0..self.by_var[var.idx()].len() {
            let (row, term) = self.by_var[var.idx()][k];
            let (l, c) = self.rows[row].terms[term];
            if lit_value(l, &self.assignment) {
                self.activities[row] += c;
            } else {
                self.activities[row] -= c;
            }
            self.update_feasibility(row);
        }
        self.n_operations += self.by_var[var.idx()].len() as u64;
    }

    fn update_feasibility(&mut self, row: usize) {
        let holds = self.rows[row].holds(self.activities[row]);
        match (holds, self.infeasible_pos[row]) {
            (false, None) => {
                self.infeasible_pos[row] = Some(self.infeasible.len());
                self.infeasible.push(row);
            }
            (true, Some(pos)) => {
                self.infeasible.swap_remove(pos);
                if let Some(&moved) = self.infeasible.get(pos) {
                    self.infeasible_pos[moved] = Some(pos);
                }
                self.infeasible_pos[row] = None;
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{lit, types::Var};

    use super::{FeasibilityMaintainer, OBJECTIVE_ROW};
    use crate::types::{LinearConstraint, LinearObjective, Problem};

    fn knapsack() -> Problem {
        let mut prob = Problem::new(3);
        prob.add_constraint(LinearConstraint::at_most(
            vec![(lit![0], 3), (lit![1], 2), (lit![2], 2)],
            4,
        ));
        prob.set_objective(LinearObjective::maximize(vec![
            (lit![0], 5),
            (lit![1], 3),
            (lit![2], 3),
        ]));
        prob
    }

    #[test]
    fn undo_restores_activities() {
        let prob = knapsack();
        let mut maint = FeasibilityMaintainer::new(&prob);
        maint.set_reference(&[false, true, false], -4);
        assert_eq!(maint.infeasible_rows(), &[OBJECTIVE_ROW]);
        maint.add_backtracking_level();
        maint.assign(&[lit![0]]);
        assert_eq!(maint.activity(OBJECTIVE_ROW), -8);
        assert_eq!(maint.infeasible_rows(), &[1]);
        maint.add_backtracking_level();
        maint.assign(&[!lit![1]]);
        assert!(maint.is_feasible());
        maint.backtrack_one_level();
        assert_eq!(maint.infeasible_rows(), &[1]);
        maint.backtrack_all();
        assert_eq!(maint.assignment(), &[false, true, false]);
        assert_eq!(maint.activity(1), 2);
        assert_eq!(maint.infeasible_rows(), &[OBJECTIVE_ROW]);
    }

    #[test]
    fn one_flip_repairs() {
        let prob = knapsack();
        let mut maint = FeasibilityMaintainer::new(&prob);
        maint.set_reference(&[false, true, false], -4);
        // flipping x0 or x2 improves the objective, x2 keeps the knapsack
        assert!(maint.flip_repairs(OBJECTIVE_ROW, 0));
        assert!(!maint.flip_repairs(OBJECTIVE_ROW, 1));
        assert!(maint.flip_repairs(OBJECTIVE_ROW, 2));
        assert_eq!(maint.potential_one_flip_repairs(), vec![lit![2]]);
        assert!(!maint.value(Var::new(2)));
    }
}
