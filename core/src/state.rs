//! # Shared Problem State
//!
//! The [`ProblemState`] is the single source of truth the optimizers
//! synchronize against. It only changes through
//! [`ProblemState::merge_learned_info`] and the two marking functions, each
//! of which bumps the update stamp.

use rustsat::types::{Lit, RsHashSet, Var};

use crate::types::{Problem, Solution};

/// Stamp of a freshly created state
pub const INITIAL_STAMP: u64 = 0;

/// Information learned by a single optimizer call
#[derive(Clone, Debug, PartialEq)]
pub struct LearnedInfo {
    /// Literals that hold in every solution that improves on the incumbent
    pub fixed_literals: Vec<Lit>,
    pub solution: Option<Solution>,
    pub lower_bound: i64,
    /// Fractional values of the LP relaxation, one per variable
    pub lp_values: Vec<f64>,
    pub binary_clauses: Vec<(Lit, Lit)>,
}

impl Default for LearnedInfo {
    fn default() -> Self {
        LearnedInfo {
            fixed_literals: vec![],
            solution: None,
            lower_bound: i64::MIN,
            lp_values: vec![],
            binary_clauses: vec![],
        }
    }
}

impl LearnedInfo {
    pub fn clear(&mut self) {
        *self = LearnedInfo::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == LearnedInfo::default()
    }
}

/// The state of the problem as known to all optimizers
#[derive(Clone, Debug)]
pub struct ProblemState {
    problem: Problem,
    relative_gap_limit: f64,
    is_fixed: Vec<bool>,
    fixed_values: Vec<bool>,
    lp_values: Vec<f64>,
    solution: Solution,
    assignment_preference: Vec<bool>,
    lower_bound: i64,
    upper_bound: i64,
    binary_clauses: Vec<(Lit, Lit)>,
    binary_clause_set: RsHashSet<(Lit, Lit)>,
    update_stamp: u64,
}

impl ProblemState {
    pub fn new(problem: Problem, relative_gap_limit: f64) -> Self {
        let n_vars = problem.n_vars();
        let lower_bound = problem
            .vars()
            .map(|v| std::cmp::min(problem.var_cost(v, false), problem.var_cost(v, true)))
            .fold(0i64, |sum, c| sum.saturating_add(c));
        ProblemState {
            solution: Solution::new(&problem),
            problem,
            relative_gap_limit,
            is_fixed: vec![false; n_vars],
            fixed_values: vec![false; n_vars],
            lp_values: vec![],
            assignment_preference: vec![],
            lower_bound,
            upper_bound: i64::MAX,
            binary_clauses: vec![],
            binary_clause_set: RsHashSet::default(),
            update_stamp: INITIAL_STAMP,
        }
    }

    /// Creates a state and folds in previously learned information
    pub fn with_learned_info(
        problem: Problem,
        relative_gap_limit: f64,
        info: &LearnedInfo,
    ) -> Self {
        let mut state = Self::new(problem, relative_gap_limit);
        state.merge_learned_info(info);
        state
    }

    /// Everything this state knows as a single bundle
    pub fn learned_info(&self) -> LearnedInfo {
        LearnedInfo {
            fixed_literals: self.fixed_literals().collect(),
            solution: if self.solution.is_feasible() {
                Some(self.solution.clone())
            } else {
                None
            },
            lower_bound: self.lower_bound,
            lp_values: self.lp_values.clone(),
            binary_clauses: self.binary_clauses.clone(),
        }
    }

    /// Folds an optimizer's learned information into the state, returning
    /// whether anything changed
    pub fn merge_learned_info(&mut self, info: &LearnedInfo) -> bool {
        if self.is_infeasible() {
            return false;
        }
        let old_lb = self.lower_bound;
        let old_ub = self.upper_bound;

        let new_lp_values = !info.lp_values.is_empty() && info.lp_values != self.lp_values;
        if new_lp_values {
            assert_eq!(info.lp_values.len(), self.problem.n_vars());
            self.lp_values.clone_from(&info.lp_values);
        }

        let n_clauses = self.binary_clauses.len();
        for &(a, b) in &info.binary_clauses {
            if a.var().idx() >= self.problem.n_vars() || b.var().idx() >= self.problem.n_vars() {
                continue;
            }
            let cl = if a <= b { (a, b) } else { (b, a) };
            if self.binary_clause_set.insert(cl) {
                self.binary_clauses.push(cl);
            }
        }
        let new_binary_clauses = self.binary_clauses.len() > n_clauses;

        let mut new_solution = false;
        if let Some(sol) = &info.solution {
            if sol.is_feasible()
                && (!self.solution.is_feasible() || sol.cost() < self.solution.cost())
            {
                assert!(
                    self.problem.is_feasible(sol.values()),
                    "solution marked feasible violates a constraint"
                );
                debug_assert_eq!(sol.cost(), self.problem.cost(sol.values()));
                self.solution = sol.clone();
                new_solution = true;
            }
        }

        // A bound above the incumbent proves it optimal
        let lb = if self.solution.is_feasible() {
            std::cmp::min(info.lower_bound, self.solution.cost())
        } else {
            info.lower_bound
        };
        if lb > self.lower_bound {
            self.lower_bound = lb;
        }

        if self.solution.is_feasible() && self.solution.cost() < self.upper_bound {
            self.upper_bound = self.solution.cost();
        }

        let mut n_fixed = 0;
        for &lit in &info.fixed_literals {
            let var = lit.var().idx();
            let value = lit.is_pos();
            if self.is_fixed[var] {
                if self.fixed_values[var] != value {
                    // No solution improves on the incumbent
                    if self.solution.is_feasible() {
                        self.mark_as_optimal();
                    } else {
                        self.mark_as_infeasible();
                    }
                    return true;
                }
            } else {
                self.is_fixed[var] = true;
                self.fixed_values[var] = value;
                n_fixed += 1;
            }
        }

        if self.solution.is_feasible() && !self.is_optimal() && self.gap_is_closed() {
            self.mark_as_optimal();
            return true;
        }

        let changed = new_lp_values
            || new_binary_clauses
            || new_solution
            || self.lower_bound != old_lb
            || self.upper_bound != old_ub
            || n_fixed > 0;
        if changed {
            self.update_stamp += 1;
        }
        assert!(
            !self.solution.is_feasible() || self.lower_bound <= self.upper_bound,
            "merge produced an inverted bound gap"
        );
        changed
    }

    fn gap_is_closed(&self) -> bool {
        if self.lower_bound >= self.upper_bound {
            return true;
        }
        let gap = (self.upper_bound as f64) - (self.lower_bound as f64);
        let scale = (self.upper_bound as f64)
            .abs()
            .max((self.lower_bound as f64).abs());
        gap <= self.relative_gap_limit * scale
    }

    /// Closes the gap, the current solution must be feasible
    pub fn mark_as_optimal(&mut self) {
        assert!(self.solution.is_feasible());
        self.upper_bound = self.solution.cost();
        self.lower_bound = self.upper_bound;
        self.update_stamp += 1;
    }

    /// Inverts the bound gap
    pub fn mark_as_infeasible(&mut self) {
        if self.upper_bound == i64::MAX {
            self.upper_bound = self.lower_bound.saturating_sub(1);
        } else {
            self.lower_bound = self.upper_bound + 1;
        }
        self.update_stamp += 1;
    }

    pub fn is_optimal(&self) -> bool {
        self.solution.is_feasible() && self.solution.cost() == self.lower_bound
    }

    pub fn is_infeasible(&self) -> bool {
        self.lower_bound > self.upper_bound
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn lower_bound(&self) -> i64 {
        self.lower_bound
    }

    pub fn upper_bound(&self) -> i64 {
        self.upper_bound
    }

    pub fn lp_values(&self) -> &[f64] {
        &self.lp_values
    }

    pub fn update_stamp(&self) -> u64 {
        self.update_stamp
    }

    pub fn relative_gap_limit(&self) -> f64 {
        self.relative_gap_limit
    }

    pub fn is_fixed(&self, var: Var) -> bool {
        self.is_fixed[var.idx()]
    }

    pub fn fixed_value(&self, var: Var) -> bool {
        self.fixed_values[var.idx()]
    }

    pub fn n_fixed_vars(&self) -> usize {
        self.is_fixed.iter().filter(|&&f| f).count()
    }

    pub fn fixed_literals(&self) -> impl Iterator<Item = Lit> + '_ {
        self.is_fixed
            .iter()
            .zip(&self.fixed_values)
            .enumerate()
            .filter(|(_, (&fixed, _))| fixed)
            .map(|(idx, (_, &val))| {
                let var = Var::new(idx as u32);
                if val {
                    var.pos_lit()
                } else {
                    var.neg_lit()
                }
            })
    }

    /// Learned binary clauses, in the order they were added
    pub fn binary_clauses(&self) -> &[(Lit, Lit)] {
        &self.binary_clauses
    }

    /// Preferred values given by the user, empty if none
    pub fn assignment_preference(&self) -> &[bool] {
        &self.assignment_preference
    }

    pub fn set_assignment_preference(&mut self, preference: Vec<bool>) {
        assert_eq!(preference.len(), self.problem.n_vars());
        self.assignment_preference = preference;
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::{LearnedInfo, ProblemState, INITIAL_STAMP};
    use crate::types::{LinearConstraint, LinearObjective, Problem, Solution};

    fn at_most_two() -> Problem {
        let mut prob = Problem::new(3);
        prob.add_constraint(LinearConstraint::at_most(
            vec![(lit![0], 1), (lit![1], 1), (lit![2], 1)],
            2,
        ));
        prob.set_objective(LinearObjective::maximize(vec![
            (lit![0], 1),
            (lit![1], 1),
            (lit![2], 1),
        ]));
        prob
    }

    fn sol(prob: &Problem, values: &[bool]) -> Solution {
        Solution::checked(prob, values.to_vec())
    }

    #[test]
    fn bounds_are_monotone() {
        let prob = at_most_two();
        let mut state = ProblemState::new(prob.clone(), 0.);
        assert_eq!(state.lower_bound(), -3);
        assert_eq!(state.upper_bound(), i64::MAX);

        let infos = [
            LearnedInfo {
                solution: Some(sol(&prob, &[true, false, false])),
                ..Default::default()
            },
            LearnedInfo {
                lower_bound: -5,
                ..Default::default()
            },
            LearnedInfo {
                solution: Some(sol(&prob, &[false, false, false])),
                ..Default::default()
            },
            LearnedInfo {
                solution: Some(sol(&prob, &[true, true, false])),
                ..Default::default()
            },
            LearnedInfo {
                solution: Some(sol(&prob, &[true, false, true])),
                lower_bound: -2,
                ..Default::default()
            },
            LearnedInfo {
                lower_bound: -1,
                ..Default::default()
            },
        ];
        let (mut lb, mut ub) = (state.lower_bound(), state.upper_bound());
        for info in &infos {
            state.merge_learned_info(info);
            assert!(state.lower_bound() >= lb);
            assert!(state.upper_bound() <= ub);
            lb = state.lower_bound();
            ub = state.upper_bound();
        }
        assert!(state.is_optimal());
        assert_eq!(state.upper_bound(), -2);
        assert_eq!(state.lower_bound(), -2);
        assert_eq!(state.solution().values(), &[true, true, false]);
    }

    #[test]
    fn infeasible_solutions_are_ignored() {
        let prob = at_most_two();
        let mut state = ProblemState::new(prob.clone(), 0.);
        let changed = state.merge_learned_info(&LearnedInfo {
            solution: Some(Solution::from_values(&prob, vec![true; 3])),
            ..Default::default()
        });
        assert!(!changed);
        assert_eq!(state.update_stamp(), INITIAL_STAMP);
        assert!(!state.solution().is_feasible());
    }

    #[test]
    fn parity_conflict() {
        let mut state = ProblemState::new(at_most_two(), 0.);
        assert!(state.merge_learned_info(&LearnedInfo {
            fixed_literals: vec![lit![0]],
            ..Default::default()
        }));
        assert!(state.is_fixed(lit![0].var()));
        assert!(!state.is_infeasible());
        assert!(state.merge_learned_info(&LearnedInfo {
            fixed_literals: vec![!lit![0]],
            ..Default::default()
        }));
        assert!(state.is_infeasible());
        let (lb, ub, stamp) = (state.lower_bound(), state.upper_bound(), state.update_stamp());
        assert!(!state.merge_learned_info(&LearnedInfo {
            lower_bound: 5,
            ..Default::default()
        }));
        assert!(!state.merge_learned_info(&LearnedInfo::default()));
        assert_eq!(state.lower_bound(), lb);
        assert_eq!(state.upper_bound(), ub);
        assert_eq!(state.update_stamp(), stamp);
    }

    #[test]
    fn conflicting_fixings_prove_incumbent_optimal() {
        let prob = at_most_two();
        let mut state = ProblemState::new(prob.clone(), 0.);
        state.merge_learned_info(&LearnedInfo {
            solution: Some(sol(&prob, &[true, false, false])),
            ..Default::default()
        });
        state.merge_learned_info(&LearnedInfo {
            fixed_literals: vec![lit![0]],
            ..Default::default()
        });
        assert!(state.merge_learned_info(&LearnedInfo {
            fixed_literals: vec![!lit![0]],
            ..Default::default()
        }));
        assert!(state.is_optimal());
        assert!(!state.is_infeasible());
        assert_eq!(state.lower_bound(), -1);
        assert_eq!(state.upper_bound(), -1);

        let stamp = state.update_stamp();
        assert!(!state.merge_learned_info(&LearnedInfo::default()));
        assert_eq!(state.lower_bound(), -1);
        assert_eq!(state.upper_bound(), -1);
        assert_eq!(state.update_stamp(), stamp);
    }

    #[test]
    fn binary_clauses_are_deduplicated() {
        let mut state = ProblemState::new(at_most_two(), 0.);
        assert!(state.merge_learned_info(&LearnedInfo {
            binary_clauses: vec![(lit![0], !lit![1]), (!lit![1], lit![0])],
            ..Default::default()
        }));
        assert_eq!(state.binary_clauses().len(), 1);
        let stamp = state.update_stamp();
        assert!(!state.merge_learned_info(&LearnedInfo {
            binary_clauses: vec![(!lit![1], lit![0])],
            ..Default::default()
        }));
        assert_eq!(state.update_stamp(), stamp);
    }

    #[test]
    fn relative_gap_closes() {
        let prob = at_most_two();
        let mut state = ProblemState::new(prob.clone(), 0.6);
        state.merge_learned_info(&LearnedInfo {
            solution: Some(sol(&prob, &[true, false, false])),
            ..Default::default()
        });
        assert!(!state.is_optimal());
        state.merge_learned_info(&LearnedInfo {
            lower_bound: -2,
            ..Default::default()
        });
        assert!(state.is_optimal());
        assert_eq!(state.lower_bound(), state.upper_bound());
    }

    #[test]
    fn learned_info_round_trip() {
        let prob = at_most_two();
        let mut state = ProblemState::new(prob.clone(), 0.);
        state.merge_learned_info(&LearnedInfo {
            fixed_literals: vec![!lit![2]],
            solution: Some(sol(&prob, &[true, false, false])),
            lower_bound: -2,
            lp_values: vec![1., 1., 0.],
            binary_clauses: vec![(lit![0], lit![1])],
        });
        let copy = ProblemState::with_learned_info(prob, 0., &state.learned_info());
        assert_eq!(copy.lower_bound(), state.lower_bound());
        assert_eq!(copy.upper_bound(), state.upper_bound());
        assert_eq!(copy.solution(), state.solution());
        assert_eq!(copy.lp_values(), state.lp_values());
        assert_eq!(copy.binary_clauses(), state.binary_clauses());
        assert_eq!(copy.fixed_literals().collect::<Vec<_>>(), vec![!lit![2]]);
    }
}
