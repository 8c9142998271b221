//! # Problem and Solution Types
//!
//! Variables are [`rustsat::types::Var`] handles and literals are
//! [`rustsat::types::Lit`], so the same index space is shared with the
//! propagation oracles. Constraints are addressed by [`ConstraintIndex`].

use std::{cmp, fmt};

use rustsat::{
    instances::ManageVars,
    types::{Lit, Var},
};

/// Errors that make a [`Problem`] invalid
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("constraint {0} has lower bound {1} above its upper bound {2}")]
    EmptyRange(ConstraintIndex, i64, i64),
    #[error("literal {lit} is out of range for a problem with {n_vars} variables")]
    LitOutOfRange { lit: Lit, n_vars: usize },
    #[error("variable {var} appears more than once in {location}")]
    RepeatedVariable { var: Var, location: String },
    #[error("the coefficients of {0} overflow a 64 bit integer")]
    Overflow(String),
    #[error("the objective coefficients cannot be scaled to integers")]
    UnscalableObjective,
    #[error("got {0} variable names for {1} variables")]
    NameCount(usize, usize),
}

/// Typed index of a constraint in a [`Problem`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintIndex(u32);

impl ConstraintIndex {
    pub const fn new(idx: usize) -> Self {
        ConstraintIndex(idx as u32)
    }

    pub const fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ConstraintIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A linear constraint `lb <= sum(coeff * lit) <= ub` over literals
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LinearConstraint {
    terms: Vec<(Lit, i64)>,
    lb: Option<i64>,
    ub: Option<i64>,
}

impl LinearConstraint {
    pub fn new(terms: Vec<(Lit, i64)>, lb: Option<i64>, ub: Option<i64>) -> Self {
        LinearConstraint { terms, lb, ub }
    }

    pub fn at_most(terms: Vec<(Lit, i64)>, ub: i64) -> Self {
        Self::new(terms, None, Some(ub))
    }

    pub fn at_least(terms: Vec<(Lit, i64)>, lb: i64) -> Self {
        Self::new(terms, Some(lb), None)
    }

    pub fn equal(terms: Vec<(Lit, i64)>, rhs: i64) -> Self {
        Self::new(terms, Some(rhs), Some(rhs))
    }

    /// A clause, i.e., at least one of the literals must be true
    pub fn clause<I: IntoIterator<Item = Lit>>(lits: I) -> Self {
        Self::at_least(lits.into_iter().map(|l| (l, 1)).collect(), 1)
    }

    pub fn terms(&self) -> &[(Lit, i64)] {
        &self.terms
    }

    pub fn lb(&self) -> Option<i64> {
        self.lb
    }

    pub fn ub(&self) -> Option<i64> {
        self.ub
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The value of the left-hand side under a full assignment
    pub fn activity(&self, values: &[bool]) -> i64 {
        self.terms
            .iter()
            .filter(|(l, _)| lit_value(*l, values))
            .map(|(_, c)| *c)
            .sum()
    }

    pub fn is_satisfied(&self, values: &[bool]) -> bool {
        let act = self.activity(values);
        self.lb.is_none_or(|lb| act >= lb) && self.ub.is_none_or(|ub| act <= ub)
    }

    /// The constraint as (at most two) rows `sum(w * l) <= b` with positive
    /// weights. A negative `b` means the row can never be satisfied. Bounds
    /// outside of the reachable activity are clamped to `-1` or the weight sum.
    pub fn normalized(&self) -> Vec<(Vec<(Lit, u64)>, i64)> {
        let mut rows = vec![];
        if let Some(ub) = self.ub {
            rows.push(normalize_row(
                self.terms.iter().map(|&(l, c)| (l, i128::from(c))),
                i128::from(ub),
            ));
        }
        if let Some(lb) = self.lb {
            rows.push(normalize_row(
                self.terms.iter().map(|&(l, c)| (l, -i128::from(c))),
                -i128::from(lb),
            ));
        }
        rows
    }

    /// Smallest and largest possible activity
    pub fn activity_range(&self) -> (i64, i64) {
        self.terms.iter().fold((0, 0), |(min, max), (_, c)| {
            if *c < 0 {
                (min + c, max)
            } else {
                (min, max + c)
            }
        })
    }
}

fn normalize_row<I: Iterator<Item = (Lit, i128)>>(
    terms: I,
    mut bound: i128,
) -> (Vec<(Lit, u64)>, i64) {
    let mut total: i128 = 0;
    let lits: Vec<_> = terms
        .filter(|(_, c)| *c != 0)
        .map(|(l, c)| {
            // |c| fits u64 since c comes from an i64
            let w = c.unsigned_abs() as u64;
            total += i128::from(w);
            if c < 0 {
                bound -= c;
                (!l, w)
            } else {
                (l, w)
            }
        })
        .collect();
    let max = total.min(i128::from(i64::MAX));
    let bound = i64::try_from(bound.clamp(-1, max)).unwrap_or(i64::MAX);
    (lits, bound)
}

/// A linear objective to minimize
///
/// The true cost of an internal integer cost `c` is
/// `scaling_factor * (c + offset)`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearObjective {
    terms: Vec<(Lit, i64)>,
    offset: i64,
    scaling_factor: f64,
}

impl Default for LinearObjective {
    fn default() -> Self {
        LinearObjective {
            terms: vec![],
            offset: 0,
            scaling_factor: 1.,
        }
    }
}

impl LinearObjective {
    pub fn minimize(terms: Vec<(Lit, i64)>) -> Self {
        LinearObjective {
            terms,
            ..Default::default()
        }
    }

    /// Builds an objective to maximize by negating it internally
    pub fn maximize(terms: Vec<(Lit, i64)>) -> Self {
        LinearObjective {
            terms: terms.into_iter().map(|(l, c)| (l, -c)).collect(),
            offset: 0,
            scaling_factor: -1.,
        }
    }

    /// Sets the offset in terms of the user objective
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = if self.scaling_factor < 0. {
            -offset
        } else {
            offset
        };
        self
    }

    /// Builds an objective from fractional coefficients by scaling with the
    /// smallest power of ten that makes all coefficients integral
    pub fn from_float_terms(
        terms: Vec<(Lit, f64)>,
        offset: f64,
        maximize: bool,
    ) -> Result<Self, Error> {
        const MAX_EXPONENT: i32 = 9;
        const TOLERANCE: f64 = 1e-6;
        let sign = if maximize { -1. } else { 1. };
        for exp in 0..=MAX_EXPONENT {
            let mult = 10f64.powi(exp);
            let integral = |val: f64| {
                let scaled = val * mult;
                (scaled - scaled.round()).abs() <= TOLERANCE && scaled.abs() < i64::MAX as f64 / 2.
            };
            if !terms.iter().all(|(_, c)| integral(*c)) || !integral(offset) {
                continue;
            }
            return Ok(LinearObjective {
                terms: terms
                    .iter()
                    .map(|(l, c)| (*l, (sign * c * mult).round() as i64))
                    .collect(),
                offset: (sign * offset * mult).round() as i64,
                scaling_factor: sign / mult,
            });
        }
        Err(Error::UnscalableObjective)
    }

    pub fn terms(&self) -> &[(Lit, i64)] {
        &self.terms
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }

    /// Converts an internal cost into the user's objective value
    pub fn scaled(&self, cost: i64) -> f64 {
        self.scaling_factor * (cost as f64 + self.offset as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Normalizes the objective to positive weights, returning the literals
    /// with their weight and the constant offset that the normalization
    /// introduces
    pub fn normalized(&self) -> (Vec<(Lit, u64)>, i64) {
        let mut offset = 0;
        let lits = self
            .terms
            .iter()
            .filter(|(_, c)| *c != 0)
            .map(|&(l, c)| {
                if c < 0 {
                    offset += c;
                    (!l, c.unsigned_abs())
                } else {
                    (l, c as u64)
                }
            })
            .collect();
        (lits, offset)
    }
}

/// An immutable pseudo-Boolean optimization problem
#[derive(Clone, Debug, PartialEq)]
pub struct Problem {
    n_vars: usize,
    names: Vec<String>,
    constraints: Vec<LinearConstraint>,
    objective: LinearObjective,
    /// Per variable, the cost contribution when assigned false and true
    var_costs: Vec<(i64, i64)>,
}

impl Problem {
    pub fn new(n_vars: usize) -> Self {
        Problem {
            n_vars,
            names: (0..n_vars).map(|i| format!("x{}", i + 1)).collect(),
            constraints: vec![],
            objective: LinearObjective::default(),
            var_costs: vec![(0, 0); n_vars],
        }
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }

    pub fn add_constraint(&mut self, constr: LinearConstraint) -> ConstraintIndex {
        self.constraints.push(constr);
        ConstraintIndex::new(self.constraints.len() - 1)
    }

    pub fn set_objective(&mut self, objective: LinearObjective) {
        self.var_costs = vec![(0, 0); self.n_vars];
        for &(l, c) in objective.terms() {
            let Some(vc) = self.var_costs.get_mut(l.var().idx()) else {
                continue;
            };
            if l.is_pos() {
                vc.1 = vc.1.saturating_add(c);
            } else {
                vc.0 = vc.0.saturating_add(c);
            }
        }
        self.objective = objective;
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    pub fn n_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn vars(&self) -> impl Iterator<Item = Var> {
        (0..self.n_vars as u32).map(Var::new)
    }

    pub fn var_name(&self, var: Var) -> &str {
        &self.names[var.idx()]
    }

    pub fn constraint(&self, idx: ConstraintIndex) -> &LinearConstraint {
        &self.constraints[idx.idx()]
    }

    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintIndex, &LinearConstraint)> {
        self.constraints
            .iter()
            .enumerate()
            .map(|(idx, c)| (ConstraintIndex::new(idx), c))
    }

    pub fn objective(&self) -> &LinearObjective {
        &self.objective
    }

    /// The cost a variable contributes when assigned `value`
    pub fn var_cost(&self, var: Var, value: bool) -> i64 {
        let (f, t) = self.var_costs[var.idx()];
        if value {
            t
        } else {
            f
        }
    }

    /// Internal cost of a full assignment
    pub fn cost(&self, values: &[bool]) -> i64 {
        values
            .iter()
            .zip(&self.var_costs)
            .map(|(&v, &(f, t))| if v { t } else { f })
            .sum()
    }

    /// Checks every constraint from scratch
    pub fn is_feasible(&self, values: &[bool]) -> bool {
        values.len() == self.n_vars && self.constraints.iter().all(|c| c.is_satisfied(values))
    }

    /// Checks that the problem is well formed
    pub fn validate(&self) -> Result<(), Error> {
        if self.names.len() != self.n_vars {
            return Err(Error::NameCount(self.names.len(), self.n_vars));
        }
        let check_terms = |terms: &[(Lit, i64)], location: &dyn Fn() -> String| {
            let mut seen = vec![false; self.n_vars];
            let mut abs_sum: i64 = 0;
            for &(l, c) in terms {
                if l.var().idx() >= self.n_vars {
                    return Err(Error::LitOutOfRange {
                        lit: l,
                        n_vars: self.n_vars,
                    });
                }
                if std::mem::replace(&mut seen[l.var().idx()], true) {
                    return Err(Error::RepeatedVariable {
                        var: l.var(),
                        location: location(),
                    });
                }
                abs_sum = abs_sum
                    .checked_add(c.checked_abs().ok_or_else(|| Error::Overflow(location()))?)
                    .ok_or_else(|| Error::Overflow(location()))?;
            }
            Ok(())
        };
        for (idx, constr) in self.constraints() {
            if let (Some(lb), Some(ub)) = (constr.lb, constr.ub) {
                if lb > ub {
                    return Err(Error::EmptyRange(idx, lb, ub));
                }
            }
            check_terms(constr.terms(), &|| format!("constraint {idx}"))?;
        }
        check_terms(self.objective.terms(), &|| String::from("the objective"))?;
        if !self.objective.scaling_factor.is_finite() || self.objective.scaling_factor == 0. {
            return Err(Error::UnscalableObjective);
        }
        Ok(())
    }
}

/// Value of a literal under a full assignment
#[inline]
pub fn lit_value(lit: Lit, values: &[bool]) -> bool {
    values[lit.var().idx()] != lit.is_neg()
}

/// A full assignment with its cost
///
/// The feasibility flag is only set once a search strategy asserts it via
/// [`Solution::check_feasibility`]. Any change to the assignment clears it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    values: Vec<bool>,
    cost: i64,
    feasible: bool,
}

impl Solution {
    /// The all-false assignment
    pub fn new(problem: &Problem) -> Self {
        Self::from_values(problem, vec![false; problem.n_vars()])
    }

    pub fn from_values(problem: &Problem, values: Vec<bool>) -> Self {
        debug_assert_eq!(values.len(), problem.n_vars());
        Solution {
            cost: problem.cost(&values),
            values,
            feasible: false,
        }
    }

    /// Builds a solution and immediately checks its feasibility
    pub fn checked(problem: &Problem, values: Vec<bool>) -> Self {
        let mut sol = Self::from_values(problem, values);
        sol.check_feasibility(problem);
        sol
    }

    pub fn value(&self, var: Var) -> bool {
        self.values[var.idx()]
    }

    pub fn lit_value(&self, lit: Lit) -> bool {
        lit_value(lit, &self.values)
    }

    pub fn set_value(&mut self, problem: &Problem, var: Var, value: bool) {
        let old = std::mem::replace(&mut self.values[var.idx()], value);
        if old != value {
            self.cost += problem.var_cost(var, value) - problem.var_cost(var, old);
            self.feasible = false;
        }
    }

    pub fn values(&self) -> &[bool] {
        &self.values
    }

    pub fn cost(&self) -> i64 {
        self.cost
    }

    pub fn is_feasible(&self) -> bool {
        self.feasible
    }

    /// Recomputes the feasibility flag from the constraints
    pub fn check_feasibility(&mut self, problem: &Problem) -> bool {
        self.feasible = problem.is_feasible(&self.values);
        self.feasible
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The assignment as literals that are true
    pub fn lits(&self) -> impl Iterator<Item = Lit> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(idx, &val)| {
                let var = Var::new(idx as u32);
                if val {
                    var.pos_lit()
                } else {
                    var.neg_lit()
                }
            })
    }
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v")?;
        for (idx, &val) in self.values.iter().enumerate() {
            if val {
                write!(f, " x{}", idx + 1)?;
            } else {
                write!(f, " -x{}", idx + 1)?;
            }
        }
        writeln!(f)
    }
}

/// Variable manager handing out auxiliary variables above the problem
/// variables
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarManager {
    next_var: Var,
    max_orig_var: Option<Var>,
}

impl VarManager {
    pub fn new(n_orig_vars: usize) -> Self {
        VarManager {
            next_var: Var::new(n_orig_vars as u32),
            max_orig_var: n_orig_vars.checked_sub(1).map(|v| Var::new(v as u32)),
        }
    }

    pub fn max_orig_var(&self) -> Option<Var> {
        self.max_orig_var
    }
}

impl ManageVars for VarManager {
    fn new_var(&mut self) -> Var {
        let v = self.next_var;
        self.next_var += 1;
        v
    }

    fn max_var(&self) -> Option<Var> {
        if self.next_var == Var::new(0) {
            None
        } else {
            Some(self.next_var - 1)
        }
    }

    fn increase_next_free(&mut self, v: Var) -> bool {
        if v > self.next_var {
            self.next_var = v;
            return true;
        };
        false
    }

    fn combine(&mut self, other: Self) {
        if other.next_var > self.next_var {
            self.next_var = other.next_var;
        };
    }

    fn n_used(&self) -> u32 {
        self.next_var.idx32()
    }

    fn forget_from(&mut self, min_var: Var) {
        let min_var = match self.max_orig_var {
            Some(max) => cmp::max(min_var, max + 1),
            None => min_var,
        };
        self.next_var = cmp::min(self.next_var, min_var);
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::*;

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
    fn incremental_cost() {
        let prob = knapsack();
        let mut sol = Solution::new(&prob);
        assert_eq!(sol.cost(), 0);
        sol.set_value(&prob, Var::new(0), true);
        assert_eq!(sol.cost(), -5);
        sol.set_value(&prob, Var::new(1), true);
        assert_eq!(sol.cost(), prob.cost(sol.values()));
        assert!(!sol.is_feasible());
        assert!(!sol.check_feasibility(&prob));
        sol.set_value(&prob, Var::new(0), false);
        assert!(sol.check_feasibility(&prob));
        assert_eq!(prob.objective().scaled(sol.cost()), 3.);
    }

    #[test]
    fn negative_literal_costs() {
        let mut prob = Problem::new(2);
        prob.set_objective(
            LinearObjective::minimize(vec![(!lit![0], 4), (lit![1], -2)]).with_offset(1),
        );
        let sol = Solution::new(&prob);
        assert_eq!(sol.cost(), 4);
        let (lits, offset) = prob.objective().normalized();
        assert_eq!(lits, vec![(!lit![0], 4), (!lit![1], 2)]);
        assert_eq!(offset, -2);
        assert_eq!(prob.objective().scaled(4), 5.);
    }

    #[test]
    fn normalized_rows() {
        let constr = LinearConstraint::new(vec![(lit![0], 2), (lit![1], -3)], Some(-1), Some(1));
        let rows = constr.normalized();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (vec![(lit![0], 2), (!lit![1], 3)], 4));
        assert_eq!(rows[1], (vec![(!lit![0], 2), (lit![1], 3)], 3));
        for values in [[false, false], [true, false], [false, true], [true, true]] {
            let rows_hold = rows.iter().all(|(lits, bound)| {
                lits.iter()
                    .filter(|(l, _)| lit_value(*l, &values))
                    .map(|(_, w)| *w as i64)
                    .sum::<i64>()
                    <= *bound
            });
            assert_eq!(rows_hold, constr.is_satisfied(&values));
        }
    }

    #[test]
    fn extreme_bounds_saturate() {
        let constr = LinearConstraint::at_most(vec![(lit![0], -1)], i64::MAX);
        assert_eq!(constr.normalized(), vec![(vec![(!lit![0], 1)], 1)]);
        let constr = LinearConstraint::new(vec![(lit![0], 1)], Some(i64::MIN), None);
        assert_eq!(constr.normalized(), vec![(vec![(!lit![0], 1)], 1)]);
        let constr = LinearConstraint::at_least(vec![(lit![0], 2)], i64::MAX);
        assert_eq!(constr.normalized(), vec![(vec![(!lit![0], 2)], -1)]);
        let constr = LinearConstraint::at_most(vec![(lit![0], 2), (lit![1], 3)], i64::MIN);
        assert_eq!(constr.normalized()[0].1, -1);
        for values in [[false, false], [true, false], [false, true], [true, true]] {
            assert!(!constr.is_satisfied(&values));
        }
    }

    #[test]
    fn validation() {
        assert!(knapsack().validate().is_ok());
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::new(vec![(lit![0], 1)], Some(2), Some(1)));
        assert_eq!(
            prob.validate(),
            Err(Error::EmptyRange(ConstraintIndex::new(0), 2, 1))
        );
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::clause([lit![0], lit![2]]));
        assert!(matches!(prob.validate(), Err(Error::LitOutOfRange { .. })));
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::clause([lit![0], !lit![0]]));
        assert!(matches!(
            prob.validate(),
            Err(Error::RepeatedVariable { .. })
        ));
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::at_most(
            vec![(lit![0], i64::MAX), (lit![1], 1)],
            1,
        ));
        assert!(matches!(prob.validate(), Err(Error::Overflow(_))));
    }

    #[test]
    fn float_objective_scaling() {
        let obj =
            LinearObjective::from_float_terms(vec![(lit![0], 0.5), (lit![1], 1.25)], 0.1, false)
                .unwrap();
        assert_eq!(obj.terms(), &[(lit![0], 50), (lit![1], 125)]);
        assert_eq!(obj.offset(), 10);
        assert!((obj.scaled(175) - 1.85).abs() < 1e-9);
        assert_eq!(
            LinearObjective::from_float_terms(vec![(lit![0], std::f64::consts::PI)], 0., false),
            Err(Error::UnscalableObjective)
        );
    }

    #[test]
    fn var_manager_above_problem() {
        let mut vm = VarManager::new(3);
        assert_eq!(vm.new_var(), Var::new(3));
        assert_eq!(vm.max_var(), Some(Var::new(3)));
        vm.forget_from(Var::new(0));
        assert_eq!(vm.new_var(), Var::new(3));
    }
}
