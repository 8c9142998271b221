//! # Linear Relaxation
//!
//! Bounds the objective with the continuous relaxation of the problem solved
//! by [HiGHS](https://highs.dev), optionally tightened by strong branching.
//! The relaxation includes the learned binary clauses and a cut requiring
//! improvement on the incumbent, so an infeasible relaxation proves the
//! incumbent optimal.
//!
//! The HiGHS model is built once and then modified in place. New binary
//! clauses and tighter improvement cuts are added as rows, fixings change the
//! column bounds.

use highs::{Col, HighsModelStatus, Model, RowProblem, Sense};
use rustsat::types::{Lit, Var};

use crate::{
    optimizer::{exhausted_status, SearchStrategy, Status},
    options::Parameters,
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    types::Solution,
    Log,
};

/// Values this close to an integer are considered integral
const TOLERANCE: f64 = 1e-6;
/// Deterministic time charged per nonzero of the relaxation per solve
const DTIME_PER_NONZERO: f64 = 1e-7;

/// Outcome of solving one relaxation
enum LpResult {
    Optimal { objective: f64, values: Vec<f64> },
    Infeasible,
    Unknown,
}

/// The row `lb <= sum(a * l) <= ub` with negative literals substituted by
/// `1 - x`, `None` if the row is unbounded on both sides
fn linear_row(
    cols: &[Col],
    terms: &[(Lit, i64)],
    lb: Option<i64>,
    ub: Option<i64>,
) -> Option<(std::ops::RangeInclusive<f64>, Vec<(Col, f64)>)> {
    if lb.is_none() && ub.is_none() {
        return None;
    }
    let mut constant = 0.;
    let factors: Vec<(Col, f64)> = terms
        .iter()
        .map(|&(l, a)| {
            let a = a as f64;
            if l.is_neg() {
                constant += a;
                (cols[l.var().idx()], -a)
            } else {
                (cols[l.var().idx()], a)
            }
        })
        .collect();
    let lb = lb.map_or(f64::NEG_INFINITY, |lb| lb as f64 - constant);
    let ub = ub.map_or(f64::INFINITY, |ub| ub as f64 - constant);
    Some((lb..=ub, factors))
}

fn fixed_bounds(value: bool) -> (f64, f64) {
    if value {
        (1., 1.)
    } else {
        (0., 0.)
    }
}

pub struct LinearRelaxation {
    use_binary_clauses: bool,
    model: Option<Model>,
    cols: Vec<Col>,
    costs: Vec<f64>,
    obj_constant: f64,
    /// Bounds every column currently has in the model
    col_bounds: Vec<(f64, f64)>,
    /// Nonzeros of the model, charged on every solve
    nnz: usize,
    /// Number of learned binary clauses of the state already added
    n_binary_clauses: usize,
    /// Incumbent cost of the tightest improvement cut in the model
    cut_ub: Option<i64>,
    /// Stamp of the state the relaxation was last solved for
    solved_stamp: Option<u64>,
    /// Columns fixed by strong branching since the last synchronization
    fixed: Vec<Option<bool>>,
}

impl LinearRelaxation {
    pub fn new(params: &Parameters) -> Self {
        LinearRelaxation {
            use_binary_clauses: params.use_learned_binary_clauses_in_lp,
            model: None,
            cols: vec![],
            costs: vec![],
            obj_constant: 0.,
            col_bounds: vec![],
            nnz: 0,
            n_binary_clauses: 0,
            cut_ub: None,
            solved_stamp: None,
            fixed: vec![],
        }
    }

    /// Builds the model from the problem constraints
    fn load(&mut self, state: &ProblemState) {
        let problem = state.problem();
        let mut costs = vec![0.; problem.n_vars()];
        let mut obj_constant = 0.;
        for &(l, c) in problem.objective().terms() {
            let c = c as f64;
            if l.is_neg() {
                obj_constant += c;
                costs[l.var().idx()] -= c;
            } else {
                costs[l.var().idx()] += c;
            }
        }
        let mut lp = RowProblem::default();
        let cols: Vec<Col> = costs
            .iter()
            .map(|&cost| lp.add_column(cost, 0.0..=1.))
            .collect();
        let mut nnz = cols.len();
        for (_, constr) in problem.constraints() {
            if let Some((bounds, factors)) =
                linear_row(&cols, constr.terms(), constr.lb(), constr.ub())
            {
                nnz += factors.len();
                lp.add_row(bounds, factors);
            }
        }
        let mut model = lp.optimise(Sense::Minimise);
        model.set_option("output_flag", false);
        self.col_bounds = vec![(0., 1.); cols.len()];
        self.fixed = vec![None; cols.len()];
        self.model = Some(model);
        self.cols = cols;
        self.costs = costs;
        self.obj_constant = obj_constant;
        self.nnz = nnz;
        self.n_binary_clauses = 0;
        self.cut_ub = None;
    }

    fn add_row(&mut self, terms: &[(Lit, i64)], lb: Option<i64>, ub: Option<i64>) {
        let Some(model) = &mut self.model else {
            return;
        };
        if let Some((bounds, factors)) = linear_row(&self.cols, terms, lb, ub) {
            self.nnz += factors.len();
            model.add_row(bounds, factors);
        }
    }

    fn set_col_bounds(&mut self, var: Var, (lb, ub): (f64, f64)) -> anyhow::Result<()> {
        let idx = var.idx();
        if self.col_bounds[idx] == (lb, ub) {
            return Ok(());
        }
        let Some(model) = &mut self.model else {
            return Ok(());
        };
        let ret = unsafe {
            highs_sys::Highs_changeColBounds(
                model.as_mut_ptr(),
                idx as highs_sys::HighsInt,
                lb,
                ub,
            )
        };
        if ret == highs_sys::STATUS_ERROR {
            anyhow::bail!("HiGHS failed to change the bounds of column {idx}");
        }
        self.col_bounds[idx] = (lb, ub);
        Ok(())
    }

    /// Solves the model in its current form
    fn solve_lp(&mut self, time_limit: &mut TimeLimit) -> LpResult {
        let Some(mut model) = self.model.take() else {
            return LpResult::Unknown;
        };
        time_limit.advance_deterministic_time(self.nnz as f64 * DTIME_PER_NONZERO);
        model.set_option("time_limit", time_limit.time_left().max(0.));
        let solved = model.solve();
        let res = match solved.status() {
            HighsModelStatus::Optimal => {
                let values = solved.get_solution().columns().to_vec();
                let objective = self.obj_constant
                    + values
                        .iter()
                        .zip(&self.costs)
                        .map(|(val, cost)| val * cost)
                        .sum::<f64>();
                LpResult::Optimal { objective, values }
            }
            HighsModelStatus::Infeasible => LpResult::Infeasible,
            _ => LpResult::Unknown,
        };
        self.model = Some(Model::from(solved));
        res
    }

    /// Objective of the relaxation with `var` fixed, infinite if infeasible
    fn branch_objective(
        &mut self,
        var: Var,
        value: bool,
        time_limit: &mut TimeLimit,
    ) -> anyhow::Result<Option<f64>> {
        let old = self.col_bounds[var.idx()];
        self.set_col_bounds(var, fixed_bounds(value))?;
        let res = self.solve_lp(time_limit);
        self.set_col_bounds(var, old)?;
        Ok(match res {
            LpResult::Optimal { objective, .. } => Some(objective),
            LpResult::Infeasible => Some(f64::INFINITY),
            LpResult::Unknown => None,
        })
    }

    /// Tightens the bound by solving the relaxation with every fractional
    /// column fixed to both values. Columns whose branch cannot improve on
    /// the incumbent are fixed the other way and reported.
    fn strong_branching(
        &mut self,
        params: &Parameters,
        state: &ProblemState,
        values: &[f64],
        mut bound: f64,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
    ) -> anyhow::Result<Option<f64>> {
        let start = time_limit.elapsed_deterministic_time();
        for var in state.problem().vars() {
            if state.is_fixed(var) || self.fixed[var.idx()].is_some() {
                continue;
            }
            let val = values[var.idx()];
            if val.abs() < TOLERANCE || (val - 1.).abs() < TOLERANCE {
                continue;
            }
            let spent = time_limit.elapsed_deterministic_time() - start;
            if time_limit.limit_reached() || spent > params.lp_max_deterministic_time {
                break;
            }
            let Some(obj_false) = self.branch_objective(var, false, time_limit)? else {
                continue;
            };
            let Some(obj_true) = self.branch_objective(var, true, time_limit)? else {
                continue;
            };
            let fix = match (obj_false.is_finite(), obj_true.is_finite()) {
                (false, false) => return Ok(None),
                (false, true) => Some(true),
                (true, false) => Some(false),
                (true, true) => None,
            };
            if let Some(value) = fix {
                self.fixed[var.idx()] = Some(value);
                self.set_col_bounds(var, fixed_bounds(value))?;
                learned
                    .fixed_literals
                    .push(if value { var.pos_lit() } else { var.neg_lit() });
            }
            bound = bound.max(obj_false.min(obj_true));
        }
        Ok(Some(bound))
    }
}

impl SearchStrategy for LinearRelaxation {
    fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        let problem = state.problem();
        if self.model.is_none() || self.cols.len() != problem.n_vars() {
            self.load(state);
        }
        if self.use_binary_clauses {
            for &(a, b) in &state.binary_clauses()[self.n_binary_clauses..] {
                self.add_row(&[(a, 1), (b, 1)], Some(1), None);
            }
            self.n_binary_clauses = state.binary_clauses().len();
        }
        let ub = state.upper_bound();
        if ub != i64::MAX && self.cut_ub.is_none_or(|cut| ub < cut) {
            self.add_row(problem.objective().terms(), None, Some(ub - 1));
            self.cut_ub = Some(ub);
        }
        self.fixed.iter_mut().for_each(|fix| *fix = None);
        for var in problem.vars() {
            let bounds = if state.is_fixed(var) {
                fixed_bounds(state.fixed_value(var))
            } else {
                (0., 1.)
            };
            self.set_col_bounds(var, bounds)?;
        }
        Ok(Status::Continue)
    }

    fn should_be_run(&self, state: &ProblemState) -> bool {
        self.solved_stamp != Some(state.update_stamp())
    }

    fn optimize(
        &mut self,
        params: &Parameters,
        state: &ProblemState,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        if self.model.is_none() || self.fixed.len() != state.problem().n_vars() {
            self.synchronize(state)?;
        }
        self.solved_stamp = Some(state.update_stamp());
        log.log_routine_start("lp")?;
        let res = self.solve_lp(time_limit);
        log.log_routine_end()?;
        let (objective, values) = match res {
            LpResult::Optimal { objective, values } => (objective, values),
            LpResult::Infeasible => {
                if state.solution().is_feasible() {
                    learned.lower_bound = state.upper_bound();
                }
                return Ok(exhausted_status(state));
            }
            LpResult::Unknown => return Ok(Status::Abort),
        };
        let integral = values
            .iter()
            .all(|val| val.abs() < TOLERANCE || (val - 1.).abs() < TOLERANCE);
        if integral {
            let sol = Solution::checked(
                state.problem(),
                values.iter().map(|val| *val > 0.5).collect(),
            );
            if sol.is_feasible() {
                learned.lower_bound = sol.cost();
                learned.solution = Some(sol);
                learned.lp_values = values;
                return Ok(Status::OptimalSolutionFound);
            }
        }
        let mut bound = objective;
        if params.use_lp_strong_branching {
            log.log_routine_start("strong branching")?;
            let res =
                self.strong_branching(params, state, &values, bound, learned, time_limit)?;
            log.log_routine_end()?;
            match res {
                Some(sb_bound) => bound = sb_bound,
                None => {
                    if state.solution().is_feasible() {
                        learned.lower_bound = state.upper_bound();
                    }
                    return Ok(exhausted_status(state));
                }
            }
        }
        if bound.is_finite() {
            learned.lower_bound = (bound - TOLERANCE).ceil() as i64;
        }
        learned.lp_values = values;
        Ok(Status::Continue)
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{lit, types::Var};

    use super::LinearRelaxation;
    use crate::{
        optimizer::{SearchStrategy, Status},
        options::Parameters,
        state::{LearnedInfo, ProblemState},
        time::TimeLimit,
        types::{LinearConstraint, LinearObjective, Problem, Solution},
        Log,
    };

    fn optimize(state: &ProblemState, params: &Parameters) -> (Status, LearnedInfo) {
        let mut lp = LinearRelaxation::new(params);
        lp.synchronize(state).unwrap();
        call(&mut lp, state, params)
    }

    fn call(
        lp: &mut LinearRelaxation,
        state: &ProblemState,
        params: &Parameters,
    ) -> (Status, LearnedInfo) {
        let mut learned = LearnedInfo::default();
        let status = lp
            .optimize(
                params,
                state,
                &mut learned,
                &mut TimeLimit::infinite(),
                &mut Log::default(),
            )
            .unwrap();
        (status, learned)
    }

    fn triangle(weight: i64) -> Problem {
        // pairwise at least one of three
        let mut prob = Problem::new(3);
        for (a, b) in [(0, 1), (1, 2), (0, 2)] {
            prob.add_constraint(LinearConstraint::clause([
                Var::new(a).pos_lit(),
                Var::new(b).pos_lit(),
            ]));
        }
        prob.set_objective(LinearObjective::minimize(vec![
            (lit![0], weight),
            (lit![1], weight),
            (lit![2], weight),
        ]));
        prob
    }

    #[test]
    fn fractional_bound() {
        let state = ProblemState::new(triangle(1), 0.);
        let (status, learned) = optimize(&state, &Parameters::default());
        assert_eq!(status, Status::Continue);
        assert_eq!(learned.lower_bound, 2);
        assert_eq!(learned.lp_values.len(), 3);
        assert!(learned.solution.is_none());
    }

    #[test]
    fn integral_relaxation_is_optimal() {
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::at_least(
            vec![(lit![0], 1), (!lit![1], 1)],
            2,
        ));
        prob.set_objective(LinearObjective::minimize(vec![
            (lit![0], 3),
            (lit![1], 1),
        ]));
        let state = ProblemState::new(prob, 0.);
        let (status, learned) = optimize(&state, &Parameters::default());
        assert_eq!(status, Status::OptimalSolutionFound);
        let sol = learned.solution.unwrap();
        assert_eq!(sol.values(), &[true, false]);
        assert_eq!(sol.cost(), 3);
    }

    #[test]
    fn strong_branching_tightens_bound() {
        let mut state = ProblemState::new(triangle(2), 0.);
        let info = LearnedInfo {
            solution: Some(Solution::checked(state.problem(), vec![true; 3])),
            ..Default::default()
        };
        state.merge_learned_info(&info);
        assert_eq!(state.upper_bound(), 6);
        let (status, learned) = optimize(&state, &Parameters::default());
        assert_eq!(status, Status::Continue);
        assert_eq!(learned.lower_bound, 3);
        let params = Parameters {
            use_lp_strong_branching: true,
            ..Default::default()
        };
        let (status, learned) = optimize(&state, &params);
        assert_eq!(status, Status::Continue);
        assert_eq!(learned.lower_bound, 4);
        assert!(learned.fixed_literals.is_empty());
    }

    #[test]
    fn strong_branching_fixes_variable() {
        // pairwise covering with weights 1, 2, 2, the relaxation is all one half
        let mut prob = triangle(2);
        prob.set_objective(LinearObjective::minimize(vec![
            (lit![0], 1),
            (lit![1], 2),
            (lit![2], 2),
        ]));
        let mut state = ProblemState::new(prob, 0.);
        let info = LearnedInfo {
            solution: Some(Solution::checked(state.problem(), vec![false, true, true])),
            ..Default::default()
        };
        state.merge_learned_info(&info);
        assert_eq!(state.upper_bound(), 4);
        let params = Parameters {
            use_lp_strong_branching: true,
            ..Default::default()
        };
        let mut lp = LinearRelaxation::new(&params);
        lp.synchronize(&state).unwrap();
        let (status, learned) = call(&mut lp, &state, &params);
        assert_eq!(status, Status::Continue);
        // x0 = 0 forces x1 = x2 = 1 which does not improve
        assert_eq!(learned.fixed_literals, vec![lit![0]]);
        assert_eq!(learned.lower_bound, 3);
        assert_eq!(lp.fixed[0], Some(true));
        assert_eq!(lp.col_bounds[0], (1., 1.));
        assert_eq!(lp.col_bounds[1], (0., 1.));

        // the fixing reaches the model through the state as well
        state.merge_learned_info(&learned);
        lp.synchronize(&state).unwrap();
        assert_eq!(lp.fixed[0], None);
        assert_eq!(lp.col_bounds[0], (1., 1.));
    }

    #[test]
    fn learned_binary_clauses_add_rows() {
        let mut prob = Problem::new(2);
        prob.set_objective(LinearObjective::minimize(vec![(lit![0], 1), (lit![1], 1)]));
        let mut state = ProblemState::new(prob, 0.);
        let params = Parameters::default();
        let mut lp = LinearRelaxation::new(&params);
        lp.synchronize(&state).unwrap();
        let (status, learned) = call(&mut lp, &state, &params);
        assert_eq!(status, Status::OptimalSolutionFound);
        assert_eq!(learned.lower_bound, 0);

        state.merge_learned_info(&LearnedInfo {
            binary_clauses: vec![(lit![0], lit![1])],
            ..Default::default()
        });
        lp.synchronize(&state).unwrap();
        assert_eq!(lp.n_binary_clauses, 1);
        let (status, learned) = call(&mut lp, &state, &params);
        assert_eq!(status, Status::OptimalSolutionFound);
        assert_eq!(learned.lower_bound, 1);
        assert_eq!(learned.solution.unwrap().cost(), 1);

        let params = Parameters {
            use_learned_binary_clauses_in_lp: false,
            ..Default::default()
        };
        let (_, learned) = optimize(&state, &params);
        assert_eq!(learned.lower_bound, 0);
    }

    #[test]
    fn no_improvement_possible() {
        let mut prob = Problem::new(3);
        prob.add_constraint(LinearConstraint::at_least(
            vec![(lit![0], 2), (lit![1], 1), (lit![2], 1)],
            2,
        ));
        prob.set_objective(LinearObjective::minimize(vec![
            (lit![0], 3),
            (lit![1], 2),
            (lit![2], 2),
        ]));
        let mut state = ProblemState::new(prob, 0.);
        let info = LearnedInfo {
            solution: Some(Solution::checked(state.problem(), vec![true, false, false])),
            ..Default::default()
        };
        state.merge_learned_info(&info);
        let (status, learned) = optimize(&state, &Parameters::default());
        assert_eq!(status, Status::OptimalSolutionFound);
        assert_eq!(learned.lower_bound, 3);
    }
}
