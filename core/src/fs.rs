//! # First Solution Generators
//!
//! Generators that load the state into the SAT oracle and search for a
//! solution improving on the incumbent, either guided by a preferred
//! assignment ([`GuidedSat`]) or with randomized restarts
//! ([`RandomFirstSolution`]).

use rand::{rngs::StdRng, Rng, SeedableRng};
use rustsat::solvers::SolverResult;

use crate::{
    optimizer::{exhausted_status, SearchStrategy, Status},
    options::Parameters,
    oracle::Oracle,
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    types::{Problem, Solution},
    Log,
};

/// Conflict budget of a single randomized attempt
const RANDOM_ATTEMPT_CONFLICTS: u32 = 10;

/// The preferred assignment used to guide the oracle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuidePolicy {
    /// No preference, repeated calls form a SAT-UNSAT linear search
    NotGuided,
    /// Round the LP relaxation values
    LpGuided,
    /// Prefer the cheaper value of every objective variable
    ObjectiveGuided,
    /// Follow the hint given by the user
    UserGuided,
}

/// Preferred values minimizing the objective, `None` for variables the
/// objective does not care about
pub(crate) fn objective_preference(problem: &Problem) -> Vec<Option<bool>> {
    problem
        .vars()
        .map(|var| {
            let cost_false = problem.var_cost(var, false);
            let cost_true = problem.var_cost(var, true);
            if cost_false == cost_true {
                None
            } else {
                Some(cost_true < cost_false)
            }
        })
        .collect()
}

/// Rounded LP relaxation values
pub(crate) fn lp_preference(lp_values: &[f64]) -> Vec<Option<bool>> {
    lp_values.iter().map(|&val| Some(val > 0.5)).collect()
}

/// Resets the phases of the oracle to the given preference
pub(crate) fn apply_preference(
    oracle: &mut Oracle,
    preference: &[Option<bool>],
) -> anyhow::Result<()> {
    oracle.unphase_all()?;
    for (idx, pref) in preference.iter().enumerate() {
        if let Some(val) = pref {
            let var = rustsat::types::Var::new(idx as u32);
            oracle.phase_lit(if *val { var.pos_lit() } else { var.neg_lit() })?;
        }
    }
    Ok(())
}

/// Loads or updates an oracle for the state, returning the status if the
/// state is already proven exhausted
pub(crate) fn sync_oracle(
    oracle: &mut Option<Oracle>,
    state: &ProblemState,
    seed: u64,
) -> anyhow::Result<Status> {
    if let Some(oracle) = oracle.as_mut() {
        oracle.update_from_state(state)?;
    } else {
        let mut fresh = Oracle::from_state(state, seed)?;
        fresh.export_binary_clauses();
        *oracle = Some(fresh);
    }
    if oracle.as_ref().is_some_and(Oracle::is_unsat) {
        return Ok(exhausted_status(state));
    }
    Ok(Status::Continue)
}

/// A first solution generator with an assignment preference
pub struct GuidedSat {
    policy: GuidePolicy,
    oracle: Option<Oracle>,
    seed: u64,
    abort: bool,
    conflict_limit: u32,
    time_ratio: f64,
}

impl GuidedSat {
    pub fn new(policy: GuidePolicy, params: &Parameters) -> Self {
        GuidedSat {
            policy,
            oracle: None,
            seed: params.random_seed,
            abort: false,
            conflict_limit: params.guided_sat_conflicts_chunk,
            time_ratio: params.first_solution_time_ratio,
        }
    }

    pub fn policy(&self) -> GuidePolicy {
        self.policy
    }

    fn preference(&self, state: &ProblemState) -> Vec<Option<bool>> {
        match self.policy {
            GuidePolicy::NotGuided => vec![],
            GuidePolicy::LpGuided => lp_preference(state.lp_values()),
            GuidePolicy::ObjectiveGuided => objective_preference(state.problem()),
            GuidePolicy::UserGuided => state
                .assignment_preference()
                .iter()
                .map(|&val| Some(val))
                .collect(),
        }
    }
}

impl SearchStrategy for GuidedSat {
    fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        let status = sync_oracle(&mut self.oracle, state, self.seed)?;
        if status != Status::Continue {
            return Ok(status);
        }
        let preference = self.preference(state);
        if let Some(oracle) = &mut self.oracle {
            if !preference.is_empty() {
                apply_preference(oracle, &preference)?;
            }
        }
        Ok(Status::Continue)
    }

    fn should_be_run(&self, state: &ProblemState) -> bool {
        if self.abort {
            return false;
        }
        match self.policy {
            GuidePolicy::LpGuided => !state.lp_values().is_empty(),
            GuidePolicy::UserGuided => !state.assignment_preference().is_empty(),
            GuidePolicy::NotGuided | GuidePolicy::ObjectiveGuided => true,
        }
    }

    fn optimize(
        &mut self,
        _params: &Parameters,
        state: &ProblemState,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        if self.oracle.is_none() {
            let status = self.synchronize(state)?;
            if status != Status::Continue {
                return Ok(status);
            }
        }
        let Some(oracle) = &mut self.oracle else {
            return Ok(Status::Abort);
        };
        let mut limit = time_limit.sub_limit(self.time_ratio);
        let conflicts = self.conflict_limit;
        self.time_ratio = (self.time_ratio * 2.).min(1.);
        self.conflict_limit = self.conflict_limit.saturating_mul(2);

        let res = oracle.solve(&[], Some(conflicts), &mut limit, log)?;
        learned.binary_clauses = oracle.take_binary_clauses();
        time_limit.advance_deterministic_time(limit.elapsed_deterministic_time());
        match res {
            SolverResult::Unsat => {
                if self.policy != GuidePolicy::NotGuided {
                    self.abort = true;
                }
                if state.solution().is_feasible() {
                    learned.lower_bound = state.upper_bound();
                }
                Ok(exhausted_status(state))
            }
            SolverResult::Interrupted => Ok(Status::LimitReached),
            SolverResult::Sat => {
                let sol = Solution::checked(state.problem(), oracle.values()?);
                if !sol.is_feasible() {
                    return Ok(Status::LimitReached);
                }
                debug_assert!(sol.cost() < state.upper_bound());
                learned.solution = Some(sol);
                Ok(Status::SolutionFound)
            }
        }
    }
}

/// Repeated short randomized searches, each required to beat the best
/// solution found so far
pub struct RandomFirstSolution {
    oracle: Option<Oracle>,
    rng: StdRng,
    seed: u64,
}

impl RandomFirstSolution {
    pub fn new(params: &Parameters) -> Self {
        RandomFirstSolution {
            oracle: None,
            rng: StdRng::seed_from_u64(params.random_seed),
            seed: params.random_seed,
        }
    }
}

impl SearchStrategy for RandomFirstSolution {
    fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        sync_oracle(&mut self.oracle, state, self.seed)
    }

    fn should_be_run(&self, _state: &ProblemState) -> bool {
        true
    }

    fn optimize(
        &mut self,
        params: &Parameters,
        state: &ProblemState,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        if self.oracle.is_none() {
            let status = self.synchronize(state)?;
            if status != Status::Continue {
                return Ok(status);
            }
        }
        let Some(oracle) = &mut self.oracle else {
            return Ok(Status::Abort);
        };
        let problem = state.problem();
        let mut best_cost = if state.solution().is_feasible() {
            state.solution().cost()
        } else {
            i64::MAX
        };
        let mut remaining_conflicts =
            params.max_number_of_conflicts_in_random_solution_generation;
        let mut solution_found = false;
        while remaining_conflicts > 0 && !time_limit.limit_reached() {
            self.seed = self.seed.wrapping_add(1);
            oracle.set_seed(self.seed)?;
            let preference = match self.rng.random_range(0..4) {
                0 => objective_preference(problem),
                1 if !state.lp_values().is_empty() => lp_preference(state.lp_values()),
                _ => (0..problem.n_vars())
                    .map(|_| Some(self.rng.random_bool(0.5)))
                    .collect(),
            };
            apply_preference(oracle, &preference)?;
            if best_cost != i64::MAX {
                oracle.constrain_objective(problem.objective(), best_cost - 1)?;
            }
            let res = oracle.solve(
                &[],
                Some(remaining_conflicts.min(RANDOM_ATTEMPT_CONFLICTS)),
                time_limit,
                log,
            )?;
            learned
                .binary_clauses
                .extend(oracle.take_binary_clauses());
            match res {
                SolverResult::Sat => {
                    let sol = Solution::checked(problem, oracle.values()?);
                    if sol.is_feasible() {
                        debug_assert!(sol.cost() < best_cost);
                        best_cost = sol.cost();
                        learned.solution = Some(sol);
                        solution_found = true;
                    }
                }
                SolverResult::Unsat => {
                    if best_cost == i64::MAX {
                        return Ok(Status::Infeasible);
                    }
                    learned.lower_bound = best_cost;
                    return Ok(Status::OptimalSolutionFound);
                }
                SolverResult::Interrupted => (),
            }
            remaining_conflicts = remaining_conflicts.saturating_sub(RANDOM_ATTEMPT_CONFLICTS);
        }
        Ok(if solution_found {
            Status::SolutionFound
        } else {
            Status::Continue
        })
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::{GuidePolicy, GuidedSat, RandomFirstSolution};
    use crate::{
        optimizer::{SearchStrategy, Status},
        options::Parameters,
        state::{LearnedInfo, ProblemState},
        time::TimeLimit,
        types::{LinearConstraint, LinearObjective, Problem},
        Log,
    };

    fn max_two_of_three() -> Problem {
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

    fn run<S: SearchStrategy>(strat: &mut S, state: &mut ProblemState) -> Status {
        let params = Parameters::default();
        let status = strat.synchronize(state).unwrap();
        if status != Status::Continue {
            return status;
        }
        let mut learned = LearnedInfo::default();
        let status = strat
            .optimize(
                &params,
                state,
                &mut learned,
                &mut TimeLimit::infinite(),
                &mut Log::default(),
            )
            .unwrap();
        state.merge_learned_info(&learned);
        status
    }

    #[test]
    fn linear_search_reaches_optimum() {
        let mut state = ProblemState::new(max_two_of_three(), 0.);
        let mut strat = GuidedSat::new(GuidePolicy::NotGuided, &Parameters::default());
        let mut status = Status::Continue;
        for _ in 0..10 {
            status = run(&mut strat, &mut state);
            if status == Status::OptimalSolutionFound {
                break;
            }
            assert_eq!(status, Status::SolutionFound);
        }
        assert_eq!(status, Status::OptimalSolutionFound);
        assert_eq!(state.solution().cost(), -2);
        assert!(strat.should_be_run(&state));
    }

    #[test]
    fn objective_guided_solution() {
        let mut state = ProblemState::new(max_two_of_three(), 0.);
        let mut strat = GuidedSat::new(GuidePolicy::ObjectiveGuided, &Parameters::default());
        assert_eq!(run(&mut strat, &mut state), Status::SolutionFound);
        assert!(state.solution().is_feasible());
        assert!(!GuidedSat::new(GuidePolicy::LpGuided, &Parameters::default())
            .should_be_run(&state));
        assert!(!GuidedSat::new(GuidePolicy::UserGuided, &Parameters::default())
            .should_be_run(&state));
    }

    #[test]
    fn random_first_solution_infeasible() {
        let mut prob = Problem::new(1);
        prob.add_constraint(LinearConstraint::equal(vec![(lit![0], 1)], 1));
        prob.add_constraint(LinearConstraint::equal(vec![(lit![0], 1)], 0));
        let mut state = ProblemState::new(prob, 0.);
        let mut strat = RandomFirstSolution::new(&Parameters::default());
        assert_eq!(run(&mut strat, &mut state), Status::Infeasible);
    }

    #[test]
    fn random_first_solution_improves() {
        let mut state = ProblemState::new(max_two_of_three(), 0.);
        let mut strat = RandomFirstSolution::new(&Parameters::default());
        let status = run(&mut strat, &mut state);
        assert!(matches!(
            status,
            Status::SolutionFound | Status::OptimalSolutionFound
        ));
        assert!(state.solution().is_feasible());
    }
}
