//! # Large Neighborhood Search
//!
//! All variants fix most variables to their value in the incumbent and look
//! for an improving solution of the remaining sub-problem with the SAT
//! oracle, the objective always being constrained to improve.
//!
//! - [`CompleteLns`]: lets a bounded number of objective terms change
//! - [`RandomLns`]: random neighborhoods of fixed difficulty
//! - [`AdaptiveLns`]: neighborhoods whose difficulty follows a Luby driven
//!   adaptive parameter

use rand::{rngs::StdRng, Rng, SeedableRng};
use rustsat::{
    encodings::card::{BoundUpper as _, DbTotalizer},
    solvers::SolverResult,
    types::Lit,
};

use crate::{
    fs::{apply_preference, lp_preference, sync_oracle},
    optimizer::{exhausted_status, SearchStrategy, Status},
    options::Parameters,
    oracle::Oracle,
    propagator::Propagator,
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    types::Solution,
    Log,
};

mod luby;
mod neighborhood;

use luby::LubyAdaptiveParameterValue;
pub use neighborhood::NeighborhoodKind;
use neighborhood::NeighborhoodGenerator;

/// Initial difficulty of the adaptive variants
const INITIAL_DIFFICULTY: f64 = 0.5;

/// Sets the phases of the oracle to the LP values or the incumbent
fn set_phases(oracle: &mut Oracle, state: &ProblemState, use_lp: bool) -> anyhow::Result<()> {
    if use_lp && !state.lp_values().is_empty() {
        apply_preference(oracle, &lp_preference(state.lp_values()))
    } else {
        oracle.phase_values(state.solution().values())
    }
}

/// Reads an improving solution from the last satisfiable oracle call
fn improving_solution(oracle: &Oracle, state: &ProblemState) -> anyhow::Result<Option<Solution>> {
    let sol = Solution::checked(state.problem(), oracle.values()?);
    if sol.is_feasible() && sol.cost() < state.upper_bound() {
        return Ok(Some(sol));
    }
    Ok(None)
}

/// LNS where at most a fixed number of the cost incurring objective
/// literals may change their value
pub struct CompleteLns {
    oracle: Option<Oracle>,
    seed: u64,
}

impl CompleteLns {
    pub fn new(params: &Parameters) -> Self {
        CompleteLns {
            oracle: None,
            seed: params.random_seed,
        }
    }
}

impl SearchStrategy for CompleteLns {
    fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        sync_oracle(&mut self.oracle, state, self.seed)
    }

    fn runs_once_per_solution(&self) -> bool {
        true
    }

    fn needs_feasible_solution(&self) -> bool {
        true
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
        if !state.solution().is_feasible() {
            return Ok(Status::Abort);
        }
        let status = sync_oracle(&mut self.oracle, state, self.seed)?;
        if status != Status::Continue {
            learned.lower_bound = state.upper_bound();
            return Ok(status);
        }
        let Some(oracle) = &mut self.oracle else {
            return Ok(Status::Abort);
        };
        let (obj_lits, _) = state.problem().objective().normalized();
        let costly: Vec<Lit> = obj_lits
            .into_iter()
            .map(|(l, _)| l)
            .filter(|&l| state.solution().lit_value(l))
            .collect();
        let covers_all = costly.len() <= params.num_relaxed_vars;
        let assumps = if covers_all {
            vec![]
        } else {
            // at most `num_relaxed_vars` costly literals become false
            let k = params.num_relaxed_vars;
            let mut tot = DbTotalizer::from_iter(costly.iter().map(|&l| !l));
            let (solver, var_manager) = oracle.parts();
            tot.encode_ub(k..k + 1, solver, var_manager)?;
            match tot.enforce_ub(k) {
                Ok(assumps) => assumps,
                Err(rustsat::encodings::Error::Unsat) => return Ok(Status::Abort),
                Err(err) => return Err(err.into()),
            }
        };
        oracle.phase_values(state.solution().values())?;
        let res = oracle.solve(&assumps, None, time_limit, log)?;
        learned.binary_clauses = oracle.take_binary_clauses();
        Ok(match res {
            SolverResult::Sat => match improving_solution(oracle, state)? {
                Some(sol) => {
                    learned.solution = Some(sol);
                    Status::SolutionFound
                }
                None => Status::Continue,
            },
            SolverResult::Unsat if covers_all => {
                learned.lower_bound = state.upper_bound();
                exhausted_status(state)
            }
            SolverResult::Unsat => Status::Abort,
            SolverResult::Interrupted => Status::LimitReached,
        })
    }
}

/// LNS over random neighborhoods of a fixed difficulty
pub struct RandomLns {
    generator: Option<NeighborhoodGenerator>,
    kind: NeighborhoodKind,
    use_lp: bool,
    oracle: Option<Oracle>,
    rng: StdRng,
    seed: u64,
}

impl RandomLns {
    pub fn new(kind: NeighborhoodKind, use_lp: bool, params: &Parameters) -> Self {
        RandomLns {
            generator: None,
            kind,
            use_lp,
            oracle: None,
            rng: StdRng::seed_from_u64(params.random_seed),
            seed: params.random_seed,
        }
    }
}

impl SearchStrategy for RandomLns {
    fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        sync_oracle(&mut self.oracle, state, self.seed)
    }

    fn needs_feasible_solution(&self) -> bool {
        true
    }

    fn should_be_run(&self, state: &ProblemState) -> bool {
        !self.use_lp || !state.lp_values().is_empty()
    }

    fn optimize(
        &mut self,
        params: &Parameters,
        state: &ProblemState,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        if !state.solution().is_feasible() {
            return Ok(Status::Abort);
        }
        let status = sync_oracle(&mut self.oracle, state, self.seed)?;
        if status != Status::Continue {
            learned.lower_bound = state.upper_bound();
            return Ok(status);
        }
        let Some(oracle) = &mut self.oracle else {
            return Ok(Status::Abort);
        };
        let generator = self
            .generator
            .get_or_insert_with(|| NeighborhoodGenerator::new(self.kind, state.problem()));
        for _ in 0..params.num_random_lns_tries {
            if time_limit.limit_reached() {
                return Ok(Status::LimitReached);
            }
            let fixed = generator.generate(state, params.random_lns_difficulty, &mut self.rng);
            set_phases(oracle, state, self.use_lp)?;
            let res = oracle.solve(
                &fixed,
                Some(params.max_number_of_conflicts_in_random_lns),
                time_limit,
                log,
            )?;
            learned
                .binary_clauses
                .extend(oracle.take_binary_clauses());
            match res {
                SolverResult::Sat => {
                    if let Some(sol) = improving_solution(oracle, state)? {
                        learned.solution = Some(sol);
                        return Ok(Status::SolutionFound);
                    }
                }
                SolverResult::Unsat if fixed.is_empty() => {
                    learned.lower_bound = state.upper_bound();
                    return Ok(exhausted_status(state));
                }
                SolverResult::Unsat | SolverResult::Interrupted => (),
            }
        }
        Ok(Status::Continue)
    }
}

/// LNS whose neighborhood size adapts to how hard the sub-problems are
pub struct AdaptiveLns {
    generator: Option<NeighborhoodGenerator>,
    kind: NeighborhoodKind,
    use_lp: bool,
    oracle: Option<Oracle>,
    /// Problem, incumbent bound and learned facts, for cheap probing
    propagator: Option<Propagator>,
    difficulty: LubyAdaptiveParameterValue,
    rng: StdRng,
    seed: u64,
}

impl AdaptiveLns {
    pub fn new(kind: NeighborhoodKind, use_lp: bool, params: &Parameters) -> Self {
        AdaptiveLns {
            generator: None,
            kind,
            use_lp,
            oracle: None,
            propagator: None,
            difficulty: LubyAdaptiveParameterValue::new(INITIAL_DIFFICULTY),
            rng: StdRng::seed_from_u64(params.random_seed),
            seed: params.random_seed,
        }
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty.value()
    }

    fn sync_propagator(&mut self, state: &ProblemState) -> Status {
        let problem = state.problem();
        let mut prop = Propagator::from_problem(problem);
        if state.upper_bound() != i64::MAX {
            prop.add_objective_upper_bound(problem.objective(), state.upper_bound() - 1);
        }
        for lit in state.fixed_literals() {
            prop.add_unit(lit);
        }
        for &(a, b) in state.binary_clauses() {
            prop.add_binary_clause(a, b);
        }
        let unsat = prop.is_model_unsat();
        self.propagator = Some(prop);
        if unsat {
            return exhausted_status(state);
        }
        Status::Continue
    }

    /// Whether propagating the neighborhood on the problem leads to a
    /// conflict
    fn probe_conflicts(&mut self, fixed: &[Lit], time_limit: &mut TimeLimit) -> bool {
        let Some(prop) = &mut self.propagator else {
            return false;
        };
        let dtime = prop.deterministic_time();
        let mut conflict = false;
        for &lit in fixed {
            match prop.lit_value(lit) {
                Some(true) => (),
                Some(false) => conflict = true,
                None => conflict = prop.enqueue_decision(lit).is_none(),
            }
            if conflict {
                break;
            }
        }
        prop.backtrack_all();
        time_limit.advance_deterministic_time(prop.deterministic_time() - dtime);
        conflict
    }
}

impl SearchStrategy for AdaptiveLns {
    fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        let status = sync_oracle(&mut self.oracle, state, self.seed)?;
        if status != Status::Continue {
            return Ok(status);
        }
        Ok(self.sync_propagator(state))
    }

    fn needs_feasible_solution(&self) -> bool {
        true
    }

    fn should_be_run(&self, state: &ProblemState) -> bool {
        !self.use_lp || !state.lp_values().is_empty()
    }

    fn optimize(
        &mut self,
        params: &Parameters,
        state: &ProblemState,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        if !state.solution().is_feasible() {
            return Ok(Status::Abort);
        }
        if self.oracle.is_none() || self.propagator.is_none() {
            let status = self.synchronize(state)?;
            if status != Status::Continue {
                learned.lower_bound = state.upper_bound();
                return Ok(status);
            }
        }
        if let Some(prop) = &self.propagator {
            learned.fixed_literals = prop
                .level_zero_lits()
                .iter()
                .copied()
                .filter(|l| !state.is_fixed(l.var()))
                .collect();
        }

        self.difficulty.update_luby();
        let difficulty = self.difficulty.value();
        let generator = self
            .generator
            .get_or_insert_with(|| NeighborhoodGenerator::new(self.kind, state.problem()));
        let fixed = generator.generate(state, difficulty, &mut self.rng);
        let n_free = state.problem().n_vars() - state.n_fixed_vars() - fixed.len();
        log.log_message(&format!(
            "adaptive lns difficulty {difficulty:.3} with {n_free} free variables"
        ))?;
        if fixed.is_empty() {
            // the target difficulty relaxes the whole problem
            self.difficulty.decrease();
            return Ok(Status::Abort);
        }
        if n_free == 0 {
            self.difficulty.boost_luby();
            return Ok(Status::Continue);
        }

        if self.probe_conflicts(&fixed, time_limit) {
            self.difficulty.increase();
            return Ok(Status::Continue);
        }

        let Some(oracle) = &mut self.oracle else {
            return Ok(Status::Abort);
        };
        set_phases(oracle, state, self.use_lp)?;
        let res = oracle.solve(
            &fixed,
            Some(params.max_number_of_conflicts_for_quick_check),
            time_limit,
            log,
        )?;
        learned.binary_clauses = oracle.take_binary_clauses();
        match res {
            SolverResult::Sat => {
                self.difficulty.increase();
                if let Some(sol) = improving_solution(oracle, state)? {
                    learned.solution = Some(sol);
                    return Ok(Status::SolutionFound);
                }
                return Ok(Status::Continue);
            }
            SolverResult::Unsat => {
                self.difficulty.increase();
                return Ok(Status::Continue);
            }
            SolverResult::Interrupted if time_limit.limit_reached() => {
                return Ok(Status::LimitReached);
            }
            SolverResult::Interrupted => (),
        }

        // the probe was undecided, solve the sub-problem on its own
        let sub_seed = self.seed.wrapping_add(self.rng.random::<u64>());
        let mut sub = Oracle::from_state(state, sub_seed)?;
        for &lit in &fixed {
            sub.add_unit(lit)?;
        }
        set_phases(&mut sub, state, self.use_lp)?;
        let res = sub.solve(
            &[],
            Some(params.max_number_of_conflicts_in_random_lns),
            time_limit,
            log,
        )?;
        Ok(match res {
            SolverResult::Sat => {
                self.difficulty.increase();
                match improving_solution(&sub, state)? {
                    Some(sol) => {
                        learned.solution = Some(sol);
                        Status::SolutionFound
                    }
                    None => Status::Continue,
                }
            }
            SolverResult::Unsat => {
                self.difficulty.increase();
                Status::Continue
            }
            SolverResult::Interrupted => {
                self.difficulty.decrease();
                if time_limit.limit_reached() {
                    Status::LimitReached
                } else {
                    Status::Continue
                }
            }
        })
    }
}
