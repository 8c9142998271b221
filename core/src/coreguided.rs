//! # Core-Guided Search
//!
//! OLL core-guided optimization with stratification and hardening. The
//! objective is reformulated with totalizers over the extracted cores, each
//! core raising the lower bound by its minimum weight. A satisfiable call
//! with all reformulated objective literals assumed false is optimal.
//!
//! The reformulation persists across calls. Facts learned by other
//! optimizers only add hard constraints, which keeps all cores valid.

use rustsat::{
    encodings::{
        nodedb::{NodeById, NodeCon, NodeId, NodeLike},
        totdb::{Db as TotDb, Node, Semantics},
    },
    solvers::SolverResult,
    types::{Lit, RsHashMap},
};

use crate::{
    fs::sync_oracle,
    optimizer::{exhausted_status, SearchStrategy, Status},
    options::Parameters,
    oracle::Oracle,
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    types::Solution,
    Log,
};

/// Conflict limit of a single solve during core minimization
const MINIMIZATION_CONFLICTS: u32 = 1000;

/// A totalizer output standing in for a merged core
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Reformulation {
    root: NodeId,
    oidx: usize,
    weight: u64,
}

pub struct CoreBasedOptimizer {
    oracle: Option<Oracle>,
    seed: u64,
    tot_db: TotDb,
    /// Reformulated objective, literal to weight, the literals are assumed
    /// false
    inactives: RsHashMap<Lit, u64>,
    reformulations: RsHashMap<Lit, Reformulation>,
    /// Lower bound of the normalized objective derived from the cores
    core_offset: u64,
    /// Constant introduced by normalizing the objective
    norm_offset: i64,
    /// Only literals of at least this weight are assumed
    strat_level: u64,
    initialized: bool,
}

impl CoreBasedOptimizer {
    pub fn new(params: &Parameters) -> Self {
        CoreBasedOptimizer {
            oracle: None,
            seed: params.random_seed,
            tot_db: TotDb::default(),
            inactives: RsHashMap::default(),
            reformulations: RsHashMap::default(),
            core_offset: 0,
            norm_offset: 0,
            strat_level: 0,
            initialized: false,
        }
    }

    fn init(&mut self, state: &ProblemState) {
        let (lits, offset) = state.problem().objective().normalized();
        self.norm_offset = offset;
        self.strat_level = lits.iter().map(|(_, w)| *w).max().unwrap_or(0);
        self.inactives = lits.into_iter().collect();
        self.initialized = true;
    }

    /// The lower bound on the objective the cores prove
    pub fn lower_bound(&self) -> i64 {
        self.norm_offset + self.core_offset as i64
    }

    /// Lowers the stratification level to the next weight below it, returns
    /// `false` if all literals are assumed already
    fn lower_strat_level(&mut self) -> bool {
        let next = self
            .inactives
            .values()
            .copied()
            .filter(|&w| w < self.strat_level)
            .max();
        match next {
            Some(level) => {
                self.strat_level = level;
                true
            }
            None => false,
        }
    }

    fn assumptions(&self) -> Vec<Lit> {
        let mut lits: Vec<(Lit, u64)> = self
            .inactives
            .iter()
            .filter(|(_, &w)| w >= self.strat_level)
            .map(|(&l, &w)| (l, w))
            .collect();
        lits.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        lits.into_iter().map(|(l, _)| !l).collect()
    }

    /// Fixes inactive literals whose weight alone exceeds the gap
    fn harden(
        &mut self,
        state: &ProblemState,
        learned: &mut LearnedInfo,
    ) -> anyhow::Result<()> {
        if state.upper_bound() == i64::MAX {
            return Ok(());
        }
        let gap = state.upper_bound() - 1 - self.lower_bound();
        let Some(oracle) = &mut self.oracle else {
            return Ok(());
        };
        let mut hardened = vec![];
        for (&l, &w) in &self.inactives {
            if w as i64 > gap {
                hardened.push(l);
            }
        }
        for l in hardened {
            oracle.add_unit(!l)?;
            self.inactives.remove(&l);
            if l.var().idx() < state.problem().n_vars() && !state.is_fixed(l.var()) {
                learned.fixed_literals.push(!l);
            }
        }
        Ok(())
    }

    /// Drops literals from a core while it stays a core
    fn minimize_core(
        &mut self,
        mut core: Vec<Lit>,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Vec<Lit>> {
        if core.len() <= 1 {
            return Ok(core);
        }
        let Some(oracle) = &mut self.oracle else {
            return Ok(core);
        };
        log.log_routine_start("core-minimization")?;
        // try dropping the lightest literals first
        let mut candidates = core.clone();
        candidates.sort_unstable_by_key(|l| self.inactives.get(l).copied().unwrap_or(0));
        for drop_lit in candidates {
            if !core.contains(&drop_lit) {
                continue;
            }
            let assumps: Vec<Lit> = core
                .iter()
                .filter(|&&l| l != drop_lit)
                .map(|&l| !l)
                .collect();
            if oracle.solve(&assumps, Some(MINIMIZATION_CONFLICTS), time_limit, log)?
                == SolverResult::Unsat
            {
                core = oracle.core()?;
            }
            if time_limit.limit_reached() {
                break;
            }
        }
        log.log_routine_end()?;
        Ok(core)
    }

    /// Relaxes the literals of a core and merges them into a new totalizer
    fn reformulate(&mut self, core: &[Lit], core_weight: u64) -> anyhow::Result<()> {
        let mut cons = Vec::with_capacity(core.len());
        for &olit in core {
            let Some(weight) = self.inactives.get_mut(&olit) else {
                continue;
            };
            *weight -= core_weight;
            let remaining = *weight;
            if remaining == 0 {
                self.inactives.remove(&olit);
            }
            let Some(reform) = self.reformulations.get(&olit).copied() else {
                let id = self.tot_db.insert(Node::Leaf(olit));
                cons.push(NodeCon::full(id));
                continue;
            };
            cons.push(NodeCon::single(reform.root, reform.oidx + 1, 1));
            if remaining > 0 {
                continue;
            }
            self.reformulations.remove(&olit);
            if reform.oidx + 1 >= self.tot_db[reform.root].len() {
                continue;
            }
            // the totalizer moves on to its next output
            let new_olit = self.build_output(reform.root, reform.oidx + 1)?;
            self.inactives.insert(new_olit, reform.weight);
            self.reformulations.insert(
                new_olit,
                Reformulation {
                    oidx: reform.oidx + 1,
                    ..reform
                },
            );
        }
        if cons.len() <= 1 {
            return Ok(());
        }
        let con = self.tot_db.merge(&cons);
        debug_assert_eq!(con.offset(), 0);
        debug_assert_eq!(con.multiplier(), 1);
        let root = con.id;
        if self.tot_db[root].len() <= 1 {
            return Ok(());
        }
        let olit = self.build_output(root, 1)?;
        self.inactives.insert(olit, core_weight);
        self.reformulations.insert(
            olit,
            Reformulation {
                root,
                oidx: 1,
                weight: core_weight,
            },
        );
        Ok(())
    }

    fn build_output(&mut self, root: NodeId, oidx: usize) -> anyhow::Result<Lit> {
        let Some(oracle) = &mut self.oracle else {
            anyhow::bail!("core-guided search without an oracle");
        };
        let (solver, var_manager) = oracle.parts();
        Ok(self
            .tot_db
            .define_unweighted(root, oidx, Semantics::If, solver, var_manager)?)
    }
}

impl SearchStrategy for CoreBasedOptimizer {
    fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        if !self.initialized {
            self.init(state);
        }
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
        if self.oracle.is_none() || !self.initialized {
            let status = self.synchronize(state)?;
            if status != Status::Continue {
                return Ok(status);
            }
        }
        log.log_routine_start("oll")?;
        let status = loop {
            if time_limit.limit_reached() {
                break Status::LimitReached;
            }
            self.harden(state, learned)?;
            let assumps = self.assumptions();
            let Some(oracle) = &mut self.oracle else {
                break Status::Abort;
            };
            let res = oracle.solve(
                &assumps,
                Some(params.guided_sat_conflicts_chunk),
                time_limit,
                log,
            )?;
            match res {
                SolverResult::Interrupted => {
                    break if time_limit.limit_reached() {
                        Status::LimitReached
                    } else {
                        Status::Continue
                    };
                }
                SolverResult::Sat => {
                    let sol = Solution::checked(state.problem(), oracle.values()?);
                    debug_assert!(sol.is_feasible());
                    let improving = sol.is_feasible() && sol.cost() < state.upper_bound();
                    let cost = sol.cost();
                    if improving {
                        learned.solution = Some(sol);
                    }
                    if self.lower_strat_level() {
                        if improving {
                            break Status::SolutionFound;
                        }
                        continue;
                    }
                    // every reformulated literal is false, the cost meets the bound
                    debug_assert_eq!(cost, self.lower_bound());
                    learned.lower_bound = learned.lower_bound.max(cost);
                    break if improving {
                        Status::OptimalSolutionFound
                    } else {
                        exhausted_status(state)
                    };
                }
                SolverResult::Unsat => {
                    let core = oracle.core()?;
                    if core.is_empty() {
                        learned.lower_bound = state.upper_bound();
                        break exhausted_status(state);
                    }
                    let orig_len = core.len();
                    let core = if params.core_minimization {
                        self.minimize_core(core, time_limit, log)?
                    } else {
                        core
                    };
                    let core_weight = core
                        .iter()
                        .filter_map(|l| self.inactives.get(l).copied())
                        .min()
                        .unwrap_or(0);
                    if core_weight == 0 {
                        break Status::Abort;
                    }
                    log.log_core(core_weight, orig_len, core.len())?;
                    self.core_offset += core_weight;
                    self.reformulate(&core, core_weight)?;
                    learned.lower_bound = learned.lower_bound.max(self.lower_bound());
                    if self.lower_bound() >= state.upper_bound() {
                        break exhausted_status(state);
                    }
                }
            }
        };
        if let Some(oracle) = &mut self.oracle {
            learned.binary_clauses = oracle.take_binary_clauses();
        }
        log.log_routine_end()?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::CoreBasedOptimizer;
    use crate::{
        optimizer::{SearchStrategy, Status},
        options::Parameters,
        state::{LearnedInfo, ProblemState},
        time::TimeLimit,
        types::{LinearConstraint, LinearObjective, Problem},
        Log,
    };

    /// Exactly one of three terms with weights 1, 1 and 2
    fn exactly_one() -> Problem {
        let mut prob = Problem::new(3);
        prob.add_constraint(LinearConstraint::equal(
            vec![(lit![0], 1), (lit![1], 1), (lit![2], 1)],
            1,
        ));
        prob.set_objective(LinearObjective::minimize(vec![
            (lit![0], 1),
            (lit![1], 1),
            (lit![2], 2),
        ]));
        prob
    }

    fn call(
        opt: &mut CoreBasedOptimizer,
        state: &ProblemState,
        log: &mut Log,
    ) -> (Status, LearnedInfo) {
        let params = Parameters::default();
        let mut learned = LearnedInfo::default();
        let status = opt
            .optimize(
                &params,
                state,
                &mut learned,
                &mut TimeLimit::infinite(),
                log,
            )
            .unwrap();
        (status, learned)
    }

    #[test]
    fn merges_core_to_optimum() {
        // solutions are not merged, so the cores alone have to close the gap
        let state = ProblemState::new(exactly_one(), 0.);
        let mut opt = CoreBasedOptimizer::new(&Parameters::default());
        let mut log = Log::default();
        let mut status = Status::Continue;
        let mut learned = LearnedInfo::default();
        for _ in 0..10 {
            (status, learned) = call(&mut opt, &state, &mut log);
            if status == Status::OptimalSolutionFound {
                break;
            }
        }
        assert_eq!(status, Status::OptimalSolutionFound);
        assert_eq!(learned.lower_bound, 1);
        assert_eq!(learned.solution.unwrap().cost(), 1);
        assert!(log.stats().n_cores >= 1);
        assert_eq!(opt.lower_bound(), 1);
    }

    #[test]
    fn drives_state_to_optimality() {
        let mut state = ProblemState::new(exactly_one(), 0.);
        let mut opt = CoreBasedOptimizer::new(&Parameters::default());
        let mut log = Log::default();
        for _ in 0..10 {
            if opt.synchronize(&state).unwrap().is_definitive() {
                break;
            }
            let (status, learned) = call(&mut opt, &state, &mut log);
            state.merge_learned_info(&learned);
            if status.is_definitive() {
                break;
            }
        }
        assert!(state.is_optimal());
        assert_eq!(state.solution().cost(), 1);
    }

    #[test]
    fn infeasible_problem() {
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::clause([lit![0]]));
        prob.add_constraint(LinearConstraint::clause([!lit![0]]));
        prob.set_objective(LinearObjective::minimize(vec![(lit![1], 1)]));
        let state = ProblemState::new(prob, 0.);
        let mut opt = CoreBasedOptimizer::new(&Parameters::default());
        let (status, _) = call(&mut opt, &state, &mut Log::default());
        assert_eq!(status, Status::Infeasible);
    }

    #[test]
    fn negative_weights_offset() {
        // minimize -x0 - x1 with at most one: optimum -1
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::at_most(
            vec![(lit![0], 1), (lit![1], 1)],
            1,
        ));
        prob.set_objective(LinearObjective::maximize(vec![(lit![0], 1), (lit![1], 1)]));
        let state = ProblemState::new(prob, 0.);
        let mut opt = CoreBasedOptimizer::new(&Parameters::default());
        let mut log = Log::default();
        let mut status = Status::Continue;
        let mut learned = LearnedInfo::default();
        for _ in 0..10 {
            (status, learned) = call(&mut opt, &state, &mut log);
            if status == Status::OptimalSolutionFound {
                break;
            }
        }
        assert_eq!(status, Status::OptimalSolutionFound);
        assert_eq!(learned.lower_bound, -1);
    }
}
