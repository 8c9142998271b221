//! # SAT Oracle
//!
//! A thin layer over [`CaDiCaL`] that loads pseudo-Boolean constraints with
//! the encodings from [`rustsat::encodings`] and keeps track of the solving
//! effort as deterministic time.

use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use rustsat::{
    clause,
    encodings::{
        card::{self, BoundUpper as _},
        pb::{self, BoundUpper as _, BoundUpperIncremental as _},
    },
    instances::ManageVars,
    solvers::{
        ControlSignal, Learn, LimitConflicts, PhaseLit, Solve, SolveIncremental, SolveStats,
        SolverResult, Terminate,
    },
    types::{Clause, Lit, TernaryVal, Var},
};
use rustsat_cadical::CaDiCaL;

use crate::{
    state::ProblemState,
    time::TimeLimit,
    types::{LinearConstraint, LinearObjective, VarManager},
    Log,
};

/// Incremental encoding of `objective <= ub`
struct ObjectiveBound {
    enc: pb::DbGte,
    /// Offset introduced by normalizing negative coefficients
    offset: i64,
    /// Sum of all weights of the normalized objective
    max_value: u64,
    ub: Option<u64>,
}

pub struct Oracle {
    solver: CaDiCaL<'static, 'static>,
    var_manager: VarManager,
    n_vars: usize,
    objective: Option<ObjectiveBound>,
    /// Set once a constraint that can never be satisfied was added
    unsat: bool,
    /// Number of learned binary clauses of the state already added
    n_binary_clauses: usize,
    /// Binary clauses over problem variables learned by the solver and not
    /// yet taken
    exported: Option<Rc<RefCell<Vec<(Lit, Lit)>>>>,
    n_calls: usize,
}

impl Oracle {
    pub fn new(n_vars: usize, seed: u64) -> anyhow::Result<Self> {
        let mut solver = CaDiCaL::default();
        solver.set_option("ilb", 0)?;
        solver.set_option("seed", (seed % i32::MAX as u64) as i32)?;
        if n_vars > 0 {
            solver.reserve(Var::new(n_vars as u32 - 1))?;
        }
        Ok(Oracle {
            solver,
            var_manager: VarManager::new(n_vars),
            n_vars,
            objective: None,
            unsat: false,
            n_binary_clauses: 0,
            exported: None,
            n_calls: 0,
        })
    }

    /// Starts collecting the binary clauses the solver learns over problem
    /// variables. Every clause added to the oracle must hold in all solutions
    /// improving on the incumbent, otherwise the export is unsound.
    pub fn export_binary_clauses(&mut self) {
        if self.exported.is_some() {
            return;
        }
        let buffer = Rc::new(RefCell::new(vec![]));
        let sink = Rc::clone(&buffer);
        let n_vars = self.n_vars;
        self.solver.attach_learner(
            move |cl: Clause| {
                if cl.len() == 2 && cl.iter().all(|l| l.var().idx() < n_vars) {
                    sink.borrow_mut().push((cl[0], cl[1]));
                }
            },
            2,
        );
        self.exported = Some(buffer);
    }

    /// Drains the exported binary clauses learned so far
    pub fn take_binary_clauses(&mut self) -> Vec<(Lit, Lit)> {
        self.exported
            .as_ref()
            .map(|buffer| std::mem::take(&mut *buffer.borrow_mut()))
            .unwrap_or_default()
    }

    /// Loads the problem of a state together with everything learned about
    /// it. The objective is constrained to improve on the incumbent, if any.
    pub fn from_state(state: &ProblemState, seed: u64) -> anyhow::Result<Self> {
        let problem = state.problem();
        let mut oracle = Self::new(problem.n_vars(), seed)?;
        for (_, constr) in problem.constraints() {
            oracle.add_constraint(constr)?;
        }
        oracle.update_from_state(state)?;
        Ok(oracle)
    }

    /// Adds what the state learned since the last update
    pub fn update_from_state(&mut self, state: &ProblemState) -> anyhow::Result<()> {
        for lit in state.fixed_literals() {
            self.add_unit(lit)?;
        }
        if state.upper_bound() != i64::MAX {
            self.constrain_objective(state.problem().objective(), state.upper_bound() - 1)?;
        }
        for &(a, b) in &state.binary_clauses()[self.n_binary_clauses..] {
            self.add_clause(clause![a, b])?;
        }
        self.n_binary_clauses = state.binary_clauses().len();
        Ok(())
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    /// Whether a trivially unsatisfiable constraint was added
    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    pub fn add_clause(&mut self, clause: Clause) -> anyhow::Result<()> {
        if clause.is_empty() {
            self.unsat = true;
            return Ok(());
        }
        self.solver.add_clause(clause)?;
        Ok(())
    }

    pub fn add_unit(&mut self, lit: Lit) -> anyhow::Result<()> {
        self.solver.add_unit(lit)?;
        Ok(())
    }

    pub fn add_constraint(&mut self, constr: &LinearConstraint) -> anyhow::Result<()> {
        for (lits, bound) in constr.normalized() {
            self.add_row(lits, bound)?;
        }
        Ok(())
    }

    /// Adds `sum(w * l) <= bound`
    pub fn add_row(&mut self, lits: Vec<(Lit, u64)>, bound: i64) -> anyhow::Result<()> {
        if bound < 0 {
            self.unsat = true;
            return Ok(());
        }
        let bound = bound as u64;
        let total: u64 = lits.iter().map(|(_, w)| *w).sum();
        if total <= bound {
            return Ok(());
        }
        // weights above the bound force their literal to false
        let (forced, lits): (Vec<_>, Vec<_>) =
            lits.into_iter().partition(|(_, w)| *w > bound);
        for (l, _) in forced {
            self.add_unit(!l)?;
        }
        if lits.iter().map(|(_, w)| *w).sum::<u64>() <= bound {
            return Ok(());
        }
        if lits.iter().all(|(_, w)| *w == lits[0].1) {
            let k = (bound / lits[0].1) as usize;
            if k + 1 == lits.len() {
                // at most all but one: at least one false
                return self.add_clause(lits.iter().map(|(l, _)| !*l).collect());
            }
            return self.add_at_most(lits.into_iter().map(|(l, _)| l).collect(), k);
        }
        let mut enc = pb::DbGte::from_iter(lits.into_iter().map(|(l, w)| (l, w as usize)));
        let ub = bound as usize;
        enc.encode_ub(ub..ub + 1, &mut self.solver, &mut self.var_manager)?;
        self.enforce(enc.enforce_ub(ub))
    }

    /// Adds a cardinality constraint `sum(lits) <= k`
    pub fn add_at_most(&mut self, lits: Vec<Lit>, k: usize) -> anyhow::Result<()> {
        if lits.len() <= k {
            return Ok(());
        }
        if k == 0 {
            for l in lits {
                self.add_unit(!l)?;
            }
            return Ok(());
        }
        let mut enc = card::DbTotalizer::from_iter(lits);
        enc.encode_ub(k..k + 1, &mut self.solver, &mut self.var_manager)?;
        self.enforce(enc.enforce_ub(k))
    }

    fn enforce(
        &mut self,
        units: Result<Vec<Lit>, rustsat::encodings::Error>,
    ) -> anyhow::Result<()> {
        match units {
            Ok(units) => {
                for u in units {
                    self.add_unit(u)?;
                }
            }
            Err(rustsat::encodings::Error::Unsat) => self.unsat = true,
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Constrains `objective <= ub`. The bound may only be tightened, the
    /// encoding is built once and extended incrementally.
    pub fn constrain_objective(
        &mut self,
        objective: &LinearObjective,
        ub: i64,
    ) -> anyhow::Result<()> {
        let obj = self.objective.get_or_insert_with(|| {
            let (lits, offset) = objective.normalized();
            ObjectiveBound {
                max_value: lits.iter().map(|(_, w)| *w).sum(),
                enc: pb::DbGte::from_iter(lits.into_iter().map(|(l, w)| (l, w as usize))),
                offset,
                ub: None,
            }
        });
        let bound = ub.saturating_sub(obj.offset);
        if bound < 0 {
            self.unsat = true;
            return Ok(());
        }
        let bound = bound as u64;
        if bound >= obj.max_value || obj.ub.is_some_and(|old| old <= bound) {
            return Ok(());
        }
        obj.ub = Some(bound);
        let bound = bound as usize;
        obj.enc
            .encode_ub_change(bound..bound + 1, &mut self.solver, &mut self.var_manager)?;
        let units = obj.enc.enforce_ub(bound);
        self.enforce(units)
    }

    /// Gives the solver a new random seed
    pub fn set_seed(&mut self, seed: u64) -> anyhow::Result<()> {
        self.solver.set_option("seed", (seed % i32::MAX as u64) as i32)?;
        Ok(())
    }

    /// Solves under assumptions with an optional conflict limit. The call is
    /// interrupted once the wall clock budget runs out and the solving time is
    /// charged to the deterministic clock.
    pub fn solve(
        &mut self,
        assumps: &[Lit],
        conflict_limit: Option<u32>,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<SolverResult> {
        if self.unsat {
            log.log_oracle_call(SolverResult::Unsat)?;
            return Ok(SolverResult::Unsat);
        }
        if time_limit.limit_reached() {
            return Ok(SolverResult::Interrupted);
        }
        self.n_calls += 1;
        self.solver.limit_conflicts(conflict_limit)?;
        let left = time_limit.time_left();
        if left.is_finite() {
            let deadline = Instant::now() + Duration::from_secs_f64(left);
            self.solver.attach_terminator(move || {
                if Instant::now() >= deadline {
                    ControlSignal::Terminate
                } else {
                    ControlSignal::Continue
                }
            });
        } else {
            self.solver.detach_terminator();
        }
        let before = self.solve_time();
        log.log_routine_start("oracle call")?;
        let res = self.solver.solve_assumps(assumps)?;
        log.log_routine_end()?;
        log.log_oracle_call(res)?;
        let spent = self.solve_time().saturating_sub(before);
        time_limit.advance_deterministic_time(spent.as_secs_f64());
        Ok(res)
    }

    /// The failed assumptions of the last unsatisfiable call
    pub fn core(&mut self) -> anyhow::Result<Vec<Lit>> {
        if self.unsat {
            return Ok(vec![]);
        }
        Ok(self.solver.core()?)
    }

    /// The values of the problem variables in the last model
    pub fn values(&self) -> anyhow::Result<Vec<bool>> {
        if self.n_vars == 0 {
            return Ok(vec![]);
        }
        let sol = self.solver.solution(Var::new(self.n_vars as u32 - 1))?;
        Ok((0..self.n_vars)
            .map(|idx| sol.var_value(Var::new(idx as u32)) == TernaryVal::True)
            .collect())
    }

    /// Sets the preferred polarity of the problem variables
    pub fn phase_values(&mut self, values: &[bool]) -> anyhow::Result<()> {
        for (idx, &val) in values.iter().enumerate().take(self.n_vars) {
            let var = Var::new(idx as u32);
            self.solver
                .phase_lit(if val { var.pos_lit() } else { var.neg_lit() })?;
        }
        Ok(())
    }

    pub fn phase_lit(&mut self, lit: Lit) -> anyhow::Result<()> {
        self.solver.phase_lit(lit)?;
        Ok(())
    }

    pub fn unphase_all(&mut self) -> anyhow::Result<()> {
        for idx in 0..self.n_vars {
            self.solver.unphase_var(Var::new(idx as u32))?;
        }
        Ok(())
    }

    /// Solving effort so far
    pub fn solve_time(&self) -> Duration {
        self.solver.cpu_solve_time()
    }

    /// Solving effort so far in deterministic time units
    pub fn deterministic_time(&self) -> f64 {
        self.solve_time().as_secs_f64()
    }

    pub fn n_calls(&self) -> usize {
        self.n_calls
    }

    /// Access for encodings built outside of this module
    pub(crate) fn parts(&mut self) -> (&mut CaDiCaL<'static, 'static>, &mut VarManager) {
        (&mut self.solver, &mut self.var_manager)
    }

    pub fn max_var(&self) -> Option<Var> {
        self.var_manager.max_var()
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{lit, solvers::SolverResult};

    use super::Oracle;
    use crate::{
        time::TimeLimit,
        types::{LinearConstraint, LinearObjective},
        Log,
    };

    fn solve(oracle: &mut Oracle, assumps: &[rustsat::types::Lit]) -> SolverResult {
        oracle
            .solve(assumps, None, &mut TimeLimit::infinite(), &mut Log::default())
            .unwrap()
    }

    #[test]
    fn weighted_row() {
        let mut oracle = Oracle::new(3, 1).unwrap();
        oracle
            .add_constraint(&LinearConstraint::at_least(
                vec![(lit![0], 3), (lit![1], 2), (lit![2], 2)],
                4,
            ))
            .unwrap();
        assert_eq!(solve(&mut oracle, &[!lit![1]]), SolverResult::Sat);
        assert_eq!(oracle.values().unwrap()[..], [true, false, true]);
        assert_eq!(solve(&mut oracle, &[!lit![0]]), SolverResult::Sat);
        assert_eq!(oracle.values().unwrap()[..], [false, true, true]);
        assert_eq!(
            solve(&mut oracle, &[!lit![0], !lit![2]]),
            SolverResult::Unsat
        );
        let core = oracle.core().unwrap();
        assert!(!core.is_empty());
    }

    #[test]
    fn objective_bound_tightens() {
        let mut oracle = Oracle::new(3, 1).unwrap();
        oracle
            .add_constraint(&LinearConstraint::at_least(
                vec![(lit![0], 1), (lit![1], 1), (lit![2], 1)],
                2,
            ))
            .unwrap();
        let obj = LinearObjective::minimize(vec![(lit![0], 1), (lit![1], 2), (lit![2], 3)]);
        oracle.constrain_objective(&obj, 4).unwrap();
        assert_eq!(solve(&mut oracle, &[]), SolverResult::Sat);
        let values = oracle.values().unwrap();
        let cost: i64 = obj
            .terms()
            .iter()
            .filter(|(l, _)| values[l.var().idx()] != l.is_neg())
            .map(|(_, c)| c)
            .sum();
        assert!(cost <= 4);
        oracle.constrain_objective(&obj, 2).unwrap();
        assert_eq!(solve(&mut oracle, &[]), SolverResult::Unsat);
    }

    #[test]
    fn exported_binary_clauses_use_problem_vars() {
        // four pigeons in three holes, lit `3p + h` puts pigeon `p` in hole `h`
        let mut oracle = Oracle::new(12, 1).unwrap();
        oracle.export_binary_clauses();
        let var = |p: u32, h: u32| rustsat::types::Var::new(3 * p + h).pos_lit();
        for p in 0..4 {
            oracle
                .add_constraint(&LinearConstraint::clause((0..3).map(|h| var(p, h))))
                .unwrap();
        }
        for h in 0..3 {
            oracle
                .add_constraint(&LinearConstraint::at_most(
                    (0..4).map(|p| (var(p, h), 1)).collect(),
                    1,
                ))
                .unwrap();
        }
        assert_eq!(solve(&mut oracle, &[]), SolverResult::Unsat);
        let clauses = oracle.take_binary_clauses();
        for &(a, b) in &clauses {
            assert!(a.var().idx() < 12 && b.var().idx() < 12);
        }
        assert!(oracle.take_binary_clauses().is_empty());

        let mut plain = Oracle::new(2, 1).unwrap();
        plain.add_constraint(&LinearConstraint::clause([lit![0], lit![1]])).unwrap();
        assert_eq!(solve(&mut plain, &[!lit![0]]), SolverResult::Sat);
        assert!(plain.take_binary_clauses().is_empty());
    }

    #[test]
    fn negative_bound_is_unsat() {
        let mut oracle = Oracle::new(1, 1).unwrap();
        let obj = LinearObjective::minimize(vec![(lit![0], 1)]);
        oracle.constrain_objective(&obj, -1).unwrap();
        assert!(oracle.is_unsat());
        assert_eq!(solve(&mut oracle, &[]), SolverResult::Unsat);
    }
}
