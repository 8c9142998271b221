//! # Solver Driver
//!
//! The entry point of the library. A [`BopSolver`] owns the problem and the
//! parameters, builds a fresh problem state and portfolio for every solve
//! call and runs the portfolio until the problem is solved or the time
//! budget is spent.

use std::fmt;

use crate::{
    options::Parameters,
    portfolio::PortfolioOptimizer,
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    types::{Problem, Solution},
    Log, Stats, WriteSolverLog,
};

/// Errors in the solver configuration
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("got an assignment hint of length {0} for {1} variables")]
    HintLength(usize, usize),
}

/// Final outcome of a solve call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    OptimalSolutionFound,
    FeasibleSolutionFound,
    InfeasibleProblem,
    NoSolutionFound,
    /// The problem failed validation
    InvalidProblem,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::OptimalSolutionFound => write!(f, "OPTIMAL"),
            SolveStatus::FeasibleSolutionFound => write!(f, "FEASIBLE"),
            SolveStatus::InfeasibleProblem => write!(f, "INFEASIBLE"),
            SolveStatus::NoSolutionFound => write!(f, "UNKNOWN"),
            SolveStatus::InvalidProblem => write!(f, "INVALID"),
        }
    }
}

/// Result of a solve call, costs are in terms of the user objective
#[derive(Clone, Debug, PartialEq)]
pub struct SolveResult {
    pub status: SolveStatus,
    pub solution: Option<Solution>,
    /// The scaled cost of the solution
    pub cost: Option<f64>,
    /// The best proven scaled bound
    pub bound: Option<f64>,
}

impl SolveResult {
    fn without_solution(status: SolveStatus) -> Self {
        SolveResult {
            status,
            solution: None,
            cost: None,
            bound: None,
        }
    }

    /// The optimality gap in percent
    pub fn gap(&self) -> Option<f64> {
        let (cost, bound) = (self.cost?, self.bound?);
        if cost == bound {
            return Some(0.);
        }
        Some(100. * (cost - bound).abs() / cost.abs().max(bound.abs()))
    }
}

pub struct BopSolver {
    problem: Problem,
    params: Parameters,
    log: Log,
}

impl BopSolver {
    /// Creates a solver, only a single worker is supported
    pub fn new(problem: Problem, params: Parameters) -> Result<Self, Error> {
        if params.num_bop_solvers != 1 {
            return Err(Error::InvalidConfig(format!(
                "{} solver instances requested but only a single one is supported",
                params.num_bop_solvers
            )));
        }
        if !(0. ..=1.).contains(&params.random_lns_difficulty) {
            return Err(Error::InvalidConfig(format!(
                "random LNS difficulty {} is not in [0, 1]",
                params.random_lns_difficulty
            )));
        }
        let mut log = Log::default();
        let stats = log.stats_mut();
        stats.n_vars = problem.n_vars();
        stats.n_constraints = problem.n_constraints();
        Ok(BopSolver {
            problem,
            params,
            log,
        })
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn stats(&self) -> Stats {
        self.log.stats()
    }

    pub fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L) {
        self.log.attach(Box::new(logger));
    }

    pub fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.log.detach()
    }

    /// Solves the problem under the configured limits
    pub fn solve(&mut self) -> anyhow::Result<SolveResult> {
        if self.problem.validate().is_err() {
            return Ok(SolveResult::without_solution(SolveStatus::InvalidProblem));
        }
        let state = ProblemState::new(self.problem.clone(), self.params.relative_gap_limit);
        self.run(state)
    }

    /// Solves the problem with an assignment hint. The hint is the preferred
    /// assignment of the user guided first solution and the initial
    /// incumbent if it is feasible.
    pub fn solve_with_hint(&mut self, hint: &[bool]) -> anyhow::Result<SolveResult> {
        if hint.len() != self.problem.n_vars() {
            return Err(Error::HintLength(hint.len(), self.problem.n_vars()).into());
        }
        if self.problem.validate().is_err() {
            return Ok(SolveResult::without_solution(SolveStatus::InvalidProblem));
        }
        let sol = Solution::checked(&self.problem, hint.to_vec());
        let info = LearnedInfo {
            solution: sol.is_feasible().then_some(sol),
            ..Default::default()
        };
        let mut state = ProblemState::with_learned_info(
            self.problem.clone(),
            self.params.relative_gap_limit,
            &info,
        );
        state.set_assignment_preference(hint.to_vec());
        self.run(state)
    }

    fn run(&mut self, mut state: ProblemState) -> anyhow::Result<SolveResult> {
        let mut time_limit = TimeLimit::new(
            self.params.max_time_in_seconds,
            self.params.max_deterministic_time,
        );
        let mut portfolio = PortfolioOptimizer::new(&self.params);
        let status = portfolio.run(&self.params, &mut state, &mut time_limit, &mut self.log)?;
        self.log.log_message(&format!(
            "portfolio stopped with status {status} after {:.3}s",
            time_limit.elapsed().as_secs_f64()
        ))?;
        self.log.log_end_solve()?;
        Ok(result_of(&state))
    }
}

fn result_of(state: &ProblemState) -> SolveResult {
    if state.is_infeasible() {
        return SolveResult::without_solution(SolveStatus::InfeasibleProblem);
    }
    let objective = state.problem().objective();
    let bound = (state.lower_bound() != i64::MIN).then(|| objective.scaled(state.lower_bound()));
    if !state.solution().is_feasible() {
        return SolveResult {
            bound,
            ..SolveResult::without_solution(SolveStatus::NoSolutionFound)
        };
    }
    let status = if state.is_optimal() {
        SolveStatus::OptimalSolutionFound
    } else {
        SolveStatus::FeasibleSolutionFound
    };
    SolveResult {
        status,
        solution: Some(state.solution().clone()),
        cost: Some(objective.scaled(state.solution().cost())),
        bound,
    }
}
