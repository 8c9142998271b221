//! # BOP
//!
//! A portfolio pseudo-Boolean optimizer. Several search strategies (guided
//! first solutions, LP relaxation bounding, local search, large neighborhood
//! search and core-guided search) are scheduled by an adaptive selector and
//! share everything they learn through a single [`state::ProblemState`].

use anyhow::Context;
use rustsat::solvers::SolverResult;

pub mod options;
pub use options::{OptimizerMethod, OptimizerType, Parameters};

pub mod types;
pub use types::{LinearConstraint, LinearObjective, Problem, Solution};

pub mod prepro;

pub mod state;
pub use state::{LearnedInfo, ProblemState};

pub mod time;
pub use time::TimeLimit;

pub mod solver;
pub use solver::{BopSolver, SolveResult, SolveStatus};

pub mod optimizer;
pub use optimizer::{Optimizer, Status};

pub mod propagator;

pub(crate) mod oracle;

pub(crate) mod selector;

pub(crate) mod portfolio;

pub(crate) mod fs;
#[cfg(feature = "lp")]
pub(crate) mod lp;
pub(crate) mod ls;
pub(crate) mod lns;
pub(crate) mod coreguided;

/// Statistics of the solver
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Stats {
    /// The number of scheduler steps
    pub n_optimizer_calls: usize,
    /// The number of improving solutions merged into the state
    pub n_solutions: usize,
    /// The number of lower bound improvements
    pub n_bound_updates: usize,
    /// The number of calls to the SAT oracle
    pub n_oracle_calls: usize,
    /// The number of extracted cores
    pub n_cores: usize,
    /// Optimizer calls per returned status, indexed by [`Status::idx`]
    pub n_status: [usize; Status::COUNT],
    /// The number of problem variables
    pub n_vars: usize,
    /// The number of problem constraints
    pub n_constraints: usize,
}

/// A logger to attach to a solver
pub trait WriteSolverLog {
    /// Adds an improving solution with its scaled cost to the log
    fn log_solution(&mut self, cost: f64) -> anyhow::Result<()>;
    /// Adds an improved scaled lower bound to the log
    fn log_bound(&mut self, bound: f64) -> anyhow::Result<()>;
    /// Adds a finished optimizer run to the log
    fn log_optimizer_run(
        &mut self,
        name: &str,
        status: Status,
        deterministic_time: f64,
    ) -> anyhow::Result<()>;
    /// Adds an oracle call to the log
    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()>;
    /// Adds an extracted core to the log
    fn log_core(&mut self, weight: u64, len: usize, red_len: usize) -> anyhow::Result<()>;
    /// Adds a new routine starting to the log
    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()>;
    /// Adds a new routine ending to the log
    fn log_routine_end(&mut self) -> anyhow::Result<()>;
    /// Adds end of solving to the log
    fn log_end_solve(&mut self) -> anyhow::Result<()>;
    /// Logs any string
    fn log_message(&mut self, msg: &str) -> anyhow::Result<()>;
}

/// Dispatches events to an optional logger and keeps the statistics
#[derive(Default)]
pub struct Log {
    logger: Option<Box<dyn WriteSolverLog>>,
    stats: Stats,
}

impl Log {
    pub fn attach(&mut self, logger: Box<dyn WriteSolverLog>) {
        self.logger = Some(logger);
    }

    pub fn detach(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.logger.take()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut Stats {
        &mut self.stats
    }

    pub fn log_solution(&mut self, cost: f64) -> anyhow::Result<()> {
        self.stats.n_solutions += 1;
        if let Some(logger) = &mut self.logger {
            logger.log_solution(cost).context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_bound(&mut self, bound: f64) -> anyhow::Result<()> {
        self.stats.n_bound_updates += 1;
        if let Some(logger) = &mut self.logger {
            logger.log_bound(bound).context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_optimizer_run(
        &mut self,
        name: &str,
        status: Status,
        deterministic_time: f64,
    ) -> anyhow::Result<()> {
        self.stats.n_optimizer_calls += 1;
        self.stats.n_status[status.idx()] += 1;
        if let Some(logger) = &mut self.logger {
            logger
                .log_optimizer_run(name, status, deterministic_time)
                .context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()> {
        self.stats.n_oracle_calls += 1;
        if let Some(logger) = &mut self.logger {
            logger.log_oracle_call(result).context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_core(&mut self, weight: u64, len: usize, red_len: usize) -> anyhow::Result<()> {
        self.stats.n_cores += 1;
        if let Some(logger) = &mut self.logger {
            logger
                .log_core(weight, len, red_len)
                .context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_start(desc).context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_routine_end(&mut self) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_end().context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_end_solve(&mut self) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_end_solve().context("logger failed")?;
        }
        Ok(())
    }

    pub fn log_message(&mut self, msg: &str) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_message(msg).context("logger failed")?;
        }
        Ok(())
    }
}
