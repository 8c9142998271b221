//! # Optimizer Contract
//!
//! Every search strategy is a variant of [`Strategy`] and is driven through
//! the uniform [`Optimizer`] wrapper: it is synchronized against the shared
//! [`ProblemState`] whenever the state stamp moved and then asked to do a
//! bounded amount of work that it reports through a [`LearnedInfo`].

use std::fmt;

use crate::{
    coreguided::CoreBasedOptimizer,
    fs::{GuidedSat, RandomFirstSolution},
    lns::{AdaptiveLns, CompleteLns, RandomLns},
    ls::LocalSearchOptimizer,
    options::{OptimizerType, Parameters},
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    Log,
};

#[cfg(feature = "lp")]
use crate::lp::LinearRelaxation;

/// Outcome of an optimizer call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    /// Nothing new was learned, but calling again may help
    Continue,
    /// An improving feasible solution was found
    SolutionFound,
    /// The incumbent (or the returned solution) is optimal
    OptimalSolutionFound,
    /// The problem has no solution
    Infeasible,
    /// The time budget ran out mid-work
    LimitReached,
    /// The optimizer cannot help until the state changes
    Abort,
}

impl Status {
    pub const COUNT: usize = 6;

    pub fn idx(self) -> usize {
        match self {
            Status::Continue => 0,
            Status::SolutionFound => 1,
            Status::OptimalSolutionFound => 2,
            Status::Infeasible => 3,
            Status::LimitReached => 4,
            Status::Abort => 5,
        }
    }

    pub fn all() -> [Status; Status::COUNT] {
        [
            Status::Continue,
            Status::SolutionFound,
            Status::OptimalSolutionFound,
            Status::Infeasible,
            Status::LimitReached,
            Status::Abort,
        ]
    }

    /// Whether the status ends the whole search
    pub fn is_definitive(self) -> bool {
        matches!(self, Status::OptimalSolutionFound | Status::Infeasible)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Continue => write!(f, "continue"),
            Status::SolutionFound => write!(f, "solution-found"),
            Status::OptimalSolutionFound => write!(f, "optimal-solution-found"),
            Status::Infeasible => write!(f, "infeasible"),
            Status::LimitReached => write!(f, "limit-reached"),
            Status::Abort => write!(f, "abort"),
        }
    }
}

/// Interface every variant of [`Strategy`] implements
pub(crate) trait SearchStrategy {
    /// Pulls in state changes, only called when the state stamp moved
    fn synchronize(&mut self, _state: &ProblemState) -> anyhow::Result<Status> {
        Ok(Status::Continue)
    }

    fn runs_once_per_solution(&self) -> bool {
        false
    }

    fn needs_feasible_solution(&self) -> bool {
        false
    }

    fn should_be_run(&self, state: &ProblemState) -> bool;

    fn optimize(
        &mut self,
        params: &Parameters,
        state: &ProblemState,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status>;
}

/// The closed set of search strategies
pub(crate) enum Strategy {
    GuidedSat(GuidedSat),
    RandomFirstSolution(RandomFirstSolution),
    #[cfg(feature = "lp")]
    LinearRelaxation(LinearRelaxation),
    LocalSearch(LocalSearchOptimizer),
    CompleteLns(CompleteLns),
    RandomLns(RandomLns),
    AdaptiveLns(AdaptiveLns),
    CoreBased(CoreBasedOptimizer),
}

macro_rules! dispatch {
    ($strat:expr, $s:ident => $body:expr) => {
        match $strat {
            Strategy::GuidedSat($s) => $body,
            Strategy::RandomFirstSolution($s) => $body,
            #[cfg(feature = "lp")]
            Strategy::LinearRelaxation($s) => $body,
            Strategy::LocalSearch($s) => $body,
            Strategy::CompleteLns($s) => $body,
            Strategy::RandomLns($s) => $body,
            Strategy::AdaptiveLns($s) => $body,
            Strategy::CoreBased($s) => $body,
        }
    };
}

/// A search strategy with its synchronization bookkeeping
pub struct Optimizer {
    name: String,
    kind: OptimizerType,
    strategy: Strategy,
    /// Stamp of the state the strategy last synchronized against
    sync_stamp: Option<u64>,
    /// Upper bound at the last call of a run-once-per-solution strategy
    last_run_ub: Option<i64>,
}

impl Optimizer {
    pub(crate) fn new(name: String, kind: OptimizerType, strategy: Strategy) -> Self {
        Optimizer {
            name,
            kind,
            strategy,
            sync_stamp: None,
            last_run_ub: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OptimizerType {
        self.kind
    }

    /// The state stamp of the last synchronization that did any work
    pub fn synchronized_stamp(&self) -> Option<u64> {
        self.sync_stamp
    }

    /// Pulls in new facts from the state. Calling it again with an unchanged
    /// state does no work and returns [`Status::Continue`].
    pub fn synchronize(&mut self, state: &ProblemState) -> anyhow::Result<Status> {
        if self.sync_stamp == Some(state.update_stamp()) {
            return Ok(Status::Continue);
        }
        self.sync_stamp = Some(state.update_stamp());
        if state.is_infeasible() {
            return Ok(Status::Infeasible);
        }
        if state.is_optimal() {
            return Ok(Status::OptimalSolutionFound);
        }
        dispatch!(&mut self.strategy, s => s.synchronize(state))
    }

    pub fn runs_once_per_solution(&self) -> bool {
        dispatch!(&self.strategy, s => s.runs_once_per_solution())
    }

    pub fn needs_feasible_solution(&self) -> bool {
        dispatch!(&self.strategy, s => s.needs_feasible_solution())
    }

    /// Whether a call can make progress on the current state
    pub fn should_be_run(&self, state: &ProblemState) -> bool {
        if self.needs_feasible_solution() && !state.solution().is_feasible() {
            return false;
        }
        if self.runs_once_per_solution() && self.last_run_ub == Some(state.upper_bound()) {
            return false;
        }
        dispatch!(&self.strategy, s => s.should_be_run(state))
    }

    /// Does a bounded amount of work, reporting what was learned in
    /// `learned`
    pub fn optimize(
        &mut self,
        params: &Parameters,
        state: &ProblemState,
        learned: &mut LearnedInfo,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        debug_assert!(learned.is_empty());
        if self.runs_once_per_solution() {
            self.last_run_ub = Some(state.upper_bound());
        }
        dispatch!(&mut self.strategy, s => s.optimize(params, state, learned, time_limit, log))
    }
}

impl fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Optimizer")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("sync_stamp", &self.sync_stamp)
            .finish()
    }
}

/// Status when the problem with the objective constrained to improve on the
/// incumbent has no solution
pub(crate) fn exhausted_status(state: &ProblemState) -> Status {
    if state.solution().is_feasible() {
        Status::OptimalSolutionFound
    } else {
        Status::Infeasible
    }
}
