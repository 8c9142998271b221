//! # Solver Parameters

use std::fmt;

/// The kinds of optimizers the portfolio can run
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OptimizerType {
    /// Core-guided OLL search proving lower bounds
    SatCoreBased,
    /// SAT-UNSAT linear search on the objective
    SatLinearSearch,
    /// Solve the LP relaxation for bounds and hint values
    LinearRelaxation,
    /// One-flip repair local search, one instance per decision depth
    LocalSearch,
    /// Randomized restarts of the oracle with a small conflict budget
    RandomFirstSolution,
    /// LNS relaxing the variables of random constraints
    RandomConstraintLns,
    /// LNS fixing random objective variables
    RandomVariableLns,
    /// [`OptimizerType::RandomConstraintLns`] with LP guided phases
    RandomConstraintLnsGuidedByLp,
    /// [`OptimizerType::RandomVariableLns`] with LP guided phases
    RandomVariableLnsGuidedByLp,
    /// Adaptive LNS over the variable/constraint incidence graph
    RelationGraphLns,
    /// LNS allowing a bounded number of objective terms to change
    CompleteLns,
    /// First solution with phases from the LP relaxation
    LpFirstSolution,
    /// First solution with phases minimizing the objective
    ObjectiveFirstSolution,
    /// First solution with phases from a user hint
    UserGuidedFirstSolution,
    /// Adaptive difficulty LNS with objective based neighborhoods
    AdaptiveObjectiveLns,
    /// Adaptive difficulty LNS with constraint based neighborhoods
    AdaptiveConstraintLns,
}

impl fmt::Display for OptimizerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerType::SatCoreBased => write!(f, "sat-core-based"),
            OptimizerType::SatLinearSearch => write!(f, "sat-linear-search"),
            OptimizerType::LinearRelaxation => write!(f, "linear-relaxation"),
            OptimizerType::LocalSearch => write!(f, "local-search"),
            OptimizerType::RandomFirstSolution => write!(f, "random-first-solution"),
            OptimizerType::RandomConstraintLns => write!(f, "random-constraint-lns"),
            OptimizerType::RandomVariableLns => write!(f, "random-variable-lns"),
            OptimizerType::RandomConstraintLnsGuidedByLp => {
                write!(f, "random-constraint-lns-guided-by-lp")
            }
            OptimizerType::RandomVariableLnsGuidedByLp => {
                write!(f, "random-variable-lns-guided-by-lp")
            }
            OptimizerType::RelationGraphLns => write!(f, "relation-graph-lns"),
            OptimizerType::CompleteLns => write!(f, "complete-lns"),
            OptimizerType::LpFirstSolution => write!(f, "lp-first-solution"),
            OptimizerType::ObjectiveFirstSolution => write!(f, "objective-first-solution"),
            OptimizerType::UserGuidedFirstSolution => write!(f, "user-guided-first-solution"),
            OptimizerType::AdaptiveObjectiveLns => write!(f, "adaptive-objective-lns"),
            OptimizerType::AdaptiveConstraintLns => write!(f, "adaptive-constraint-lns"),
        }
    }
}

/// An enabled optimizer with its tuning
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct OptimizerMethod {
    pub kind: OptimizerType,
    /// Score the selector starts with for this optimizer
    pub initial_score: f64,
    /// Fraction of the remaining time budget a single call may use
    pub time_limit_ratio: f64,
}

impl OptimizerMethod {
    pub fn new(kind: OptimizerType) -> Self {
        OptimizerMethod {
            kind,
            initial_score: 0.1,
            time_limit_ratio: 1.,
        }
    }

    pub fn with_score(mut self, initial_score: f64) -> Self {
        self.initial_score = initial_score;
        self
    }

    pub fn with_time_limit_ratio(mut self, ratio: f64) -> Self {
        self.time_limit_ratio = ratio;
        self
    }
}

impl From<OptimizerType> for OptimizerMethod {
    fn from(kind: OptimizerType) -> Self {
        OptimizerMethod::new(kind)
    }
}

/// The optimizer order used when no methods are configured
pub fn default_methods() -> Vec<OptimizerMethod> {
    use OptimizerType::*;
    [
        (LocalSearch, 1.),
        (RandomFirstSolution, 0.1),
        (LinearRelaxation, 0.1),
        (LpFirstSolution, 0.1),
        (ObjectiveFirstSolution, 0.1),
        (UserGuidedFirstSolution, 0.1),
        (RandomConstraintLnsGuidedByLp, 0.1),
        (RandomVariableLnsGuidedByLp, 0.1),
        (RelationGraphLns, 0.1),
        (RandomConstraintLns, 0.1),
        (RandomVariableLns, 0.1),
        (AdaptiveObjectiveLns, 0.1),
        (AdaptiveConstraintLns, 0.1),
        (SatCoreBased, 0.1),
        (CompleteLns, 0.1),
        (SatLinearSearch, 0.01),
    ]
    .into_iter()
    .map(|(kind, score)| OptimizerMethod::new(kind).with_score(score))
    .collect()
}

/// Parameters of the solver
#[derive(Clone, PartialEq, Debug)]
pub struct Parameters {
    /// Wall clock limit for the whole solve
    pub max_time_in_seconds: f64,
    /// Deterministic time limit for the whole solve
    pub max_deterministic_time: f64,
    /// Stop once `(ub - lb) <= gap * max(|ub|, |lb|)`
    pub relative_gap_limit: f64,
    pub random_seed: u64,
    /// Number of parallel solver instances, only 1 is supported
    pub num_bop_solvers: usize,
    /// Stop after this many scheduler steps without any state change
    pub max_number_of_consecutive_failing_optimizer_calls: Option<usize>,
    /// Enabled optimizers in order, the default order is used if empty
    pub methods: Vec<OptimizerMethod>,
    /// Conflict limit of one guided first solution call
    pub guided_sat_conflicts_chunk: u32,
    /// Initial fraction of the optimizer budget given to a first solution
    /// call, doubled after every call
    pub first_solution_time_ratio: f64,
    pub max_number_of_conflicts_in_random_solution_generation: u32,
    pub max_number_of_conflicts_in_random_lns: u32,
    /// Conflict limit of the probe on the existing oracle in adaptive LNS
    pub max_number_of_conflicts_for_quick_check: u32,
    /// Number of neighborhoods tried per call of a random LNS
    pub num_random_lns_tries: usize,
    /// Fraction of the variables random LNS leaves free
    pub random_lns_difficulty: f64,
    /// Number of objective terms complete LNS lets change
    pub num_relaxed_vars: usize,
    /// Local search instances are created for depths `1..=max`
    pub max_num_decisions_in_ls: usize,
    pub max_num_broken_constraints_in_ls: usize,
    pub max_number_of_explored_assignments_per_try_in_ls: usize,
    pub use_transposition_table_in_ls: bool,
    pub use_potential_one_flip_repairs_in_ls: bool,
    pub use_lp_strong_branching: bool,
    /// Deterministic time budget of one strong branching pass
    pub lp_max_deterministic_time: f64,
    pub use_learned_binary_clauses_in_lp: bool,
    /// Minimize cores in the core-guided optimizer
    pub core_minimization: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            max_time_in_seconds: f64::INFINITY,
            max_deterministic_time: f64::INFINITY,
            relative_gap_limit: 1e-4,
            random_seed: 8,
            num_bop_solvers: 1,
            max_number_of_consecutive_failing_optimizer_calls: None,
            methods: vec![],
            guided_sat_conflicts_chunk: 1000,
            first_solution_time_ratio: 0.1,
            max_number_of_conflicts_in_random_solution_generation: 500,
            max_number_of_conflicts_in_random_lns: 2500,
            max_number_of_conflicts_for_quick_check: 10,
            num_random_lns_tries: 1,
            random_lns_difficulty: 0.3,
            num_relaxed_vars: 10,
            max_num_decisions_in_ls: 4,
            max_num_broken_constraints_in_ls: usize::MAX,
            max_number_of_explored_assignments_per_try_in_ls: 10000,
            use_transposition_table_in_ls: true,
            use_potential_one_flip_repairs_in_ls: false,
            use_lp_strong_branching: false,
            lp_max_deterministic_time: 1.,
            use_learned_binary_clauses_in_lp: true,
            core_minimization: true,
        }
    }
}

impl Parameters {
    /// The configured methods or the default order
    pub fn methods(&self) -> Vec<OptimizerMethod> {
        if self.methods.is_empty() {
            default_methods()
        } else {
            self.methods.clone()
        }
    }

    /// Parameters that only run the given optimizer types
    pub fn only(kinds: &[OptimizerType]) -> Self {
        Parameters {
            methods: kinds.iter().map(|&k| OptimizerMethod::new(k)).collect(),
            ..Default::default()
        }
    }
}
