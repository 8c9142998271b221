//! # Neighborhood Generators
//!
//! A neighborhood is given by the literals that stay fixed to their value in
//! the incumbent. Every generator relaxes about `difficulty` of the variables
//! the state has not fixed yet and fixes the rest.

use rand::{rngs::StdRng, seq::SliceRandom, Rng};
use rustsat::types::{Lit, Var};

use crate::{state::ProblemState, types::Problem};

/// Constraints with more than this fraction of all variables are not used to
/// grow neighborhoods
const MAX_CONSTRAINT_FRACTION: f64 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborhoodKind {
    /// Relaxes random objective variables whose value incurs cost, then
    /// random other variables
    Objective,
    /// Relaxes all variables of random constraints
    Constraint,
    /// Relaxes variables reached by a breadth first walk over the
    /// variable/constraint incidence graph
    RelationGraph,
}

#[derive(Clone, Debug)]
pub(crate) struct NeighborhoodGenerator {
    kind: NeighborhoodKind,
    /// Per constraint, its variables, empty for constraints that are too large
    constraint_vars: Vec<Vec<Var>>,
    /// Per variable, the constraints it appears in
    var_constraints: Vec<Vec<usize>>,
}

impl NeighborhoodGenerator {
    pub fn new(kind: NeighborhoodKind, problem: &Problem) -> Self {
        let max_len = (MAX_CONSTRAINT_FRACTION * problem.n_vars() as f64) as usize;
        let constraint_vars: Vec<Vec<Var>> = problem
            .constraints()
            .map(|(_, constr)| {
                if constr.len() > max_len.max(1) {
                    vec![]
                } else {
                    constr.terms().iter().map(|(l, _)| l.var()).collect()
                }
            })
            .collect();
        let mut var_constraints = vec![vec![]; problem.n_vars()];
        for (cidx, vars) in constraint_vars.iter().enumerate() {
            for var in vars {
                var_constraints[var.idx()].push(cidx);
            }
        }
        NeighborhoodGenerator {
            kind,
            constraint_vars,
            var_constraints,
        }
    }

    /// The literals of the incumbent to fix. Variables fixed in the state are
    /// neither relaxed nor returned.
    pub fn generate(&self, state: &ProblemState, difficulty: f64, rng: &mut StdRng) -> Vec<Lit> {
        let problem = state.problem();
        let candidates: Vec<Var> = problem.vars().filter(|&v| !state.is_fixed(v)).collect();
        let target = (difficulty.clamp(0., 1.) * candidates.len() as f64).round() as usize;
        let mut relaxed = Relaxed::new(problem.n_vars(), state);
        match self.kind {
            NeighborhoodKind::Objective => {
                let mut costly: Vec<Var> = candidates
                    .iter()
                    .copied()
                    .filter(|&v| {
                        let val = state.solution().value(v);
                        problem.var_cost(v, val) > problem.var_cost(v, !val)
                    })
                    .collect();
                costly.shuffle(rng);
                let mut others = candidates.clone();
                others.shuffle(rng);
                for var in costly.into_iter().chain(others) {
                    if relaxed.len() >= target {
                        break;
                    }
                    relaxed.relax(var);
                }
            }
            NeighborhoodKind::Constraint => {
                let mut order: Vec<usize> = (0..self.constraint_vars.len()).collect();
                order.shuffle(rng);
                for cidx in order {
                    if relaxed.len() >= target {
                        break;
                    }
                    for &var in &self.constraint_vars[cidx] {
                        relaxed.relax(var);
                    }
                }
            }
            NeighborhoodKind::RelationGraph => {
                let mut queue = std::collections::VecDeque::new();
                let mut seen_constraint = vec![false; self.constraint_vars.len()];
                while relaxed.len() < target {
                    let var = match queue.pop_front() {
                        Some(var) => var,
                        None => {
                            let open: Vec<Var> = candidates
                                .iter()
                                .copied()
                                .filter(|&v| !relaxed.contains(v))
                                .collect();
                            if open.is_empty() {
                                break;
                            }
                            let var = open[rng.random_range(0..open.len())];
                            relaxed.relax(var);
                            var
                        }
                    };
                    for &cidx in &self.var_constraints[var.idx()] {
                        if std::mem::replace(&mut seen_constraint[cidx], true) {
                            continue;
                        }
                        for &next in &self.constraint_vars[cidx] {
                            if relaxed.len() >= target {
                                break;
                            }
                            if relaxed.relax(next) {
                                queue.push_back(next);
                            }
                        }
                    }
                }
            }
        }
        let sol = state.solution();
        candidates
            .into_iter()
            .filter(|&v| !relaxed.contains(v))
            .map(|v| {
                if sol.value(v) {
                    v.pos_lit()
                } else {
                    v.neg_lit()
                }
            })
            .collect()
    }
}

/// Set of relaxed variables that ignores variables fixed in the state
struct Relaxed {
    relaxed: Vec<bool>,
    blocked: Vec<bool>,
    len: usize,
}

impl Relaxed {
    fn new(n_vars: usize, state: &ProblemState) -> Self {
        Relaxed {
            relaxed: vec![false; n_vars],
            blocked: (0..n_vars as u32).map(|v| state.is_fixed(Var::new(v))).collect(),
            len: 0,
        }
    }

    /// Relaxes a variable, returns whether it was newly relaxed
    fn relax(&mut self, var: Var) -> bool {
        if self.blocked[var.idx()] || self.relaxed[var.idx()] {
            return false;
        }
        self.relaxed[var.idx()] = true;
        self.len += 1;
        true
    }

    fn contains(&self, var: Var) -> bool {
        self.relaxed[var.idx()]
    }

    fn len(&self) -> usize {
        self.len
    }
}
