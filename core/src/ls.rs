//! # Local Search
//!
//! One-flip repair local search around the incumbent. The search tree is
//! bounded by a maximum number of decisions and survives across calls. It is
//! only rebuilt when the incumbent or the set of fixed variables changes.

use crate::{
    optimizer::{SearchStrategy, Status},
    options::Parameters,
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    types::Solution,
    Log,
};

mod iterator;
mod maintainer;
mod repairer;

use iterator::{AssignmentIterator, Step};

pub struct LocalSearchOptimizer {
    max_num_decisions: usize,
    seed: u64,
    iterator: Option<AssignmentIterator>,
    /// Upper bound and number of fixed variables the iterator was built for
    built_for: Option<(i64, usize)>,
    exhausted: bool,
}

impl LocalSearchOptimizer {
    pub fn new(max_num_decisions: usize, params: &Parameters) -> Self {
        LocalSearchOptimizer {
            max_num_decisions,
            seed: params.random_seed.wrapping_add(max_num_decisions as u64),
            iterator: None,
            built_for: None,
            exhausted: false,
        }
    }

    pub fn max_num_decisions(&self) -> usize {
        self.max_num_decisions
    }

    fn rebuild(&mut self, state: &ProblemState, params: &Parameters) -> Status {
        let key = (state.upper_bound(), state.n_fixed_vars());
        if self.built_for == Some(key) {
            return Status::Continue;
        }
        self.built_for = Some(key);
        self.exhausted = false;
        self.iterator = AssignmentIterator::new(state, params, self.max_num_decisions, self.seed);
        if self.iterator.is_none() {
            // propagation alone rules out any improvement
            return Status::OptimalSolutionFound;
        }
        Status::Continue
    }
}

impl SearchStrategy for LocalSearchOptimizer {
    fn needs_feasible_solution(&self) -> bool {
        true
    }

    fn should_be_run(&self, _state: &ProblemState) -> bool {
        !self.exhausted
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
        let status = self.rebuild(state, params);
        if status != Status::Continue {
            learned.lower_bound = state.upper_bound();
            return Ok(status);
        }
        let Some(it) = &mut self.iterator else {
            return Ok(Status::Abort);
        };
        let dtime = it.deterministic_time();
        let explored = it.n_explored();
        let step = it.next_assignment(
            params.max_number_of_explored_assignments_per_try_in_ls,
            time_limit,
        );
        time_limit.advance_deterministic_time(it.deterministic_time() - dtime);
        log.log_message(&format!(
            "local search depth {} explored {} assignments",
            self.max_num_decisions,
            it.n_explored() - explored
        ))?;
        learned.fixed_literals = it
            .level_zero_lits()
            .iter()
            .copied()
            .filter(|l| !state.is_fixed(l.var()))
            .collect();
        Ok(match step {
            Step::Feasible => {
                let sol = Solution::checked(state.problem(), it.assignment().to_vec());
                debug_assert!(sol.is_feasible());
                if sol.is_feasible() && sol.cost() < state.upper_bound() {
                    learned.solution = Some(sol);
                    Status::SolutionFound
                } else {
                    Status::Continue
                }
            }
            Step::Exhausted => {
                self.exhausted = true;
                Status::Abort
            }
            Step::BudgetSpent => Status::Continue,
            Step::LimitReached => Status::LimitReached,
        })
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::LocalSearchOptimizer;
    use crate::{
        optimizer::{SearchStrategy, Status},
        options::Parameters,
        state::{LearnedInfo, ProblemState},
        time::TimeLimit,
        types::{LinearConstraint, LinearObjective, Problem, Solution},
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

    fn call(ls: &mut LocalSearchOptimizer, state: &mut ProblemState) -> Status {
        let mut learned = LearnedInfo::default();
        let status = ls
            .optimize(
                &Parameters::default(),
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
    fn climbs_to_optimum() {
        let prob = max_two_of_three();
        let mut state = ProblemState::new(prob.clone(), 0.);
        state.merge_learned_info(&LearnedInfo {
            solution: Some(Solution::checked(&prob, vec![false; 3])),
            ..Default::default()
        });
        let mut ls = LocalSearchOptimizer::new(1, &Parameters::default());
        assert!(ls.needs_feasible_solution());
        assert_eq!(call(&mut ls, &mut state), Status::SolutionFound);
        assert_eq!(state.solution().cost(), -1);
        assert_eq!(call(&mut ls, &mut state), Status::SolutionFound);
        assert_eq!(state.solution().cost(), -2);
        assert_eq!(call(&mut ls, &mut state), Status::OptimalSolutionFound);
        assert!(state.is_optimal());
    }

    #[test]
    fn level_zero_propagation_improves() {
        let mut prob = Problem::new(2);
        prob.add_constraint(LinearConstraint::equal(vec![(lit![0], 1), (lit![1], 1)], 1));
        prob.set_objective(LinearObjective::minimize(vec![(lit![0], 2), (lit![1], 1)]));
        let mut state = ProblemState::new(prob.clone(), 0.);
        state.merge_learned_info(&LearnedInfo {
            solution: Some(Solution::checked(&prob, vec![true, false])),
            ..Default::default()
        });
        let mut ls = LocalSearchOptimizer::new(1, &Parameters::default());
        assert_eq!(call(&mut ls, &mut state), Status::SolutionFound);
        assert_eq!(state.solution().values(), &[false, true]);
    }

    #[test]
    fn exhausted_search_aborts() {
        // every improvement needs at least two flips
        let mut prob = Problem::new(4);
        prob.add_constraint(LinearConstraint::equal(
            vec![(lit![0], 1), (lit![1], 1), (lit![2], 1), (lit![3], 1)],
            2,
        ));
        prob.set_objective(LinearObjective::minimize(vec![
            (lit![0], 3),
            (lit![1], 3),
            (lit![2], 1),
            (lit![3], 1),
        ]));
        let mut state = ProblemState::new(prob.clone(), 0.);
        state.merge_learned_info(&LearnedInfo {
            solution: Some(Solution::checked(&prob, vec![true, true, false, false])),
            ..Default::default()
        });
        let mut ls = LocalSearchOptimizer::new(1, &Parameters::default());
        assert_eq!(call(&mut ls, &mut state), Status::Abort);
        assert!(!ls.should_be_run(&state));

        let mut ls = LocalSearchOptimizer::new(2, &Parameters::default());
        assert_eq!(call(&mut ls, &mut state), Status::SolutionFound);
        assert_eq!(state.solution().cost(), 4);
    }
}
