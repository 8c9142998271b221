//! # Portfolio Scheduler
//!
//! Runs the configured optimizers one bounded call at a time. Each step
//! synchronizes the optimizers with the shared state, lets the adaptive
//! selector pick one, runs it and merges what it learned.

use crate::{
    coreguided::CoreBasedOptimizer,
    fs::{GuidePolicy, GuidedSat, RandomFirstSolution},
    lns::{AdaptiveLns, CompleteLns, NeighborhoodKind, RandomLns},
    ls::LocalSearchOptimizer,
    optimizer::{Optimizer, Status, Strategy},
    options::{OptimizerType, Parameters},
    selector::AdaptiveItemSelector,
    state::{LearnedInfo, ProblemState},
    time::TimeLimit,
    Log,
};

/// Instantiates the optimizers of one configured optimizer type
fn build_optimizers(kind: OptimizerType, params: &Parameters) -> Vec<Optimizer> {
    let single = |strategy| vec![Optimizer::new(kind.to_string(), kind, strategy)];
    match kind {
        OptimizerType::SatCoreBased => single(Strategy::CoreBased(CoreBasedOptimizer::new(params))),
        OptimizerType::SatLinearSearch => {
            single(Strategy::GuidedSat(GuidedSat::new(GuidePolicy::NotGuided, params)))
        }
        #[cfg(feature = "lp")]
        OptimizerType::LinearRelaxation => {
            single(Strategy::LinearRelaxation(crate::lp::LinearRelaxation::new(params)))
        }
        #[cfg(not(feature = "lp"))]
        OptimizerType::LinearRelaxation => vec![],
        OptimizerType::LocalSearch => (1..=params.max_num_decisions_in_ls)
            .map(|depth| {
                Optimizer::new(
                    format!("{kind}-{depth}"),
                    kind,
                    Strategy::LocalSearch(LocalSearchOptimizer::new(depth, params)),
                )
            })
            .collect(),
        OptimizerType::RandomFirstSolution => {
            single(Strategy::RandomFirstSolution(RandomFirstSolution::new(params)))
        }
        OptimizerType::RandomConstraintLns => single(Strategy::RandomLns(RandomLns::new(
            NeighborhoodKind::Constraint,
            false,
            params,
        ))),
        OptimizerType::RandomVariableLns => single(Strategy::RandomLns(RandomLns::new(
            NeighborhoodKind::Objective,
            false,
            params,
        ))),
        OptimizerType::RandomConstraintLnsGuidedByLp => single(Strategy::RandomLns(
            RandomLns::new(NeighborhoodKind::Constraint, true, params),
        )),
        OptimizerType::RandomVariableLnsGuidedByLp => single(Strategy::RandomLns(
            RandomLns::new(NeighborhoodKind::Objective, true, params),
        )),
        OptimizerType::RelationGraphLns => single(Strategy::AdaptiveLns(AdaptiveLns::new(
            NeighborhoodKind::RelationGraph,
            false,
            params,
        ))),
        OptimizerType::CompleteLns => single(Strategy::CompleteLns(CompleteLns::new(params))),
        OptimizerType::LpFirstSolution => {
            single(Strategy::GuidedSat(GuidedSat::new(GuidePolicy::LpGuided, params)))
        }
        OptimizerType::ObjectiveFirstSolution => single(Strategy::GuidedSat(GuidedSat::new(
            GuidePolicy::ObjectiveGuided,
            params,
        ))),
        OptimizerType::UserGuidedFirstSolution => {
            single(Strategy::GuidedSat(GuidedSat::new(GuidePolicy::UserGuided, params)))
        }
        OptimizerType::AdaptiveObjectiveLns => single(Strategy::AdaptiveLns(AdaptiveLns::new(
            NeighborhoodKind::Objective,
            false,
            params,
        ))),
        OptimizerType::AdaptiveConstraintLns => single(Strategy::AdaptiveLns(AdaptiveLns::new(
            NeighborhoodKind::Constraint,
            false,
            params,
        ))),
    }
}

pub(crate) struct PortfolioOptimizer {
    optimizers: Vec<Optimizer>,
    time_limit_ratios: Vec<f64>,
    selector: AdaptiveItemSelector,
    /// State stamp at which an optimizer last aborted, it is skipped until
    /// the state changes
    aborted_at: Vec<Option<u64>>,
    n_failing_calls: usize,
}

impl PortfolioOptimizer {
    pub fn new(params: &Parameters) -> Self {
        let mut optimizers = vec![];
        let mut time_limit_ratios = vec![];
        let mut scores = vec![];
        for method in params.methods() {
            for opt in build_optimizers(method.kind, params) {
                scores.push((opt.name().to_string(), method.initial_score));
                time_limit_ratios.push(method.time_limit_ratio);
                optimizers.push(opt);
            }
        }
        let n_opts = optimizers.len();
        PortfolioOptimizer {
            optimizers,
            time_limit_ratios,
            selector: AdaptiveItemSelector::new(params.random_seed, scores),
            aborted_at: vec![None; n_opts],
            n_failing_calls: 0,
        }
    }

    pub fn optimizers(&self) -> &[Optimizer] {
        &self.optimizers
    }

    /// Runs steps until the state is solved, the time limit is reached or
    /// no optimizer can make progress
    pub fn run(
        &mut self,
        params: &Parameters,
        state: &mut ProblemState,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        loop {
            if time_limit.limit_reached() {
                return Ok(Status::LimitReached);
            }
            let status = self.step(params, state, time_limit, log)?;
            if status != Status::Continue {
                return Ok(status);
            }
        }
    }

    /// Synchronizes all optimizers and runs a single selected one
    pub fn step(
        &mut self,
        params: &Parameters,
        state: &mut ProblemState,
        time_limit: &mut TimeLimit,
        log: &mut Log,
    ) -> anyhow::Result<Status> {
        if let Some(status) = definitive_status(state) {
            return Ok(status);
        }
        for opt in &mut self.optimizers {
            match opt.synchronize(state)? {
                Status::Infeasible => return Ok(exhaust(state)),
                Status::OptimalSolutionFound if state.solution().is_feasible() => {
                    state.mark_as_optimal();
                    return Ok(Status::OptimalSolutionFound);
                }
                _ => (),
            }
        }
        for (idx, opt) in self.optimizers.iter().enumerate() {
            let runnable =
                self.aborted_at[idx] != Some(state.update_stamp()) && opt.should_be_run(state);
            self.selector.set_selectable(idx, runnable);
        }
        let Some(idx) = self.selector.select_item() else {
            log.log_message("no optimizer can make progress")?;
            return Ok(Status::Abort);
        };

        log.log_message(&format!(
            "selected {} with score {:.3}",
            self.selector.name(idx),
            self.selector.score(idx)
        ))?;
        let opt = &mut self.optimizers[idx];
        let mut sub_limit = time_limit.sub_limit(self.time_limit_ratios[idx]);
        let mut learned = LearnedInfo::default();
        let status = opt.optimize(params, state, &mut learned, &mut sub_limit, log)?;
        let spent = sub_limit.elapsed_deterministic_time();
        time_limit.advance_deterministic_time(spent);
        log.log_optimizer_run(opt.name(), status, spent)?;

        let old_ub = state.upper_bound();
        let old_lb = state.lower_bound();
        let changed = match status {
            Status::Infeasible => {
                state.merge_learned_info(&learned);
                exhaust(state);
                true
            }
            Status::OptimalSolutionFound => {
                state.merge_learned_info(&learned);
                if state.solution().is_feasible() && !state.is_optimal() {
                    state.mark_as_optimal();
                }
                true
            }
            _ => state.merge_learned_info(&learned),
        };
        let objective = state.problem().objective();
        if state.solution().is_feasible() && state.upper_bound() < old_ub {
            log.log_solution(objective.scaled(state.upper_bound()))?;
        }
        if state.lower_bound() > old_lb && !state.is_infeasible() {
            log.log_bound(objective.scaled(state.lower_bound()))?;
        }

        self.selector.update_score(changed);
        if status == Status::Abort {
            self.aborted_at[idx] = Some(state.update_stamp());
        }
        if state.upper_bound() < old_ub {
            self.selector.start_new_round();
        }

        if let Some(status) = definitive_status(state) {
            return Ok(status);
        }
        if changed {
            self.n_failing_calls = 0;
        } else {
            self.n_failing_calls += 1;
            if params
                .max_number_of_consecutive_failing_optimizer_calls
                .is_some_and(|max| self.n_failing_calls >= max)
            {
                log.log_message("too many consecutive failing optimizer calls")?;
                return Ok(Status::Abort);
            }
        }
        if time_limit.limit_reached() {
            return Ok(Status::LimitReached);
        }
        Ok(Status::Continue)
    }
}

/// Closes the search once no better solution exists. With a feasible
/// incumbent this proves it optimal.
fn exhaust(state: &mut ProblemState) -> Status {
    if state.solution().is_feasible() {
        if !state.is_optimal() {
            state.mark_as_optimal();
        }
        Status::OptimalSolutionFound
    } else {
        if !state.is_infeasible() {
            state.mark_as_infeasible();
        }
        Status::Infeasible
    }
}

fn definitive_status(state: &ProblemState) -> Option<Status> {
    if state.is_infeasible() {
        Some(Status::Infeasible)
    } else if state.is_optimal() {
        Some(Status::OptimalSolutionFound)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::{exhaust, PortfolioOptimizer};
    use crate::{
        optimizer::Status,
        options::{OptimizerMethod, OptimizerType, Parameters},
        state::{LearnedInfo, ProblemState},
        time::TimeLimit,
        types::{LinearConstraint, LinearObjective, Problem, Solution},
        Log,
    };

    fn two_of_three() -> Problem {
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

    #[test]
    fn local_search_expands_per_depth() {
        let params = Parameters {
            max_num_decisions_in_ls: 3,
            ..Parameters::only(&[OptimizerType::LocalSearch, OptimizerType::SatCoreBased])
        };
        let portfolio = PortfolioOptimizer::new(&params);
        let names: Vec<_> = portfolio.optimizers().iter().map(|o| o.name()).collect();
        assert_eq!(
            names,
            vec![
                "local-search-1",
                "local-search-2",
                "local-search-3",
                "sat-core-based"
            ]
        );
        assert_eq!(portfolio.optimizers()[2].kind(), OptimizerType::LocalSearch);
    }

    #[test]
    fn synchronization_is_idempotent() {
        let state = ProblemState::new(two_of_three(), 0.);
        let mut portfolio = PortfolioOptimizer::new(&Parameters::default());
        for opt in &mut portfolio.optimizers {
            assert_eq!(opt.synchronize(&state).unwrap(), Status::Continue);
            let stamp = opt.synchronized_stamp();
            assert_eq!(opt.synchronize(&state).unwrap(), Status::Continue);
            assert_eq!(opt.synchronized_stamp(), stamp);
        }
    }

    #[test]
    fn default_portfolio_solves() {
        let params = Parameters::default();
        let mut state = ProblemState::new(two_of_three(), 0.);
        let mut portfolio = PortfolioOptimizer::new(&params);
        let status = portfolio
            .run(
                &params,
                &mut state,
                &mut TimeLimit::new(30., f64::INFINITY),
                &mut Log::default(),
            )
            .unwrap();
        assert_eq!(status, Status::OptimalSolutionFound);
        assert_eq!(state.solution().cost(), -2);
    }

    #[test]
    fn bounds_are_monotone() {
        let params = Parameters::default();
        let mut state = ProblemState::new(two_of_three(), 0.);
        let mut portfolio = PortfolioOptimizer::new(&params);
        let mut time_limit = TimeLimit::new(30., f64::INFINITY);
        let mut log = Log::default();
        let (mut lb, mut ub) = (state.lower_bound(), state.upper_bound());
        for _ in 0..100 {
            let status = portfolio
                .step(&params, &mut state, &mut time_limit, &mut log)
                .unwrap();
            assert!(state.lower_bound() >= lb);
            assert!(state.upper_bound() <= ub);
            (lb, ub) = (state.lower_bound(), state.upper_bound());
            if status != Status::Continue {
                break;
            }
        }
        assert!(state.is_optimal());
    }

    #[test]
    fn exhausted_search_keeps_incumbent() {
        let prob = two_of_three();
        let mut state = ProblemState::new(prob.clone(), 0.);
        state.merge_learned_info(&LearnedInfo {
            solution: Some(Solution::checked(&prob, vec![true, false, false])),
            ..Default::default()
        });
        assert_eq!(exhaust(&mut state), Status::OptimalSolutionFound);
        assert!(state.is_optimal());
        assert!(!state.is_infeasible());
        assert_eq!(state.lower_bound(), -1);

        let mut state = ProblemState::new(prob, 0.);
        assert_eq!(exhaust(&mut state), Status::Infeasible);
        assert!(state.is_infeasible());
        let lb = state.lower_bound();
        assert!(!state.merge_learned_info(&LearnedInfo::default()));
        assert_eq!(state.lower_bound(), lb);
    }

    #[test]
    fn failing_calls_limit_stops() {
        // an LNS never runs without a solution to start from
        let params = Parameters {
            methods: vec![OptimizerMethod::new(OptimizerType::RandomConstraintLns)],
            max_number_of_consecutive_failing_optimizer_calls: Some(3),
            ..Default::default()
        };
        let mut state = ProblemState::new(two_of_three(), 0.);
        let mut portfolio = PortfolioOptimizer::new(&params);
        let status = portfolio
            .run(
                &params,
                &mut state,
                &mut TimeLimit::new(30., f64::INFINITY),
                &mut Log::default(),
            )
            .unwrap();
        assert_eq!(status, Status::Abort);
        assert!(!state.solution().is_feasible());
    }
}
