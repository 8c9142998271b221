use bop_core::{BopSolver, OptimizerMethod, OptimizerType, Parameters, SolveResult, SolveStatus};
use libtest_mimic::{Arguments, Failed};

use setup::TestSetup;

/// Optimizer types that prove optimality on their own
const COMPLETE: [OptimizerType; 2] = [OptimizerType::SatCoreBased, OptimizerType::SatLinearSearch];

const ALL_TYPES: [OptimizerType; 16] = [
    OptimizerType::SatCoreBased,
    OptimizerType::SatLinearSearch,
    OptimizerType::LinearRelaxation,
    OptimizerType::LocalSearch,
    OptimizerType::RandomFirstSolution,
    OptimizerType::RandomConstraintLns,
    OptimizerType::RandomVariableLns,
    OptimizerType::RandomConstraintLnsGuidedByLp,
    OptimizerType::RandomVariableLnsGuidedByLp,
    OptimizerType::RelationGraphLns,
    OptimizerType::CompleteLns,
    OptimizerType::LpFirstSolution,
    OptimizerType::ObjectiveFirstSolution,
    OptimizerType::UserGuidedFirstSolution,
    OptimizerType::AdaptiveObjectiveLns,
    OptimizerType::AdaptiveConstraintLns,
];

fn limited(params: Parameters) -> Parameters {
    Parameters {
        max_time_in_seconds: 10.,
        max_number_of_consecutive_failing_optimizer_calls: Some(500),
        ..params
    }
}

fn main() {
    let args = Arguments::from_args();
    let mut tests = vec![];

    tests.extend(
        TestSetup::new("portfolio", "", limited(Parameters::default()), true).collect_tests(),
    );
    tests.extend(
        TestSetup::new(
            "portfolio",
            "no-core-min",
            limited(Parameters {
                core_minimization: false,
                ..Parameters::default()
            }),
            true,
        )
        .collect_tests(),
    );
    tests.extend(
        TestSetup::new(
            "portfolio",
            "seed",
            limited(Parameters {
                random_seed: 42,
                ..Parameters::default()
            }),
            true,
        )
        .collect_tests(),
    );

    for kind in ALL_TYPES {
        // the first solution lets optimizers that improve solutions run
        let params = limited(Parameters {
            methods: vec![
                OptimizerMethod::new(OptimizerType::ObjectiveFirstSolution).with_score(0.1),
                OptimizerMethod::new(kind),
            ],
            ..Parameters::default()
        });
        tests.extend(
            TestSetup::new(kind.to_string(), "", params, COMPLETE.contains(&kind)).collect_tests(),
        );
    }
    for kind in COMPLETE {
        tests.extend(
            TestSetup::new(kind.to_string(), "alone", limited(Parameters::only(&[kind])), true)
                .collect_tests(),
        );
    }

    libtest_mimic::run(&args, tests).exit();
}

/// The result has to be correct but only complete configurations have to
/// reach a definitive status
fn check_result(
    res: &SolveResult,
    expected: Option<f64>,
    complete: bool,
) -> Result<(), Failed> {
    match expected {
        None => match res.status {
            SolveStatus::InfeasibleProblem => Ok(()),
            SolveStatus::NoSolutionFound if !complete => Ok(()),
            status => Err(format!("expected infeasibility, got {status}").into()),
        },
        Some(opt) => match res.status {
            SolveStatus::OptimalSolutionFound => {
                if res.cost == Some(opt) {
                    Ok(())
                } else {
                    Err(format!("optimum mismatch: was {:?}, should be {opt}", res.cost).into())
                }
            }
            SolveStatus::FeasibleSolutionFound | SolveStatus::NoSolutionFound if !complete => {
                if res.cost.is_some_and(|cost| cost < opt) {
                    return Err(format!("cost {:?} below the optimum {opt}", res.cost).into());
                }
                if res.bound.is_some_and(|bound| bound > opt) {
                    return Err(format!("bound {:?} above the optimum {opt}", res.bound).into());
                }
                Ok(())
            }
            status => Err(format!("expected optimum {opt}, got {status}").into()),
        },
    }
}

fn run_test(
    inst: bop_core::prepro::Parsed,
    params: Parameters,
    expected: Option<f64>,
    complete: bool,
) -> Result<(), Failed> {
    let problem = inst.problem;
    let mut solver = BopSolver::new(problem.clone(), params)?;
    let res = solver.solve()?;
    if let Some(sol) = &res.solution {
        if !problem.is_feasible(sol.values()) {
            return Err("reported solution violates a constraint".into());
        }
        if Some(problem.objective().scaled(sol.cost())) != res.cost {
            return Err("reported cost does not match the solution".into());
        }
    }
    check_result(&res, expected, complete)
}

mod setup {
    use std::{
        ffi::OsStr,
        fs::File,
        io::{BufRead, BufReader},
        path::Path,
    };

    use bop_core::Parameters;
    use libtest_mimic::{Failed, Trial};

    pub struct TestSetup {
        params: Parameters,
        alg: String,
        variant: &'static str,
        complete: bool,
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Decision {
        Keep,
        Ignore,
    }

    /// Expected outcome given in the instance header
    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Meta {
        decision: Decision,
        /// The optimal scaled cost, `None` for infeasible instances
        opt: Option<f64>,
    }

    fn comment_prefix(path: &Path) -> Option<char> {
        match path.extension() {
            Some(ext) if ext == OsStr::new("wcnf") => Some('c'),
            Some(ext) if ext == OsStr::new("opb") => Some('*'),
            _ => None,
        }
    }

    impl TestSetup {
        pub fn new<S: Into<String>>(
            alg: S,
            variant: &'static str,
            params: Parameters,
            complete: bool,
        ) -> Self {
            Self {
                params,
                alg: alg.into(),
                variant,
                complete,
            }
        }

        fn kind(&self) -> String {
            format!(
                "{}{}{}",
                self.alg,
                if self.variant.is_empty() { "" } else { ":" },
                self.variant
            )
        }

        fn meta(&self, path: &Path, prefix: char) -> Meta {
            let mut meta = Meta {
                decision: Decision::Keep,
                opt: None,
            };
            for line in
                BufReader::new(File::open(path).expect("failed to open instance file")).lines()
            {
                let line = line.expect("failed to read test config");
                let Some(line) = line.strip_prefix(prefix) else {
                    break;
                };
                let line = line.trim();
                if let Some(opt) = line.strip_prefix("opt:") {
                    let opt = opt.trim();
                    meta.opt = if opt == "infeasible" {
                        None
                    } else {
                        Some(opt.parse().expect("invalid optimum in instance header"))
                    };
                    continue;
                }
                if line == "ignore-test" {
                    meta.decision = Decision::Ignore;
                }
                if let Some(alg) = line.strip_prefix("ignore-test:") {
                    if alg.trim() == self.alg || alg.trim() == self.kind() {
                        meta.decision = Decision::Ignore;
                    }
                }
            }
            meta
        }

        pub fn collect_tests(self) -> Vec<Trial> {
            let manifest_dir = env!("CARGO_MANIFEST_DIR");
            let mut tests = vec![];
            for entry in std::fs::read_dir(format!("{manifest_dir}/data/"))
                .expect("failed to find test instances")
            {
                let entry = entry.unwrap();
                let path = entry.path();
                if !entry.file_type().unwrap().is_file() {
                    eprintln!("skipping `{path:?}`");
                    continue;
                }
                let Some(prefix) = comment_prefix(&path) else {
                    eprintln!("skipping file `{path:?}`");
                    continue;
                };
                let name = path.file_name().unwrap().to_str().unwrap().to_string();
                let meta = self.meta(&path, prefix);
                let params = self.params.clone();
                let complete = self.complete;
                tests.push(
                    Trial::test(name, move || run_test(&path, params, meta.opt, complete))
                        .with_kind(self.kind())
                        .with_ignored_flag(meta.decision == Decision::Ignore),
                );
            }
            tests
        }
    }

    fn run_test(
        path: &Path,
        params: Parameters,
        opt: Option<f64>,
        complete: bool,
    ) -> Result<(), Failed> {
        let inst = bop_core::prepro::parse(
            path,
            bop_core::prepro::FileFormat::Infer,
            rustsat::instances::fio::opb::Options::default(),
        )
        .expect("failed to parse instance");
        super::run_test(inst, params, opt, complete)
    }
}
