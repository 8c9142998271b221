//! # Command Line Interface for the Solver Binary

use std::io::Error as IOError;
use std::path::PathBuf;
use std::time::Duration;
use std::{
    fmt::{self},
    io::Write,
};

use bop_core::{
    options::{OptimizerMethod, OptimizerType, Parameters},
    prepro::{FileFormat, Parsed},
    SolveResult, Stats, Status, WriteSolverLog,
};
use clap::{crate_authors, crate_name, crate_version, Args, Parser, ValueEnum};
use cpu_time::ProcessTime;
use rustsat::{instances::fio, solvers::SolverResult};
use termcolor::{Buffer, BufferWriter, Color, ColorSpec, WriteColor};

macro_rules! none_if_zero {
    ($val:expr) => {
        if $val == 0 {
            None
        } else {
            Some($val)
        }
    };
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    #[command(flatten)]
    search: SearchArgs,
    #[command(flatten)]
    limits: LimitArgs,
    #[command(flatten)]
    file: FileArgs,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args)]
struct SearchArgs {
    /// The optimizers to run in the portfolio, in order of priority. Without
    /// this option, the default portfolio is used.
    #[arg(long, value_enum, value_delimiter = ',')]
    methods: Vec<OptimizerType>,
    /// The seed of all randomized optimizers
    #[arg(long, default_value_t = Parameters::default().random_seed)]
    seed: u64,
    /// The number of parallel solver instances, only 1 is supported
    #[arg(long, default_value_t = Parameters::default().num_bop_solvers)]
    num_bop_solvers: usize,
    /// The number of conflicts per oracle call of the core-guided search
    #[arg(long, default_value_t = Parameters::default().guided_sat_conflicts_chunk)]
    guided_sat_conflicts_chunk: u32,
    /// The share of the time limit given to the first solution optimizers
    #[arg(long, default_value_t = Parameters::default().first_solution_time_ratio)]
    first_solution_time_ratio: f64,
    /// The initial fraction of free variables in random LNS
    #[arg(long, default_value_t = Parameters::default().random_lns_difficulty)]
    random_lns_difficulty: f64,
    /// The number of objective terms that may change in the complete LNS
    #[arg(long, default_value_t = Parameters::default().num_relaxed_vars)]
    num_relaxed_vars: usize,
    /// The maximum search depth of the local search
    #[arg(long, default_value_t = Parameters::default().max_num_decisions_in_ls)]
    max_num_decisions_in_ls: usize,
    /// Skip already explored assignments in the local search
    #[arg(long, default_value_t = Bool::from(Parameters::default().use_transposition_table_in_ls))]
    ls_transposition_table: Bool,
    /// Also try repairs that only potentially fix a constraint with one flip
    #[arg(long, default_value_t = Bool::from(Parameters::default().use_potential_one_flip_repairs_in_ls))]
    ls_potential_one_flip_repairs: Bool,
    /// Strengthen LP bounds by probing variables
    #[arg(long, default_value_t = Bool::from(Parameters::default().use_lp_strong_branching))]
    lp_strong_branching: Bool,
    /// Add learned binary clauses to the LP relaxation
    #[arg(long, default_value_t = Bool::from(Parameters::default().use_learned_binary_clauses_in_lp))]
    lp_learned_binary_clauses: Bool,
    /// Whether to minimize cores in the core-guided search
    #[arg(long, default_value_t = Bool::from(Parameters::default().core_minimization))]
    core_minimization: Bool,
}

#[derive(Args)]
struct LimitArgs {
    /// The wall clock time limit in seconds (0 is no limit)
    #[arg(long, default_value_t = 0.)]
    time_limit: f64,
    /// The deterministic time limit (0 is no limit)
    #[arg(long, default_value_t = 0.)]
    deterministic_time_limit: f64,
    /// Stop once the relative gap between solution and bound is below this
    #[arg(long, default_value_t = Parameters::default().relative_gap_limit)]
    relative_gap_limit: f64,
    /// Stop after this many consecutive optimizer calls without progress (0
    /// is no limit)
    #[arg(long, default_value_t = 0)]
    failing_calls_limit: usize,
}

#[derive(Args)]
struct FileArgs {
    /// The file format of the input file. With infer, the file format is
    /// inferred from the file extension.
    #[arg(long, value_enum, default_value_t = FileFormat::Infer)]
    file_format: FileFormat,
    /// The index in the OPB file to treat as the lowest variable
    #[arg(long, default_value_t = 0)]
    first_var_idx: u32,
    /// The path to the instance file to load. Compressed files with an
    /// extension like `.bz2` or `.gz` can be read.
    inst_path: PathBuf,
}

#[derive(Args)]
struct LogArgs {
    #[command(flatten)]
    color: concolor_clap::Color,
    /// Print the solver configuration
    #[arg(long)]
    print_solver_config: bool,
    /// Print the solution as a value line
    #[arg(long)]
    print_solution: bool,
    /// Don't print statistics
    #[arg(long)]
    no_print_stats: bool,
    /// Verbosity of the solver output
    #[arg(short, long, default_value_t = 0)]
    verbosity: u8,
    /// Log improving solutions as they are discovered
    #[arg(long)]
    log_solutions: bool,
    /// Log lower bound improvements
    #[arg(long)]
    log_bounds: bool,
    /// Log every optimizer run of the portfolio
    #[arg(long)]
    log_optimizer_runs: bool,
    /// Log SAT oracle calls
    #[arg(long)]
    log_oracle_calls: bool,
    /// Log extracted cores
    #[arg(long)]
    log_cores: bool,
    /// Log routine starts and ends till a given depth
    #[arg(long, default_value_t = 0)]
    log_routines: usize,
}

impl Into<LoggerConfig> for &LogArgs {
    fn into(self) -> LoggerConfig {
        LoggerConfig {
            log_solutions: self.log_solutions || self.verbosity >= 1,
            log_bounds: self.log_bounds || self.verbosity >= 1,
            log_optimizer_runs: self.log_optimizer_runs || self.verbosity >= 2,
            log_oracle_calls: self.log_oracle_calls || self.verbosity >= 3,
            log_cores: self.log_cores || self.verbosity >= 2,
            log_routines: std::cmp::max(self.log_routines, self.verbosity as usize * 2),
            log_messages: self.verbosity >= 1,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Bool {
    /// Turn on feature
    True,
    /// Turn off feature
    False,
}

impl Into<bool> for Bool {
    fn into(self) -> bool {
        self == Bool::True
    }
}

impl fmt::Display for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bool::True => write!(f, "true"),
            Bool::False => write!(f, "false"),
        }
    }
}

impl From<bool> for Bool {
    fn from(val: bool) -> Self {
        if val {
            Bool::True
        } else {
            Bool::False
        }
    }
}

pub struct Cli {
    pub params: Parameters,
    pub file_format: FileFormat,
    pub opb_options: fio::opb::Options,
    pub inst_path: PathBuf,
    stdout: BufferWriter,
    stderr: BufferWriter,
    print_solver_config: bool,
    print_solution: bool,
    print_stats: bool,
    color: concolor_clap::Color,
    logger_config: LoggerConfig,
}

fn color_choice(color: concolor_clap::Color, stream: atty::Stream) -> termcolor::ColorChoice {
    match color.color {
        concolor_clap::ColorChoice::Always => termcolor::ColorChoice::Always,
        concolor_clap::ColorChoice::Never => termcolor::ColorChoice::Never,
        concolor_clap::ColorChoice::Auto => {
            if atty::is(stream) {
                termcolor::ColorChoice::Auto
            } else {
                termcolor::ColorChoice::Never
            }
        }
    }
}

impl Cli {
    pub fn init() -> Self {
        let args = CliArgs::parse();
        let search = args.search;
        let limit = |val: f64| if val > 0. { val } else { f64::INFINITY };
        let params = Parameters {
            max_time_in_seconds: limit(args.limits.time_limit),
            max_deterministic_time: limit(args.limits.deterministic_time_limit),
            relative_gap_limit: args.limits.relative_gap_limit,
            random_seed: search.seed,
            num_bop_solvers: search.num_bop_solvers,
            max_number_of_consecutive_failing_optimizer_calls: none_if_zero!(
                args.limits.failing_calls_limit
            ),
            methods: search
                .methods
                .iter()
                .map(|&kind| OptimizerMethod::new(kind))
                .collect(),
            guided_sat_conflicts_chunk: search.guided_sat_conflicts_chunk,
            first_solution_time_ratio: search.first_solution_time_ratio,
            random_lns_difficulty: search.random_lns_difficulty,
            num_relaxed_vars: search.num_relaxed_vars,
            max_num_decisions_in_ls: search.max_num_decisions_in_ls,
            use_transposition_table_in_ls: search.ls_transposition_table.into(),
            use_potential_one_flip_repairs_in_ls: search.ls_potential_one_flip_repairs.into(),
            use_lp_strong_branching: search.lp_strong_branching.into(),
            use_learned_binary_clauses_in_lp: search.lp_learned_binary_clauses.into(),
            core_minimization: search.core_minimization.into(),
            ..Default::default()
        };
        let cli = Cli {
            params,
            file_format: args.file.file_format,
            opb_options: fio::opb::Options {
                first_var_idx: args.file.first_var_idx,
                ..Default::default()
            },
            inst_path: args.file.inst_path,
            stdout: BufferWriter::stdout(color_choice(args.log.color, atty::Stream::Stdout)),
            stderr: BufferWriter::stderr(color_choice(args.log.color, atty::Stream::Stderr)),
            print_solver_config: args.log.print_solver_config,
            print_solution: args.log.print_solution,
            print_stats: !args.log.no_print_stats,
            color: args.log.color,
            logger_config: (&args.log).into(),
        };
        #[cfg(not(feature = "lp"))]
        if cli
            .params
            .methods()
            .iter()
            .any(|m| m.kind == OptimizerType::LinearRelaxation)
        {
            cli.warning("requested the linear relaxation but solver is built without LP support")
                .expect("IO error during CLI initialization");
        }
        cli
    }

    pub fn new_cli_logger(&self) -> CliLogger {
        CliLogger {
            stdout: BufferWriter::stdout(color_choice(self.color, atty::Stream::Stdout)),
            config: self.logger_config.clone(),
            routine_stack: vec![],
        }
    }

    pub fn warning(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stderr.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Yellow)))?;
        write!(buffer, "warning")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stderr.print(&buffer)?;
        Ok(())
    }

    pub fn error(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stderr.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Red)))?;
        write!(buffer, "error")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stderr.print(&buffer)?;
        Ok(())
    }

    pub fn info(&self, msg: &str) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
        write!(buffer, "info")?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, ": ")?;
        buffer.reset()?;
        writeln!(buffer, "{}", msg)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_header(&self) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Green)))?;
        write!(buffer, "{}", crate_name!())?;
        buffer.reset()?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, " ({})", crate_version!())?;
        buffer.reset()?;
        writeln!(buffer, "{}", crate_authors!("\n"))?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        write!(buffer, "==============================")?;
        buffer.reset()?;
        writeln!(buffer)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_solver_config(&self) -> Result<(), IOError> {
        if self.print_solver_config {
            let params = &self.params;
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
            write!(buffer, "Solver Config")?;
            buffer.reset()?;
            buffer.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(buffer, ": ")?;
            buffer.reset()?;
            Self::print_parameter(&mut buffer, "methods", MethodsPrinter(&params.methods()))?;
            Self::print_parameter(&mut buffer, "seed", params.random_seed)?;
            Self::print_parameter(&mut buffer, "time-limit", params.max_time_in_seconds)?;
            Self::print_parameter(
                &mut buffer,
                "deterministic-time-limit",
                params.max_deterministic_time,
            )?;
            Self::print_parameter(&mut buffer, "relative-gap-limit", params.relative_gap_limit)?;
            Self::print_parameter(
                &mut buffer,
                "failing-calls-limit",
                OptVal::new(params.max_number_of_consecutive_failing_optimizer_calls),
            )?;
            Self::print_parameter(
                &mut buffer,
                "guided-sat-conflicts-chunk",
                params.guided_sat_conflicts_chunk,
            )?;
            Self::print_parameter(
                &mut buffer,
                "random-lns-difficulty",
                params.random_lns_difficulty,
            )?;
            Self::print_parameter(&mut buffer, "num-relaxed-vars", params.num_relaxed_vars)?;
            Self::print_parameter(
                &mut buffer,
                "max-num-decisions-in-ls",
                params.max_num_decisions_in_ls,
            )?;
            Self::print_parameter(
                &mut buffer,
                "ls-transposition-table",
                params.use_transposition_table_in_ls,
            )?;
            Self::print_parameter(
                &mut buffer,
                "lp-strong-branching",
                params.use_lp_strong_branching,
            )?;
            Self::print_parameter(&mut buffer, "core-minimization", params.core_minimization)?;
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    pub fn print_result(&self, res: &SolveResult, parsed: &Parsed) -> Result<(), IOError> {
        let mut buffer = self.stdout.buffer();
        Self::start_block(&mut buffer)?;
        buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
        write!(buffer, "Result")?;
        buffer.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(buffer, ": ")?;
        buffer.reset()?;
        Self::print_parameter(&mut buffer, "status", res.status)?;
        Self::print_parameter(&mut buffer, "cost", OptVal::new(res.cost))?;
        Self::print_parameter(&mut buffer, "bound", OptVal::new(res.bound))?;
        Self::print_parameter(&mut buffer, "gap", GapPrinter(res.gap()))?;
        Self::print_parameter(
            &mut buffer,
            "cpu-time",
            DurPrinter::new(ProcessTime::now().as_duration()),
        )?;
        if self.print_solution {
            if let Some(sol) = &res.solution {
                writeln!(buffer, "{}", ValuePrinter(parsed.original_values(sol)))?;
            }
        }
        Self::end_block(&mut buffer)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }

    pub fn print_stats(&self, stats: Stats) -> Result<(), IOError> {
        if self.print_stats {
            let mut buffer = self.stdout.buffer();
            Self::start_block(&mut buffer)?;
            buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(Color::Blue)))?;
            write!(buffer, "Solver Stats")?;
            buffer.reset()?;
            buffer.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(buffer, ": ")?;
            buffer.reset()?;
            Self::print_parameter(&mut buffer, "n-vars", stats.n_vars)?;
            Self::print_parameter(&mut buffer, "n-constraints", stats.n_constraints)?;
            Self::print_parameter(&mut buffer, "n-optimizer-calls", stats.n_optimizer_calls)?;
            Self::print_parameter(&mut buffer, "n-solutions", stats.n_solutions)?;
            Self::print_parameter(&mut buffer, "n-bound-updates", stats.n_bound_updates)?;
            Self::print_parameter(&mut buffer, "n-oracle-calls", stats.n_oracle_calls)?;
            Self::print_parameter(&mut buffer, "n-cores", stats.n_cores)?;
            for status in Status::all() {
                Self::print_parameter(
                    &mut buffer,
                    &format!("n-{status}"),
                    stats.n_status[status.idx()],
                )?;
            }
            Self::end_block(&mut buffer)?;
            self.stdout.print(&buffer)?;
        }
        Ok(())
    }

    fn print_parameter<V: fmt::Display>(
        buffer: &mut Buffer,
        name: &str,
        val: V,
    ) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(buffer, "{}", name)?;
        buffer.reset()?;
        writeln!(buffer, ": {}", val)?;
        Ok(())
    }

    fn start_block(buffer: &mut Buffer) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(buffer, ">>>>>")?;
        buffer.reset()?;
        writeln!(buffer)?;
        Ok(())
    }

    fn end_block(buffer: &mut Buffer) -> Result<(), IOError> {
        buffer.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(buffer, "<<<<<")?;
        buffer.reset()?;
        writeln!(buffer)?;
        Ok(())
    }
}

#[derive(Clone)]
struct LoggerConfig {
    log_solutions: bool,
    log_bounds: bool,
    log_optimizer_runs: bool,
    log_oracle_calls: bool,
    log_cores: bool,
    log_routines: usize,
    log_messages: bool,
}

pub struct CliLogger {
    stdout: BufferWriter,
    config: LoggerConfig,
    routine_stack: Vec<(&'static str, ProcessTime)>,
}

impl CliLogger {
    fn print_event<D: fmt::Display>(
        &self,
        color: Color,
        event: &str,
        details: D,
    ) -> anyhow::Result<()> {
        let mut buffer = self.stdout.buffer();
        buffer.set_color(ColorSpec::new().set_fg(Some(color)))?;
        write!(buffer, "{}", event)?;
        buffer.reset()?;
        writeln!(buffer, ": {}", details)?;
        self.stdout.print(&buffer)?;
        Ok(())
    }
}

impl WriteSolverLog for CliLogger {
    fn log_solution(&mut self, cost: f64) -> anyhow::Result<()> {
        if self.config.log_solutions {
            self.print_event(
                Color::Magenta,
                "solution",
                format_args!(
                    "cost: {}; cpu-time: {}",
                    cost,
                    DurPrinter::new(ProcessTime::now().as_duration()),
                ),
            )?;
        }
        Ok(())
    }

    fn log_bound(&mut self, bound: f64) -> anyhow::Result<()> {
        if self.config.log_bounds {
            self.print_event(
                Color::Cyan,
                "lower bound",
                format_args!(
                    "bound: {}; cpu-time: {}",
                    bound,
                    DurPrinter::new(ProcessTime::now().as_duration()),
                ),
            )?;
        }
        Ok(())
    }

    fn log_optimizer_run(
        &mut self,
        name: &str,
        status: Status,
        deterministic_time: f64,
    ) -> anyhow::Result<()> {
        if self.config.log_optimizer_runs {
            self.print_event(
                Color::Magenta,
                "optimizer run",
                format_args!(
                    "optimizer: {}; status: {}; dtime: {:.4}",
                    name, status, deterministic_time,
                ),
            )?;
        }
        Ok(())
    }

    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()> {
        if self.config.log_oracle_calls {
            self.print_event(
                Color::Magenta,
                "oracle call",
                format_args!(
                    "result: {}; cpu-time: {}",
                    result,
                    DurPrinter::new(ProcessTime::now().as_duration()),
                ),
            )?;
        }
        Ok(())
    }

    fn log_core(&mut self, weight: u64, len: usize, red_len: usize) -> anyhow::Result<()> {
        if self.config.log_cores {
            self.print_event(
                Color::Magenta,
                "extracted core",
                format_args!(
                    "weight: {}; original-len: {}; reduced-len: {}",
                    weight, len, red_len,
                ),
            )?;
        }
        Ok(())
    }

    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        self.routine_stack.push((desc, ProcessTime::now()));

        if self.config.log_routines >= self.routine_stack.len() {
            self.print_event(Color::Green, ">>> routine start", desc)?;
        }
        Ok(())
    }

    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        let Some((desc, start)) = self.routine_stack.pop() else {
            anyhow::bail!("routine stack out of sync")
        };

        if self.config.log_routines > self.routine_stack.len() {
            let duration = ProcessTime::now().duration_since(start);
            self.print_event(
                Color::Red,
                "<<< routine end",
                format_args!("{}; duration: {}", desc, DurPrinter::new(duration)),
            )?;
        }
        Ok(())
    }

    fn log_end_solve(&mut self) -> anyhow::Result<()> {
        while !self.routine_stack.is_empty() {
            self.log_routine_end()?;
        }
        Ok(())
    }

    fn log_message(&mut self, msg: &str) -> anyhow::Result<()> {
        if self.config.log_messages {
            self.print_event(Color::Blue, "message", msg)?;
        }
        Ok(())
    }
}

struct OptVal<T> {
    val: Option<T>,
}

impl<T> OptVal<T> {
    fn new(val: Option<T>) -> Self {
        OptVal { val }
    }
}

impl<T: fmt::Display> fmt::Display for OptVal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.val {
            Some(t) => fmt::Display::fmt(&t, f),
            None => write!(f, "none"),
        }
    }
}

struct GapPrinter(Option<f64>);

impl fmt::Display for GapPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(gap) => write!(f, "{:.4}%", gap),
            None => write!(f, "none"),
        }
    }
}

struct MethodsPrinter<'a>(&'a [OptimizerMethod]);

impl fmt::Display for MethodsPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, method) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", method.kind)?;
        }
        Ok(())
    }
}

/// Prints a solution as a value line of 1-based literals
struct ValuePrinter<'a>(&'a [bool]);

impl fmt::Display for ValuePrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v")?;
        for (idx, &val) in self.0.iter().enumerate() {
            if val {
                write!(f, " x{}", idx + 1)?;
            } else {
                write!(f, " -x{}", idx + 1)?;
            }
        }
        Ok(())
    }
}

struct DurPrinter {
    dur: Duration,
}

impl DurPrinter {
    fn new(dur: Duration) -> Self {
        Self { dur }
    }
}

impl fmt::Display for DurPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dur)
    }
}

#[test]
fn verify_cli_args() {
    use clap::CommandFactory;
    CliArgs::command().debug_assert()
}

#[test]
fn value_line() {
    assert_eq!(
        format!("{}", ValuePrinter(&[true, false, true])),
        "v x1 -x2 x3"
    );
}
