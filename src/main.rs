use bop_core::{prepro, BopSolver, SolveStatus};

mod cli;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::init();

    match sub_main(&cli) {
        Ok(_) => (),
        Err(err) => {
            cli.error(&format!("{err}"))?;
            cli.error(&format!("{}", err.backtrace()))?;
        }
    };

    Ok(())
}

fn sub_main(cli: &Cli) -> anyhow::Result<()> {
    cli.print_header()?;
    cli.print_solver_config()?;

    cli.info(&format!("solving instance {:?}", cli.inst_path))?;

    let parsed = prepro::parse(&cli.inst_path, cli.file_format, cli.opb_options)?;
    cli.info(&format!(
        "parsed {} variables ({} original) and {} constraints",
        parsed.problem.n_vars(),
        parsed.n_orig_vars,
        parsed.problem.n_constraints(),
    ))?;

    let mut solver = BopSolver::new(parsed.problem.clone(), cli.params.clone())?;
    solver.attach_logger(cli.new_cli_logger());
    let res = solver.solve()?;

    match res.status {
        SolveStatus::InvalidProblem => cli.error("the instance failed validation")?,
        SolveStatus::NoSolutionFound => cli.warning("no solution found within the limits")?,
        _ => (),
    }
    cli.print_result(&res, &parsed)?;
    cli.print_stats(solver.stats())?;

    Ok(())
}
