use clap::{Parser, Subcommand, ValueEnum};
use sparselp_solver::{
    DualAscentSettings, DualCoordinateAscent, DualGradientAscent, DualSolution, RandomLp, SparseLp, TieMethod,
    WarmStart,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sparselp")]
#[command(about = "Dual ascent solvers for large sparse linear programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random feasible LP and solve it
    Solve {
        /// Solver to run
        #[arg(short, long, value_enum, default_value_t = Method::Coordinate)]
        method: Method,
        #[command(flatten)]
        problem: ProblemArgs,
        #[command(flatten)]
        run: RunArgs,
        /// Tie rule for variables with zero reduced cost (round, center)
        #[arg(long)]
        tie_method: Option<String>,
    },
    /// Run both solvers on the same random LP
    Compare {
        #[command(flatten)]
        problem: ProblemArgs,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Coordinate,
    Gradient,
}

#[derive(clap::Args)]
struct ProblemArgs {
    /// Number of variables
    #[arg(long, default_value_t = 30)]
    vars: usize,
    /// Number of equality rows to draw
    #[arg(long, default_value_t = 1)]
    eq: usize,
    /// Number of inequality rows to draw
    #[arg(long, default_value_t = 30)]
    ineq: usize,
    /// Probability that a matrix entry is nonzero
    #[arg(long, default_value_t = 0.2)]
    sparsity: f64,
    /// Seed of the generated LP
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Outer iteration budget (solver default when omitted)
    #[arg(long)]
    max_iterations: Option<usize>,
    /// Wall-clock budget in seconds
    #[arg(long)]
    max_time: Option<f64>,
    /// Output format (json, pretty)
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            method,
            problem,
            run,
            tie_method,
        } => {
            let (lp, _) = generate(&problem);
            let mut settings = settings_for(method, &run);
            if let Some(name) = tie_method {
                settings.tie_method = match name.parse::<TieMethod>() {
                    Ok(t) => t,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                };
            }
            let solution = run_solver(method, &lp, settings);

            if run.format == "json" {
                println!("{}", serde_json::to_string_pretty(&solution).unwrap_or_else(|e| format!("Error: {}", e)));
            } else {
                print_report(method, &lp, &solution);
            }
        }
        Commands::Compare { problem, run } => {
            let (lp, _) = generate(&problem);
            let coordinate = run_solver(Method::Coordinate, &lp, settings_for(Method::Coordinate, &run));
            let gradient = run_solver(Method::Gradient, &lp, settings_for(Method::Gradient, &run));

            if run.format == "json" {
                let both = serde_json::json!({ "coordinate": coordinate, "gradient": gradient });
                println!("{}", serde_json::to_string_pretty(&both).unwrap_or_else(|e| format!("Error: {}", e)));
            } else {
                println!("{:12} {:>16} {:>16} {:>12} {:>8} {:>10}", "method", "dual", "primal", "max viol", "iters", "time");
                for (name, s) in [("coordinate", &coordinate), ("gradient", &gradient)] {
                    println!(
                        "{:12} {:>16.6} {:>16.6} {:>12.3e} {:>8} {:>9.3}s",
                        name,
                        s.dual_objective,
                        s.primal_objective,
                        s.max_violation,
                        s.iterations,
                        s.elapsed.as_secs_f64()
                    );
                }
            }
        }
    }
}

fn generate(args: &ProblemArgs) -> (SparseLp, Vec<f64>) {
    match RandomLp::new(args.vars, args.eq, args.ineq, args.sparsity).generate(args.seed) {
        Ok(generated) => generated,
        Err(e) => {
            eprintln!("Error generating LP: {}", e);
            std::process::exit(1);
        }
    }
}

fn settings_for(method: Method, run: &RunArgs) -> DualAscentSettings {
    let mut settings = match method {
        Method::Coordinate => DualAscentSettings::default(),
        Method::Gradient => DualAscentSettings::gradient(),
    };
    if let Some(max) = run.max_iterations {
        settings = settings.with_max_iterations(max);
    }
    if let Some(secs) = run.max_time {
        match Duration::try_from_secs_f64(secs) {
            Ok(budget) => settings = settings.with_max_time(budget),
            Err(e) => {
                eprintln!("Invalid --max-time {}: {}", secs, e);
                std::process::exit(1);
            }
        }
    }
    settings
}

fn run_solver(method: Method, lp: &SparseLp, settings: DualAscentSettings) -> DualSolution {
    let result = match method {
        Method::Coordinate => DualCoordinateAscent::new().with_settings(settings).solve(lp),
        Method::Gradient => DualGradientAscent::new()
            .with_settings(settings)
            .solve_with(lp, WarmStart::default(), None),
    };
    match result {
        Ok(solution) => solution,
        Err(e) => {
            eprintln!("Solver error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_report(method: Method, lp: &SparseLp, solution: &DualSolution) {
    let name = match method {
        Method::Coordinate => "dual coordinate ascent",
        Method::Gradient => "dual gradient ascent",
    };
    println!("Method: {}", name);
    println!(
        "Problem: {} variables, {} equalities, {} inequalities",
        lp.num_variables(),
        lp.num_equalities(),
        lp.num_inequalities()
    );
    println!();
    println!("Status: {:?}", solution.status);
    println!("Dual objective:   {:.6}", solution.dual_objective);
    println!("Primal objective: {:.6}", solution.primal_objective);
    println!("Gap:              {:.3e}", solution.gap());
    println!("Max violation:    {:.3e}", solution.max_violation);
    println!("Sum violation:    {:.3e}", solution.sum_violation);
    println!("Iterations:       {}", solution.iterations);
    println!("Time:             {:.3}s", solution.elapsed.as_secs_f64());
    if solution.monotonicity_warnings > 0 {
        println!("Monotonicity warnings: {}", solution.monotonicity_warnings);
    }

    let violations = lp.violations(&solution.x, 1e-9);
    if !violations.is_empty() {
        println!();
        println!("Worst violations ({} total):", violations.len());
        for v in violations.iter().take(5) {
            println!("  {:10} {}", v.constraint, v.description);
        }
    }
}
