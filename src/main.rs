use clap::{Args, Parser, Subcommand, ValueEnum};
use clop::artificial::{ArtificialProblem, ProblemError, ProblemKind};
use clop::eigen::EigenSystem;
use clop::experiment::Experiment;
use clop::parametric::ModelKind;
use clop::policy::{PolicyConfigs, PolicyKind};
use clop::regression::{Regression, RegressionConfig};
use clop::replicate::replicate;
use clop::types::{ConfigError, Outcome};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use csv::WriterBuilder;
use ndarray::Array1;
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CLOP_RELEASE_TAG"),
    ", built ",
    env!("CLOP_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "clop")]
#[command(version = VERSION)]
#[command(about = "Noisy parameter tuning on synthetic win/loss problems", long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
    #[command(alias = "bench")]
    Replicate(ReplicateArgs),
}

#[derive(Args, Debug)]
struct SetupArgs {
    #[arg(long = "problem", default_value = "quadratic-1d")]
    problem: String,
    #[arg(long = "policy", default_value = "qlr-max")]
    policy: String,
    /// Only used by the N-dimensional problems.
    #[arg(long = "dimensions")]
    dimensions: Option<usize>,
    #[arg(long = "model", value_enum, default_value_t = ModelArg::Quadratic)]
    model: ModelArg,
    /// JSON file with `regression` and `policies` sections.
    #[arg(long = "config")]
    config: Option<PathBuf>,
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    setup: SetupArgs,
    #[arg(long = "samples", default_value_t = 1000)]
    samples: usize,
    /// Write every sample and its outcome to this CSV file.
    #[arg(long = "trace")]
    trace: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReplicateArgs {
    #[command(flatten)]
    setup: SetupArgs,
    #[arg(long = "checkpoints", value_delimiter = ',', default_value = "100,1000")]
    checkpoints: Vec<usize>,
    #[arg(long = "repeats", default_value_t = 100)]
    repeats: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelArg {
    Quadratic,
    IndependentQuadratic,
    Cubic,
    Gaussian,
    Concave,
    Constant,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Quadratic => ModelKind::Quadratic,
            ModelArg::IndependentQuadratic => ModelKind::IndependentQuadratic,
            ModelArg::Cubic => ModelKind::Cubic,
            ModelArg::Gaussian => ModelKind::Gaussian,
            ModelArg::Concave => ModelKind::Concave,
            ModelArg::Constant => ModelKind::Constant,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    regression: RegressionConfig,
    #[serde(default)]
    policies: PolicyConfigs,
}

/// Everything needed to build one experiment per seed.
struct Setup {
    problem: Box<dyn ArtificialProblem>,
    policy: PolicyKind,
    model: ModelKind,
    config: ConfigFile,
}

impl Setup {
    fn from_args(args: &SetupArgs) -> Result<Self, String> {
        let kind = ProblemKind::from_name(&args.problem).map_err(|e| e.to_string())?;
        let problem = kind.build(args.dimensions).map_err(|e| e.to_string())?;
        let policy = PolicyKind::from_name(&args.policy)
            .ok_or_else(|| ProblemError::UnknownPolicy(args.policy.clone()).to_string())?;
        let config = match &args.config {
            Some(path) => load_config(path)?,
            None => ConfigFile::default(),
        };
        config.regression.validate().map_err(|e| e.to_string())?;
        Ok(Self {
            problem,
            policy,
            model: args.model.into(),
            config,
        })
    }

    fn dimensions(&self) -> usize {
        self.problem.dimensions()
    }

    /// A regression is always attached so policies without an estimator of
    /// their own can still report a maximum.
    fn experiment(&self, seed: u64) -> Result<Experiment, ConfigError> {
        let d = self.dimensions();
        let policy = self.policy.build(d, &self.config.policies, seed)?;
        let regression = Regression::new(self.model.build(d), self.config.regression.clone())?;
        Experiment::new(d, policy, Some(regression))
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_single(args),
        Command::Replicate(args) => run_replicate(args),
    }
}

fn load_config(path: &Path) -> Result<ConfigFile, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config '{}': {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("failed to parse config '{}': {e}", path.display()))
}

fn format_point(x: &Array1<f64>) -> String {
    let coords: Vec<String> = x.iter().map(|v| format!("{v:+.4}")).collect();
    format!("({})", coords.join(", "))
}

fn run_single(args: RunArgs) -> Result<(), String> {
    let setup = Setup::from_args(&args.setup)?;
    let d = setup.dimensions();
    let mut experiment = setup.experiment(args.setup.seed).map_err(|e| e.to_string())?;
    let mut rng = StdRng::seed_from_u64(args.setup.seed.wrapping_add(1));

    let mut trace = match &args.trace {
        Some(path) => {
            let mut wtr = WriterBuilder::new()
                .has_headers(true)
                .from_path(path)
                .map_err(|e| format!("failed to create trace csv '{}': {e}", path.display()))?;
            let mut header: Vec<String> = vec!["index".to_string()];
            header.extend((0..d).map(|j| format!("x{j}")));
            header.push("outcome".to_string());
            wtr.write_record(&header)
                .map_err(|e| format!("failed to write csv header: {e}"))?;
            Some(wtr)
        }
        None => None,
    };

    for _ in 0..args.samples {
        let (index, x) = experiment.next_sample();
        let outcome = setup.problem.outcome(x.view(), &mut rng);
        experiment.report(index, outcome);
        if let Some(wtr) = trace.as_mut() {
            let mut record = vec![index.to_string()];
            record.extend(x.iter().map(|v| format!("{v:.12}")));
            record.push(outcome.label().to_string());
            wtr.write_record(&record)
                .map_err(|e| format!("failed to write csv row: {e}"))?;
        }
    }
    if let Some(mut wtr) = trace {
        wtr.flush().map_err(|e| format!("failed to flush trace csv: {e}"))?;
    }

    experiment.refresh();
    let estimate = experiment.max_parameter();
    let optimum = setup.problem.optimal_parameters();
    let optimal_proba = setup.problem.optimal_proba();
    let results = experiment.results();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["quantity", "value"]);
    let mut add = |name: &str, value: String| {
        table.add_row(Row::from(vec![Cell::new(name), Cell::new(value)]));
    };
    add("problem", args.setup.problem.clone());
    add("policy", setup.policy.name().to_string());
    add("samples", results.len().to_string());
    for outcome in [Outcome::Win, Outcome::Loss, Outcome::Draw] {
        add(outcome.label(), results.count_outcomes(outcome, 0).to_string());
    }
    add("optimum", format_point(&optimum));
    add("optimal proba", format!("{optimal_proba:.4}"));
    match &estimate {
        Some(x) => {
            let proba = setup.problem.proba(x.view());
            add("estimate", format_point(x));
            add("proba at estimate", format!("{proba:.4}"));
            add("regret", format!("{:.5}", optimal_proba - proba));
        }
        None => add("estimate", "none".to_string()),
    }
    if let Some(regression) = experiment.regression_mut() {
        if let Some(report) = regression.last_fit() {
            add(
                "last fit",
                format!("{:?}, {} iterations", report.method, report.iterations),
            );
        }
        add("localization steps", regression.weight_functions().len().to_string());
        let mut eigen = EigenSystem::new();
        if let Some(axes) = eigen.compute(regression) {
            let values: Vec<String> = axes.values.iter().map(|v| format!("{v:.4}")).collect();
            add("model curvature", values.join(", "));
        }
    }

    println!("{table}");
    Ok(())
}

fn run_replicate(args: ReplicateArgs) -> Result<(), String> {
    if args.repeats == 0 {
        return Err("--repeats must be positive".to_string());
    }
    let setup = Setup::from_args(&args.setup)?;
    let checkpoints = replicate(
        &*setup.problem,
        &args.checkpoints,
        args.repeats,
        args.setup.seed,
        |seed| setup.experiment(seed),
    )
    .map_err(|e| e.to_string())?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "samples", "mean", "std", "median", "p90", "max", "max seed", "misses",
        ]);
    for checkpoint in &checkpoints {
        let (max, worst) = checkpoint.max().unwrap_or((0.0, 0));
        table.add_row(Row::from(vec![
            Cell::new(checkpoint.samples),
            Cell::new(format!("{:.5}", checkpoint.mean())),
            Cell::new(format!("{:.5}", checkpoint.variance().sqrt())),
            Cell::new(format!("{:.5}", checkpoint.percentile(0.5))),
            Cell::new(format!("{:.5}", checkpoint.percentile(0.9))),
            Cell::new(format!("{max:.5}")),
            Cell::new(args.setup.seed + worst as u64),
            Cell::new(checkpoint.misses()),
        ]));
    }

    println!(
        "{} on {} ({} replicas):",
        setup.policy.name(),
        args.setup.problem,
        args.repeats
    );
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn version_carries_the_release_tag_and_build_time() {
        let command = Cli::command();
        let version = command.get_version().expect("version is set");
        assert!(version.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(version.contains(env!("CLOP_RELEASE_TAG")));
        assert!(version.contains(env!("CLOP_BUILD_TIMESTAMP")));
    }
}
