#![deny(dead_code)]
#![deny(unused_imports)]

pub mod artificial;
pub mod eigen;
pub mod estimator;
pub mod experiment;
pub mod linalg;
pub mod observer;
pub mod parametric;
pub mod policy;
pub mod probability;
pub mod regression;
pub mod replicate;
pub mod solver;
pub mod types;

pub use artificial::{ArtificialProblem, CheckPoint, ProblemError, ProblemKind};
pub use eigen::{Eigen, EigenSystem};
pub use estimator::{MaxEstimator, RegressionMapMax};
pub use experiment::Experiment;
pub use linalg::LinalgError;
pub use observer::{Observer, Results};
pub use parametric::{ModelKind, ParametricFunction};
pub use policy::{PolicyConfigs, PolicyContext, PolicyKind, SamplingPolicy};
pub use regression::{PosteriorView, Regression, RegressionConfig, SampleData};
pub use replicate::replicate;
pub use solver::{DiffFunction, OptimReport};
pub use types::{ConfigError, Outcome};
