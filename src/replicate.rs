//! Replicated evaluation of a policy on an artificial problem.
//!
//! Replicas are independent and run on the rayon pool; each one builds its
//! own [`Experiment`] from the factory, so nothing is shared across threads
//! except the problem itself.

use crate::artificial::{ArtificialProblem, CheckPoint};
use crate::experiment::Experiment;
use crate::types::ConfigError;
use ndarray::Array1;
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;

/// Offsets the game generator's seed from the policy's.
const OUTCOME_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Plays one replica up to each checkpoint and returns `(regret, missed)`
/// per checkpoint.
pub fn run_replica(
    problem: &dyn ArtificialProblem,
    experiment: &mut Experiment,
    checkpoints: &[usize],
    seed: u64,
) -> Vec<(f64, bool)> {
    let mut rng = StdRng::seed_from_u64(seed ^ OUTCOME_SEED_SALT);
    let optimal = problem.optimal_proba();
    let mut scores = Vec::with_capacity(checkpoints.len());
    for &target in checkpoints {
        while experiment.results().len() < target {
            let (index, x) = experiment.next_sample();
            let outcome = problem.outcome(x.view(), &mut rng);
            experiment.report(index, outcome);
        }
        experiment.refresh();
        let (estimate, missed) = match experiment.max_parameter() {
            Some(x) => (x, false),
            None => (Array1::zeros(problem.dimensions()), true),
        };
        scores.push((optimal - problem.proba(estimate.view()), missed));
    }
    scores
}

/// Runs `repeats` replicas with seeds `first_seed..first_seed + repeats` in
/// parallel. Checkpoints are sample counts and are visited in ascending
/// order.
pub fn replicate<F>(
    problem: &dyn ArtificialProblem,
    checkpoints: &[usize],
    repeats: usize,
    first_seed: u64,
    factory: F,
) -> Result<Vec<CheckPoint>, ConfigError>
where
    F: Fn(u64) -> Result<Experiment, ConfigError> + Sync,
{
    let mut sorted = checkpoints.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let replicas: Vec<Vec<(f64, bool)>> = (0..repeats as u64)
        .into_par_iter()
        .map(|r| {
            let seed = first_seed + r;
            let mut experiment = factory(seed)?;
            Ok(run_replica(problem, &mut experiment, &sorted, seed))
        })
        .collect::<Result<_, ConfigError>>()?;

    let mut stats: Vec<CheckPoint> = sorted.iter().map(|&n| CheckPoint::new(n)).collect();
    for scores in &replicas {
        for (checkpoint, &(error, missed)) in stats.iter_mut().zip(scores) {
            checkpoint.record(error, missed);
        }
    }
    log::debug!("replicated {repeats} runs over {} checkpoints", stats.len());
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artificial::ProblemKind;
    use crate::policy::{PolicyConfigs, PolicyKind};

    #[test]
    fn replicas_are_reproducible_and_ordered_by_seed() {
        let problem = ProblemKind::Quadratic1d.build(None).expect("problem");
        let factory = |seed: u64| -> Result<Experiment, ConfigError> {
            let policy = PolicyKind::Spsa.build(1, &PolicyConfigs::default(), seed)?;
            Experiment::new(1, policy, None)
        };
        let first = replicate(&*problem, &[200, 50], 4, 10, factory).expect("runs");
        let second = replicate(&*problem, &[50, 200], 4, 10, factory).expect("runs");
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].samples, 50);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.errors(), b.errors());
            assert_eq!(a.len(), 4);
            assert_eq!(a.misses(), 0);
            assert!(a.errors().iter().all(|&e| e >= -1e-12));
        }
    }
}
