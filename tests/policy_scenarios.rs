use clop::policy::{Bast, BastConfig, CrossEntropy, CrossEntropyConfig, Spsa, SpsaConfig};
use clop::{Experiment, MaxEstimator, Observer, Outcome, PolicyContext, Results, SamplingPolicy};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

fn play<F>(experiment: &mut Experiment, samples: usize, mut oracle: F)
where
    F: FnMut(&Array1<f64>) -> Outcome,
{
    for _ in 0..samples {
        let (index, x) = experiment.next_sample();
        let outcome = oracle(&x);
        experiment.report(index, outcome);
    }
}

#[test]
fn spsa_converges_to_a_concave_optimum() {
    let mut spsa = Spsa::new(1, SpsaConfig::default()).expect("valid config");
    spsa.seed(0);
    let mut experiment = Experiment::new(1, Box::new(spsa), None).expect("experiment");
    let mut rng = StdRng::seed_from_u64(1000);
    play(&mut experiment, 2000, |x| {
        let p = (0.9 - 2.0 * (x[0] - 0.3) * (x[0] - 0.3)).clamp(0.0, 1.0);
        if rng.random::<f64>() < p {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    });
    let theta = experiment.max_parameter().expect("spsa keeps an estimate");
    assert!((theta[0] - 0.3).abs() < 0.05, "theta {theta}");
}

#[test]
fn bast_bisects_towards_a_step() {
    let mut bast = Bast::new(1, BastConfig::default()).expect("valid config");
    bast.seed(3);
    let mut experiment = Experiment::new(1, Box::new(bast), None).expect("experiment");
    play(&mut experiment, 200, |x| {
        if x[0] > 0.0 { Outcome::Win } else { Outcome::Loss }
    });
    let best = experiment.max_parameter().expect("bast always answers");
    assert!((0.0..=0.1).contains(&best[0]), "bast settled at {best}");
}

#[test]
fn cross_entropy_keeps_exactly_the_selection() {
    let config = CrossEntropyConfig {
        population: 100,
        selection: 10,
        ..CrossEntropyConfig::default()
    };
    let mut policy = CrossEntropy::new(2, config).expect("valid config");
    policy.seed(8);
    let mut results = Results::new(2);
    let mut rng = StdRng::seed_from_u64(77);
    for i in 0..3000 {
        let x = {
            let mut ctx = PolicyContext::new(&results, None);
            policy.next_sample(i, &mut ctx)
        };
        let p = 0.3 + 0.4 * (-(x[0] * x[0] + x[1] * x[1])).exp();
        let index = results.add_sample(x);
        policy.on_sample(&results);
        let outcome = if rng.random::<f64>() < p {
            Outcome::Win
        } else {
            Outcome::Loss
        };
        results.add_outcome(index, outcome);
        policy.on_outcome(&results, index);
    }
    assert!(policy.generation() > 0);
    assert_eq!(policy.last_elite().len(), 10);
    let estimate = policy.max_parameter().expect("mean");
    assert!(estimate.iter().all(|v| (-1.0..=1.0).contains(v)));
}

#[test]
fn unknown_outcomes_do_not_stop_any_policy() {
    let policies: Vec<Box<dyn SamplingPolicy + Send>> = vec![
        Box::new(CrossEntropy::new(1, CrossEntropyConfig::default()).expect("valid config")),
        Box::new(Bast::new(1, BastConfig::default()).expect("valid config")),
        Box::new(Spsa::new(1, SpsaConfig::default()).expect("valid config")),
    ];
    for policy in policies {
        let mut experiment = Experiment::new(1, policy, None).expect("experiment");
        let mut k = 0;
        play(&mut experiment, 60, |_| {
            k += 1;
            match k % 3 {
                0 => Outcome::Unknown,
                1 => Outcome::Win,
                _ => Outcome::Loss,
            }
        });
        assert_eq!(experiment.results().len(), 60);
    }
}

#[test]
fn estimators_can_be_queried_directly() {
    let mut spsa = Spsa::new(3, SpsaConfig::default()).expect("valid config");
    let theta = spsa.max_parameter().expect("theta");
    assert_eq!(theta, Array1::zeros(3));
}
