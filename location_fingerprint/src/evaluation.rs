use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use trajectory_grid::Trajectory;

use crate::{
    Attack, CorrelationModel, FingerprintConfig, FingerprintError, PartyId, fingerprint,
    sample_count, sample_items, similarity_detection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Independent trials, each with freshly fingerprinted copies.
    pub trial_count: usize,
    /// Leaks simulated per trial.
    pub sub_trial_count: usize,
    /// Trajectories fingerprinted per trial.
    pub trajectory_count: usize,
    pub party_count: usize,
    /// Trajectories are cut to this many points.
    pub trajectory_length: usize,
    #[serde(default)]
    pub seed: u64,
}

impl EvaluationConfig {
    fn validate(&self, data: &[Trajectory], attack: &Attack) -> Result<(), FingerprintError> {
        let problem = if self.trial_count == 0 || self.sub_trial_count == 0 {
            Some("at least one trial and one sub-trial are needed")
        } else if self.trajectory_count == 0 || self.trajectory_count > data.len() {
            Some("trajectory count must be between one and the dataset size")
        } else if self.trajectory_length == 0 {
            Some("trajectory length must be positive")
        } else if attack.is_collusion() && attack.leaker_count() < 2 {
            Some("collusion needs at least two colluders")
        } else if self.party_count < attack.leaker_count().max(1) {
            Some("fewer parties than leakers")
        } else {
            None
        };
        problem.map_or(Ok(()), |p| Err(FingerprintError::InvalidEvaluation(p)))
    }
}

/// The party named most often, the lowest id on ties.
fn most_suspected(suspects: &[PartyId], party_count: usize) -> Option<PartyId> {
    let mut counts = vec![0usize; party_count];
    for &suspect in suspects {
        if let Some(count) = counts.get_mut(suspect) {
            *count += 1;
        }
    }
    counts
        .iter()
        .enumerate()
        .reduce(|acc, x| if acc.1 < x.1 { x } else { acc })
        .filter(|(_, count)| **count > 0)
        .map(|(party, _)| party)
}

fn single_trial(
    trial: usize,
    data: &[Trajectory],
    model: &CorrelationModel,
    fp_config: &FingerprintConfig,
    attack: &Attack,
    config: &EvaluationConfig,
) -> Result<f64, FingerprintError> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(trial as u64));

    // copies[trajectory][party]
    let copies = sample_items(&mut rng, data, config.trajectory_count)
        .into_iter()
        .map(|t| {
            let t = t.truncated(config.trajectory_length);
            (0..config.party_count)
                .map(|_| fingerprint(&mut rng, &t, model, fp_config).map(|fp| fp.trajectory))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut hits = 0usize;
    for _ in 0..config.sub_trial_count {
        let leakers = sample_count(&mut rng, config.party_count, attack.leaker_count());
        let mut suspects = Vec::with_capacity(copies.len());

        for parties in &copies {
            let leaked: Vec<&Trajectory> = leakers.iter().map(|&p| &parties[p]).collect();
            let attacked = attack.apply(&mut rng, model, &leaked)?;
            suspects.push(similarity_detection(&attacked, parties)?.party);
        }

        if most_suspected(&suspects, config.party_count).is_some_and(|s| leakers.contains(&s)) {
            hits += 1;
        }
    }

    let accuracy = hits as f64 / config.sub_trial_count as f64;
    debug!(trial, accuracy, "trial finished");
    Ok(accuracy)
}

/// Share of simulated leaks traced back to a leaking party.
///
/// Trials run in parallel, each on its own random stream seeded from
/// `config.seed` and the trial index, so results are reproducible.
pub fn evaluate_detection_accuracy(
    data: &[Trajectory],
    model: &CorrelationModel,
    fp_config: &FingerprintConfig,
    attack: &Attack,
    config: &EvaluationConfig,
) -> Result<f64, FingerprintError> {
    config.validate(data, attack)?;

    let accuracies = (0..config.trial_count)
        .into_par_iter()
        .map(|trial| single_trial(trial, data, model, fp_config, attack, config))
        .collect::<Result<Vec<f64>, _>>()?;

    let accuracy = accuracies.iter().sum::<f64>() / accuracies.len() as f64;
    info!(
        trials = config.trial_count,
        parties = config.party_count,
        ?attack,
        accuracy,
        "detection accuracy"
    );
    Ok(accuracy)
}
