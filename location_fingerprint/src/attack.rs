use std::borrow::Borrow;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use trajectory_grid::{Cell, Point, Trajectory};

use crate::error::check_ratio;
use crate::{
    Candidates, CorrelationModel, DEFAULT_JITTER_SCALE, FingerprintError, sample_nearby_cell,
    sample_nearby_point, sample_proportionally,
};

/// Which cell the correlation attack looks up transitions from at the next
/// step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePoint {
    /// The leaked cell, whether or not it was replaced. Errors do not compound.
    #[default]
    Leaked,
    /// The cell the attack just emitted.
    Attacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attack {
    RandomDistortion {
        ratio: f64,
    },
    Correlation {
        tau: f64,
        ratio: f64,
        #[serde(default)]
        reference: ReferencePoint,
        #[serde(default = "default_scale")]
        scale: u32,
    },
    MajorityCollusion {
        colluders: usize,
    },
    ProbabilisticCollusion {
        colluders: usize,
        p_estimate: f64,
        tau: f64,
        ratio: f64,
    },
}

fn default_scale() -> u32 {
    DEFAULT_JITTER_SCALE
}

impl Attack {
    /// How many party copies the adversary needs.
    pub fn leaker_count(&self) -> usize {
        match *self {
            Attack::RandomDistortion { .. } | Attack::Correlation { .. } => 1,
            Attack::MajorityCollusion { colluders }
            | Attack::ProbabilisticCollusion { colluders, .. } => colluders,
        }
    }

    pub fn is_collusion(&self) -> bool {
        matches!(
            self,
            Attack::MajorityCollusion { .. } | Attack::ProbabilisticCollusion { .. }
        )
    }

    /// Runs the attack on the leaked copies. Single-copy attacks use the first
    /// copy only.
    pub fn apply<R, L>(
        &self,
        rng: &mut R,
        model: &CorrelationModel,
        leaked: &[L],
    ) -> Result<Trajectory, FingerprintError>
    where
        R: Rng + ?Sized,
        L: Borrow<Trajectory>,
    {
        let first = || {
            leaked
                .first()
                .map(as_trajectory)
                .ok_or(FingerprintError::NotEnoughColluders {
                    required: 1,
                    provided: 0,
                })
        };

        match *self {
            Attack::RandomDistortion { ratio } => random_distortion_attack(rng, first()?, ratio),
            Attack::Correlation {
                tau,
                ratio,
                reference,
                scale,
            } => correlation_attack(rng, first()?, model, tau, ratio, reference, scale),
            Attack::MajorityCollusion { .. } => majority_collusion_attack(rng, leaked),
            Attack::ProbabilisticCollusion {
                p_estimate,
                tau,
                ratio,
                ..
            } => probabilistic_collusion_attack(rng, leaked, model, p_estimate, tau, ratio),
        }
    }
}

/// Replaces each point after the first, with probability `ratio`, by a
/// neighboring cell.
pub fn random_distortion_attack<R: Rng + ?Sized>(
    rng: &mut R,
    leaked: &Trajectory,
    ratio: f64,
) -> Result<Trajectory, FingerprintError> {
    let ratio = check_ratio("attack ratio", ratio)?;
    let Some((first, rest)) = leaked.split_first() else {
        return Err(FingerprintError::NoPointsProvided);
    };

    let attacked = std::iter::once(*first)
        .chain(rest.iter().map(|point| {
            if rng.random_bool(ratio) {
                point.moved_to(sample_nearby_point(rng, point.cell, 1))
            } else {
                *point
            }
        }))
        .collect();
    Ok(attacked)
}

/// Uses the correlation model to spot and undo implausible steps.
///
/// A step the model considers implausible (below `tau`) is, with probability
/// `ratio`, replaced by the most likely successor. A plausible step is, with
/// the same probability, jittered up to `scale` cells in case it carries the
/// fingerprint. `reference` picks the cell the next lookup starts from.
pub fn correlation_attack<R: Rng + ?Sized>(
    rng: &mut R,
    leaked: &Trajectory,
    model: &CorrelationModel,
    tau: f64,
    ratio: f64,
    reference: ReferencePoint,
    scale: u32,
) -> Result<Trajectory, FingerprintError> {
    let ratio = check_ratio("attack ratio", ratio)?;
    let Some((first, rest)) = leaked.split_first() else {
        return Err(FingerprintError::NoPointsProvided);
    };
    leaked.validate(model.grid())?;

    let mut attacked = Vec::with_capacity(leaked.len());
    attacked.push(*first);
    let mut prev = first.cell;
    let mut flips = 0usize;

    for point in rest {
        let tiers = model.get_all_transition(prev, None, tau);
        let current = point.cell;

        let cell = if !tiers.tau_candidates.contains(current) {
            if rng.random_bool(ratio) {
                tiers
                    .tau_candidates
                    .argmax()
                    .or_else(|| tiers.candidates.argmax())
                    .unwrap_or(current)
            } else {
                current
            }
        } else if rng.random_bool(ratio) {
            sample_nearby_cell(rng, model.grid(), current, scale)
        } else {
            current
        };

        if cell != current {
            trace!(from = %current, to = %cell, "correlation attack flip");
            flips += 1;
        }
        attacked.push(point.moved_to(cell));
        prev = match reference {
            ReferencePoint::Leaked => current,
            ReferencePoint::Attacked => cell,
        };
    }

    debug!(len = attacked.len(), flips, "correlation attack done");
    Ok(Trajectory::new(attacked))
}

fn as_trajectory<L: Borrow<Trajectory>>(leaked: &L) -> &Trajectory {
    leaked.borrow()
}

/// Checks the colluding copies and returns their common length.
fn check_colluders<L: Borrow<Trajectory>>(leaked: &[L]) -> Result<usize, FingerprintError> {
    if leaked.len() < 2 {
        return Err(FingerprintError::NotEnoughColluders {
            required: 2,
            provided: leaked.len(),
        });
    }
    let expected = as_trajectory(&leaked[0]).len();
    if let Some(other) = leaked
        .iter()
        .map(as_trajectory)
        .find(|t| t.len() != expected)
    {
        return Err(FingerprintError::LengthMismatch {
            expected,
            found: other.len(),
        });
    }
    if expected == 0 {
        return Err(FingerprintError::NoPointsProvided);
    }
    Ok(expected)
}

/// Cells reported at step `i`, with how many copies report each.
fn votes<L: Borrow<Trajectory>>(leaked: &[L], i: usize) -> (Candidates, Point) {
    let mut counts = Candidates::new();
    for copy in leaked {
        counts.add(as_trajectory(copy)[i].cell, 1.0);
    }
    (counts, as_trajectory(&leaked[0])[i])
}

/// Emits, at every step, the cell reported by most colluders. Ties are broken
/// uniformly at random.
pub fn majority_collusion_attack<R, L>(
    rng: &mut R,
    leaked: &[L],
) -> Result<Trajectory, FingerprintError>
where
    R: Rng + ?Sized,
    L: Borrow<Trajectory>,
{
    let len = check_colluders(leaked)?;

    let attacked = (0..len)
        .map(|i| {
            let (counts, point) = votes(leaked, i);
            let tied = counts.all_max();
            let cell = tied.choose(rng).copied().unwrap_or(point.cell);
            point.moved_to(cell)
        })
        .collect();
    Ok(attacked)
}

/// Likelihood that a cell reported by `count` of `leaked` copies is the
/// unmarked truth, when each copy is marked independently with probability
/// `p_estimate`.
fn plausibility(p_estimate: f64, count: f64, leaked: usize) -> f64 {
    let count = count as i32;
    (1.0 - p_estimate).powi(count) * p_estimate.powi(leaked as i32 - count)
}

/// Combines vote counts with the correlation model.
///
/// The first cell is drawn in proportion to its [`plausibility`]. Later
/// cells are, with probability `ratio`, drawn among reported cells whose
/// transition probability from the previous output exceeds `tau`, weighted by
/// transition probability times plausibility, falling back to the most likely
/// transition when none qualifies. Otherwise the plain majority cell is used.
pub fn probabilistic_collusion_attack<R, L>(
    rng: &mut R,
    leaked: &[L],
    model: &CorrelationModel,
    p_estimate: f64,
    tau: f64,
    ratio: f64,
) -> Result<Trajectory, FingerprintError>
where
    R: Rng + ?Sized,
    L: Borrow<Trajectory>,
{
    let len = check_colluders(leaked)?;
    let p_estimate = check_ratio("p estimate", p_estimate)?;
    let ratio = check_ratio("attack ratio", ratio)?;
    for copy in leaked {
        as_trajectory(copy).validate(model.grid())?;
    }
    let n = leaked.len();

    let mut attacked = Vec::with_capacity(len);
    let (counts, point) = votes(leaked, 0);
    let weighted = counts.map_weights(|_, count| plausibility(p_estimate, count, n));
    let first = sample_proportionally(rng, &weighted).unwrap_or(point.cell);
    attacked.push(point.moved_to(first));

    let mut prev = first;
    for i in 1..len {
        let (counts, point) = votes(leaked, i);

        let cell = if rng.random_bool(ratio) {
            let transition = model.get_transition(prev);
            let roll: Candidates = counts
                .iter()
                .filter_map(|(cell, count)| {
                    let t = transition.get(cell);
                    (t > tau).then(|| (cell, t * plausibility(p_estimate, count, n)))
                })
                .collect();

            if roll.is_empty() {
                transition.argmax()
            } else {
                sample_proportionally(rng, &roll)
            }
        } else {
            counts.argmax()
        }
        .unwrap_or(point.cell);

        attacked.push(point.moved_to(cell));
        prev = cell;
    }

    Ok(Trajectory::new(attacked))
}
