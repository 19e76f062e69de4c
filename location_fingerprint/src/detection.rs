use std::borrow::Borrow;

use trajectory_grid::Trajectory;

use crate::FingerprintError;

pub type PartyId = usize;

/// Verdict of the similarity detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The accused party, the lowest id among equal scores.
    pub party: PartyId,
    /// Share of timesteps at which each party's copy was nearest to the leak.
    pub scores: Vec<f64>,
}

/// Attributes `leaked` to one of the party copies. Party ids are indices into
/// `parties`.
///
/// At every timestep each party whose point is nearest to the leaked point
/// gets `1 / len` of a vote, so a party matching everywhere scores one.
pub fn similarity_detection<P: Borrow<Trajectory>>(
    leaked: &Trajectory,
    parties: &[P],
) -> Result<Detection, FingerprintError> {
    if parties.is_empty() {
        return Err(FingerprintError::NoParties);
    }
    if leaked.is_empty() {
        return Err(FingerprintError::NoPointsProvided);
    }
    let copies: Vec<&Trajectory> = parties.iter().map(Borrow::<Trajectory>::borrow).collect();
    if let Some(copy) = copies.iter().find(|c| c.len() != leaked.len()) {
        return Err(FingerprintError::LengthMismatch {
            expected: leaked.len(),
            found: copy.len(),
        });
    }

    let vote = 1.0 / leaked.len() as f64;
    let mut scores = vec![0.0; copies.len()];
    let mut distances = vec![0; copies.len()];

    for (i, point) in leaked.iter().enumerate() {
        for (d, copy) in distances.iter_mut().zip(&copies) {
            *d = point.cell.sq_euclidean(copy[i].cell);
        }
        let Some(&min) = distances.iter().min() else {
            continue;
        };
        for (score, _) in scores.iter_mut().zip(&distances).filter(|(_, d)| **d == min) {
            *score += vote;
        }
    }

    let party = scores
        .iter()
        .enumerate()
        .reduce(|acc, x| if acc.1 < x.1 { x } else { acc })
        .map_or(0, |(party, _)| party);

    Ok(Detection { party, scores })
}
