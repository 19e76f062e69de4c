use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use trajectory_grid::{Cell, Point, Trajectory};

use crate::error::check_ratio;
use crate::{
    Candidates, CorrelationModel, FingerprintError, Sampled, sample_closest,
    sample_proportionally_with_truth,
};

pub const DEFAULT_TAU: f64 = 0.005;
pub const DEFAULT_THETA: f64 = 0.5;

/// What to emit when the true cell is not a plausible successor of the
/// previously emitted cell.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffModelPolicy {
    /// Truth-biased sampling among the tau candidates.
    #[default]
    Resample,
    /// Anchor on the tau candidate closest to the truth, provided it is
    /// strictly closer than the previous cell; otherwise keep the truth.
    SnapToClosest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Target share of points carrying the fingerprint.
    pub ratio: f64,
    #[serde(default = "default_tau")]
    pub tau: f64,
    #[serde(default = "default_theta")]
    pub theta: f64,
    #[serde(default)]
    pub off_model: OffModelPolicy,
}

fn default_tau() -> f64 {
    DEFAULT_TAU
}

fn default_theta() -> f64 {
    DEFAULT_THETA
}

impl FingerprintConfig {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio,
            tau: DEFAULT_TAU,
            theta: DEFAULT_THETA,
            off_model: OffModelPolicy::default(),
        }
    }

    pub fn with_tau(self, tau: f64) -> Self {
        Self { tau, ..self }
    }

    pub fn with_theta(self, theta: f64) -> Self {
        Self { theta, ..self }
    }

    pub fn with_off_model(self, off_model: OffModelPolicy) -> Self {
        Self { off_model, ..self }
    }
}

/// One party's copy together with which points were deliberately embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprinted {
    pub trajectory: Trajectory,
    pub flags: Vec<bool>,
}

impl Fingerprinted {
    pub fn embedded_count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }

    pub fn embedding_rate(&self) -> f64 {
        if self.flags.is_empty() {
            0.0
        } else {
            self.embedded_count() as f64 / self.flags.len() as f64
        }
    }
}

fn with_truth<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &Candidates,
    truth: Cell,
    p: f64,
) -> Sampled {
    sample_proportionally_with_truth(rng, candidates, Some(truth), p)
        .unwrap_or(Sampled::kept(truth))
}

/// Per-trajectory embedding state. The instantaneous probability is steered
/// once per block so the overall share of embedded points tracks the target.
struct Embedder<'a> {
    model: &'a CorrelationModel,
    config: &'a FingerprintConfig,
    p_current: f64,
    block_size: usize,
    block_count: usize,
    fp_count: usize,
    points: Vec<Point>,
    flags: Vec<bool>,
}

impl<'a> Embedder<'a> {
    fn new(model: &'a CorrelationModel, config: &'a FingerprintConfig, len: usize) -> Self {
        Self {
            model,
            config,
            p_current: config.ratio,
            block_size: (1.0 / config.ratio).ceil() as usize,
            block_count: 0,
            fp_count: 0,
            points: Vec::with_capacity(len),
            flags: Vec::with_capacity(len),
        }
    }

    fn embed_first<R: Rng + ?Sized>(&self, rng: &mut R, truth: Cell) -> Sampled {
        let emission = self.model.get_emission(truth);
        with_truth(rng, &emission, truth, self.p_current)
    }

    fn embed_next<R: Rng + ?Sized>(&self, rng: &mut R, prev: Cell, truth: Cell) -> Sampled {
        let p = self.p_current;
        let tiers = self.model.get_all_transition(prev, Some(truth), self.config.tau);
        let tau_candidates = tiers.tau_candidates;
        let tau_dist_candidates = tiers.tau_dist_candidates.unwrap_or_default();

        if tau_dist_candidates.contains(truth) {
            if tau_dist_candidates.len() > 1 {
                with_truth(rng, &tau_dist_candidates, truth, p)
            } else if tau_candidates.len() > 1 {
                with_truth(rng, &tau_candidates, truth, p)
            } else {
                Sampled::kept(truth)
            }
        } else if tau_candidates.is_empty() {
            Sampled::kept(truth)
        } else {
            match self.config.off_model {
                OffModelPolicy::Resample => with_truth(rng, &tau_candidates, truth, p),
                OffModelPolicy::SnapToClosest if tau_candidates.len() > 1 => {
                    match sample_closest(truth, tau_candidates.cells()) {
                        Some(anchor) if anchor.sq_euclidean(truth) < prev.sq_euclidean(truth) => {
                            // the truth is off-model, so anything emitted here differs from it
                            Sampled::altered(with_truth(rng, &tau_candidates, anchor, p).cell)
                        }
                        _ => Sampled::kept(truth),
                    }
                }
                OffModelPolicy::SnapToClosest => Sampled::kept(truth),
            }
        }
    }

    fn push(&mut self, point: Point, sampled: Sampled) {
        trace!(
            truth = %point.cell,
            emitted = %sampled.cell,
            altered = sampled.altered,
            p = self.p_current
        );
        self.points.push(point.moved_to(sampled.cell));
        self.flags.push(sampled.altered);
        if sampled.altered {
            self.fp_count += 1;
        }

        self.block_count += 1;
        if self.block_count >= self.block_size {
            self.adjust();
        }
    }

    fn adjust(&mut self) {
        let FingerprintConfig { ratio, theta, .. } = *self.config;
        let expected = ratio * self.points.len() as f64;
        let observed = self.fp_count as f64;

        self.p_current = if observed > expected {
            ratio * (1.0 - theta)
        } else if observed < expected {
            ratio * (1.0 + theta)
        } else {
            ratio
        }
        .clamp(0.0, 1.0);
        self.block_count = 0;

        debug!(
            embedded = self.fp_count,
            expected,
            p_current = self.p_current,
            "fingerprint block adjusted"
        );
    }

    fn finish(self) -> Fingerprinted {
        Fingerprinted {
            trajectory: Trajectory::new(self.points),
            flags: self.flags,
        }
    }
}

/// Embeds a fingerprint into `trajectory`, producing one party's copy.
///
/// Every emitted cell is either the truth or a plausible alternative under
/// `model`; timestamps are copied through. A ratio of zero returns the input
/// unchanged with no flags set.
pub fn fingerprint<R: Rng + ?Sized>(
    rng: &mut R,
    trajectory: &Trajectory,
    model: &CorrelationModel,
    config: &FingerprintConfig,
) -> Result<Fingerprinted, FingerprintError> {
    let ratio = check_ratio("fingerprint ratio", config.ratio)?;
    check_ratio("theta", config.theta)?;

    if ratio == 0.0 {
        return Ok(Fingerprinted {
            trajectory: trajectory.clone(),
            flags: vec![false; trajectory.len()],
        });
    }

    let Some((first, rest)) = trajectory.split_first() else {
        return Err(FingerprintError::NoPointsProvided);
    };
    trajectory.validate(model.grid())?;

    let mut embedder = Embedder::new(model, config, trajectory.len());
    let sampled = embedder.embed_first(rng, first.cell);
    embedder.push(*first, sampled);

    let mut prev = sampled.cell;
    for point in rest {
        let sampled = embedder.embed_next(rng, prev, point.cell);
        embedder.push(*point, sampled);
        prev = sampled.cell;
    }

    let fingerprinted = embedder.finish();
    debug!(
        len = fingerprinted.flags.len(),
        rate = fingerprinted.embedding_rate(),
        target = ratio,
        "fingerprinted trajectory"
    );
    Ok(fingerprinted)
}
