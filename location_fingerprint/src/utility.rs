use itertools::Itertools;
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;
use trajectory_grid::{Cell, GridConfig, Trajectory};

use crate::{CorrelationModel, FingerprintError};

pub const DEFAULT_QUERY_COUNT: usize = 200;
pub const DEFAULT_BIN_COUNT: usize = 10;

/// Pattern sampling gives up after this many dead ends in a row.
const MAX_PATTERN_ATTEMPTS: usize = 1000;

fn relative_error(orig: usize, eval: usize) -> f64 {
    orig.abs_diff(eval) as f64 / orig.max(1) as f64
}

fn check_queries(query_count: usize) -> Result<(), FingerprintError> {
    if query_count == 0 {
        Err(FingerprintError::InvalidEvaluation("at least one query is needed"))
    } else {
        Ok(())
    }
}

/// Points strictly closer than `radius` to `center`.
fn count_in_range(dataset: &[Trajectory], center: Cell, radius: i64) -> usize {
    dataset
        .iter()
        .flat_map(Trajectory::cells)
        .filter(|cell| cell.sq_euclidean(center) < radius * radius)
        .count()
}

/// Mean relative error of point counts inside random circles on `grid`.
pub fn area_query_error<R: Rng + ?Sized>(
    rng: &mut R,
    orig: &[Trajectory],
    eval: &[Trajectory],
    grid: &GridConfig,
    query_count: usize,
) -> Result<f64, FingerprintError> {
    check_queries(query_count)?;
    let size = grid.grid_size() as i32;

    let total: f64 = (0..query_count)
        .map(|_| {
            let center = Cell::new(rng.random_range(0..size), rng.random_range(0..size));
            let radius = rng.random_range(0..size) as i64;
            relative_error(
                count_in_range(orig, center, radius),
                count_in_range(eval, center, radius),
            )
        })
        .sum();
    Ok(total / query_count as f64)
}

fn count_pattern(dataset: &[Trajectory], pattern: &[Cell]) -> usize {
    dataset
        .iter()
        .map(|t| {
            let cells: Vec<Cell> = t.cells().collect();
            cells.windows(pattern.len()).filter(|w| *w == pattern).count()
        })
        .sum()
}

/// Random walk of `gram` cells along observed transitions, restarted at a
/// dead end.
fn sample_pattern<R: Rng + ?Sized>(
    rng: &mut R,
    sources: &[Cell],
    model: &CorrelationModel,
    gram: usize,
) -> Option<Vec<Cell>> {
    for _ in 0..MAX_PATTERN_ATTEMPTS {
        let mut pattern = vec![*sources.choose(rng)?];
        while pattern.len() < gram {
            let Some(&last) = pattern.last() else { break };
            let successors: Vec<Cell> = model.get_vanilla_transition(last).cells().collect();
            match successors.choose(rng) {
                Some(&next) => pattern.push(next),
                None => break,
            }
        }
        if pattern.len() == gram {
            return Some(pattern);
        }
    }
    None
}

/// Mean relative error of the number of occurrences of `gram`-long cell
/// sequences sampled from the model's transitions.
pub fn pattern_query_error<R: Rng + ?Sized>(
    rng: &mut R,
    orig: &[Trajectory],
    eval: &[Trajectory],
    model: &CorrelationModel,
    gram: usize,
    query_count: usize,
) -> Result<f64, FingerprintError> {
    check_queries(query_count)?;
    if gram == 0 {
        return Err(FingerprintError::InvalidEvaluation("patterns need at least one cell"));
    }
    let sources: Vec<Cell> = model.transition_sources().collect();

    let mut total = 0.0;
    for _ in 0..query_count {
        let pattern = sample_pattern(rng, &sources, model, gram).ok_or(
            FingerprintError::InvalidEvaluation("the model has no transition path of that length"),
        )?;
        let error = relative_error(count_pattern(orig, &pattern), count_pattern(eval, &pattern));
        debug!(?pattern, error, "pattern query");
        total += error;
    }
    Ok(total / query_count as f64)
}

/// `bin_count` evenly spaced edges from zero to `max`, then one open-ended
/// bin for everything beyond.
fn histogram(values: &[f64], max: f64, bin_count: usize) -> Vec<f64> {
    let last = bin_count.saturating_sub(1).max(1) as f64;
    let edges: Vec<f64> = (0..bin_count).map(|i| max * i as f64 / last).collect();
    let mut counts = vec![0.0; edges.len().max(1)];

    for value in values.iter().filter(|v| **v >= 0.0) {
        let bin = edges.partition_point(|e| e <= value).saturating_sub(1);
        if let Some(count) = counts.get_mut(bin) {
            *count += 1.0;
        }
    }
    counts
}

fn entropy_term(p: f64, m: f64) -> f64 {
    if p > 0.0 { p * (p / m).ln() } else { 0.0 }
}

/// Jensen-Shannon distance (square root of the divergence, natural log)
/// between two histograms, normalized first. `None` when either is empty.
pub fn jensen_shannon_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    let (sum_a, sum_b) = (a.iter().sum::<f64>(), b.iter().sum::<f64>());
    if sum_a <= 0.0 || sum_b <= 0.0 || a.len() != b.len() {
        return None;
    }
    let divergence: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let (p, q) = (x / sum_a, y / sum_b);
            let m = (p + q) / 2.0;
            entropy_term(p, m) + entropy_term(q, m)
        })
        .sum::<f64>()
        / 2.0;
    Some(divergence.max(0.0).sqrt())
}

fn distribution_error(orig: &[f64], eval: &[f64], bin_count: usize) -> Option<f64> {
    let max = orig.iter().copied().fold(0.0, f64::max);
    jensen_shannon_distance(&histogram(orig, max, bin_count), &histogram(eval, max, bin_count))
}

/// Divergence between the distributions of trajectory path lengths.
pub fn trip_error(orig: &[Trajectory], eval: &[Trajectory], bin_count: usize) -> Option<f64> {
    let lengths =
        |dataset: &[Trajectory]| dataset.iter().map(Trajectory::path_length).collect_vec();
    distribution_error(&lengths(orig), &lengths(eval), bin_count)
}

/// Divergence between the distributions of single-step lengths.
pub fn diameter_error(orig: &[Trajectory], eval: &[Trajectory], bin_count: usize) -> Option<f64> {
    let steps = |dataset: &[Trajectory]| {
        dataset
            .iter()
            .flat_map(Trajectory::step_lengths)
            .collect_vec()
    };
    distribution_error(&steps(orig), &steps(eval), bin_count)
}

/// Rank of every grid cell by visit count, most visited first. Equal counts
/// keep the order in which the cells were first visited; cells never
/// visited share the last rank.
fn popularity_ranks(dataset: &[Trajectory], grid: &GridConfig) -> Vec<usize> {
    let mut counts = vec![0usize; grid.cell_count()];
    let mut seen = Vec::new();
    for index in dataset.iter().flat_map(Trajectory::cells).filter_map(|c| grid.index_of(c)) {
        if counts[index] == 0 {
            seen.push(index);
        }
        counts[index] += 1;
    }
    seen.sort_by_key(|&index| std::cmp::Reverse(counts[index]));

    let mut ranks = vec![grid.cell_count().saturating_sub(1); grid.cell_count()];
    for (rank, index) in seen.into_iter().enumerate() {
        ranks[index] = rank;
    }
    ranks
}

/// Pairs inside runs of equal values of a sorted slice.
fn tied_pairs<T: PartialEq>(sorted: &[T]) -> u64 {
    sorted
        .chunk_by(|a, b| a == b)
        .map(|run| {
            let t = run.len() as u64;
            t * (t - 1) / 2
        })
        .sum()
}

/// Merge sort that returns the number of strictly inverted pairs.
fn sort_counting_swaps(values: &mut [usize]) -> u64 {
    let len = values.len();
    if len < 2 {
        return 0;
    }
    let mid = len / 2;
    let mut swaps =
        sort_counting_swaps(&mut values[..mid]) + sort_counting_swaps(&mut values[mid..]);

    let mut merged = Vec::with_capacity(len);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < len {
        if values[j] < values[i] {
            merged.push(values[j]);
            swaps += (mid - i) as u64;
            j += 1;
        } else {
            merged.push(values[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&values[i..mid]);
    merged.extend_from_slice(&values[j..]);
    values.copy_from_slice(&merged);
    swaps
}

/// Kendall's tau-b, in `O(n log n)` (Knight's algorithm). `None` when either
/// side is constant or the lengths differ.
pub fn kendall_tau(x: &[usize], y: &[usize]) -> Option<f64> {
    if x.len() != y.len() {
        return None;
    }
    let n = x.len() as u64;
    let total = n * n.saturating_sub(1) / 2;

    let mut pairs: Vec<(usize, usize)> = x.iter().copied().zip(y.iter().copied()).collect();
    pairs.sort_unstable();
    let x_ties = tied_pairs(&pairs.iter().map(|p| p.0).collect_vec());
    let joint_ties = tied_pairs(&pairs);

    let mut ys = pairs.iter().map(|p| p.1).collect_vec();
    let swaps = sort_counting_swaps(&mut ys);
    let y_ties = tied_pairs(&ys);

    let denominator = ((total - x_ties) as f64 * (total - y_ties) as f64).sqrt();
    if denominator <= 0.0 {
        return None;
    }
    let numerator = total as f64 - x_ties as f64 - y_ties as f64 + joint_ties as f64
        - 2.0 * swaps as f64;
    Some(numerator / denominator)
}

/// Rank correlation of cell popularity between the two datasets: one when
/// both rank the cells alike, minus one when the order is reversed. Project
/// both datasets first to compare on a coarser grid.
pub fn popularity_correlation(
    orig: &[Trajectory],
    eval: &[Trajectory],
    grid: &GridConfig,
) -> Option<f64> {
    kendall_tau(&popularity_ranks(orig, grid), &popularity_ranks(eval, grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn c(x: i32, y: i32) -> Cell {
        Cell::new(x, y)
    }

    fn dataset() -> Vec<Trajectory> {
        vec![
            Trajectory::from_cells([c(0, 0), c(1, 0), c(2, 0), c(3, 0)]),
            Trajectory::from_cells([c(4, 4), c(4, 5), c(4, 6)]),
            Trajectory::from_cells([c(9, 9), c(7, 7)]),
        ]
    }

    #[test]
    fn identical_datasets_have_no_error() {
        let mut rng = StdRng::seed_from_u64(3);
        let grid = GridConfig::with_size(10).unwrap();
        let model = CorrelationModel::new(grid, dataset().iter().map(Trajectory::cells)).unwrap();
        let data = dataset();

        assert_eq!(area_query_error(&mut rng, &data, &data, &grid, 50), Ok(0.0));
        assert_eq!(pattern_query_error(&mut rng, &data, &data, &model, 2, 50), Ok(0.0));
        assert_eq!(trip_error(&data, &data, DEFAULT_BIN_COUNT), Some(0.0));
        assert_eq!(diameter_error(&data, &data, DEFAULT_BIN_COUNT), Some(0.0));
    }

    #[test]
    fn missing_patterns_count_fully() {
        let mut rng = StdRng::seed_from_u64(5);
        let grid = GridConfig::with_size(10).unwrap();
        let data = vec![Trajectory::from_cells([c(0, 0), c(1, 0)])];
        let model = CorrelationModel::new(grid, data.iter().map(Trajectory::cells)).unwrap();
        let moved = vec![Trajectory::from_cells([c(0, 0), c(0, 1)])];

        assert_eq!(pattern_query_error(&mut rng, &data, &moved, &model, 2, 10), Ok(1.0));
        assert!(matches!(
            pattern_query_error(&mut rng, &data, &moved, &model, 3, 10),
            Err(FingerprintError::InvalidEvaluation(_))
        ));
    }

    #[test]
    fn counting_helpers() {
        let data = dataset();
        assert_eq!(count_in_range(&data, c(0, 0), 2), 2);
        assert_eq!(count_in_range(&data, c(0, 0), 0), 0);
        assert_eq!(count_pattern(&data, &[c(1, 0), c(2, 0)]), 1);
        assert_eq!(count_pattern(&data, &[c(2, 0), c(1, 0)]), 0);
        assert_eq!(relative_error(0, 3), 3.0);
        assert_eq!(relative_error(4, 2), 0.5);
    }

    #[test]
    fn histogram_keeps_an_open_last_bin() {
        let counts = histogram(&[0.0, 1.0, 4.9, 5.0, 12.0], 10.0, 3);
        assert_eq!(counts, vec![3.0, 1.0, 1.0]);
    }

    #[test]
    fn kendall_tau_b_handles_ties() {
        assert_eq!(kendall_tau(&[0, 1, 2, 3], &[0, 1, 2, 3]), Some(1.0));
        assert_eq!(kendall_tau(&[0, 1, 2, 3], &[3, 2, 1, 0]), Some(-1.0));
        assert_eq!(kendall_tau(&[0, 0, 1], &[0, 1, 1]), Some(0.5));
        assert_eq!(kendall_tau(&[2, 2, 2], &[0, 1, 2]), None);
        assert_eq!(kendall_tau(&[0, 1], &[0]), None);
    }

    #[test]
    fn popularity_follows_visit_order() {
        let grid = GridConfig::with_size(2).unwrap();
        let (a, b, d, e) = (c(0, 0), c(0, 1), c(1, 0), c(1, 1));
        let orig = vec![Trajectory::from_cells([a, a, a, b, b, d])];
        assert_eq!(popularity_correlation(&orig, &orig, &grid), Some(1.0));

        // a and d trade places; the unvisited e stays last in both
        let swapped = vec![Trajectory::from_cells([d, d, d, b, b, a])];
        let tau = popularity_correlation(&orig, &swapped, &grid).unwrap();
        assert!(tau.abs() < 1e-12, "tau {tau}");

        let busy = vec![Trajectory::from_cells([a, a, a, a, b, b, b, d, d, e])];
        let quiet = vec![Trajectory::from_cells([e, e, e, e, d, d, d, b, b, a])];
        assert_eq!(popularity_correlation(&busy, &quiet, &grid), Some(-1.0));

        assert_eq!(popularity_correlation(&[], &orig, &grid), None);
    }

    #[test]
    fn jensen_shannon_bounds() {
        assert_eq!(jensen_shannon_distance(&[1.0, 0.0], &[2.0, 0.0]), Some(0.0));
        let disjoint = jensen_shannon_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((disjoint - std::f64::consts::LN_2.sqrt()).abs() < 1e-12);
        assert_eq!(jensen_shannon_distance(&[0.0, 0.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn distorted_steps_diverge() {
        let data = dataset();
        let jumpy = vec![
            Trajectory::from_cells([c(0, 0), c(9, 0), c(0, 0), c(9, 9)]),
            Trajectory::from_cells([c(4, 4), c(0, 9), c(9, 0)]),
        ];
        assert!(diameter_error(&data, &jumpy, DEFAULT_BIN_COUNT).unwrap() > 0.5);
        assert!(trip_error(&data, &jumpy, DEFAULT_BIN_COUNT).unwrap() > 0.0);
    }
}
