use geo::{Area, BoundingRect, Contains};
use geo_types::{Coord, Point, Polygon};
use rand::Rng;
use rand::distr::{Distribution, weighted::WeightedIndex};
use rand::seq::{IndexedRandom, index};
use trajectory_grid::{Cell, GridConfig};

use crate::Candidates;

/// Jitter radius, in cells, used when an attacker nudges a point it suspects.
pub const DEFAULT_JITTER_SCALE: u32 = 3;

/// Outcome of a sampling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampled {
    pub cell: Cell,
    /// The sampled cell differs from the truth it was drawn against.
    pub altered: bool,
}

impl Sampled {
    pub const fn kept(cell: Cell) -> Self {
        Self {
            cell,
            altered: false,
        }
    }

    pub const fn altered(cell: Cell) -> Self {
        Self {
            cell,
            altered: true,
        }
    }
}

fn pick_weighted<R: Rng + ?Sized>(rng: &mut R, items: &[(Cell, f64)]) -> Option<Cell> {
    let dist = WeightedIndex::new(items.iter().map(|(_, w)| *w)).ok()?;
    items.get(dist.sample(rng)).map(|(c, _)| *c)
}

/// Draws a cell with probability proportional to its weight. Falls back to a
/// uniform draw when no weight is positive, `None` only for an empty set.
pub fn sample_proportionally<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &Candidates,
) -> Option<Cell> {
    if candidates.total() > 0.0 {
        if let Some(cell) = pick_weighted(rng, candidates.as_slice()) {
            return Some(cell);
        }
    }
    candidates.as_slice().choose(rng).map(|(c, _)| *c)
}

/// Truth-biased proportional sampling.
///
/// With a `truth`, the truth is returned unchanged with probability `1 - p`;
/// the remaining mass `p` is spread over the other candidates in proportion
/// to their weights, excluding the truth's own weight. When no other
/// candidate carries weight the truth is returned unaltered. `truth` need not
/// be one of the candidates.
///
/// Without a truth this is [`sample_proportionally`] and nothing counts as
/// altered. Returns `None` only for an empty set without a truth.
pub fn sample_proportionally_with_truth<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &Candidates,
    truth: Option<Cell>,
    p: f64,
) -> Option<Sampled> {
    let Some(truth) = truth else {
        return sample_proportionally(rng, candidates).map(Sampled::kept);
    };

    let others: Vec<(Cell, f64)> = candidates.iter().filter(|(c, _)| *c != truth).collect();
    let rest: f64 = others.iter().map(|(_, w)| w).sum();
    if rest <= 0.0 || rest.is_nan() || !rng.random_bool(p.clamp(0.0, 1.0)) {
        return Some(Sampled::kept(truth));
    }

    Some(pick_weighted(rng, &others).map_or(Sampled::kept(truth), Sampled::altered))
}

/// A cell up to `scale` away on each axis, never `cell` itself. A scale of
/// zero is treated as one.
pub fn sample_nearby_point<R: Rng + ?Sized>(rng: &mut R, cell: Cell, scale: u32) -> Cell {
    let s = scale.max(1) as i32;
    loop {
        let dx = rng.random_range(-s..=s);
        let dy = rng.random_range(-s..=s);
        let moved = cell.offset(dx, dy);
        if moved != cell {
            return moved;
        }
    }
}

/// [`sample_nearby_point`] restricted to cells inside `grid`.
///
/// # Panics
/// When `cell` itself lies outside the grid.
pub fn sample_nearby_cell<R: Rng + ?Sized>(
    rng: &mut R,
    grid: &GridConfig,
    cell: Cell,
    scale: u32,
) -> Cell {
    assert!(grid.contains(cell), "cannot jitter {cell}, it lies outside the grid");
    loop {
        let nearby = sample_nearby_point(rng, cell, scale);
        if grid.contains(nearby) {
            return nearby;
        }
    }
}

/// The candidate closest to `cell`, the first one on ties.
pub fn sample_closest<I: IntoIterator<Item = Cell>>(cell: Cell, candidates: I) -> Option<Cell> {
    candidates
        .into_iter()
        .map(|c| (c, c.sq_euclidean(cell)))
        .reduce(|acc, x| if x.1 < acc.1 { x } else { acc })
        .map(|(c, _)| c)
}

/// `max(1, count)` distinct indices below `len`, capped at `len`.
pub fn sample_count<R: Rng + ?Sized>(rng: &mut R, len: usize, count: usize) -> Vec<usize> {
    index::sample(rng, len, count.max(1).min(len)).into_vec()
}

/// [`sample_count`] over the items of a slice.
pub fn sample_items<'a, R: Rng + ?Sized, T>(
    rng: &mut R,
    items: &'a [T],
    count: usize,
) -> Vec<&'a T> {
    sample_count(rng, items.len(), count)
        .into_iter()
        .filter_map(|i| items.get(i))
        .collect()
}

pub fn sample_portion<R: Rng + ?Sized>(rng: &mut R, len: usize, portion: f64) -> Vec<usize> {
    sample_count(rng, len, (portion * len as f64) as usize)
}

/// Uniform geographic coordinate inside `cell`.
pub fn sample_coordinate<R: Rng + ?Sized>(
    rng: &mut R,
    grid: &GridConfig,
    cell: Cell,
) -> Option<Coord<f64>> {
    grid.contains(cell).then(|| {
        let x = f64::from(cell.x) + rng.random::<f64>();
        let y = f64::from(cell.y) + rng.random::<f64>();
        grid.coordinate_at(x, y)
    })
}

/// Rejection-samples a point inside `polygon`. `None` for polygons without
/// area.
pub fn sample_uniformly<R: Rng + ?Sized>(
    rng: &mut R,
    polygon: &Polygon<f64>,
) -> Option<Point<f64>> {
    if polygon.unsigned_area() <= 0.0 {
        return None;
    }
    let rect = polygon.bounding_rect()?;
    let (min, max) = (rect.min(), rect.max());
    loop {
        let point = Point::new(
            rng.random_range(min.x..max.x),
            rng.random_range(min.y..max.y),
        );
        if polygon.contains(&point) {
            return Some(point);
        }
    }
}
