use itertools::Itertools;
use tracing::debug;
use trajectory_grid::{Cell, GridConfig, GridError};

use crate::Candidates;

/// Markov model of movement between cells, learned from historical
/// trajectories. Immutable once built, so a single model can be shared by
/// every trial of an evaluation run.
#[derive(Debug, Clone)]
pub struct CorrelationModel {
    grid: GridConfig,
    /// How often each cell was entered, indexed by [`GridConfig::index_of`].
    emission: Vec<u64>,
    /// Observed successors of each cell with their counts, first seen first.
    transition: Vec<Vec<(Cell, u64)>>,
}

/// The three nested candidate sets shared by the embedder and the
/// correlation attack.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTiers {
    /// The full next-step distribution.
    pub candidates: Candidates,
    /// Candidates with probability at least `tau`.
    pub tau_candidates: Candidates,
    /// Tau candidates no farther from the true cell than the previous cell
    /// is. Only computed when a true cell was given.
    pub tau_dist_candidates: Option<Candidates>,
}

impl CorrelationModel {
    /// Counts every consecutive `(prev, curr)` pair of every trajectory in the
    /// corpus. Fails on the first cell that lies outside `grid`.
    pub fn new<I, T>(grid: GridConfig, corpus: I) -> Result<Self, GridError>
    where
        I: IntoIterator<Item = T>,
        T: IntoIterator<Item = Cell>,
    {
        let mut emission = vec![0; grid.cell_count()];
        let mut transition: Vec<Vec<(Cell, u64)>> = vec![Vec::new(); grid.cell_count()];
        let mut pairs = 0usize;

        for trajectory in corpus {
            for (prev, curr) in trajectory.into_iter().tuple_windows() {
                let from = grid.try_index(prev)?;
                let to = grid.try_index(curr)?;

                let successors = &mut transition[from];
                match successors.iter_mut().find(|(cell, _)| *cell == curr) {
                    Some((_, count)) => *count += 1,
                    None => successors.push((curr, 1)),
                }
                emission[to] += 1;
                pairs += 1;
            }
        }
        debug!(pairs, cells = grid.cell_count(), "built correlation model");

        Ok(Self {
            grid,
            emission,
            transition,
        })
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    /// # Panics
    /// When `cell` lies outside the grid.
    fn index(&self, cell: Cell) -> usize {
        match self.grid.index_of(cell) {
            Some(index) => index,
            None => self.out_of_grid(cell),
        }
    }

    fn out_of_grid(&self, cell: Cell) -> ! {
        panic!(
            "cell {cell} is outside the {size}x{size} correlation grid",
            size = self.grid.grid_size()
        )
    }

    /// Number of times `cell` was entered in the corpus.
    pub fn emission_count(&self, cell: Cell) -> u64 {
        self.emission[self.index(cell)]
    }

    /// Cells with at least one observed successor, in row-major order.
    pub fn transition_sources(&self) -> impl Iterator<Item = Cell> + '_ {
        self.transition
            .iter()
            .enumerate()
            .filter(|(_, successors)| !successors.is_empty())
            .filter_map(|(index, _)| self.grid.cell_at(index))
    }

    /// Raw successor counts of `cell`, empty when none were observed.
    pub fn get_vanilla_transition(&self, cell: Cell) -> Candidates {
        self.transition[self.index(cell)]
            .iter()
            .map(|(next, count)| (*next, *count as f64))
            .collect()
    }

    /// Next-step probabilities from `cell`. A cell without observed successors
    /// gets a uniform distribution over its neighborhood instead, so the result
    /// is never empty.
    pub fn get_transition(&self, cell: Cell) -> Candidates {
        let counts = self.get_vanilla_transition(cell);
        if counts.total() > 0.0 {
            counts.normalized()
        } else {
            Candidates::uniform(self.grid.neighborhood(cell))
        }
    }

    /// Visitation frequency over the neighborhood of `cell`, normalized within
    /// that neighborhood. Uniform when nothing in it was ever visited.
    pub fn get_emission(&self, cell: Cell) -> Candidates {
        if !self.grid.contains(cell) {
            self.out_of_grid(cell);
        }
        let local: Candidates = self
            .grid
            .neighborhood(cell)
            .map(|c| (c, self.emission_count(c) as f64))
            .collect();

        if local.total() > 0.0 {
            local.normalized()
        } else {
            Candidates::uniform(local.cells())
        }
    }

    /// Graduated candidate sets for a step leaving `prev`. `truth` enables the
    /// distance tier.
    pub fn get_all_transition(&self, prev: Cell, truth: Option<Cell>, tau: f64) -> TransitionTiers {
        let candidates = self.get_transition(prev);
        let tau_candidates = candidates.filter(|_, p| p >= tau);
        let tau_dist_candidates = truth.map(|truth| {
            let dist = prev.sq_euclidean(truth);
            tau_candidates.filter(|cell, _| cell.sq_euclidean(truth) <= dist)
        });

        TransitionTiers {
            candidates,
            tau_candidates,
            tau_dist_candidates,
        }
    }
}
