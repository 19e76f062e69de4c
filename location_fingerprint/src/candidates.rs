use trajectory_grid::Cell;

/// Unnormalized weights over cells, kept in insertion order so that "pick the
/// maximum" is reproducible: the first cell reaching the maximum wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates(Vec<(Cell, f64)>);

impl Candidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equal weight `1 / n` for each of the `n` cells.
    pub fn uniform<I: IntoIterator<Item = Cell>>(cells: I) -> Self {
        let mut uniform: Self = cells.into_iter().map(|c| (c, 1.0)).collect();
        let n = uniform.len() as f64;
        uniform.0.iter_mut().for_each(|(_, w)| *w /= n);
        uniform
    }

    /// Adds `weight` to `cell`, appending it when unseen.
    pub fn add(&mut self, cell: Cell, weight: f64) {
        match self.0.iter_mut().find(|(c, _)| *c == cell) {
            Some((_, w)) => *w += weight,
            None => self.0.push((cell, weight)),
        }
    }

    /// Weight of `cell`, zero when absent.
    pub fn get(&self, cell: Cell) -> f64 {
        self.0
            .iter()
            .find(|(c, _)| *c == cell)
            .map_or(0.0, |(_, w)| *w)
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.0.iter().any(|(c, _)| *c == cell)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Cell, f64)> + '_ {
        self.0.iter().copied()
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.0.iter().map(|(c, _)| *c)
    }

    pub fn as_slice(&self) -> &[(Cell, f64)] {
        &self.0
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, w)| w).sum()
    }

    /// Scales the weights to sum to one. Left as is when the total is not
    /// positive.
    pub fn normalized(mut self) -> Self {
        let total = self.total();
        if total > 0.0 {
            self.0.iter_mut().for_each(|(_, w)| *w /= total);
        }
        self
    }

    pub fn filter(&self, mut keep: impl FnMut(Cell, f64) -> bool) -> Self {
        self.iter().filter(|(c, w)| keep(*c, *w)).collect()
    }

    pub fn map_weights(mut self, mut f: impl FnMut(Cell, f64) -> f64) -> Self {
        self.0.iter_mut().for_each(|(c, w)| *w = f(*c, *w));
        self
    }

    /// Highest weighted cell, first seen on ties.
    pub fn argmax(&self) -> Option<Cell> {
        self.iter()
            .reduce(|acc, x| if acc.1 < x.1 { x } else { acc })
            .map(|(c, _)| c)
    }

    /// Every cell sharing the maximum weight, in insertion order.
    pub fn all_max(&self) -> Vec<Cell> {
        let max = self.iter().map(|(_, w)| w).fold(f64::NEG_INFINITY, f64::max);
        self.iter().filter(|(_, w)| *w == max).map(|(c, _)| c).collect()
    }
}

impl FromIterator<(Cell, f64)> for Candidates {
    fn from_iter<I: IntoIterator<Item = (Cell, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
