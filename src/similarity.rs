/**
 * SimLearn
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::cmp;

use scoped_pool::Pool;

use config::TrainingConfig;
use types;
use types::{ScoredItem, SparseMatrix, TopItems};

/// Below this many rows per job, handing work to the pool costs more than it saves.
const MIN_ROWS_PER_JOB: usize = 256;

/// The item x item weight matrix under training. The dense variant is a row-major
/// `items x items` accumulator, the sparse variant only holds entries which have been written
/// to. Both read absent entries as zero, so they learn exactly the same values.
///
/// Invariant: the diagonal is never written and therefore always zero.
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarityState {
    Dense { num_items: usize, values: Vec<f64> },
    Sparse { rows: SparseMatrix },
}

/// Borrowed view of the current matrix, as returned by `SimilarityState::get`.
#[derive(Debug, Clone, Copy)]
pub enum SimilarityView<'a> {
    Dense { num_items: usize, values: &'a [f64] },
    Sparse(&'a SparseMatrix),
}

impl SimilarityState {

    pub fn new_dense(num_items: usize) -> Self {
        SimilarityState::Dense { num_items, values: vec![0.0; num_items * num_items] }
    }

    pub fn new_sparse(num_items: usize) -> Self {
        SimilarityState::Sparse { rows: types::new_sparse_matrix(num_items) }
    }

    /// The representation requested by `config.sparse_training`. Callers are expected to have
    /// run `TrainingConfig::check_capacity` before asking for a dense matrix.
    pub fn for_config(num_items: usize, config: &TrainingConfig) -> Self {
        if config.sparse_training {
            SimilarityState::new_sparse(num_items)
        } else {
            SimilarityState::new_dense(num_items)
        }
    }

    pub fn num_items(&self) -> usize {
        match *self {
            SimilarityState::Dense { num_items, .. } => num_items,
            SimilarityState::Sparse { ref rows } => rows.len(),
        }
    }

    pub fn is_sparse(&self) -> bool {
        match *self {
            SimilarityState::Dense { .. } => false,
            SimilarityState::Sparse { .. } => true,
        }
    }

    pub fn get(&self) -> SimilarityView {
        match *self {
            SimilarityState::Dense { num_items, ref values } =>
                SimilarityView::Dense { num_items, values: &values[..] },
            SimilarityState::Sparse { ref rows } => SimilarityView::Sparse(rows),
        }
    }

    #[inline]
    pub fn value(&self, row: u32, col: u32) -> f64 {
        match *self {
            SimilarityState::Dense { num_items, ref values } =>
                values[row as usize * num_items + col as usize],
            SimilarityState::Sparse { ref rows } =>
                rows[row as usize].get(&col).cloned().unwrap_or(0.0),
        }
    }

    /// Sums `S[row][l]` over `items`, skipping `l == row`. Items are visited in the given order
    /// in both representations.
    #[inline]
    pub fn row_sum(&self, row: u32, items: &[u32]) -> f64 {
        let mut sum = 0.0;
        match *self {
            SimilarityState::Dense { num_items, ref values } => {
                let offset = row as usize * num_items;
                for &item in items {
                    if item != row {
                        sum += values[offset + item as usize];
                    }
                }
            },
            SimilarityState::Sparse { ref rows } => {
                let entries = &rows[row as usize];
                for &item in items {
                    if item != row {
                        if let Some(value) = entries.get(&item) {
                            sum += *value;
                        }
                    }
                }
            },
        }
        sum
    }

    /// Adds `delta` to `S[row][col]`. Writing to the diagonal is a logic error of the caller.
    #[inline]
    pub fn apply_update(&mut self, row: u32, col: u32, delta: f64) {
        assert_ne!(row, col, "self-similarity must never be written");

        match *self {
            SimilarityState::Dense { num_items, ref mut values } =>
                values[row as usize * num_items + col as usize] += delta,
            SimilarityState::Sparse { ref mut rows } =>
                *rows[row as usize].entry(col).or_insert(0.0) += delta,
        }
    }

    /// Averages `S[row][col]` and `S[col][row]` and writes the result back to both entries,
    /// which leaves the pair exactly symmetric.
    #[inline]
    pub fn mirror(&mut self, row: u32, col: u32) {
        assert_ne!(row, col, "self-similarity must never be written");

        let average = (self.value(row, col) + self.value(col, row)) / 2.0;
        self.set(row, col, average);
        self.set(col, row, average);
    }

    fn set(&mut self, row: u32, col: u32, value: f64) {
        match *self {
            SimilarityState::Dense { num_items, ref mut values } =>
                values[row as usize * num_items + col as usize] = value,
            SimilarityState::Sparse { ref mut rows } => {
                rows[row as usize].insert(col, value);
            },
        }
    }

    /// Number of stored nonzero entries in a row.
    pub fn row_nnz(&self, row: u32) -> usize {
        match *self {
            SimilarityState::Dense { num_items, ref values } => {
                let offset = row as usize * num_items;
                values[offset..offset + num_items].iter().filter(|value| **value != 0.0).count()
            },
            SimilarityState::Sparse { ref rows } =>
                rows[row as usize].values().filter(|value| **value != 0.0).count(),
        }
    }

    /// Largest absolute difference between `S` and its transpose.
    pub fn max_asymmetry(&self) -> f64 {
        let mut max_difference: f64 = 0.0;
        match *self {
            SimilarityState::Dense { num_items, ref values } => {
                for row in 0..num_items {
                    for col in (row + 1)..num_items {
                        let difference =
                            (values[row * num_items + col] - values[col * num_items + row]).abs();
                        max_difference = max_difference.max(difference);
                    }
                }
            },
            SimilarityState::Sparse { ref rows } => {
                for (row, entries) in rows.iter().enumerate() {
                    for (col, value) in entries.iter() {
                        let difference = (value - self.value(*col, row as u32)).abs();
                        max_difference = max_difference.max(difference);
                    }
                }
            },
        }
        max_difference
    }

    /// Keeps the `k` entries of largest magnitude per row, ties broken by the lower column index.
    /// Zeros are never kept. Rows are independent, so we spread them over `pool_size` threads;
    /// the result does not depend on the number of threads. The accumulator itself is untouched.
    pub fn top_k_sparsify(&self, k: usize, pool_size: usize) -> SparseWeights {

        let num_items = self.num_items();
        let k = cmp::min(k, num_items);
        let mut rows: Vec<Vec<(u32, f64)>> = vec![Vec::new(); num_items];

        if pool_size <= 1 || num_items <= MIN_ROWS_PER_JOB {
            for (row, entries) in rows.iter_mut().enumerate() {
                *entries = self.sparsify_row(row as u32, k);
            }
        } else {
            let rows_per_job = cmp::max(MIN_ROWS_PER_JOB, (num_items + pool_size - 1) / pool_size);
            let pool = Pool::new(pool_size);

            pool.scoped(|scope| {
                for (job, chunk) in rows.chunks_mut(rows_per_job).enumerate() {
                    let first_row = job * rows_per_job;
                    scope.execute(move || {
                        for (offset, entries) in chunk.iter_mut().enumerate() {
                            *entries = self.sparsify_row((first_row + offset) as u32, k);
                        }
                    });
                }
            });

            pool.shutdown();
        }

        SparseWeights { num_items, rows }
    }

    fn sparsify_row(&self, row: u32, k: usize) -> Vec<(u32, f64)> {

        let mut top_items = TopItems::new(k);

        match *self {
            SimilarityState::Dense { num_items, ref values } => {
                let offset = row as usize * num_items;
                for (col, value) in values[offset..offset + num_items].iter().enumerate() {
                    if *value != 0.0 && !value.is_nan() {
                        top_items.offer(ScoredItem { item: col as u32, score: value.abs() });
                    }
                }
            },
            SimilarityState::Sparse { ref rows } => {
                for (col, value) in rows[row as usize].iter() {
                    if *value != 0.0 && !value.is_nan() {
                        top_items.offer(ScoredItem { item: *col, score: value.abs() });
                    }
                }
            },
        }

        let mut entries: Vec<(u32, f64)> = top_items.into_sorted_vec()
            .into_iter()
            .map(|scored_item| (scored_item.item, self.value(row, scored_item.item)))
            .collect();

        entries.sort_unstable_by_key(|&(col, _)| col);
        entries
    }
}

/// The served, row-sparsified weight matrix. Each row holds its nonzero entries in ascending
/// column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseWeights {
    num_items: usize,
    rows: Vec<Vec<(u32, f64)>>,
}

impl SparseWeights {

    /// Assembles weights from explicit rows, sorting each row by column.
    pub fn from_rows(num_items: usize, rows: Vec<Vec<(u32, f64)>>) -> Self {
        let mut rows = rows;
        rows.resize(num_items, Vec::new());
        for entries in rows.iter_mut() {
            entries.sort_unstable_by_key(|&(col, _)| col);
        }
        SparseWeights { num_items, rows }
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    pub fn row(&self, row: u32) -> &[(u32, f64)] {
        &self.rows[row as usize]
    }

    pub fn rows(&self) -> &[Vec<(u32, f64)>] {
        &self.rows
    }

    pub fn get(&self, row: u32, col: u32) -> f64 {
        let entries = &self.rows[row as usize];
        match entries.binary_search_by_key(&col, |&(c, _)| c) {
            Ok(position) => entries[position].1,
            Err(_) => 0.0,
        }
    }

    pub fn nnz(&self) -> usize {
        self.rows.iter().map(|entries| entries.len()).sum()
    }

    pub fn transpose(&self) -> SparseWeights {
        let mut transposed: Vec<Vec<(u32, f64)>> = vec![Vec::new(); self.num_items];
        for (row, entries) in self.rows.iter().enumerate() {
            for &(col, value) in entries {
                transposed[col as usize].push((row as u32, value));
            }
        }
        // Rows are visited in ascending order, so every transposed row is already sorted
        SparseWeights { num_items: self.num_items, rows: transposed }
    }
}
