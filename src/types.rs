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

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use fnv::FnvHashMap;

pub type SparseVector = FnvHashMap<u32, f64>;
pub type SparseMatrix = Vec<SparseVector>;

/// One strictly ascending list of item indices per user.
pub type SparseBinaryMatrix = Vec<Vec<u32>>;

pub fn new_sparse_vector(capacity: usize) -> SparseVector {
    FnvHashMap::with_capacity_and_hasher(capacity, Default::default())
}

pub fn new_sparse_matrix(num_rows: usize) -> SparseMatrix {
    vec![new_sparse_vector(0); num_rows]
}

/// Result type used to find the top-k items of a row via a binary heap
#[derive(PartialEq,Debug,Clone,Copy)]
pub struct ScoredItem {
    pub item: u32,
    pub score: f64,
}

/// Ordering for our max-heap: the "largest" element is the worst one we keep, so that it sits at
/// the top of the heap and can be replaced. Higher scores rank first, equal scores are broken by
/// the lower item index to keep the selection deterministic. There is no total order on floating
/// point numbers, callers must not feed NaN scores.
fn cmp_reverse(scored_item_a: &ScoredItem, scored_item_b: &ScoredItem) -> Ordering {
    match scored_item_a.score.partial_cmp(&scored_item_b.score) {
        Some(Ordering::Less) => Ordering::Greater,
        Some(Ordering::Greater) => Ordering::Less,
        _ => scored_item_a.item.cmp(&scored_item_b.item),
    }
}

impl Eq for ScoredItem {}

impl Ord for ScoredItem {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_reverse(self, other)
    }
}

impl PartialOrd for ScoredItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(cmp_reverse(self, other))
    }
}

/// Bounded heap which retains the `k` best scored items offered to it.
pub struct TopItems {
    k: usize,
    heap: BinaryHeap<ScoredItem>,
}

impl TopItems {

    /// The heap grows with the offers, so `k` may exceed the number of candidates.
    pub fn new(k: usize) -> Self {
        TopItems { k, heap: BinaryHeap::new() }
    }

    pub fn offer(&mut self, scored_item: ScoredItem) {
        if self.k == 0 {
            return;
        }

        if self.heap.len() < self.k {
            self.heap.push(scored_item);
        } else if let Some(mut top) = self.heap.peek_mut() {
            if scored_item < *top {
                *top = scored_item;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best item first
    pub fn into_sorted_vec(self) -> Vec<ScoredItem> {
        self.heap.into_sorted_vec()
    }
}


#[cfg(test)]
mod tests {

    use std::f64::EPSILON;
    use super::{ScoredItem, TopItems};

    #[test]
    fn scored_item_ordering_reversed() {
        let item_a = ScoredItem { item: 1, score: 0.5 };
        let item_b = ScoredItem { item: 2, score: 1.5 };
        let item_c = ScoredItem { item: 3, score: 0.3 };

        assert!(item_a > item_b);
        assert!(item_a < item_c);
        assert!(item_b < item_c);
    }

    #[test]
    fn ties_prefer_lower_index() {
        let item_a = ScoredItem { item: 7, score: 1.0 };
        let item_b = ScoredItem { item: 2, score: 1.0 };

        assert!(item_b < item_a);
    }

    fn within_epsilon(value: f64, expected: f64) -> bool {
        (value - expected).abs() < EPSILON
    }

    #[test]
    fn topk() {

        let items = [
            ScoredItem { item: 1, score: 0.5 },
            ScoredItem { item: 2, score: 1.5 },
            ScoredItem { item: 3, score: 0.3 },
            ScoredItem { item: 4, score: 3.5 },
            ScoredItem { item: 5, score: 2.5 },
        ];

        let mut top_k = TopItems::new(3);
        for scored_item in &items {
            top_k.offer(*scored_item);
        }

        let top_k = top_k.into_sorted_vec();

        assert_eq!(top_k.len(), 3);

        assert_eq!(top_k[0].item, 4);
        assert!(within_epsilon(top_k[0].score, 3.5));

        assert_eq!(top_k[1].item, 5);
        assert!(within_epsilon(top_k[1].score, 2.5));

        assert_eq!(top_k[2].item, 2);
        assert!(within_epsilon(top_k[2].score, 1.5));
    }

    #[test]
    fn topk_with_ties_is_deterministic() {
        let mut top_k = TopItems::new(2);
        for item in (0..5).rev() {
            top_k.offer(ScoredItem { item, score: 1.0 });
        }

        let kept: Vec<u32> = top_k.into_sorted_vec().iter().map(|s| s.item).collect();
        assert_eq!(kept, vec![0, 1]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut top_k = TopItems::new(0);
        top_k.offer(ScoredItem { item: 0, score: 1.0 });
        assert_eq!(top_k.len(), 0);
        assert!(top_k.is_empty());
    }

    #[test]
    fn capacity_beyond_offers_keeps_everything() {
        let mut top_k = TopItems::new(usize::max_value());
        assert!(top_k.is_empty());

        for item in 0..3 {
            top_k.offer(ScoredItem { item, score: item as f64 });
        }

        let kept: Vec<u32> = top_k.into_sorted_vec().iter().map(|s| s.item).collect();
        assert_eq!(kept, vec![2, 1, 0]);
    }
}
