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

use similarity::SparseWeights;
use types;
use types::{ScoredItem, SparseBinaryMatrix, TopItems};

/// Scores every item reachable from the user's history by summing the learned weights
/// `W[i][l]` over the known items `l`, and returns the `n` best items, best first. `transposed`
/// must be the transpose of the served weights, so that each known item contributes a row.
/// `history` has to be sorted.
pub fn recommend_for_user(
    history: &[u32],
    transposed: &SparseWeights,
    n: usize,
    exclude_seen: bool,
) -> Vec<ScoredItem> {

    let n = cmp::min(n, transposed.num_items());
    let mut scores = types::new_sparse_vector(n);

    for known_item in history {
        for &(item, weight) in transposed.row(*known_item) {
            if exclude_seen && history.binary_search(&item).is_ok() {
                continue;
            }
            *scores.entry(item).or_insert(0.0) += weight;
        }
    }

    let mut top_items = TopItems::new(n);

    for (item, score) in scores.into_iter() {
        if !score.is_nan() {
            top_items.offer(ScoredItem { item, score });
        }
    }

    top_items.into_sorted_vec()
}

/// Computes the top-`n` recommendations for every user.
pub fn recommend(
    histories: &SparseBinaryMatrix,
    weights: &SparseWeights,
    n: usize,
    exclude_seen: bool,
) -> Vec<Vec<u32>> {

    let transposed = weights.transpose();

    histories.iter()
        .map(|history| {
            recommend_for_user(history, &transposed, n, exclude_seen)
                .into_iter()
                .map(|scored_item| scored_item.item)
                .collect()
        })
        .collect()
}


#[cfg(test)]
mod tests {

    use super::{recommend, recommend_for_user};
    use similarity::SparseWeights;

    fn weights() -> SparseWeights {
        // W[i][l]: how much knowing item l speaks for item i
        SparseWeights::from_rows(4, vec![
            vec![(1, 0.5), (2, 0.1)],
            vec![(0, 0.5), (3, 0.2)],
            vec![(0, 0.1), (1, 0.4)],
            vec![(1, 0.2), (2, -0.3)],
        ])
    }

    #[test]
    fn aggregates_weights_over_history() {
        let transposed = weights().transpose();

        let recommended = recommend_for_user(&[1, 2], &transposed, 3, true);

        // item 0: 0.5 + 0.1, item 3: 0.2 - 0.3
        assert_eq!(recommended.len(), 2);
        assert_eq!(recommended[0].item, 0);
        assert!((recommended[0].score - 0.6).abs() < 1e-12);
        assert_eq!(recommended[1].item, 3);
        assert!((recommended[1].score + 0.1).abs() < 1e-12);
    }

    #[test]
    fn seen_items_can_be_kept() {
        let transposed = weights().transpose();

        let recommended = recommend_for_user(&[1], &transposed, 2, false);
        let items: Vec<u32> = recommended.iter().map(|scored_item| scored_item.item).collect();

        assert_eq!(items, vec![0, 2]);
    }

    #[test]
    fn list_length_beyond_the_catalog() {
        let transposed = weights().transpose();

        let recommended = recommend_for_user(&[1], &transposed, usize::max_value(), true);
        let items: Vec<u32> = recommended.iter().map(|scored_item| scored_item.item).collect();

        assert_eq!(items, vec![0, 2, 3]);
    }

    #[test]
    fn recommendations_for_all_users() {
        let histories = vec![vec![0], vec![1, 2], vec![]];

        let recommendations = recommend(&histories, &weights(), 1, true);

        assert_eq!(recommendations, vec![vec![1], vec![0], vec![]]);
    }
}
