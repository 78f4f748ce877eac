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

use fnv::FnvHashMap;

use errors::TrainingError;
use types::SparseBinaryMatrix;

/// Binarized view of a weighted user-item interaction matrix. For every user, we keep the
/// ascending list of items whose (summed) feedback reaches the positivity threshold. The index is
/// built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMask {
    positives: SparseBinaryMatrix,
    num_items: usize,
    num_positives: usize,
}

impl InteractionMask {

    /// Builds the mask from `(user, item, value)` triples. Repeated pairs are summed before the
    /// threshold is applied, so negative feedback can cancel out earlier positive feedback.
    pub fn from_triples<I>(
        interactions: I,
        num_users: usize,
        num_items: usize,
        positive_threshold: f64,
    ) -> Result<Self, TrainingError>
        where I: IntoIterator<Item=(u32, u32, f64)> {

        let mut values: Vec<FnvHashMap<u32, f64>> =
            vec![FnvHashMap::with_capacity_and_hasher(0, Default::default()); num_users];

        for (user, item, value) in interactions {
            check_bounds(user, item, num_users, num_items)?;
            *values[user as usize].entry(item).or_insert(0.0) += value;
        }

        let positives: SparseBinaryMatrix = values.into_iter()
            .map(|row| {
                let mut items: Vec<u32> = row.into_iter()
                    .filter(|&(_, value)| value >= positive_threshold)
                    .map(|(item, _)| item)
                    .collect();
                items.sort_unstable();
                items
            })
            .collect();

        Ok(InteractionMask::assemble(positives, num_items))
    }

    /// Builds the mask from already binarized histories, one list of items per user.
    pub fn from_histories(
        histories: SparseBinaryMatrix,
        num_items: usize,
    ) -> Result<Self, TrainingError> {

        let num_users = histories.len();
        let mut positives = histories;

        for (user, items) in positives.iter_mut().enumerate() {
            for &item in items.iter() {
                check_bounds(user as u32, item, num_users, num_items)?;
            }
            items.sort_unstable();
            items.dedup();
        }

        Ok(InteractionMask::assemble(positives, num_items))
    }

    fn assemble(positives: SparseBinaryMatrix, num_items: usize) -> Self {
        let num_positives = positives.iter().map(|items| items.len()).sum();
        InteractionMask { positives, num_items, num_positives }
    }

    pub fn num_users(&self) -> usize {
        self.positives.len()
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Number of positive user-item pairs.
    pub fn num_positives(&self) -> usize {
        self.num_positives
    }

    pub fn positives(&self, user: u32) -> &[u32] {
        &self.positives[user as usize]
    }

    pub fn is_positive(&self, user: u32, item: u32) -> bool {
        self.positives[user as usize].binary_search(&item).is_ok()
    }

    pub fn users_with_positives(&self) -> Vec<u32> {
        self.positives.iter()
            .enumerate()
            .filter(|&(_, items)| !items.is_empty())
            .map(|(user, _)| user as u32)
            .collect()
    }

    pub fn histories(&self) -> &SparseBinaryMatrix {
        &self.positives
    }
}

fn check_bounds(
    user: u32,
    item: u32,
    num_users: usize,
    num_items: usize,
) -> Result<(), TrainingError> {
    if user as usize >= num_users || item as usize >= num_items {
        Err(TrainingError::InvalidInteraction { user, item })
    } else {
        Ok(())
    }
}


#[cfg(test)]
mod tests {

    use super::InteractionMask;
    use errors::TrainingError;

    #[test]
    fn threshold_binarizes() {
        let interactions = vec![
            (0, 0, 5.0), (0, 1, 3.0), (0, 2, 4.0),
            (1, 1, 4.5), (1, 3, -1.0),
            (2, 3, 1.0),
        ];

        let mask = InteractionMask::from_triples(interactions, 3, 4, 4.0).unwrap();

        assert_eq!(mask.positives(0), &[0, 2]);
        assert_eq!(mask.positives(1), &[1]);
        assert!(mask.positives(2).is_empty());
        assert_eq!(mask.num_positives(), 3);
        assert_eq!(mask.users_with_positives(), vec![0, 1]);

        assert!(mask.is_positive(0, 2));
        assert!(!mask.is_positive(0, 1));
    }

    #[test]
    fn repeated_feedback_is_summed() {
        let interactions = vec![(0, 1, 3.0), (0, 1, 2.0), (0, 2, 5.0), (0, 2, -3.0)];

        let mask = InteractionMask::from_triples(interactions, 1, 3, 4.0).unwrap();

        assert_eq!(mask.positives(0), &[1]);
    }

    #[test]
    fn out_of_range_interactions_fail() {
        match InteractionMask::from_triples(vec![(0, 7, 5.0)], 1, 3, 1.0) {
            Err(TrainingError::InvalidInteraction { user, item }) => {
                assert_eq!((user, item), (0, 7));
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn histories_are_sorted_and_deduplicated() {
        let mask = InteractionMask::from_histories(vec![vec![3, 1, 3], vec![]], 4).unwrap();

        assert_eq!(mask.positives(0), &[1, 3]);
        assert_eq!(mask.num_positives(), 2);
        assert_eq!(mask.num_users(), 2);
        assert_eq!(mask.num_items(), 4);
    }
}
