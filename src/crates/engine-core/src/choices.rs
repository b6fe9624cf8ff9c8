//! Answer choices for multiple-choice samples

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// One answer option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,

    /// Whether the option was judged correct, once known
    pub correct: Option<bool>,

    /// Index of this option in the sample's original ordering
    pub original_position: usize,
}

/// Ordered collection of [`Choice`]s
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Choices {
    items: Vec<Choice>,
}

impl Choices {
    /// Build from values in their original order.
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = values
            .into_iter()
            .enumerate()
            .map(|(original_position, value)| Choice {
                value: value.into(),
                correct: None,
                original_position,
            })
            .collect();
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Choice> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Choice> {
        self.items.iter()
    }

    /// Record correctness for the choice currently at `index`.
    pub fn mark(mut self, index: usize, correct: bool) -> Self {
        if let Some(choice) = self.items.get_mut(index) {
            choice.correct = Some(correct);
        }
        self
    }

    /// Permute the choices.
    ///
    /// `original_position` is not reassigned: it keeps the index the choice
    /// had at construction, so answers can be mapped back after any number
    /// of shuffles. A choice's current index is its place in the collection.
    /// The same seed always yields the same permutation; the generator is
    /// local to this call.
    pub fn shuffle(mut self, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.items.shuffle(&mut rng);
        self
    }
}

impl IntoIterator for Choices {
    type Item = Choice;
    type IntoIter = std::vec::IntoIter<Choice>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters() -> Choices {
        Choices::new(["a", "b", "c", "d", "e", "f"])
    }

    #[test]
    fn test_new_assigns_positions() {
        let choices = letters();
        assert_eq!(choices.len(), 6);
        for (i, choice) in choices.iter().enumerate() {
            assert_eq!(choice.original_position, i);
            assert!(choice.correct.is_none());
        }
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let first: Vec<String> = letters().shuffle(Some(7)).into_iter().map(|c| c.value).collect();
        let second: Vec<String> = letters().shuffle(Some(7)).into_iter().map(|c| c.value).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_shuffle_keeps_original_positions() {
        let shuffled = letters().shuffle(Some(42));
        let mut positions: Vec<usize> = shuffled.iter().map(|c| c.original_position).collect();

        for choice in shuffled.iter() {
            let expected = (choice.value.as_bytes()[0] - b'a') as usize;
            assert_eq!(choice.original_position, expected);
        }

        positions.sort_unstable();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_mark() {
        let choices = letters().mark(2, true).mark(99, false);
        assert_eq!(choices.get(2).unwrap().correct, Some(true));
        assert_eq!(choices.get(0).unwrap().correct, None);
    }
}
