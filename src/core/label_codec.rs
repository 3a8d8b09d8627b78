use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::error::CodecError;

/// Bidirectional mapping between item sets and indicator vectors
///
/// Column `i` of an indicator vector corresponds to `classes()[i]`. The
/// label space is sorted lexicographically, so fitting twice on the same
/// item sets gives the same column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCodec {
    classes: Vec<String>,
}

impl LabelCodec {
    /// Build the label space from every item set in the training corpus
    pub fn fit<'a, I>(item_sets: I) -> Self
    where
        I: IntoIterator<Item = &'a BTreeSet<String>>,
    {
        let classes: BTreeSet<String> = item_sets
            .into_iter()
            .flat_map(|items| items.iter().cloned())
            .collect();

        Self {
            classes: classes.into_iter().collect(),
        }
    }

    /// Indicator vector width
    pub fn width(&self) -> usize {
        self.classes.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Encode an item set; every item must belong to the label space
    pub fn transform(&self, items: &BTreeSet<String>) -> Result<Vec<u8>, CodecError> {
        let mut indicator = vec![0u8; self.width()];
        for item in items {
            let idx = self
                .classes
                .binary_search(item)
                .map_err(|_| CodecError::UnknownItem(item.clone()))?;
            indicator[idx] = 1;
        }
        Ok(indicator)
    }

    /// Decode an indicator vector back into item names
    ///
    /// An all-zero vector decodes to an empty set. A vector whose width
    /// differs from the label space is rejected, never truncated or padded.
    pub fn inverse_transform(&self, indicator: &[u8]) -> Result<BTreeSet<String>, CodecError> {
        if indicator.len() != self.width() {
            return Err(CodecError::WidthMismatch {
                expected: self.width(),
                actual: indicator.len(),
            });
        }

        Ok(indicator
            .iter()
            .zip(&self.classes)
            .filter(|(bit, _)| **bit != 0)
            .map(|(_, class)| class.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fit_is_sorted_and_deduplicated() {
        let sets = vec![set(&["towel", "hat"]), set(&["coat", "hat"])];
        let codec = LabelCodec::fit(&sets);

        assert_eq!(codec.classes(), ["coat", "hat", "towel"]);
    }

    #[test]
    fn test_fit_order_independent() {
        let a = vec![set(&["towel", "hat"]), set(&["coat"])];
        let b = vec![set(&["coat"]), set(&["hat", "towel"])];

        assert_eq!(LabelCodec::fit(&a), LabelCodec::fit(&b));
    }

    #[test]
    fn test_round_trip_over_training_sets() {
        let sets = vec![
            set(&["sunscreen", "towel"]),
            set(&["coat", "map"]),
            set(&["laptop"]),
        ];
        let codec = LabelCodec::fit(&sets);

        for items in &sets {
            let indicator = codec.transform(items).unwrap();
            assert_eq!(&codec.inverse_transform(&indicator).unwrap(), items);
        }
    }

    #[test]
    fn test_all_zero_decodes_to_empty_set() {
        let codec = LabelCodec::fit(&vec![set(&["coat", "map"])]);

        assert!(codec.inverse_transform(&[0, 0]).unwrap().is_empty());
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let codec = LabelCodec::fit(&vec![set(&["coat", "map"])]);

        assert_eq!(
            codec.inverse_transform(&[1, 0, 1]),
            Err(CodecError::WidthMismatch { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_unknown_item_is_rejected() {
        let codec = LabelCodec::fit(&vec![set(&["coat"])]);

        assert_eq!(
            codec.transform(&set(&["kite"])),
            Err(CodecError::UnknownItem("kite".to_string()))
        );
    }
}
