//! Project species filtering
//!
//! The project's included-species list masks classes out of the softmax
//! vector; surviving probabilities are renormalized to sum to 1 before
//! picking the top-1. If the configuration masks every class, the unfiltered
//! top-1 is used and a warning logged, so a misconfigured project degrades
//! instead of silencing the pipeline.

use crate::species::SPECIES;
use std::collections::BTreeMap;
use tracing::warn;

/// Probabilities below this are dropped from the persisted vector
pub const RAW_PREDICTION_FLOOR: f64 = 0.005;

/// The filtered top-1 outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Top1 {
    pub species: String,
    pub confidence: f64,
    /// True when every class was masked and the unfiltered argmax was used
    pub fallback_used: bool,
}

/// Apply the species filter to a probability vector aligned with
/// [`SPECIES`]. `included` of `None` permits every class.
pub fn filtered_top1(probabilities: &[f64], included: Option<&[String]>) -> Option<Top1> {
    if probabilities.len() != SPECIES.len() {
        warn!(
            got = probabilities.len(),
            expected = SPECIES.len(),
            "probability vector does not match vocabulary"
        );
        return None;
    }

    let is_included = |species: &str| match included {
        None => true,
        Some(list) => list.iter().any(|s| s == species),
    };

    let retained_sum: f64 = SPECIES
        .iter()
        .zip(probabilities)
        .filter(|(species, _)| is_included(species))
        .map(|(_, p)| *p)
        .sum();

    if retained_sum > 0.0 {
        let (species, probability) = SPECIES
            .iter()
            .zip(probabilities)
            .filter(|(species, _)| is_included(species))
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
        return Some(Top1 {
            species: (*species).to_string(),
            confidence: probability / retained_sum,
            fallback_used: false,
        });
    }

    // Every class masked: configuration error, fall back to the raw argmax.
    warn!("species filter masked every class, falling back to unfiltered top-1");
    let (species, probability) = SPECIES
        .iter()
        .zip(probabilities)
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    Some(Top1 {
        species: (*species).to_string(),
        confidence: *probability,
        fallback_used: true,
    })
}

/// The probability vector as persisted: classes above the floor, keyed by
/// species name. The chosen top-1 is always retained even below the floor.
pub fn raw_predictions(probabilities: &[f64], top1_species: &str) -> BTreeMap<String, f64> {
    SPECIES
        .iter()
        .zip(probabilities)
        .filter(|(species, p)| **p > RAW_PREDICTION_FLOOR || **species == top1_species)
        .map(|(species, p)| ((*species).to_string(), *p))
        .collect()
}

/// Top-1 over a stored prediction map with an exclusion list (reprocess
/// path). Returns `None` when nothing survives the filter.
pub fn top1_from_stored(
    predictions: &BTreeMap<String, f64>,
    excluded: &[String],
) -> Option<(String, f64)> {
    predictions
        .iter()
        .filter(|(species, _)| !excluded.iter().any(|e| e == *species))
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(species, confidence)| (species.clone(), *confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_with(pairs: &[(&str, f64)]) -> Vec<f64> {
        let mut probabilities = vec![0.0; SPECIES.len()];
        for (species, p) in pairs {
            let index = SPECIES
                .iter()
                .position(|s| s == species)
                .unwrap_or_else(|| panic!("unknown species {species}"));
            probabilities[index] = *p;
        }
        probabilities
    }

    #[test]
    fn test_unfiltered_top1_is_argmax() {
        let probabilities = vector_with(&[("roe_deer", 0.9), ("fox", 0.05), ("badger", 0.05)]);
        let top1 = filtered_top1(&probabilities, None).expect("top1");
        assert_eq!(top1.species, "roe_deer");
        assert!((top1.confidence - 0.9).abs() < 1e-9);
        assert!(!top1.fallback_used);
    }

    #[test]
    fn test_filter_masks_and_renormalizes() {
        // Raw top-1 roe_deer is masked; fox wins among {fox, badger} and its
        // probability is renormalized over the retained mass.
        let probabilities = vector_with(&[("roe_deer", 0.9), ("fox", 0.05), ("badger", 0.03)]);
        let included = vec!["fox".to_string(), "badger".to_string()];
        let top1 = filtered_top1(&probabilities, Some(&included)).expect("top1");
        assert_eq!(top1.species, "fox");
        assert!((top1.confidence - 0.05 / 0.08).abs() < 1e-9);
        assert!(!top1.fallback_used);
    }

    #[test]
    fn test_all_masked_falls_back_to_unfiltered() {
        let probabilities = vector_with(&[("roe_deer", 0.9), ("fox", 0.1)]);
        let included = vec!["wolf".to_string()];
        let top1 = filtered_top1(&probabilities, Some(&included)).expect("top1");
        assert_eq!(top1.species, "roe_deer");
        assert!((top1.confidence - 0.9).abs() < 1e-9);
        assert!(top1.fallback_used);
    }

    #[test]
    fn test_wrong_vector_length_is_rejected() {
        assert!(filtered_top1(&[0.5, 0.5], None).is_none());
    }

    #[test]
    fn test_raw_predictions_keep_floor_and_top1() {
        let probabilities = vector_with(&[("roe_deer", 0.98), ("fox", 0.004), ("badger", 0.016)]);
        let raw = raw_predictions(&probabilities, "fox");
        // fox is below the floor but retained as the chosen top-1.
        assert!(raw.contains_key("fox"));
        assert!(raw.contains_key("roe_deer"));
        assert!(raw.contains_key("badger"));
        // zero-probability classes are not persisted.
        assert!(!raw.contains_key("wolf"));
    }

    #[test]
    fn test_top1_from_stored_respects_exclusions() {
        let mut predictions = BTreeMap::new();
        predictions.insert("roe_deer".to_string(), 0.9);
        predictions.insert("fox".to_string(), 0.1);

        let top1 = top1_from_stored(&predictions, &["roe_deer".to_string()]);
        assert_eq!(top1, Some(("fox".to_string(), 0.1)));

        let none = top1_from_stored(
            &predictions,
            &["roe_deer".to_string(), "fox".to_string()],
        );
        assert!(none.is_none());
    }
}
