//! Loss dictionaries and their weighted combination.

use std::collections::BTreeMap;

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use crate::{
    data::Target,
    error::{EngineError, EngineResult},
};

/// Name of the classification-error entry every criterion reports.
pub const CLASS_ERROR: &str = "class_error";

/// Loss-term name → scalar tensor of shape `[1]` for one batch.
pub type LossDict<B> = BTreeMap<String, Tensor<B, 1>>;

/// Loss-term name → multiplier applied when terms are combined.
pub type WeightDict = BTreeMap<String, f64>;

/// The loss criterion of a detector.
///
/// `O` is the model's raw output type.
pub trait Criterion<B: Backend, O> {
    /// Weights of the terms that contribute to the optimised loss.
    fn weight_dict(&self) -> &WeightDict;

    /// Compute every loss term, plus [`CLASS_ERROR`], for one batch.
    fn forward(&self, outputs: &O, targets: &[Target<B>]) -> LossDict<B>;
}

/// Sum of `value * weight` over the terms present in both maps.
///
/// Returns `None` when no term has a weight.
pub fn weighted_loss<B: Backend>(losses: &LossDict<B>, weights: &WeightDict) -> Option<Tensor<B, 1>> {
    losses
        .iter()
        .filter_map(|(name, value)| {
            weights
                .get(name)
                .map(|weight| value.clone().mul_scalar(*weight))
        })
        .reduce(|acc, term| acc + term)
}

/// Read every term back to the host. The returned values are detached from
/// the autodiff graph.
pub fn loss_values<B: Backend>(losses: &LossDict<B>) -> BTreeMap<String, f64> {
    losses
        .iter()
        .map(|(name, value)| (name.clone(), value.clone().into_scalar().elem::<f64>()))
        .collect()
}

/// The logged view of a (reduced) loss dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct LossSummary {
    /// Weighted terms, keyed by term name.
    pub scaled: BTreeMap<String, f64>,
    /// Every term unweighted, keyed `<name>_unscaled`.
    pub unscaled: BTreeMap<String, f64>,
    /// Sum of `scaled`.
    pub total: f64,
    pub class_error: Option<f64>,
}

impl LossSummary {
    pub fn new(values: &BTreeMap<String, f64>, weights: &WeightDict) -> Self {
        let scaled: BTreeMap<String, f64> = values
            .iter()
            .filter_map(|(name, value)| weights.get(name).map(|w| (name.clone(), value * w)))
            .collect();
        let unscaled = values
            .iter()
            .map(|(name, value)| (format!("{name}_unscaled"), *value))
            .collect();
        let total = scaled.values().sum();

        Self {
            scaled,
            unscaled,
            total,
            class_error: values.get(CLASS_ERROR).copied(),
        }
    }

    pub fn class_error(&self) -> EngineResult<f64> {
        self.class_error.ok_or_else(|| EngineError::MissingLossTerm {
            name: CLASS_ERROR.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray;

    fn losses(values: &[(&str, f32)]) -> LossDict<TestBackend> {
        let device = Default::default();
        values
            .iter()
            .map(|(name, v)| (name.to_string(), Tensor::from_floats([*v], &device)))
            .collect()
    }

    fn weights(values: &[(&str, f64)]) -> WeightDict {
        values.iter().map(|(n, w)| (n.to_string(), *w)).collect()
    }

    #[test]
    fn only_weighted_terms_contribute() {
        let losses = losses(&[("loss_ce", 2.0), ("loss_bbox", 0.5), (CLASS_ERROR, 50.0)]);
        let weights = weights(&[("loss_ce", 1.0), ("loss_bbox", 5.0), ("loss_giou", 2.0)]);

        let total = weighted_loss(&losses, &weights).unwrap();
        assert_relative_eq!(total.into_scalar(), 4.5);
    }

    #[test]
    fn zero_weights_give_zero_loss() {
        let losses = losses(&[("loss_ce", 3.0), ("loss_bbox", 7.0)]);
        let weights = weights(&[("loss_ce", 0.0), ("loss_bbox", 0.0)]);

        let total = weighted_loss(&losses, &weights).unwrap();
        assert_eq!(total.into_scalar(), 0.0);
    }

    #[test]
    fn no_overlap_means_nothing_to_optimise() {
        let losses = losses(&[("loss_ce", 3.0)]);
        assert!(weighted_loss(&losses, &weights(&[("loss_mask", 1.0)])).is_none());
    }

    #[test]
    fn summary_splits_scaled_and_unscaled_terms() {
        let values = loss_values(&losses(&[("loss_ce", 2.0), (CLASS_ERROR, 25.0)]));
        let summary = LossSummary::new(&values, &weights(&[("loss_ce", 0.5)]));

        assert_eq!(summary.scaled.len(), 1);
        assert_relative_eq!(summary.scaled["loss_ce"], 1.0);
        assert_relative_eq!(summary.unscaled["loss_ce_unscaled"], 2.0);
        assert_relative_eq!(summary.unscaled["class_error_unscaled"], 25.0);
        assert_relative_eq!(summary.total, 1.0);
        assert_relative_eq!(summary.class_error().unwrap(), 25.0);
    }

    #[test]
    fn missing_class_error_is_reported() {
        let values = loss_values(&losses(&[("loss_ce", 2.0)]));
        let summary = LossSummary::new(&values, &weights(&[("loss_ce", 1.0)]));

        assert!(matches!(
            summary.class_error(),
            Err(EngineError::MissingLossTerm { name }) if name == CLASS_ERROR
        ));
    }
}
