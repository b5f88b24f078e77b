//! Dataset statistics and class-imbalance weighting.

use plankton_core::{Error, Result};

/// Per-class sample counts for a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetStatistics {
    pub num_samples: usize,
    pub num_classes: usize,
    /// Count per class index, positionally aligned with class ids
    pub class_distribution: Vec<usize>,
}

impl DatasetStatistics {
    /// Count labels into `num_classes` bins.
    pub fn from_labels(labels: &[usize], num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(Error::Config("num_classes must be at least 1".to_string()));
        }

        let mut class_distribution = vec![0usize; num_classes];
        for &label in labels {
            let slot = class_distribution.get_mut(label).ok_or_else(|| {
                Error::Dataset(format!("label {label} is outside 0..{num_classes}"))
            })?;
            *slot += 1;
        }

        Ok(Self {
            num_samples: labels.len(),
            num_classes,
            class_distribution,
        })
    }

    /// Class indices with no samples
    pub fn absent_classes(&self) -> Vec<usize> {
        self.class_distribution
            .iter()
            .enumerate()
            .filter(|(_, &count)| count == 0)
            .map(|(class, _)| class)
            .collect()
    }

    /// Inverse-frequency weights normalised to sum to 1.
    ///
    /// `weight[c] = total / (num_classes * count[c])` before normalisation, so
    /// rarer classes get strictly larger weights. A class with no samples is
    /// a configuration error rather than an infinite weight.
    pub fn class_weights(&self) -> Result<Vec<f32>> {
        if let Some(&class) = self.absent_classes().first() {
            return Err(Error::Config(format!("class {class} absent from manifest")));
        }

        let total = self.num_samples as f64;
        let k = self.num_classes as f64;
        let raw: Vec<f64> = self
            .class_distribution
            .iter()
            .map(|&count| total / (k * count as f64))
            .collect();
        let sum: f64 = raw.iter().sum();

        Ok(raw.iter().map(|w| (w / sum) as f32).collect())
    }
}

/// Normalised inverse-frequency class weights for a label column.
pub fn class_weights(labels: &[usize], num_classes: usize) -> Result<Vec<f32>> {
    DatasetStatistics::from_labels(labels, num_classes)?.class_weights()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_one() {
        let labels = [0, 0, 0, 1, 1, 2];
        let weights = class_weights(&labels, 3).unwrap();
        assert_eq!(weights.len(), 3);
        let sum: f32 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rarer_class_gets_larger_weight() {
        let labels = [0, 0, 0, 1, 1, 2];
        let weights = class_weights(&labels, 3).unwrap();
        assert!(weights[2] > weights[1]);
        assert!(weights[1] > weights[0]);

        // 1/3 : 1/2 : 1 normalised
        let expected = [2.0 / 11.0, 3.0 / 11.0, 6.0 / 11.0];
        for (w, e) in weights.iter().zip(expected) {
            assert!((w - e).abs() < 1e-6);
        }
    }

    #[test]
    fn test_weights_follow_class_index_not_first_seen_order() {
        let labels = [2, 2, 2, 2, 0, 1, 1];
        let weights = class_weights(&labels, 3).unwrap();
        assert!(weights[0] > weights[1]);
        assert!(weights[1] > weights[2]);
    }

    #[test]
    fn test_balanced_weights_are_uniform() {
        let labels = [0, 1, 2, 3, 0, 1, 2, 3];
        let weights = class_weights(&labels, 4).unwrap();
        for w in weights {
            assert!((w - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_absent_class_is_config_error() {
        let labels = [0, 0, 2];
        let err = class_weights(&labels, 3).unwrap_err();
        match err {
            Error::Config(msg) => assert!(msg.contains("class 1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_label() {
        assert!(matches!(class_weights(&[0, 5], 3), Err(Error::Dataset(_))));
    }

    #[test]
    fn test_zero_classes() {
        assert!(matches!(class_weights(&[], 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_statistics_counts() {
        let stats = DatasetStatistics::from_labels(&[1, 1, 3], 4).unwrap();
        assert_eq!(stats.num_samples, 3);
        assert_eq!(stats.class_distribution, vec![0, 2, 0, 1]);
        assert_eq!(stats.absent_classes(), vec![0, 2]);
    }
}
