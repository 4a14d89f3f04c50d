//! Logistic-regression baseline classifier.
//!
//! Weighted full-batch gradient descent on z-scored features. Kept alongside
//! the boosted model as the comparison fit; the trainer keeps whichever
//! validates better.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::ml::{sigmoid, ProbabilisticClassifier};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    pub learning_rate: f64,
    pub max_iterations: usize,
    /// L2 penalty on the coefficients
    pub l2: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iterations: 500,
            l2: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticBaseline {
    params: LogisticParams,
    coefficients: Vec<f64>,
    intercept: f64,
    /// Standardization constants captured at fit time
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl LogisticBaseline {
    pub fn fit(x: &[Vec<f64>], y: &[f64], sample_weight: &[f64], params: LogisticParams) -> Result<Self> {
        if x.is_empty() {
            anyhow::bail!("cannot fit on an empty dataset");
        }
        if x.len() != y.len() || x.len() != sample_weight.len() {
            anyhow::bail!(
                "row/label/weight count mismatch: {} rows, {} labels, {} weights",
                x.len(),
                y.len(),
                sample_weight.len()
            );
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            anyhow::bail!("all rows must have {} features", n_features);
        }

        let n = x.len() as f64;
        let mut means = vec![0.0; n_features];
        for row in x {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut stds = vec![0.0; n_features];
        for row in x {
            for j in 0..n_features {
                stds[j] += (row[j] - means[j]).powi(2) / n;
            }
        }
        for s in &mut stds {
            *s = s.sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        let z: Vec<Vec<f64>> = x
            .iter()
            .map(|row| {
                row.iter()
                    .zip(means.iter().zip(&stds))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect();

        let weight_sum: f64 = sample_weight.iter().sum();
        let mut coefficients = vec![0.0; n_features];
        let mut intercept = 0.0;

        for _ in 0..params.max_iterations {
            let mut coef_gradients = vec![0.0; n_features];
            let mut intercept_gradient = 0.0;

            for (i, row) in z.iter().enumerate() {
                let margin: f64 = row
                    .iter()
                    .zip(&coefficients)
                    .map(|(v, c)| v * c)
                    .sum::<f64>()
                    + intercept;
                let error = sample_weight[i] * (sigmoid(margin) - y[i]);

                for (g, v) in coef_gradients.iter_mut().zip(row) {
                    *g += error * v / weight_sum;
                }
                intercept_gradient += error / weight_sum;
            }

            for j in 0..n_features {
                coefficients[j] -=
                    params.learning_rate * (coef_gradients[j] + params.l2 * coefficients[j]);
            }
            intercept -= params.learning_rate * intercept_gradient;
        }

        Ok(Self {
            params,
            coefficients,
            intercept,
            means,
            stds,
        })
    }

    /// A degenerate model that always returns `probability`: the class prior
    /// with no feature signal. Useful as a stand-in when exercising the
    /// decision procedure with a known probability.
    pub fn prior(n_features: usize, probability: f64) -> Self {
        let p = probability.clamp(1e-6, 1.0 - 1e-6);
        Self {
            params: LogisticParams::default(),
            coefficients: vec![0.0; n_features],
            intercept: (p / (1.0 - p)).ln(),
            means: vec![0.0; n_features],
            stds: vec![1.0; n_features],
        }
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

impl ProbabilisticClassifier for LogisticBaseline {
    fn predict_proba(&self, features: &[f64]) -> f64 {
        let margin: f64 = features
            .iter()
            .zip(self.means.iter().zip(&self.stds))
            .zip(&self.coefficients)
            .map(|((v, (m, s)), c)| (v - m) / s * c)
            .sum::<f64>()
            + self.intercept;
        sigmoid(margin)
    }

    fn feature_importances(&self) -> Vec<f64> {
        let total: f64 = self.coefficients.iter().map(|c| c.abs()).sum();
        if total <= 0.0 {
            return vec![1.0 / self.coefficients.len() as f64; self.coefficients.len()];
        }
        self.coefficients.iter().map(|c| c.abs() / total).collect()
    }

    fn kind(&self) -> &'static str {
        "logistic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_dataset() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..25 {
            let jitter = i as f64 * 0.02;
            x.push(vec![-2.0 - jitter, 1.0]);
            y.push(0.0);
            x.push(vec![2.0 + jitter, 1.0]);
            y.push(1.0);
        }
        (x, y)
    }

    #[test]
    fn test_learns_separable_data() {
        let (x, y) = separable_dataset();
        let w = vec![1.0; x.len()];
        let model = LogisticBaseline::fit(&x, &y, &w, LogisticParams::default()).unwrap();

        assert!(model.predict_proba(&[-2.5, 1.0]) < 0.3);
        assert!(model.predict_proba(&[2.5, 1.0]) > 0.7);
    }

    #[test]
    fn test_importances_track_signal_feature() {
        let (x, y) = separable_dataset();
        let w = vec![1.0; x.len()];
        let model = LogisticBaseline::fit(&x, &y, &w, LogisticParams::default()).unwrap();

        let importances = model.feature_importances();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_prior_ignores_features() {
        let model = LogisticBaseline::prior(4, 0.37);
        let a = model.predict_proba(&[0.0, 0.0, 0.0, 0.0]);
        let b = model.predict_proba(&[100.0, -3.0, 7.0, 0.5]);
        assert!((a - 0.37).abs() < 1e-9);
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let x = vec![vec![1.0], vec![2.0]];
        assert!(LogisticBaseline::fit(&x, &[0.0], &[1.0, 1.0], LogisticParams::default()).is_err());
        assert!(LogisticBaseline::fit(&[], &[], &[], LogisticParams::default()).is_err());
    }
}
