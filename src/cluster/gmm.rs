//! Gaussian Mixture Model clustering.
//!
//! GMM provides **soft clustering** with probabilistic assignments,
//! allowing items to belong to multiple clusters with different probabilities.
//!
//! # The Probabilistic Model
//!
//! GMM assumes data is generated from K Gaussian distributions:
//!
//! ```text
//! P(x) = Σₖ πₖ × N(x | μₖ, Σₖ)
//! ```
//!
//! Where:
//! - πₖ = mixing weight (probability of cluster k)
//! - μₖ = mean of cluster k
//! - Σₖ = covariance of cluster k (diagonal here)
//!
//! # The EM Algorithm
//!
//! **E-step**: Compute "responsibilities" (soft assignments):
//! ```text
//! γₙₖ = P(z=k | xₙ) = πₖ × N(xₙ | μₖ, Σₖ) / Σⱼ πⱼ × N(xₙ | μⱼ, Σⱼ)
//! ```
//!
//! **M-step**: Update parameters using responsibilities:
//! - μₖ = Σₙ γₙₖ xₙ / Σₙ γₙₖ  (weighted mean)
//! - πₖ = (1/N) Σₙ γₙₖ  (fraction of responsibility)
//!
//! Responsibilities are seeded from a k-means partition, so a fit is fully
//! determined by the seed.
//!
//! # Model Selection
//!
//! [`GmmFit::bic`] scores a fit with the Bayesian information criterion:
//!
//! ```text
//! BIC = -2 ln L + p ln N,   p = 2kd + (k - 1)
//! ```
//!
//! Lower is better. Sweeping k and taking the argmin is how the number of
//! clusters is picked before soft assignment.
//!
//! # Failure Modes
//!
//! - **Local optima**: EM converges to local maxima; initialization matters
//! - **Singular covariance**: Small clusters can collapse; we add regularization
//! - **Wrong K**: Too many components overfit; too few underfit

use super::kmeans::Kmeans;
use super::to_matrix;
use super::traits::{Clustering, SoftClustering};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};

/// Gaussian Mixture Model clustering.
#[derive(Debug, Clone)]
pub struct Gmm {
    /// Number of components (clusters).
    n_components: usize,
    /// Maximum EM iterations.
    max_iter: usize,
    /// Convergence tolerance on the per-sample log-likelihood gain.
    tol: f64,
    /// Random seed.
    seed: Option<u64>,
    /// Regularization for covariance.
    reg_covar: f64,
}

/// Result of fitting a [`Gmm`].
#[derive(Debug, Clone)]
pub struct GmmFit {
    /// `responsibilities[i][k]` = P(point i belongs to component k).
    pub responsibilities: Vec<Vec<f64>>,
    /// Total log-likelihood of the data under the fitted mixture.
    pub log_likelihood: f64,
    /// EM iterations performed.
    pub n_iter: usize,
    /// Whether the tolerance was reached before `max_iter`.
    pub converged: bool,
    n_samples: usize,
    n_features: usize,
    n_components: usize,
}

impl GmmFit {
    /// Number of free parameters of a diagonal-covariance mixture.
    pub fn n_parameters(&self) -> usize {
        let k = self.n_components;
        let d = self.n_features;
        2 * k * d + k.saturating_sub(1)
    }

    /// Bayesian information criterion. Lower is better.
    pub fn bic(&self) -> f64 {
        -2.0 * self.log_likelihood + self.n_parameters() as f64 * (self.n_samples as f64).ln()
    }

    /// Number of components in the fit.
    pub fn n_components(&self) -> usize {
        self.n_components
    }
}

impl Gmm {
    /// Create a new GMM with default settings (8 components).
    pub fn new() -> Self {
        Self {
            n_components: 8,
            max_iter: 100,
            tol: 1e-3,
            seed: None,
            reg_covar: 1e-6,
        }
    }

    /// Set number of components.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set covariance regularization.
    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    /// Compute log-likelihood of a point under a diagonal Gaussian.
    fn log_gaussian(
        point: &ndarray::ArrayView1<'_, f32>,
        mean: &ndarray::ArrayView1<'_, f64>,
        var: &ndarray::ArrayView1<'_, f64>,
    ) -> f64 {
        let d = point.len() as f64;
        let mut log_prob = -0.5 * d * (2.0 * std::f64::consts::PI).ln();

        for i in 0..point.len() {
            let diff = point[i] as f64 - mean[i];
            log_prob -= 0.5 * var[i].ln();
            log_prob -= 0.5 * diff * diff / var[i];
        }

        log_prob
    }

    /// Log-sum-exp for numerical stability.
    fn logsumexp(values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NEG_INFINITY;
        }
        let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max_val.is_infinite() {
            return max_val;
        }
        max_val
            + values
                .iter()
                .map(|&v| (v - max_val).exp())
                .sum::<f64>()
                .ln()
    }

    /// M-step: weights, means and diagonal variances from responsibilities.
    fn m_step(
        &self,
        data: &Array2<f32>,
        resp: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>, Array2<f64>) {
        let (n, d) = data.dim();
        let k = resp.ncols();

        // sklearn-style floor keeps empty components finite.
        let nk: Vec<f64> = (0..k)
            .map(|c| resp.column(c).sum() + 10.0 * f64::EPSILON)
            .collect();

        let weights = Array1::from_iter(nk.iter().map(|&v| v / n as f64));

        let mut means = Array2::zeros((k, d));
        for c in 0..k {
            for i in 0..n {
                let r = resp[[i, c]];
                if r == 0.0 {
                    continue;
                }
                for j in 0..d {
                    means[[c, j]] += r * data[[i, j]] as f64;
                }
            }
            for j in 0..d {
                means[[c, j]] /= nk[c];
            }
        }

        let mut variances = Array2::zeros((k, d));
        for c in 0..k {
            for i in 0..n {
                let r = resp[[i, c]];
                if r == 0.0 {
                    continue;
                }
                for j in 0..d {
                    let diff = data[[i, j]] as f64 - means[[c, j]];
                    variances[[c, j]] += r * diff * diff;
                }
            }
            for j in 0..d {
                variances[[c, j]] = variances[[c, j]] / nk[c] + self.reg_covar;
            }
        }

        (weights, means, variances)
    }

    /// E-step: responsibilities and total log-likelihood.
    fn e_step(
        data: &Array2<f32>,
        weights: &Array1<f64>,
        means: &Array2<f64>,
        variances: &Array2<f64>,
        resp: &mut Array2<f64>,
    ) -> f64 {
        let n = data.nrows();
        let k = weights.len();
        let mut log_likelihood = 0.0;
        let mut log_probs = vec![0.0; k];

        for i in 0..n {
            let point = data.row(i);
            for c in 0..k {
                log_probs[c] = weights[c].ln()
                    + Self::log_gaussian(&point, &means.row(c), &variances.row(c));
            }

            let log_sum = Self::logsumexp(&log_probs);
            log_likelihood += log_sum;

            for c in 0..k {
                resp[[i, c]] = (log_probs[c] - log_sum).exp();
            }
        }

        log_likelihood
    }

    /// Fit the mixture and return responsibilities plus fit statistics.
    pub fn fit(&self, data: &[Vec<f32>]) -> Result<GmmFit> {
        if self.n_components == 0 {
            return Err(Error::invalid("n_components", "must be > 0"));
        }

        let data_arr = to_matrix(data)?;
        let (n, d) = data_arr.dim();
        let k = self.n_components.min(n);

        // Seed responsibilities from a hard k-means partition.
        let mut kmeans = Kmeans::new(k).with_max_iter(self.max_iter);
        if let Some(seed) = self.seed {
            kmeans = kmeans.with_seed(seed);
        }
        let labels = kmeans.fit(data)?.labels;

        let mut resp = Array2::zeros((n, k));
        for (i, &label) in labels.iter().enumerate() {
            resp[[i, label]] = 1.0;
        }

        let mut log_likelihood = f64::NEG_INFINITY;
        let mut converged = false;
        let mut n_iter = 0;

        for iter in 0..self.max_iter.max(1) {
            n_iter = iter + 1;
            let (weights, means, variances) = self.m_step(&data_arr, &resp);
            let ll = Self::e_step(&data_arr, &weights, &means, &variances, &mut resp);

            let gain = (ll - log_likelihood) / n as f64;
            log_likelihood = ll;
            if gain.abs() < self.tol {
                converged = true;
                break;
            }
        }

        if !log_likelihood.is_finite() {
            return Err(Error::Other(format!(
                "gmm log-likelihood is not finite (k={k}, n={n}, d={d})"
            )));
        }

        Ok(GmmFit {
            responsibilities: (0..n)
                .map(|i| (0..k).map(|c| resp[[i, c]]).collect())
                .collect(),
            log_likelihood,
            n_iter,
            converged,
            n_samples: n,
            n_features: d,
            n_components: k,
        })
    }
}

impl Default for Gmm {
    fn default() -> Self {
        Self::new()
    }
}

impl Clustering for Gmm {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        let probs = self.fit_predict_proba(data)?;

        // Hard assignment: argmax
        Ok(probs
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            })
            .collect())
    }

    fn n_clusters(&self) -> usize {
        self.n_components
    }
}

impl SoftClustering for Gmm {
    fn fit_predict_proba(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
        Ok(self.fit(data)?.responsibilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![0.05, 0.12],
            vec![0.12, 0.02],
            vec![10.0, 10.0],
            vec![10.1, 10.1],
            vec![10.02, 10.13],
            vec![10.11, 9.96],
        ]
    }

    #[test]
    fn test_gmm_basic() {
        let data = two_blobs();

        let gmm = Gmm::new().with_n_components(2).with_seed(42);
        let labels = gmm.fit_predict(&data).unwrap();

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn test_gmm_soft_assignments() {
        let data = vec![
            vec![0.0, 0.0],
            vec![5.0, 5.0], // Point between clusters
            vec![10.0, 10.0],
        ];

        let gmm = Gmm::new().with_n_components(2).with_seed(42);
        let probs = gmm.fit_predict_proba(&data).unwrap();

        // Each row should sum to ~1
        for row in &probs {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_gmm_bic_prefers_two_components_on_two_blobs() {
        let data = two_blobs();
        let one = Gmm::new().with_n_components(1).with_seed(42).fit(&data).unwrap();
        let two = Gmm::new().with_n_components(2).with_seed(42).fit(&data).unwrap();
        assert!(two.bic() < one.bic(), "bic(2)={} bic(1)={}", two.bic(), one.bic());
    }

    #[test]
    fn test_gmm_parameter_count() {
        let data = two_blobs();
        let fit = Gmm::new().with_n_components(2).with_seed(7).fit(&data).unwrap();
        // 2 means * 2 dims + 2 variances * 2 dims + 1 free weight
        assert_eq!(fit.n_parameters(), 9);
        assert_eq!(fit.n_components(), 2);
    }

    #[test]
    fn test_gmm_deterministic_with_seed() {
        let data = two_blobs();
        let a = Gmm::new().with_n_components(2).with_seed(42).fit(&data).unwrap();
        let b = Gmm::new().with_n_components(2).with_seed(42).fit(&data).unwrap();
        assert_eq!(a.responsibilities, b.responsibilities);
        assert_eq!(a.log_likelihood, b.log_likelihood);
    }

    #[test]
    fn test_gmm_components_capped_by_points() {
        let data = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let fit = Gmm::new().with_n_components(5).with_seed(1).fit(&data).unwrap();
        assert_eq!(fit.n_components(), 2);
    }

    #[test]
    fn test_gmm_empty_input_error() {
        let data: Vec<Vec<f32>> = vec![];
        assert!(Gmm::new().with_n_components(2).fit(&data).is_err());
    }
}
