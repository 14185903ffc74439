//! Nonlinear dimensionality reduction before clustering.
//!
//! High-dimensional sentence embeddings make mixture models unstable: a
//! diagonal GMM in 1536 dimensions has thousands of free parameters per
//! component. Embeddings are therefore projected onto a small manifold
//! coordinate system first.
//!
//! # Algorithm
//!
//! ```text
//! 1. Pairwise distances under the chosen metric (cosine by default)
//! 2. k-nearest-neighbour graph with smooth weights:
//!        w_ij = exp(-max(0, d_ij - ρ_i) / σ_i)
//!    ρ_i = distance to the nearest neighbour,
//!    σ_i chosen so that Σ_j w_ij = log2(k)
//! 3. Fuzzy union symmetrization: W = A + Aᵀ - A ∘ Aᵀ
//! 4. Normalized Laplacian L_sym = I - D^{-1/2} W D^{-1/2}, with the trivial
//!    eigenvector q ∝ D^{1/2}·1 deflated: M = L_sym + 3·q qᵀ
//! 5. The dim smallest eigenpairs (λ, ψ) of M; coordinate = |1 - λ| · D^{-1/2} ψ
//! ```
//!
//! Steps 1-3 are the graph construction UMAP uses. Steps 4-5 are a
//! Laplacian eigenmap with diffusion-map weighting: smooth directions
//! (λ ≈ 0) keep full weight, noisy ones (λ ≈ 1) fade out. Deflating q
//! instead of skipping column 0 keeps the component indicators when the
//! kNN graph is disconnected, since they then share eigenvalue 0 with q.
//!
//! No stochastic layout optimization is run afterwards, so the output is a
//! pure function of the input.
//!
//! # Neighbourhood Size
//!
//! | Constructor | k |
//! |-------------|---|
//! | [`ManifoldReducer::global`] | `floor(sqrt(N - 1))` |
//! | [`ManifoldReducer::local`] | caller supplied |
//!
//! Either way k is clamped to `[1, N - 1]`. Small k keeps local structure;
//! larger k flattens toward global structure.
//!
//! # Limits
//!
//! The target dimension is capped at `N - 2`. With fewer than 3 points there
//! is no valid target dimension and [`ManifoldReducer::reduce`] returns an
//! error; callers skip reduction in that case.
//!
//! # References
//!
//! - Belkin, Niyogi (2003). "Laplacian Eigenmaps for Dimensionality Reduction"
//! - Coifman, Lafon (2006). "Diffusion Maps"
//! - McInnes, Healy, Melville (2018). "UMAP: Uniform Manifold Approximation and Projection"

use super::to_matrix;
use crate::error::{Error, Result};
use faer::{Mat, Side};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Distance used to build the neighbour graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `1 - cos(a, b)`. Zero-norm vectors are at distance 1 from everything.
    #[default]
    Cosine,
    /// `||a - b||₂`.
    Euclidean,
}

impl Metric {
    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            Metric::Cosine => {
                let mut dot = 0.0f64;
                let mut na = 0.0f64;
                let mut nb = 0.0f64;
                for (&x, &y) in a.iter().zip(b.iter()) {
                    dot += x as f64 * y as f64;
                    na += x as f64 * x as f64;
                    nb += y as f64 * y as f64;
                }
                if na == 0.0 || nb == 0.0 {
                    return 1.0;
                }
                (1.0 - dot / (na.sqrt() * nb.sqrt())).max(0.0)
            }
            Metric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(&x, &y)| (x as f64 - y as f64).powi(2))
                .sum::<f64>()
                .sqrt(),
        }
    }
}

/// Projects embeddings onto a low-dimensional manifold.
#[derive(Debug, Clone)]
pub struct ManifoldReducer {
    /// Requested output dimension (capped at `N - 2`).
    n_components: usize,
    /// Neighbour count; `None` means `floor(sqrt(N - 1))`.
    n_neighbors: Option<usize>,
    metric: Metric,
}

/// Largest absolute coordinate after rescaling.
const LAYOUT_SCALE: f64 = 10.0;

/// Bisection steps for each point's bandwidth.
const SIGMA_SEARCH_STEPS: usize = 64;

impl ManifoldReducer {
    /// Reducer with the neighbourhood derived from the number of points.
    pub fn global(n_components: usize) -> Self {
        Self {
            n_components,
            n_neighbors: None,
            metric: Metric::Cosine,
        }
    }

    /// Reducer with an explicit neighbour count.
    pub fn local(n_components: usize, n_neighbors: usize) -> Self {
        Self {
            n_components,
            n_neighbors: Some(n_neighbors),
            metric: Metric::Cosine,
        }
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Output dimension actually used for `n` points.
    pub fn effective_components(&self, n: usize) -> usize {
        self.n_components.min(n.saturating_sub(2))
    }

    /// Neighbour count actually used for `n` points.
    pub fn effective_neighbors(&self, n: usize) -> usize {
        let upper = n.saturating_sub(1).max(1);
        self.n_neighbors
            .unwrap_or_else(|| (n.saturating_sub(1) as f64).sqrt() as usize)
            .clamp(1, upper)
    }

    /// Reduce `data` (N × d) to N × `effective_components(N)`.
    pub fn reduce(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        // Validates shape.
        let _ = to_matrix(data)?;
        let n = data.len();

        let dim = self.effective_components(n);
        if dim < 1 {
            return Err(Error::invalid(
                "target_dim",
                format!(
                    "cannot reduce {n} points to {} dimensions (at most N - 2 = {} allowed)",
                    self.n_components,
                    n.saturating_sub(2)
                ),
            ));
        }
        let k = self.effective_neighbors(n);

        let distances = self.pairwise_distances(data);
        let weights = fuzzy_knn_graph(&distances, k);
        laplacian_eigenmap(&weights, dim)
    }

    fn pairwise_distances(&self, data: &[Vec<f32>]) -> Array2<f64> {
        let n = data.len();
        let metric = self.metric;

        #[cfg(feature = "parallel")]
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| metric.distance(&data[i], &data[j])).collect())
            .collect();

        #[cfg(not(feature = "parallel"))]
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| metric.distance(&data[i], &data[j])).collect())
            .collect();

        let mut out = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, d) in row.into_iter().enumerate() {
                out[[i, j]] = d;
            }
        }
        out
    }
}

/// Symmetric fuzzy kNN affinity matrix.
fn fuzzy_knn_graph(distances: &Array2<f64>, k: usize) -> Array2<f64> {
    let n = distances.nrows();
    let target = (k as f64).log2();
    let mut directed = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        let mut order: Vec<usize> = (0..n).filter(|&j| j != i).collect();
        order.sort_by(|&a, &b| {
            distances[[i, a]]
                .partial_cmp(&distances[[i, b]])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        order.truncate(k);

        let rho = order.first().map(|&j| distances[[i, j]]).unwrap_or(0.0);
        let gaps: Vec<f64> = order
            .iter()
            .map(|&j| (distances[[i, j]] - rho).max(0.0))
            .collect();
        let sigma = smooth_bandwidth(&gaps, target);

        for (&j, &gap) in order.iter().zip(gaps.iter()) {
            directed[[i, j]] = (-gap / sigma).exp();
        }
    }

    let mut sym = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let a = directed[[i, j]];
            let b = directed[[j, i]];
            sym[[i, j]] = a + b - a * b;
        }
    }
    sym
}

/// Bisection for σ with Σ exp(-gap/σ) = target.
fn smooth_bandwidth(gaps: &[f64], target: f64) -> f64 {
    if gaps.iter().all(|&g| g == 0.0) {
        return 1.0;
    }

    let mut lo = 0.0f64;
    let mut hi = f64::INFINITY;
    let mut mid = 1.0f64;

    for _ in 0..SIGMA_SEARCH_STEPS {
        let psum: f64 = gaps.iter().map(|&g| (-g / mid).exp()).sum();
        if (psum - target).abs() < 1e-5 {
            break;
        }
        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let mean_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
    mid.max(1e-3 * mean_gap).max(f64::MIN_POSITIVE)
}

/// Largest eigenvalue of L_sym is at most 2; the deflated vector goes above it.
const DEFLATION_SHIFT: f64 = 3.0;

/// Diffusion-weighted eigenmap of the deflated normalized Laplacian.
fn laplacian_eigenmap(weights: &Array2<f64>, dim: usize) -> Result<Vec<Vec<f32>>> {
    let n = weights.nrows();
    let degrees: Vec<f64> = (0..n).map(|i| weights.row(i).sum()).collect();
    let inv_sqrt_deg: Vec<f64> = degrees
        .iter()
        .map(|&d| if d > 0.0 { 1.0 / d.sqrt() } else { 0.0 })
        .collect();

    let total: f64 = degrees.iter().sum();
    let q: Vec<f64> = degrees
        .iter()
        .map(|&d| if total > 0.0 { (d / total).sqrt() } else { 0.0 })
        .collect();

    let mut m = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let identity = if i == j { 1.0 } else { 0.0 };
            m[[i, j]] = identity - inv_sqrt_deg[i] * weights[[i, j]] * inv_sqrt_deg[j]
                + DEFLATION_SHIFT * q[i] * q[j];
        }
    }

    // Eigenvalues come back in nondecreasing order.
    let eig = Mat::<f64>::from_fn(n, n, |i, j| m[[i, j]]).selfadjoint_eigendecomposition(Side::Lower);
    let u = eig.u();
    if u.ncols() < dim {
        return Err(Error::Eigen(format!(
            "expected at least {dim} eigenvectors, got {}",
            u.ncols()
        )));
    }

    let mut coords = Array2::<f64>::zeros((n, dim));
    for c in 0..dim {
        let psi: Vec<f64> = (0..n).map(|i| u.read(i, c)).collect();

        // Rayleigh quotient recovers λ for the column.
        let mut lambda = 0.0;
        for i in 0..n {
            let row: f64 = (0..n).map(|j| m[[i, j]] * psi[j]).sum();
            lambda += psi[i] * row;
        }
        let weight = (1.0 - lambda).abs();

        for i in 0..n {
            coords[[i, c]] = weight * psi[i] * inv_sqrt_deg[i];
        }

        // Fix the sign: largest-magnitude entry positive.
        let mut pivot = 0.0f64;
        for i in 0..n {
            if coords[[i, c]].abs() > pivot.abs() {
                pivot = coords[[i, c]];
            }
        }
        if pivot < 0.0 {
            coords.column_mut(c).mapv_inplace(|v| -v);
        }
    }

    if coords.iter().any(|v| !v.is_finite()) {
        return Err(Error::Eigen("non-finite eigenvector entries".into()));
    }

    let max_abs = coords.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let scale = if max_abs > 0.0 { LAYOUT_SCALE / max_abs } else { 1.0 };

    Ok((0..n)
        .map(|i| (0..dim).map(|c| (coords[[i, c]] * scale) as f32).collect())
        .collect())
}
