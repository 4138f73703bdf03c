// ============================================================
// Layer 6 — Fréchet Distance Calculator
// ============================================================
// Fits a Gaussian to feature vectors of real and generated images
// and reports the Fréchet distance between the two fits:
//
//   d² = ‖μ_r − μ_g‖² + Tr(Σ_r + Σ_g − 2 (Σ_r^½ Σ_g Σ_r^½)^½)
//
// Features are block-averaged pixels: each channel is pooled onto
// a grid×grid lattice and scaled to [0,1], so a 3×32×32 image with
// grid = 4 gives a 48-dimensional vector.
//
// Matrix square roots go through nalgebra's SymmetricEigen with
// negative eigenvalues (numerical noise) clamped to zero.

use anyhow::Result;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use thiserror::Error;

use crate::domain::image::PixelImage;
use crate::domain::traits::{MetricReport, SampleMetric, SampleSource};

pub const FRECHET_DISTANCE: &str = "frechet_distance";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    #[error("need at least {needed} samples for covariance, got {got}")]
    TooFewSamples { needed: usize, got: usize },

    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("sample source returned {got} images, {requested} requested")]
    SourceShortfall { requested: usize, got: usize },
}

// ─── Feature extraction ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct PooledPixelFeatures {
    grid: usize,
}

impl Default for PooledPixelFeatures {
    fn default() -> Self {
        Self { grid: 4 }
    }
}

impl PooledPixelFeatures {
    pub fn new(grid: usize) -> Self {
        Self { grid: grid.max(1) }
    }

    pub fn extract(&self, image: &PixelImage) -> Vec<f64> {
        let shape   = image.shape;
        let grid_h  = self.grid.min(shape.height).max(1);
        let grid_w  = self.grid.min(shape.width).max(1);
        let mut out = Vec::with_capacity(shape.channels * grid_h * grid_w);

        for c in 0..shape.channels {
            for gy in 0..grid_h {
                let (y0, y1) = (gy * shape.height / grid_h, (gy + 1) * shape.height / grid_h);
                for gx in 0..grid_w {
                    let (x0, x1) = (gx * shape.width / grid_w, (gx + 1) * shape.width / grid_w);
                    let mut sum = 0u64;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            sum += image.at(c, y, x) as u64;
                        }
                    }
                    let cells = ((y1 - y0) * (x1 - x0)).max(1) as f64;
                    out.push(sum as f64 / cells / 255.0);
                }
            }
        }
        out
    }
}

// ─── Gaussian statistics ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FeatureStatistics {
    pub mean:  DVector<f64>,
    pub cov:   DMatrix<f64>,
    pub count: usize,
}

impl FeatureStatistics {
    /// Sample mean and unbiased covariance of the rows.
    pub fn from_features(rows: &[Vec<f64>]) -> Result<Self, MetricError> {
        let n = rows.len();
        if n < 2 {
            return Err(MetricError::TooFewSamples { needed: 2, got: n });
        }
        let dim = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != dim) {
            return Err(MetricError::DimensionMismatch { expected: dim, got: bad.len() });
        }

        let data = DMatrix::from_fn(n, dim, |i, j| rows[i][j]);
        let mean = DVector::from_fn(dim, |j, _| data.column(j).mean());

        let mut centered = data;
        for j in 0..dim {
            let m = mean[j];
            centered.column_mut(j).add_scalar_mut(-m);
        }
        let cov = (centered.transpose() * &centered) / (n as f64 - 1.0);

        Ok(Self { mean, cov, count: n })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

/// Symmetric PSD square root via eigendecomposition.
fn sqrt_psd(m: &DMatrix<f64>) -> DMatrix<f64> {
    let symmetric = (m + m.transpose()) * 0.5;
    let eigen     = SymmetricEigen::new(symmetric);
    let roots     = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    &eigen.eigenvectors * DMatrix::from_diagonal(&roots) * eigen.eigenvectors.transpose()
}

pub fn frechet_distance(
    a: &FeatureStatistics,
    b: &FeatureStatistics,
) -> Result<f64, MetricError> {
    if a.dim() != b.dim() {
        return Err(MetricError::DimensionMismatch { expected: a.dim(), got: b.dim() });
    }

    let diff       = &a.mean - &b.mean;
    let sqrt_a     = sqrt_psd(&a.cov);
    let product    = &sqrt_a * &b.cov * &sqrt_a;
    let cross      = sqrt_psd(&product).trace();
    let distance   = diff.norm_squared() + a.cov.trace() + b.cov.trace() - 2.0 * cross;

    // tiny negative values are rounding error
    Ok(distance.max(0.0))
}

// ─── Evaluator ────────────────────────────────────────────────────────────────

pub struct FrechetEvaluator {
    reference: FeatureStatistics,
    features:  PooledPixelFeatures,
}

impl FrechetEvaluator {
    pub fn from_reference<'a>(
        images:   impl IntoIterator<Item = &'a PixelImage>,
        features: PooledPixelFeatures,
    ) -> Result<Self, MetricError> {
        let rows: Vec<Vec<f64>> = images.into_iter().map(|img| features.extract(img)).collect();
        let reference = FeatureStatistics::from_features(&rows)?;
        tracing::info!(
            "Reference statistics ready: {} images, {} features",
            reference.count,
            reference.dim()
        );
        Ok(Self { reference, features })
    }
}

impl SampleMetric for FrechetEvaluator {
    fn calculate(
        &self,
        source:      &mut dyn SampleSource,
        num_samples: usize,
    ) -> Result<MetricReport> {
        let batch_size = source.batch_size().max(1);
        let mut rows   = Vec::with_capacity(num_samples);

        while rows.len() < num_samples {
            let want   = batch_size.min(num_samples - rows.len());
            let images = source.sample(want)?;
            if images.len() != want {
                return Err(MetricError::SourceShortfall { requested: want, got: images.len() }.into());
            }
            rows.extend(images.iter().map(|img| self.features.extract(img)));
            tracing::debug!("Evaluation samples: {}/{}", rows.len(), num_samples);
        }

        let generated = FeatureStatistics::from_features(&rows)?;
        let distance  = frechet_distance(&self.reference, &generated)?;

        let mut report = MetricReport::new();
        report.insert(FRECHET_DISTANCE.to_string(), distance);
        Ok(report)
    }
}
