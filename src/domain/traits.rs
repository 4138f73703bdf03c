// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop only talks to these seams:
//
//   DatasetSource → CIFAR-10 binaries, an image folder, ...
//   MetricSink    → the on-disk RunSession, an in-memory recorder
//   SampleSource  → the u8 wrapper around the diffusion generator
//   SampleMetric  → the Fréchet-distance calculator

use std::collections::BTreeMap;

use anyhow::Result;

use crate::domain::image::{ImageItem, PixelImage};
use crate::domain::record::LogRecord;

/// Train / validation partitions of one dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetSplits {
    pub train:      Vec<ImageItem>,
    pub validation: Vec<ImageItem>,
}

// ─── DatasetSource ────────────────────────────────────────────────────────────
/// Anything that can produce a labelled image dataset.
pub trait DatasetSource {
    fn load_splits(&self) -> Result<DatasetSplits>;
}

// ─── MetricSink ───────────────────────────────────────────────────────────────
/// Destination for per-iteration log records.
///
/// `finish` must be safe to call more than once; only the first
/// call does any work.
pub trait MetricSink {
    fn log(&mut self, record: LogRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// A generator that emits 8-bit images on request.
pub trait SampleSource {
    /// Preferred number of images per `sample` call
    fn batch_size(&self) -> usize;

    /// Produce exactly `n` images.
    fn sample(&mut self, n: usize) -> Result<Vec<PixelImage>>;
}

/// Named metric values, e.g. `frechet_distance → 41.7`
pub type MetricReport = BTreeMap<String, f64>;

// ─── SampleMetric ─────────────────────────────────────────────────────────────
/// Compares generated samples against a reference distribution.
pub trait SampleMetric {
    fn calculate(
        &self,
        source:      &mut dyn SampleSource,
        num_samples: usize,
    ) -> Result<MetricReport>;
}
