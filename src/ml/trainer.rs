// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fixed-length iteration loop with gradient accumulation, Adam
// and periodic instrumentation. One LogRecord per iteration:
//
//   iter        — iteration counter
//   step_time   — wall time of the accumulation + optimiser step
//   train_loss  — mean micro-batch loss of this iteration
//   val_loss    — last known validation loss (absent before the first)
//   examples    — one generated image, on generation iterations
//   fid         — distance score, on evaluation iterations
//
// Key Burn insight:
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() returns the model on the inner backend, with
//     gradient tracking off; validation batches use that backend too
//   - gradients are clipped by their global norm before step()

use anyhow::{anyhow, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

use crate::application::train_use_case::{AccumulationMode, TrainConfig};
use crate::data::{
    cursor::{build_loader, BatchCursor},
    dataset::ImageDataset,
    scaling::scale,
};
use crate::domain::record::{keys, LogRecord};
use crate::domain::schedule::RunSchedule;
use crate::domain::traits::{DatasetSplits, MetricSink, SampleMetric};
use crate::ml::clipping::clip_global_norm;
use crate::ml::diffusion::DiffusionWrapper;
use crate::ml::fidelity::{model_output_to_images, FidelityWrapper};

pub type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

pub fn run_training(
    cfg:       &TrainConfig,
    splits:    DatasetSplits,
    sink:      &mut dyn MetricSink,
    evaluator: Option<&dyn SampleMetric>,
) -> Result<DiffusionWrapper<MyBackend>> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, splits, sink, evaluator, &device)
}

/// Backward `steps` micro-batch losses and sum their gradients.
///
/// Each loss is weighted by `mode.loss_weight(steps)` before backward,
/// so `Mean` yields the average gradient. Returns the accumulated
/// gradients and the mean unweighted loss.
pub fn accumulate_gradients<B, M, F>(
    model:      &M,
    steps:      usize,
    mode:       AccumulationMode,
    mut micro:  F,
) -> Result<(GradientsParams, f64)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    F: FnMut(&M) -> Result<Tensor<B, 1>>,
{
    let weight          = mode.loss_weight(steps);
    let mut accumulator = GradientsAccumulator::<M>::new();
    let mut loss_sum    = 0.0f64;

    for _ in 0..steps {
        let loss = micro(model)?;
        loss_sum += loss.clone().into_scalar().elem::<f64>();

        let grads = loss.mul_scalar(weight).backward();
        accumulator.accumulate(model, GradientsParams::from_grads(grads, model));
    }

    Ok((accumulator.grads(), loss_sum / steps.max(1) as f64))
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:       &TrainConfig,
    splits:    DatasetSplits,
    sink:      &mut dyn MetricSink,
    evaluator: Option<&dyn SampleMetric>,
    device:    &B::Device,
) -> Result<DiffusionWrapper<B>> {

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: DiffusionWrapper<B> = cfg.diffusion_config().init(device);
    tracing::info!(
        "Model ready: base_channels={}, timesteps={}, image {}×{}",
        cfg.base_channels, cfg.timesteps, cfg.image_size, cfg.image_size,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optim_cfg = AdamConfig::new().with_epsilon(1e-8);
    let mut optim = optim_cfg.init();

    // ── Training loader (AutodiffBackend) ─────────────────────────────────────
    let train_loader = build_loader::<B, _>(
        ImageDataset::new(splits.train),
        cfg.batch_size,
        cfg.shuffle_seed,
        cfg.num_workers,
        device,
    )?;

    // ── Validation loader (InnerBackend — no autodiff overhead) ───────────────
    let val_loader = build_loader::<B::InnerBackend, _>(
        ImageDataset::new(splits.validation),
        cfg.batch_size,
        None,
        cfg.num_workers,
        device,
    )?;

    // ── Endless batch streams ─────────────────────────────────────────────────
    let mut train_cursor = BatchCursor::new(train_loader.as_ref())?;
    let mut val_cursor   = BatchCursor::new(val_loader.as_ref())?;

    let schedule = RunSchedule::new(
        cfg.num_iterations,
        cfg.validate_every,
        cfg.generate_every,
        cfg.evaluation_period(),
    );

    let pb = ProgressBar::new(cfg.num_iterations as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut last_val_loss: Option<f64> = None;

    // ── Iteration loop ────────────────────────────────────────────────────────
    for i in 0..cfg.num_iterations {
        let mut record = LogRecord::new();
        record.count(keys::ITER, i as u64);

        // ── Training step ─────────────────────────────────────────────────────
        let started = Instant::now();
        let (mut grads, train_loss) = accumulate_gradients(
            &model,
            cfg.accumulation_steps,
            cfg.accumulation,
            |m: &DiffusionWrapper<B>| {
                let batch = train_cursor
                    .next()
                    .ok_or_else(|| anyhow!("training loader produced no batch"))?;
                Ok(m.forward_loss(scale(batch.images))?)
            },
        )?;
        let grad_norm = clip_global_norm(&model, &mut grads, cfg.grad_clip_norm);
        model = optim.step(cfg.learning_rate, model, grads);
        let step_time = started.elapsed().as_secs_f64();

        record.scalar(keys::STEP_TIME, step_time).scalar(keys::TRAIN_LOSS, train_loss);
        tracing::debug!(
            "iter {i}: train_loss={train_loss:.5} grad_norm={grad_norm:.4} step_time={step_time:.3}s"
        );

        // ── Periodic hooks (eval mode) ────────────────────────────────────────
        let triggers = schedule.triggers(i);
        if triggers.validate || triggers.generate || triggers.evaluate {
            let valid = model.valid();

            if triggers.validate {
                let batch = val_cursor
                    .next()
                    .ok_or_else(|| anyhow!("validation loader produced no batch"))?;
                let loss  = valid.forward_loss(scale(batch.images))?;
                let value = loss.into_scalar().elem::<f64>();
                tracing::info!("iter {i}: val_loss={value:.5}");
                last_val_loss = Some(value);
            }

            if triggers.generate {
                let sample = model_output_to_images(valid.generate(1, device))?
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("generator returned no image"))?;
                record.image(keys::EXAMPLES, "Generated", sample);
            }

            if triggers.evaluate {
                let metric = evaluator
                    .ok_or_else(|| anyhow!("evaluation is enabled but no metric was supplied"))?;
                let mut source = FidelityWrapper::new(&valid, device.clone(), cfg.evaluate_batch_size);
                let report     = metric.calculate(&mut source, cfg.evaluate_num_samples)?;
                let score      = report
                    .values()
                    .next()
                    .copied()
                    .ok_or_else(|| anyhow!("metric report is empty"))?;
                tracing::info!("iter {i}: fid={score:.4}");
                record.scalar(keys::FID, score);
            }
        }

        if let Some(v) = last_val_loss {
            record.scalar(keys::VAL_LOSS, v);
        }

        sink.log(record)?;
        pb.set_message(format!("loss {train_loss:.4}"));
        pb.inc(1);
    }

    pb.finish_and_clear();
    sink.finish()?;
    tracing::info!(
        "Training complete! ({} batches served, {} full passes over the training split)",
        train_cursor.served(),
        train_cursor.passes()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::{ImageItem, ImageShape, PixelImage};
    use crate::domain::record::LogValue;
    use crate::domain::traits::{MetricReport, SampleSource};
    use crate::application::train_use_case::DatasetKind;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{Linear, LinearConfig};
    use rand::Rng;
    use std::cell::Cell;

    type TestBackend = Autodiff<NdArray>;

    #[derive(Default)]
    struct RecordingSink {
        records:  Vec<LogRecord>,
        finished: usize,
    }

    impl MetricSink for RecordingSink {
        fn log(&mut self, record: LogRecord) -> Result<()> {
            self.records.push(record);
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished += 1;
            Ok(())
        }
    }

    /// Counts calls and draws one batch from the source.
    #[derive(Default)]
    struct CountingMetric {
        calls: Cell<usize>,
    }

    impl SampleMetric for CountingMetric {
        fn calculate(&self, source: &mut dyn SampleSource, num_samples: usize) -> Result<MetricReport> {
            self.calls.set(self.calls.get() + 1);
            let images = source.sample(source.batch_size().min(num_samples))?;
            assert_eq!(images[0].shape, ImageShape::new(3, 8, 8));

            let mut report = MetricReport::new();
            report.insert("frechet_distance".to_string(), 1.5);
            Ok(report)
        }
    }

    fn random_items(n: usize) -> Vec<ImageItem> {
        let mut rng = rand::thread_rng();
        let shape   = ImageShape::new(3, 8, 8);
        (0..n)
            .map(|i| ImageItem {
                image: PixelImage::new(shape, (0..shape.numel()).map(|_| rng.gen()).collect()).unwrap(),
                label: i % 10,
            })
            .collect()
    }

    fn splits() -> DatasetSplits {
        DatasetSplits { train: random_items(8), validation: random_items(4) }
    }

    fn tiny_config() -> TrainConfig {
        TrainConfig {
            dataset:            DatasetKind::Folder,
            num_iterations:     1,
            batch_size:         4,
            accumulation_steps: 1,
            base_channels:      8,
            norm_groups:        4,
            timesteps:          3,
            image_size:         8,
            ..TrainConfig::default()
        }
    }

    fn scalar(record: &LogRecord, key: &str) -> f64 {
        record.get(key).and_then(LogValue::as_scalar).unwrap()
    }

    #[test]
    fn test_sum_accumulates_per_batch_gradients() {
        let device = Default::default();
        let linear: Linear<TestBackend> = LinearConfig::new(2, 1).with_bias(false).init(&device);
        let inputs = [[1.0f32, 2.0], [3.0, 4.0]];

        for (mode, expected) in [
            (AccumulationMode::Sum,  [4.0f32, 6.0]),
            (AccumulationMode::Mean, [2.0, 3.0]),
        ] {
            let mut next = inputs.iter();
            let (grads, _) = accumulate_gradients(&linear, 2, mode, |m: &Linear<TestBackend>| {
                let x = Tensor::<TestBackend, 1>::from_floats(next.next().unwrap().as_slice(), &device)
                    .reshape([1, 2]);
                Ok(m.forward(x).sum())
            })
            .unwrap();

            let grad: Vec<f32> = grads
                .get::<NdArray, 2>(linear.weight.id.clone())
                .unwrap()
                .into_data()
                .to_vec()
                .unwrap();
            approx::assert_abs_diff_eq!(grad.as_slice(), expected.as_slice(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_reported_loss_is_mean_of_micro_batches() {
        let device = Default::default();
        let linear: Linear<TestBackend> = LinearConfig::new(2, 1).with_bias(false).init(&device);
        let mut k = 0.0f32;
        let (_, loss) = accumulate_gradients(&linear, 4, AccumulationMode::Mean, |m: &Linear<TestBackend>| {
            k += 1.0;
            let zero = Tensor::<TestBackend, 2>::zeros([1, 2], &device);
            Ok(m.forward(zero).sum().add_scalar(k))
        })
        .unwrap();
        approx::assert_abs_diff_eq!(loss, 2.5, epsilon = 1e-6);
    }

    #[test]
    fn test_single_iteration_end_to_end() {
        let device   = Default::default();
        let mut sink = RecordingSink::default();

        train_loop::<TestBackend>(&tiny_config(), splits(), &mut sink, None, &device).unwrap();

        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.finished, 1);

        let keys: Vec<&str> = sink.records[0].keys().collect();
        assert_eq!(keys, vec!["examples", "iter", "step_time", "train_loss", "val_loss"]);
        assert!(scalar(&sink.records[0], keys::TRAIN_LOSS).is_finite());
        assert!(scalar(&sink.records[0], keys::STEP_TIME) >= 0.0);
        assert!(matches!(
            sink.records[0].get(keys::EXAMPLES),
            Some(LogValue::Image { caption, .. }) if caption == "Generated"
        ));
    }

    #[test]
    fn test_val_loss_carries_over_between_validations() {
        let device = Default::default();
        let cfg    = TrainConfig {
            num_iterations:     3,
            accumulation_steps: 2,
            validate_every:     2,
            generate_every:     5,
            ..tiny_config()
        };
        let mut sink = RecordingSink::default();
        train_loop::<TestBackend>(&cfg, splits(), &mut sink, None, &device).unwrap();

        let r = &sink.records;
        assert_eq!(r.len(), 3);
        assert_eq!(scalar(&r[1], keys::VAL_LOSS), scalar(&r[0], keys::VAL_LOSS));
        assert!(r[0].contains(keys::EXAMPLES));
        assert!(!r[1].contains(keys::EXAMPLES));
        assert!(!r[2].contains(keys::EXAMPLES));
    }

    #[test]
    fn test_disabled_evaluation_never_calls_metric() {
        let device = Default::default();
        let cfg    = TrainConfig { num_iterations: 2, evaluate_every: 1, ..tiny_config() };
        let metric = CountingMetric::default();
        let mut sink = RecordingSink::default();

        train_loop::<TestBackend>(&cfg, splits(), &mut sink, Some(&metric), &device).unwrap();

        assert_eq!(metric.calls.get(), 0);
        assert!(sink.records.iter().all(|r| !r.contains(keys::FID)));
    }

    #[test]
    fn test_evaluation_skips_zero_and_fires_on_final() {
        let device = Default::default();
        let cfg    = TrainConfig {
            num_iterations:       3,
            evaluate:             true,
            evaluate_every:       100,
            evaluate_batch_size:  2,
            evaluate_num_samples: 2,
            ..tiny_config()
        };
        let metric   = CountingMetric::default();
        let mut sink = RecordingSink::default();

        train_loop::<TestBackend>(&cfg, splits(), &mut sink, Some(&metric), &device).unwrap();

        assert_eq!(metric.calls.get(), 1);
        assert!(!sink.records[0].contains(keys::FID));
        assert_eq!(scalar(&sink.records[2], keys::FID), 1.5);
    }

    #[test]
    fn test_evaluation_without_metric_is_an_error() {
        let device   = Default::default();
        let cfg      = TrainConfig { evaluate: true, ..tiny_config() };
        let mut sink = RecordingSink::default();

        assert!(train_loop::<TestBackend>(&cfg, splits(), &mut sink, None, &device).is_err());
        assert_eq!(sink.finished, 0);
    }
}
