// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Pretraining loop over the CXR dataset using Burn's DataLoader
// and Adam.
//
//   loss = MLM masked cross-entropy + ITM cross-entropy
//          (each term only when its task is enabled)
//
// Burn notes:
//   - Training runs on TrainBackend (Autodiff<Wgpu>)
//   - model.valid() drops to the inner backend, so the validation
//     batcher is built on ValidBackend
//   - The dataset re-samples pairing, mode and masking on every
//     access, so each epoch sees fresh MLM targets
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::{CxrBatch, CxrBatcher}, dataset::CxrDataset};
use crate::infra::{checkpoint::CheckpointManager, metrics::{EpochMetrics, MetricsLogger}};
use crate::ml::loss::{itm_cross_entropy, itm_hits, masked_cross_entropy, mlm_hits};
use crate::ml::model::{CxrBert, CxrBertConfig};

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;
type ValidBackend = burn::backend::Wgpu;

/// Everything the epoch loop needs besides the datasets.
pub struct TrainingRun<'a> {
    pub config:      &'a TrainConfig,
    pub model:       CxrBertConfig,
    pub image_shape: [usize; 3],
    pub checkpoints: CheckpointManager,
    pub metrics:     MetricsLogger,
}

pub fn run_training(run: TrainingRun<'_>, train_dataset: CxrDataset, val_dataset: CxrDataset) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop(run, train_dataset, val_dataset, device)
}

// ─── Per-batch Objective ─────────────────────────────────────────────────────
/// Accuracy counters accumulated over an epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Hits {
    pub mlm_correct: usize,
    pub mlm_total:   usize,
    pub itm_correct: usize,
    pub itm_total:   usize,
}

impl Hits {
    fn add(&mut self, other: Hits) {
        self.mlm_correct += other.mlm_correct;
        self.mlm_total   += other.mlm_total;
        self.itm_correct += other.itm_correct;
        self.itm_total   += other.itm_total;
    }

    pub fn mlm_acc(&self) -> f64 {
        ratio(self.mlm_correct, self.mlm_total)
    }

    pub fn itm_acc(&self) -> f64 {
        ratio(self.itm_correct, self.itm_total)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 { num as f64 / den as f64 } else { 0.0 }
}

/// Forward one batch and combine the enabled objectives.
pub fn pretraining_step<B: Backend>(
    model: &CxrBert<B>,
    batch: CxrBatch<B>,
) -> Result<(Tensor<B, 1>, Hits)> {
    let output = model.forward(&batch)?;
    let device = batch.labels.device();

    let mut loss = Tensor::<B, 1>::zeros([1], &device);
    let mut hits = Hits::default();

    if let Some(logits) = output.mlm_logits {
        let (c, t) = mlm_hits(logits.clone(), batch.labels.clone());
        hits.mlm_correct = c;
        hits.mlm_total   = t;
        loss = loss + masked_cross_entropy(logits, batch.labels);
    }
    if let Some(logits) = output.itm_logits {
        let (c, t) = itm_hits(logits.clone(), batch.is_aligned.clone());
        hits.itm_correct = c;
        hits.itm_total   = t;
        loss = loss + itm_cross_entropy(logits, batch.is_aligned);
    }

    Ok((loss, hits))
}

// ─── Epoch Loop ──────────────────────────────────────────────────────────────
fn train_loop(
    run:           TrainingRun<'_>,
    train_dataset: CxrDataset,
    val_dataset:   CxrDataset,
    device:        burn::backend::wgpu::WgpuDevice,
) -> Result<()> {
    let cfg = run.config;

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: CxrBert<TrainBackend> = run.model.init(&device)
        .context("Invalid model configuration")?;
    tracing::info!(
        "Model ready: {} layers, hidden={}, vocab={}",
        run.model.num_layers, run.model.hidden_size, run.model.vocab_size
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim_cfg = AdamConfig::new().with_epsilon(1e-8);
    if cfg.weight_decay > 0.0 {
        optim_cfg = optim_cfg.with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay)));
    }
    if cfg.max_grad_norm > 0.0 {
        optim_cfg = optim_cfg.with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.max_grad_norm)));
    }
    let mut optim = optim_cfg.init();

    let sampler = train_dataset.sampler();

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_loader = DataLoaderBuilder::new(CxrBatcher::<TrainBackend>::new(device.clone(), run.image_shape))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers.max(1))
        .build(train_dataset);

    let val_loader = DataLoaderBuilder::new(CxrBatcher::<ValidBackend>::new(device.clone(), run.image_shape))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers.max(1))
        .build(val_dataset);

    let mut best_val_loss = f64::INFINITY;

    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = pretraining_step(&model, batch)?;

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);

            if cfg.log_every > 0 && train_batches % cfg.log_every == 0 {
                tracing::info!(
                    "epoch {} step {}: running loss {:.4}",
                    epoch, train_batches, train_loss_sum / train_batches as f64
                );
            }
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut hits         = Hits::default();

        for batch in val_loader.iter() {
            let (loss, batch_hits) = pretraining_step(&model_valid, batch)?;
            val_loss_sum += loss.into_scalar().elem::<f64>();
            val_batches  += 1;
            hits.add(batch_hits);
        }

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };

        let metrics = EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, hits.mlm_acc(), hits.itm_acc());
        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | mlm_acc={:.1}% | itm_acc={:.1}%",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss,
            metrics.mlm_acc * 100.0, metrics.itm_acc * 100.0,
        );
        run.metrics.log(&metrics)?;

        run.checkpoints.save_model(&model, epoch)?;
        if metrics.is_improvement(best_val_loss) {
            best_val_loss = metrics.val_loss;
            run.checkpoints.mark_best(epoch)?;
        }
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!(
        "Training complete ({} pairs fell back to aligned after repeated rejections)",
        sampler.exhausted_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::batcher::Batcher;
    use burn::data::dataset::Dataset;

    use crate::data::dataset::tests::{small_config, toy_dataset_with_images};
    use crate::ml::model::tests::tiny_config;

    type TB = Autodiff<NdArray>;

    fn toy_batch() -> CxrBatch<TB> {
        let ds = toy_dataset_with_images(&small_config(), 16);
        let items: Vec<_> = (0..3).filter_map(|i| ds.get(i)).collect();
        CxrBatcher::<TB>::new(Default::default(), [3, 16, 16]).batch(items)
    }

    #[test]
    fn test_step_loss_is_finite_and_counts_samples() {
        let model = tiny_config().init::<TB>(&Default::default()).unwrap();
        let (loss, hits) = pretraining_step(&model, toy_batch()).unwrap();
        let v: f32 = loss.into_scalar().elem::<f32>();
        assert!(v.is_finite() && v > 0.0);
        assert_eq!(hits.itm_total, 3);
        assert!(hits.mlm_total >= 3, "every sample masks at least one token");
    }

    #[test]
    fn test_optimizer_step_runs() {
        let device = Default::default();
        let mut model = tiny_config().init::<TB>(&device).unwrap();
        let mut optim = AdamConfig::new().init();

        let (loss, _) = pretraining_step(&model, toy_batch()).unwrap();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(1e-3, model, grads);

        let (after, _) = pretraining_step(&model, toy_batch()).unwrap();
        assert!(after.into_scalar().elem::<f32>().is_finite());
    }

    #[test]
    fn test_mlm_only_skips_itm() {
        let model = tiny_config().with_itm_task(false).init::<TB>(&Default::default()).unwrap();
        let (_, hits) = pretraining_step(&model, toy_batch()).unwrap();
        assert_eq!(hits.itm_total, 0);
    }

    #[test]
    fn test_hits_ratios() {
        let h = Hits { mlm_correct: 1, mlm_total: 4, itm_correct: 0, itm_total: 0 };
        assert_eq!(h.mlm_acc(), 0.25);
        assert_eq!(h.itm_acc(), 0.0);
    }
}
