// ============================================================
// Layer 5 — Pretraining Objectives
// ============================================================
// MLM: cross-entropy over the vocabulary at every position whose
//      recovery label is not IGNORE_INDEX (-100).
// ITM: two-way cross-entropy on the pooled [CLS] logits against
//      the is_aligned flag.
//
// Burn's CrossEntropyLoss has no ignore index, so the MLM loss
// gathers log-probabilities itself and averages over valid
// positions only.
//
// Reference: Devlin et al. (2019) BERT §3.1 (Masked LM)

use burn::{nn::loss::CrossEntropyLossConfig, prelude::*, tensor::activation::log_softmax};

use crate::data::masking::IGNORE_INDEX;

/// Mean negative log-likelihood over positions with a label.
///
/// logits: [batch, L, vocab], labels: [batch, L]
/// Returns a scalar tensor ([1]); zero when no position is labelled.
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    labels: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [batch, len, vocab] = logits.dims();
    let n = batch * len;

    let logits  = logits.reshape([n, vocab]);
    let labels  = labels.reshape([n]);
    let ignored = labels.clone().equal_elem(IGNORE_INDEX);
    let weights = ignored.clone().bool_not().float();

    // ignored positions gather class 0, then get zero weight
    let targets = labels.mask_fill(ignored, 0).reshape([n, 1]);
    let picked  = log_softmax(logits, 1).gather(1, targets).reshape([n]);

    let total = (picked * weights.clone()).sum().neg();
    total / weights.sum().clamp_min(1.0)
}

/// Image–text matching loss. logits: [batch, 2], aligned: [batch] in {0, 1}
pub fn itm_cross_entropy<B: Backend>(
    logits:  Tensor<B, 2>,
    aligned: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, aligned)
}

// ─── Accuracy Counters ───────────────────────────────────────────────────────
/// (correct, labelled) over MLM positions.
pub fn mlm_hits<B: Backend>(logits: Tensor<B, 3>, labels: Tensor<B, 2, Int>) -> (usize, usize) {
    let [batch, len, _] = logits.dims();
    let preds = logits.argmax(2).reshape([batch, len]);
    let valid = labels.clone().equal_elem(IGNORE_INDEX).bool_not().int();

    let correct = preds.equal(labels).int().mul(valid.clone());
    let correct: i64 = correct.sum().into_scalar().elem::<i64>();
    let total:   i64 = valid.sum().into_scalar().elem::<i64>();
    (correct as usize, total as usize)
}

/// (correct, samples) for the ITM head.
pub fn itm_hits<B: Backend>(logits: Tensor<B, 2>, aligned: Tensor<B, 1, Int>) -> (usize, usize) {
    let samples = aligned.dims()[0];
    // argmax(1) returns [batch, 1]; flatten before comparing
    let preds = logits.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = preds.equal(aligned).int().sum().into_scalar().elem::<i64>();
    (correct as usize, samples)
}
