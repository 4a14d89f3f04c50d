//! Binary classification metrics for model evaluation and threshold tuning.

use serde::{Deserialize, Serialize};

/// Validation metrics for a fitted classifier at its operating threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Area under the precision-recall curve
    pub pr_auc: f64,
    /// Area under the ROC curve
    pub roc_auc: f64,
    /// Mean squared error of the probabilities; lower is better calibrated
    pub brier: f64,
}

/// Precision, recall, and F1 for the positive class at a threshold
/// (prediction is positive iff probability >= threshold)
pub fn precision_recall_at(probs: &[f64], labels: &[bool], threshold: f64) -> (f64, f64, f64) {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&p, &y) in probs.iter().zip(labels) {
        let predicted = p >= threshold;
        match (predicted, y) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }
    let precision = if tp + fp == 0 { 0.0 } else { tp as f64 / (tp + fp) as f64 };
    let recall = if tp + fn_ == 0 { 0.0 } else { tp as f64 / (tp + fn_) as f64 };
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    (precision, recall, f1)
}

/// Trapezoidal area under the precision-recall curve
pub fn pr_auc(probs: &[f64], labels: &[bool]) -> f64 {
    let total_pos = labels.iter().filter(|&&y| y).count();
    if total_pos == 0 || probs.is_empty() {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0;
    let mut prev_precision = 1.0;
    let mut area = 0.0;

    let mut k = 0;
    while k < order.len() {
        // consume a block of tied probabilities as one curve point
        let block_prob = probs[order[k]];
        while k < order.len() && probs[order[k]] == block_prob {
            if labels[order[k]] {
                tp += 1;
            } else {
                fp += 1;
            }
            k += 1;
        }
        let recall = tp as f64 / total_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        area += (recall - prev_recall) * (precision + prev_precision) / 2.0;
        prev_recall = recall;
        prev_precision = precision;
    }

    area
}

/// Rank-based AUC (Mann-Whitney), with tied probabilities given average ranks
pub fn roc_auc(probs: &[f64], labels: &[bool]) -> f64 {
    let n_pos = labels.iter().filter(|&&y| y).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]).then(a.cmp(&b)));

    let mut rank_sum_pos = 0.0;
    let mut k = 0;
    while k < order.len() {
        let block_prob = probs[order[k]];
        let start = k;
        while k < order.len() && probs[order[k]] == block_prob {
            k += 1;
        }
        // ranks are 1-based; tied values share the average rank of the block
        let avg_rank = (start + 1 + k) as f64 / 2.0;
        for &i in &order[start..k] {
            if labels[i] {
                rank_sum_pos += avg_rank;
            }
        }
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    (rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Mean squared error between probabilities and outcomes
pub fn brier(probs: &[f64], labels: &[bool]) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| (p - if y { 1.0 } else { 0.0 }).powi(2))
        .sum::<f64>()
        / probs.len() as f64
}

/// Full metric set at an operating threshold
pub fn evaluate(probs: &[f64], labels: &[bool], threshold: f64) -> ClassificationMetrics {
    let (precision, recall, f1) = precision_recall_at(probs, labels, threshold);
    ClassificationMetrics {
        precision,
        recall,
        f1,
        pr_auc: pr_auc(probs, labels),
        roc_auc: roc_auc(probs, labels),
        brier: brier(probs, labels),
    }
}
