//! Host-side decode rules shared by the postprocessors.

use crate::error::{PipelineError, Result};

/// Numerically stable softmax, computed in f64.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&x| (x as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| (e / sum) as f32).collect()
}

/// Index and value of the largest score. Ties go to the lowest index.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &s) in scores.iter().enumerate() {
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best
}

/// Check a row of class scores against the label count before decoding.
pub fn check_row(what: &str, row: &[f32], num_labels: usize) -> Result<()> {
    if row.len() != num_labels {
        return Err(PipelineError::Postprocess(format!(
            "{what}: expected {num_labels} class scores, got {}",
            row.len()
        )));
    }
    if let Some(i) = row.iter().position(|x| !x.is_finite()) {
        return Err(PipelineError::Postprocess(format!(
            "{what}: class score {i} is not finite ({})",
            row[i]
        )));
    }
    Ok(())
}

/// Softmax a row of logits and pick the winning class.
///
/// The label chosen is the argmax over class probabilities; ties are broken by the
/// lowest class index. The score is the winning probability.
pub fn classify<'l>(what: &str, logits: &[f32], labels: &'l [String]) -> Result<(&'l str, f32)> {
    check_row(what, logits, labels.len())?;
    let probs = softmax(logits);
    let (idx, score) = argmax(&probs).ok_or_else(|| {
        PipelineError::Postprocess(format!("{what}: no class scores to decode"))
    })?;
    Ok((labels[idx].as_str(), score))
}
