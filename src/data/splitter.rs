// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles items and splits them into training and validation
// sets. Only needed for sources without a predefined split (an
// image folder); CIFAR-10 ships its own test batch.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::seq::SliceRandom;

use crate::data::dataset::DatasetError;

/// Randomly shuffle `items` and split into (train, validation).
///
/// `train_fraction` is clamped to [0, 1]; the split index is
/// rounded to the nearest item.
pub fn split_train_val<T>(mut items: Vec<T>, train_fraction: f64) -> (Vec<T>, Vec<T>) {
    let mut rng = rand::thread_rng();
    items.shuffle(&mut rng);

    let total    = items.len();
    let fraction = train_fraction.clamp(0.0, 1.0);
    let split_at = ((total as f64) * fraction).round() as usize;
    let split_at = split_at.min(total);

    let val = items.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation",
        items.len(),
        val.len(),
    );

    (items, val)
}

/// Like `split_train_val`, but moves one item across the boundary
/// when rounding would leave either side empty. Fails when fewer than
/// two items make that impossible.
pub fn split_non_empty<T>(
    items:          Vec<T>,
    train_fraction: f64,
) -> Result<(Vec<T>, Vec<T>), DatasetError> {
    let (mut train, mut val) = split_train_val(items, train_fraction);

    if val.is_empty() {
        if let Some(item) = train.pop() {
            val.push(item);
        }
    }
    if train.is_empty() && val.len() > 1 {
        if let Some(item) = val.pop() {
            train.push(item);
        }
    }

    if train.is_empty() {
        return Err(DatasetError::Empty("train split".to_string()));
    }
    if val.is_empty() {
        return Err(DatasetError::Empty("validation split".to_string()));
    }
    Ok((train, val))
}
