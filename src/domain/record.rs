// ============================================================
// Layer 3 — Log Record
// ============================================================
// A flat mapping from metric name to payload, assembled once per
// training iteration and handed to the experiment session.
//
// Example record after iteration 0:
//   iter=0, step_time=0.41, train_loss=1.02, val_loss=0.99,
//   examples=<image "Generated">

use std::collections::BTreeMap;

use crate::domain::image::PixelImage;

/// Well-known record keys
pub mod keys {
    pub const ITER:       &str = "iter";
    pub const STEP_TIME:  &str = "step_time";
    pub const TRAIN_LOSS: &str = "train_loss";
    pub const VAL_LOSS:   &str = "val_loss";
    pub const EXAMPLES:   &str = "examples";
    pub const FID:        &str = "fid";
}

/// Payload of a single metric entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Scalar(f64),
    Count(u64),
    Image { caption: String, image: PixelImage },
}

impl LogValue {
    #[cfg(test)]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            LogValue::Scalar(v) => Some(*v),
            LogValue::Count(v)  => Some(*v as f64),
            LogValue::Image { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    entries: BTreeMap<String, LogValue>,
}

impl LogRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(&mut self, key: impl Into<String>, value: f64) -> &mut Self {
        self.entries.insert(key.into(), LogValue::Scalar(value));
        self
    }

    pub fn count(&mut self, key: impl Into<String>, value: u64) -> &mut Self {
        self.entries.insert(key.into(), LogValue::Count(value));
        self
    }

    pub fn image(
        &mut self,
        key:     impl Into<String>,
        caption: impl Into<String>,
        image:   PixelImage,
    ) -> &mut Self {
        self.entries.insert(
            key.into(),
            LogValue::Image { caption: caption.into(), image },
        );
        self
    }

    pub fn get(&self, key: &str) -> Option<&LogValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LogValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
