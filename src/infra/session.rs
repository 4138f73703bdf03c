// ============================================================
// Layer 6 — Experiment Session
// ============================================================
// A run-scoped experiment log on the local filesystem:
//
//   <root>/<project>/run-20261016-101500/
//     config.json      ← the TrainConfig of this run
//     metrics.jsonl    ← one JSON object per logged record
//     media/           ← image payloads, <key>_<step>.png
//     summary.json     ← last value of every scalar, on finish
//
// Example metrics.jsonl line:
//   {"_step":0,"examples":{"_type":"image","caption":"Generated",
//    "path":"media/examples_0.png"},"iter":0,"step_time":0.41,
//    "train_loss":1.02,"val_loss":0.99}
//
// The session finishes itself on drop, so a run that ends in an
// error still leaves a flushed metrics file and a summary behind.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::record::{LogRecord, LogValue};
use crate::domain::traits::MetricSink;
use crate::infra::image_io::save_image;

pub struct RunSession {
    dir:      PathBuf,
    metrics:  BufWriter<File>,
    step:     u64,
    summary:  BTreeMap<String, f64>,
    finished: bool,
}

impl RunSession {
    /// Open a fresh run directory under `<root>/<project>/`.
    pub fn init(root: impl AsRef<Path>, project: &str, config: &impl Serialize) -> Result<Self> {
        let project_dir = root.as_ref().join(project);
        let stamp       = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();

        // two runs in the same second get -1, -2, … suffixes
        let mut dir = project_dir.join(format!("run-{stamp}"));
        let mut n   = 0;
        while dir.exists() {
            n  += 1;
            dir = project_dir.join(format!("run-{stamp}-{n}"));
        }

        fs::create_dir_all(dir.join("media"))
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;

        fs::write(dir.join("config.json"), serde_json::to_string_pretty(config)?)
            .with_context(|| "Failed to write config.json")?;

        let metrics = File::create(dir.join("metrics.jsonl"))
            .with_context(|| "Failed to create metrics.jsonl")?;

        tracing::info!("Experiment session started at '{}'", dir.display());
        Ok(Self {
            dir,
            metrics: BufWriter::new(metrics),
            step: 0,
            summary: BTreeMap::new(),
            finished: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn encode(&mut self, key: &str, value: &LogValue) -> Result<Value> {
        Ok(match value {
            LogValue::Scalar(v) => {
                self.summary.insert(key.to_string(), *v);
                // NaN / ±inf have no JSON form
                serde_json::Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null)
            }
            LogValue::Count(v) => {
                self.summary.insert(key.to_string(), *v as f64);
                json!(v)
            }
            LogValue::Image { caption, image } => {
                let rel = format!("media/{key}_{}.png", self.step);
                save_image(image, &self.dir.join(&rel))?;
                json!({ "_type": "image", "caption": caption, "path": rel })
            }
        })
    }
}

impl MetricSink for RunSession {
    fn log(&mut self, record: LogRecord) -> Result<()> {
        let mut line = Map::new();
        line.insert("_step".to_string(), json!(self.step));
        for (key, value) in record.iter() {
            let encoded = self.encode(key, value)?;
            line.insert(key.to_string(), encoded);
        }

        serde_json::to_writer(&mut self.metrics, &Value::Object(line))?;
        self.metrics.write_all(b"\n")?;
        // flush per record so an aborted run keeps its history
        self.metrics.flush()?;

        self.step += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.metrics.flush()?;
        fs::write(
            self.dir.join("summary.json"),
            serde_json::to_string_pretty(&self.summary)?,
        )
        .with_context(|| "Failed to write summary.json")?;

        tracing::info!("Experiment session finished ({} records)", self.step);
        Ok(())
    }
}

impl Drop for RunSession {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.finish() {
                tracing::warn!("Failed to close experiment session: {e:#}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::image::{ImageShape, PixelImage};
    use crate::domain::record::keys;

    fn read_lines(dir: &Path) -> Vec<Value> {
        fs::read_to_string(dir.join("metrics.jsonl"))
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_records_and_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = RunSession::init(tmp.path(), "demo", &json!({ "lr": 1e-4 })).unwrap();
        let dir = session.dir().to_path_buf();
        assert!(dir.join("config.json").is_file());

        let img = PixelImage::new(ImageShape::new(3, 2, 2), vec![100; 12]).unwrap();
        let mut first = LogRecord::new();
        first
            .count(keys::ITER, 0)
            .scalar(keys::TRAIN_LOSS, 1.5)
            .image(keys::EXAMPLES, "Generated", img);
        session.log(first).unwrap();

        let mut second = LogRecord::new();
        second.count(keys::ITER, 1).scalar(keys::TRAIN_LOSS, f64::NAN);
        session.log(second).unwrap();
        session.finish().unwrap();

        let lines = read_lines(&dir);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["_step"], 0);
        assert_eq!(lines[0]["train_loss"], 1.5);
        assert_eq!(lines[0]["examples"]["path"], "media/examples_0.png");
        assert!(dir.join("media/examples_0.png").is_file());
        assert_eq!(lines[1]["train_loss"], Value::Null);

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["iter"], 1.0);
    }

    #[test]
    fn test_drop_finishes_session() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = {
            let mut session = RunSession::init(tmp.path(), "demo", &json!({})).unwrap();
            let mut r = LogRecord::new();
            r.scalar(keys::VAL_LOSS, 0.25);
            session.log(r).unwrap();
            session.dir().to_path_buf()
        };
        assert!(dir.join("summary.json").is_file());
        assert_eq!(read_lines(&dir).len(), 1);
    }

    #[test]
    fn test_runs_in_same_second_get_distinct_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let a   = RunSession::init(tmp.path(), "demo", &json!({})).unwrap();
        let b   = RunSession::init(tmp.path(), "demo", &json!({})).unwrap();
        assert_ne!(a.dir(), b.dir());
    }
}
