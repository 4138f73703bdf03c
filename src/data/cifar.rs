// ============================================================
// Layer 4 — CIFAR-10 Loader
// ============================================================
// Reads the "binary version" of CIFAR-10. Each file is a flat
// sequence of 3073-byte records:
//
//   <1 byte label> <1024 red> <1024 green> <1024 blue>
//
// with each colour plane stored row-major, so a record is already
// in CHW order. Layout on disk:
//
//   <root>/cifar-10-batches-bin/data_batch_1.bin … data_batch_5.bin
//   <root>/cifar-10-batches-bin/test_batch.bin
//
// `root` may also point directly at the cifar-10-batches-bin folder.
//
// With downloading enabled, a root missing any batch file receives
// the official binary archive, unpacked in place.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};

use crate::data::dataset::DatasetError;
use crate::domain::image::{ImageItem, ImageShape, PixelImage};
use crate::domain::traits::{DatasetSource, DatasetSplits};

pub const RECORD_LEN: usize = 1 + 3 * 32 * 32;

const BATCH_DIR:   &str = "cifar-10-batches-bin";
const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILE: &str = "test_batch.bin";

pub const ARCHIVE_URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-10-binary.tar.gz";

pub struct Cifar10Loader {
    root:     PathBuf,
    download: bool,
}

impl Cifar10Loader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), download: false }
    }

    /// Fetch the archive when batch files are missing.
    pub fn with_download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    /// True when every train and test batch file exists.
    pub fn is_present(&self) -> bool {
        let dir = self.batch_dir();
        TRAIN_FILES.iter().chain([&TEST_FILE]).all(|name| dir.join(name).is_file())
    }

    /// Download and unpack the binary archive into `root`.
    pub fn download(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Cannot create '{}'", self.root.display()))?;

        tracing::info!("Downloading CIFAR-10 from {ARCHIVE_URL}");
        let response = ureq::get(ARCHIVE_URL)
            .call()
            .with_context(|| format!("Failed to download {ARCHIVE_URL}"))?;

        let total = response
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
                .progress_chars("#>-"),
        );
        pb.set_message("cifar-10-binary.tar.gz");

        unpack_archive(pb.wrap_read(response.into_reader()), &self.root)?;
        pb.finish_and_clear();
        tracing::info!("CIFAR-10 unpacked into '{}'", self.root.display());
        Ok(())
    }

    fn batch_dir(&self) -> PathBuf {
        let nested = self.root.join(BATCH_DIR);
        if nested.is_dir() { nested } else { self.root.clone() }
    }

    fn load_files(&self, names: &[&str]) -> Result<Vec<ImageItem>, DatasetError> {
        let dir = self.batch_dir();
        let mut items = Vec::new();
        for name in names {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(DatasetError::MissingFile(path));
            }
            let bytes = fs::read(&path)?;
            let batch = parse_records(&bytes, &path)?;
            tracing::debug!("Read {} images from '{}'", batch.len(), path.display());
            items.extend(batch);
        }
        Ok(items)
    }
}

impl DatasetSource for Cifar10Loader {
    fn load_splits(&self) -> Result<DatasetSplits> {
        if self.download && !self.is_present() {
            self.download()?;
        }

        let train      = self.load_files(&TRAIN_FILES)?;
        let validation = self.load_files(&[TEST_FILE])?;
        tracing::info!(
            "Loaded CIFAR-10 from '{}': {} train, {} validation",
            self.batch_dir().display(),
            train.len(),
            validation.len()
        );
        Ok(DatasetSplits { train, validation })
    }
}

/// Unpack a gzip-compressed tar stream into `root`.
pub fn unpack_archive(reader: impl Read, root: &Path) -> Result<()> {
    tar::Archive::new(GzDecoder::new(reader))
        .unpack(root)
        .with_context(|| format!("Cannot unpack CIFAR-10 archive into '{}'", root.display()))
}

/// Decode every record in one CIFAR-10 binary file.
pub fn parse_records(bytes: &[u8], path: &Path) -> Result<Vec<ImageItem>, DatasetError> {
    if bytes.is_empty() || bytes.len() % RECORD_LEN != 0 {
        return Err(DatasetError::Malformed {
            path:   path.to_path_buf(),
            reason: format!(
                "length {} is not a positive multiple of {RECORD_LEN}",
                bytes.len()
            ),
        });
    }

    bytes
        .chunks_exact(RECORD_LEN)
        .map(|record| {
            let label = record[0] as usize;
            if label > 9 {
                return Err(DatasetError::Malformed {
                    path:   path.to_path_buf(),
                    reason: format!("label {label} out of range 0..=9"),
                });
            }
            let image = PixelImage {
                shape: ImageShape::CIFAR,
                data:  record[1..].to_vec(),
            };
            Ok(ImageItem { image, label })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(label: u8, fill: u8) -> Vec<u8> {
        let mut r = vec![label];
        r.extend(std::iter::repeat(fill).take(RECORD_LEN - 1));
        r
    }

    #[test]
    fn test_parses_consecutive_records() {
        let mut bytes = record(3, 10);
        bytes.extend(record(7, 200));
        let items = parse_records(&bytes, Path::new("x.bin")).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, 3);
        assert_eq!(items[1].label, 7);
        assert_eq!(items[1].image.shape, ImageShape::CIFAR);
        assert!(items[1].image.data.iter().all(|&p| p == 200));
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let bytes = vec![0u8; RECORD_LEN + 5];
        let err   = parse_records(&bytes, Path::new("x.bin")).unwrap_err();
        assert!(matches!(err, DatasetError::Malformed { .. }));
    }

    #[test]
    fn test_bad_label_is_malformed() {
        let err = parse_records(&record(12, 0), Path::new("x.bin")).unwrap_err();
        assert!(err.to_string().contains("label 12"));
    }

    #[test]
    fn test_loads_nested_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join(BATCH_DIR);
        fs::create_dir_all(&dir).unwrap();
        for name in TRAIN_FILES {
            fs::write(dir.join(name), record(1, 5)).unwrap();
        }
        let mut test = record(2, 6);
        test.extend(record(4, 6));
        fs::write(dir.join(TEST_FILE), test).unwrap();

        let splits = Cifar10Loader::new(tmp.path()).load_splits().unwrap();
        assert_eq!(splits.train.len(), 5);
        assert_eq!(splits.validation.len(), 2);
    }

    #[test]
    fn test_missing_batch_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Cifar10Loader::new(tmp.path()).load_splits().unwrap_err();
        assert!(err.to_string().contains("data_batch_1.bin"));
    }

    /// gzip'd tar with the same layout as the official archive
    fn archive_bytes() -> Vec<u8> {
        let gz          = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        let mut builder = tar::Builder::new(gz);
        for name in TRAIN_FILES.iter().chain([&TEST_FILE]) {
            let data       = record(3, 1);
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{BATCH_DIR}/{name}"), data.as_slice())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpacked_archive_loads() {
        let tmp    = tempfile::tempdir().unwrap();
        let loader = Cifar10Loader::new(tmp.path()).with_download(true);
        assert!(!loader.is_present());

        unpack_archive(archive_bytes().as_slice(), tmp.path()).unwrap();
        assert!(loader.is_present());

        // files are present, so no network access happens here
        let splits = loader.load_splits().unwrap();
        assert_eq!(splits.train.len(), 5);
        assert_eq!(splits.validation.len(), 1);
        assert_eq!(splits.train[0].label, 3);
    }

    #[test]
    fn test_garbage_archive_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(unpack_archive(&b"not gzip"[..], tmp.path()).is_err());
    }
}
