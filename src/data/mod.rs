// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from image files on disk to tensor batches:
//
//   CIFAR-10 .bin / image folder
//       │
//       ▼
//   Cifar10Loader / ImageFolderLoader  → Vec<ImageItem> (u8, CHW)
//       │
//       ▼
//   ImageDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher      → Burn Batcher: items → [N, C, H, W] tensor in [0,1]
//       │
//       ▼
//   DataLoader        → Burn's loader (batching, shuffle, worker prefetch)
//       │
//       ▼
//   BatchCursor       → cycles the loader into an endless batch stream
//       │
//       ▼
//   scaling::scale    → [0,1] → [-1,1] right before the model

/// CIFAR-10 binary batch reader
pub mod cifar;

/// Loads a flat directory of images and resizes them
pub mod loader;

/// Implements Burn's Dataset trait for image items
pub mod dataset;

/// Converts image items into tensor batches
pub mod batcher;

/// DataLoader construction and the endless cycling cursor
pub mod cursor;

/// Pixel range conversions between [0,1], [-1,1] and u8
pub mod scaling;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
