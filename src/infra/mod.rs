// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by more than one layer:
//
//   checkpoint.rs — model weights (CompactRecorder) and the
//                   TrainConfig as JSON, so sampling can rebuild
//                   the architecture
//
//   session.rs    — run-scoped experiment log: metrics.jsonl,
//                   image media, summary.json
//
//   image_io.rs   — PNG export of u8 CHW images
//
//   frechet.rs    — Fréchet distance between feature statistics
//                   of reference and generated images

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Experiment session writer
pub mod session;

/// PNG export
pub mod image_io;

/// Distributional distance metric
pub mod frechet;
