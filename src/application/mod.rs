// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each
// (training a model, sampling from a checkpoint).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Only workflow coordination

// The training workflow and its configuration
pub mod train_use_case;

// Sampling images from a saved checkpoint
pub mod sample_use_case;
