// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits that describe a training run:
// what an image is, what a log record holds, when the periodic
// hooks fire, and the seams the other layers plug into.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits

// Raw u8 images and labelled dataset items
pub mod image;

// One flat metrics record per training iteration
pub mod record;

// Iteration-driven triggers (validate / generate / evaluate)
pub mod schedule;

// Core abstractions (traits) that other layers implement
pub mod traits;
