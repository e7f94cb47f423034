//! blink-core — Landmark inference and blink-signal processing.
//!
//! Wraps an ONNX face-mesh model for per-frame eye landmarks, derives
//! an eye-openness ratio from them, and turns the noisy ratio stream
//! into discrete blink events via a hysteresis counter.

pub mod counter;
pub mod facemesh;
pub mod openness;
pub mod types;

pub use counter::BlinkCounter;
pub use facemesh::{FaceMesh, Landmarker, MeshError};
pub use types::{LandmarkSet, Point};

use std::path::PathBuf;

/// Default directory containing the face-mesh ONNX model.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/blinkd/models")
}
