//! Face-mesh landmark adapter via ONNX Runtime.
//!
//! Wraps a single-face face-mesh model: per-frame inference yields the
//! full mesh in frame pixel coordinates, or nothing when the
//! face-presence score falls below the confidence gate.

use crate::types::{LandmarkSet, Point};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const MESH_INPUT_SIZE: usize = 192;
const MESH_LANDMARK_COUNT: usize = 468;
const MESH_COORDS_PER_LANDMARK: usize = 3;
const MESH_PIXEL_SCALE: f32 = 255.0;
const MIN_DETECTION_CONFIDENCE: f32 = 0.5;
const MIN_TRACKING_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("model file not found: {0} — place a face-mesh ONNX export in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Per-frame landmark detection. The implementor owns whatever model
/// state it needs; callers see only landmarks-or-nothing.
pub trait Landmarker {
    fn detect(&mut self, rgb: &[u8], width: u32, height: u32)
        -> Result<Option<LandmarkSet>, MeshError>;
}

/// ONNX face-mesh session. Loaded once per process and reused across
/// frames; single-subject — the model produces at most one face.
pub struct FaceMesh {
    session: Session,
    output_count: usize,
    /// Whether the previous frame had a face. Gates the next frame on
    /// the tracking threshold instead of the detection threshold.
    tracking: bool,
}

impl FaceMesh {
    /// Load the face-mesh ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, MeshError> {
        if !Path::new(model_path).exists() {
            return Err(MeshError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_count = session.outputs().len();
        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face-mesh model"
        );

        if output_count < 2 {
            return Err(MeshError::InferenceFailed(format!(
                "face-mesh model requires landmark and score outputs, got {output_count}"
            )));
        }

        Ok(Self {
            session,
            output_count,
            tracking: false,
        })
    }

    /// Release the model session.
    pub fn close(self) {
        tracing::debug!("face-mesh session closed");
    }

    /// Bilinear-resize an RGB24 frame to the mesh input square and
    /// normalize into an NCHW float tensor.
    fn preprocess(rgb: &[u8], width: usize, height: usize) -> Array4<f32> {
        let mut tensor = Array4::<f32>::zeros((1, 3, MESH_INPUT_SIZE, MESH_INPUT_SIZE));
        let scale_x = width as f32 / MESH_INPUT_SIZE as f32;
        let scale_y = height as f32 / MESH_INPUT_SIZE as f32;

        for y in 0..MESH_INPUT_SIZE {
            let src_y = (y as f32 + 0.5) * scale_y - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
            let y1 = (y0 + 1).min(height - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..MESH_INPUT_SIZE {
                let src_x = (x as f32 + 0.5) * scale_x - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                for c in 0..3 {
                    let tl = rgb[(y0 * width + x0) * 3 + c] as f32;
                    let tr = rgb[(y0 * width + x1) * 3 + c] as f32;
                    let bl = rgb[(y1 * width + x0) * 3 + c] as f32;
                    let br = rgb[(y1 * width + x1) * 3 + c] as f32;

                    let val = tl * (1.0 - fx) * (1.0 - fy)
                        + tr * fx * (1.0 - fy)
                        + bl * (1.0 - fx) * fy
                        + br * fx * fy;

                    tensor[[0, c, y, x]] = val / MESH_PIXEL_SCALE;
                }
            }
        }

        tensor
    }
}

impl Landmarker for FaceMesh {
    fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<LandmarkSet>, MeshError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(MeshError::InferenceFailed(format!(
                "frame buffer too short: expected {expected}, got {}",
                rgb.len()
            )));
        }

        let input = Self::preprocess(rgb, width as usize, height as usize);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut tensors = Vec::with_capacity(self.output_count);
        for i in 0..self.output_count {
            let (_, data) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| MeshError::InferenceFailed(format!("output {i}: {e}")))?;
            tensors.push(data);
        }

        let sizes: Vec<usize> = tensors.iter().map(|t| t.len()).collect();
        let layout = find_output_layout(&sizes).ok_or_else(|| {
            MeshError::InferenceFailed(format!("unrecognized output shapes: {sizes:?}"))
        })?;

        let score = sigmoid(tensors[layout.score][0]);
        let gate = if self.tracking {
            MIN_TRACKING_CONFIDENCE
        } else {
            MIN_DETECTION_CONFIDENCE
        };
        if score < gate {
            tracing::trace!(score, gate, "no face this frame");
            self.tracking = false;
            return Ok(None);
        }
        self.tracking = true;

        Ok(Some(scale_landmarks(
            tensors[layout.landmarks],
            width as f32,
            height as f32,
        )))
    }
}

/// Output tensor positions, identified by element count.
#[derive(Debug, PartialEq, Eq)]
struct OutputLayout {
    landmarks: usize,
    score: usize,
}

/// Identify the landmark tensor (468 × 3 floats) and the face-presence
/// score (a single float) among the model outputs.
fn find_output_layout(sizes: &[usize]) -> Option<OutputLayout> {
    let landmarks = sizes
        .iter()
        .position(|&n| n == MESH_LANDMARK_COUNT * MESH_COORDS_PER_LANDMARK)?;
    let score = sizes.iter().position(|&n| n == 1)?;
    (landmarks != score).then_some(OutputLayout { landmarks, score })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Map raw mesh coordinates (relative to the model input square, z
/// unused) into frame pixel coordinates.
fn scale_landmarks(raw: &[f32], frame_width: f32, frame_height: f32) -> LandmarkSet {
    let mut points = Vec::with_capacity(MESH_LANDMARK_COUNT);
    for lm in raw
        .chunks_exact(MESH_COORDS_PER_LANDMARK)
        .take(MESH_LANDMARK_COUNT)
    {
        points.push(Point {
            x: lm[0] / MESH_INPUT_SIZE as f32 * frame_width,
            y: lm[1] / MESH_INPUT_SIZE as f32 * frame_height,
        });
    }
    LandmarkSet { points }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_output_layout_standard_order() {
        let layout = find_output_layout(&[1404, 1]).unwrap();
        assert_eq!(layout, OutputLayout { landmarks: 0, score: 1 });
    }

    #[test]
    fn test_find_output_layout_swapped() {
        let layout = find_output_layout(&[1, 1404]).unwrap();
        assert_eq!(layout, OutputLayout { landmarks: 1, score: 0 });
    }

    #[test]
    fn test_find_output_layout_extra_outputs() {
        // Some exports carry auxiliary tensors alongside the mesh
        let layout = find_output_layout(&[1404, 1, 80]).unwrap();
        assert_eq!(layout, OutputLayout { landmarks: 0, score: 1 });
    }

    #[test]
    fn test_find_output_layout_unrecognized() {
        assert!(find_output_layout(&[100, 50]).is_none());
        assert!(find_output_layout(&[1404]).is_none());
    }

    #[test]
    fn test_sigmoid_range() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_scale_landmarks_to_frame() {
        // One landmark at the center of the input square maps to the
        // center of the frame
        let raw = vec![96.0, 96.0, 0.0];
        let set = scale_landmarks(&raw, 640.0, 480.0);
        assert_eq!(set.points.len(), 1);
        assert!((set.points[0].x - 320.0).abs() < 1e-3);
        assert!((set.points[0].y - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_scale_landmarks_count_capped() {
        // Oversized output is truncated to the mesh topology
        let raw = vec![0.0; (MESH_LANDMARK_COUNT + 10) * MESH_COORDS_PER_LANDMARK];
        let set = scale_landmarks(&raw, 640.0, 480.0);
        assert_eq!(set.points.len(), MESH_LANDMARK_COUNT);
    }

    #[test]
    fn test_preprocess_uniform_frame() {
        let width = 64usize;
        let height = 48usize;
        let rgb = vec![128u8; width * height * 3];
        let tensor = FaceMesh::preprocess(&rgb, width, height);
        let expected = 128.0 / MESH_PIXEL_SCALE;
        for &v in tensor.iter() {
            assert!((v - expected).abs() < 1e-6);
        }
    }
}
