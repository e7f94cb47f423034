//! Eye-openness ratio from six-point eye contours.

use crate::types::{LandmarkSet, Point};

/// Horizontal eye spans shorter than this (pixels) cannot produce a
/// reliable ratio.
const MIN_HORIZONTAL_SPAN: f32 = 1e-3;

/// Openness ratio of one eye from its six-point contour:
/// `(|p1-p5| + |p2-p4|) / (2 * |p0-p3|)` where 0 and 3 are the
/// horizontal corners and {1,2}/{4,5} the upper/lower lid pairs.
///
/// Returns `None` when the corners are (near-)coincident instead of
/// producing an unbounded ratio.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> Option<f32> {
    let vertical_a = eye[1].distance(&eye[5]);
    let vertical_b = eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal < MIN_HORIZONTAL_SPAN {
        return None;
    }
    Some((vertical_a + vertical_b) / (2.0 * horizontal))
}

/// Combined openness for a frame: the mean of the left- and right-eye
/// ratios. `None` when either eye is missing or degenerate.
pub fn openness(landmarks: &LandmarkSet) -> Option<f32> {
    let left = eye_aspect_ratio(&landmarks.left_eye()?)?;
    let right = eye_aspect_ratio(&landmarks.right_eye()?)?;
    Some((left + right) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LEFT_EYE_INDICES, RIGHT_EYE_INDICES};

    /// Build a six-point contour with horizontal span 100 and the lid
    /// pairs placed to produce exactly `ratio`.
    fn eye_with_ratio(ratio: f32) -> [Point; 6] {
        let half = ratio * 50.0;
        [
            Point { x: 0.0, y: 0.0 },
            Point { x: 30.0, y: half },
            Point { x: 60.0, y: half },
            Point { x: 100.0, y: 0.0 },
            Point { x: 60.0, y: -half },
            Point { x: 30.0, y: -half },
        ]
    }

    #[test]
    fn test_ratio_matches_construction() {
        for &expected in &[0.05f32, 0.21, 0.30, 0.40] {
            let ratio = eye_aspect_ratio(&eye_with_ratio(expected)).unwrap();
            assert!(
                (ratio - expected).abs() < 1e-5,
                "expected {expected}, got {ratio}"
            );
        }
    }

    #[test]
    fn test_ratio_finite_and_non_negative() {
        // Arbitrary non-degenerate contours stay in [0, inf)
        let eye = [
            Point { x: 10.0, y: 20.0 },
            Point { x: 14.0, y: 17.0 },
            Point { x: 18.0, y: 17.5 },
            Point { x: 24.0, y: 20.5 },
            Point { x: 18.0, y: 23.0 },
            Point { x: 14.0, y: 22.5 },
        ];
        let ratio = eye_aspect_ratio(&eye).unwrap();
        assert!(ratio.is_finite());
        assert!(ratio >= 0.0);
    }

    #[test]
    fn test_closed_eye_ratio_is_zero() {
        let eye = eye_with_ratio(0.0);
        assert_eq!(eye_aspect_ratio(&eye), Some(0.0));
    }

    #[test]
    fn test_degenerate_corners_rejected() {
        // All six points coincident: no horizontal span
        let eye = [Point { x: 5.0, y: 5.0 }; 6];
        assert!(eye_aspect_ratio(&eye).is_none());
    }

    #[test]
    fn test_openness_averages_both_eyes() {
        let mut points = vec![Point::default(); 468];
        for (slot, &idx) in LEFT_EYE_INDICES.iter().enumerate() {
            points[idx] = eye_with_ratio(0.2)[slot];
        }
        for (slot, &idx) in RIGHT_EYE_INDICES.iter().enumerate() {
            let mut p = eye_with_ratio(0.4)[slot];
            p.x += 200.0; // keep the eyes apart
            points[idx] = p;
        }
        let sample = openness(&LandmarkSet { points }).unwrap();
        assert!((sample - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_openness_none_when_one_eye_degenerate() {
        let mut points = vec![Point::default(); 468];
        for (slot, &idx) in LEFT_EYE_INDICES.iter().enumerate() {
            points[idx] = eye_with_ratio(0.3)[slot];
        }
        // Right eye left at the default coincident points
        assert!(openness(&LandmarkSet { points }).is_none());
    }
}
