//! blink-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access: ordered candidate acquisition,
//! best-effort property application, and per-frame RGB capture.

pub mod camera;
pub mod frame;

pub use camera::{
    acquire, default_candidates, Camera, CameraError, CameraSource, Candidate, CaptureProperties,
    FrameSource, ProbeEvent, Property, StreamBackend,
};
pub use frame::Frame;
