//! V4L2 camera acquisition and capture via the `v4l` crate.
//!
//! Acquisition walks an ordered candidate list of (device index, stream
//! backend) pairs. A candidate is accepted only when the device opens
//! AND a test read returns a non-empty frame — some drivers report a
//! successful open while being unable to stream.

use crate::frame::{self, Frame};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::{Metadata, Type as BufType};
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::capture::parameters::Parameters;
use v4l::video::Capture;
use v4l::FourCC;

/// Buffer count used until a caller requests a different one.
const DEFAULT_BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("device disconnected")]
    Disconnected,
    #[error("no candidate camera produced a readable frame")]
    NoCameraFound,
}

/// Streaming I/O method to request from the driver.
///
/// Plays the role of a backend hint: the same device is retried with a
/// different access path before moving on to the next device index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamBackend {
    /// Memory-mapped kernel buffers.
    Mmap,
    /// User-pointer buffers.
    UserPtr,
}

/// One acquisition candidate: a device index plus a backend hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub index: usize,
    pub backend: StreamBackend,
}

impl Candidate {
    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.index)
    }
}

/// Default candidate order: device 0 before device 1, mmap before
/// user-pointer on each.
pub fn default_candidates() -> Vec<Candidate> {
    vec![
        Candidate { index: 0, backend: StreamBackend::Mmap },
        Candidate { index: 0, backend: StreamBackend::UserPtr },
        Candidate { index: 1, backend: StreamBackend::Mmap },
        Candidate { index: 1, backend: StreamBackend::UserPtr },
    ]
}

/// Per-candidate progress notification during acquisition.
pub enum ProbeEvent<'a> {
    Trying(&'a Candidate),
    Accepted(&'a Candidate),
    Failed {
        candidate: &'a Candidate,
        error: &'a CameraError,
    },
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, converted to RGB24).
    Yuyv,
    /// RGB24 (3 bytes/pixel, passed through).
    Rgb24,
}

/// Capture property names confirmed by [`Camera::apply_properties`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Width,
    Height,
    Fps,
    BufferCount,
}

/// Requested capture properties. Each is applied independently and
/// best-effort: a backend may silently ignore or reject any of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureProperties {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub buffer_count: Option<u32>,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    backend: StreamBackend,
    buffer_count: u32,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

/// Try each candidate strictly in order and return the first camera
/// that passes the settle-and-test-read probe. Per-candidate failures
/// are absorbed and reported to `observer`; exhaustion yields
/// [`CameraError::NoCameraFound`] with no handle left open.
pub fn acquire(
    candidates: &[Candidate],
    settle: Duration,
    observer: impl FnMut(ProbeEvent<'_>),
) -> Result<Camera, CameraError> {
    acquire_with(candidates, |candidate| Camera::probe(candidate, settle), observer)
}

/// Ordered-candidate loop, generic over the probe so it can be
/// exercised without hardware.
fn acquire_with<T>(
    candidates: &[Candidate],
    mut probe: impl FnMut(&Candidate) -> Result<T, CameraError>,
    mut observer: impl FnMut(ProbeEvent<'_>),
) -> Result<T, CameraError> {
    for candidate in candidates {
        observer(ProbeEvent::Trying(candidate));
        match probe(candidate) {
            Ok(camera) => {
                observer(ProbeEvent::Accepted(candidate));
                return Ok(camera);
            }
            Err(error) => {
                tracing::debug!(?candidate, %error, "candidate rejected");
                observer(ProbeEvent::Failed {
                    candidate,
                    error: &error,
                });
            }
        }
    }
    Err(CameraError::NoCameraFound)
}

impl Camera {
    /// Open one candidate, negotiate a format, wait for the device to
    /// settle, then require a non-empty test read before accepting.
    fn probe(candidate: &Candidate, settle: Duration) -> Result<Self, CameraError> {
        let device_path = candidate.device_path();
        if !Path::new(&device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path));
        }

        let device = Device::with_path(&device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Request YUYV at the device's current resolution; accept RGB24
        // if the driver negotiates it instead.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = if fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if fourcc == FourCC::new(b"RGB3") {
            PixelFormat::Rgb24
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV or RGB3)"
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            backend = ?candidate.backend,
            "negotiated format"
        );

        // Give the device time to initialize before the test read.
        std::thread::sleep(settle);

        let camera = Self {
            device,
            backend: candidate.backend,
            buffer_count: DEFAULT_BUFFER_COUNT,
            width: negotiated.width,
            height: negotiated.height,
            device_path,
            fourcc,
            pixel_format,
        };

        // Open reports success on some backends that cannot stream;
        // only a real frame proves the candidate out.
        {
            let mut stream = camera.open_stream()?;
            let test_frame = camera.read_frame(&mut stream)?;
            if test_frame.is_empty() {
                return Err(CameraError::CaptureFailed(
                    "test read returned an empty frame".into(),
                ));
            }
        }

        Ok(camera)
    }

    /// Apply each requested property independently, swallowing
    /// per-property failures. Returns the properties the device
    /// actually confirmed; callers that depend on exact values must
    /// re-read them.
    pub fn apply_properties(&mut self, requested: &CaptureProperties) -> Vec<Property> {
        let mut confirmed = Vec::new();

        if requested.width.is_some() || requested.height.is_some() {
            match self.device.format() {
                Ok(mut fmt) => {
                    if let Some(width) = requested.width {
                        fmt.width = width;
                    }
                    if let Some(height) = requested.height {
                        fmt.height = height;
                    }
                    fmt.fourcc = self.fourcc;
                    match self.device.set_format(&fmt) {
                        Ok(negotiated) => {
                            self.width = negotiated.width;
                            self.height = negotiated.height;
                            if requested.width == Some(negotiated.width) {
                                confirmed.push(Property::Width);
                            }
                            if requested.height == Some(negotiated.height) {
                                confirmed.push(Property::Height);
                            }
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "resolution request rejected");
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "format query failed");
                }
            }
        }

        if let Some(fps) = requested.fps {
            match self.device.set_params(&Parameters::with_fps(fps)) {
                Ok(params) => {
                    let interval = params.interval;
                    if interval.numerator != 0 && interval.denominator / interval.numerator == fps
                    {
                        confirmed.push(Property::Fps);
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "frame rate request rejected");
                }
            }
        }

        if let Some(count) = requested.buffer_count {
            // Takes effect at the next stream creation.
            self.buffer_count = count;
            confirmed.push(Property::BufferCount);
        }

        tracing::info!(?confirmed, "capture properties applied");
        confirmed
    }

    /// Start a capture stream using the candidate's backend.
    pub fn open_stream(&self) -> Result<FrameStream<'_>, CameraError> {
        let stream = match self.backend {
            StreamBackend::Mmap => {
                MmapStream::with_buffers(&self.device, BufType::VideoCapture, self.buffer_count)
                    .map(FrameStream::Mmap)
            }
            StreamBackend::UserPtr => {
                UserptrStream::with_buffers(&self.device, BufType::VideoCapture, self.buffer_count)
                    .map(FrameStream::UserPtr)
            }
        };
        stream.map_err(|e| {
            CameraError::CaptureFailed(format!(
                "failed to start {:?} stream: {e}",
                self.backend
            ))
        })
    }

    /// Whether the device still answers capability queries. A false
    /// return means the device went away mid-session.
    pub fn is_connected(&self) -> bool {
        self.device.query_caps().is_ok()
    }

    /// Dequeue one buffer from the stream and convert it to RGB24.
    pub fn read_frame(&self, stream: &mut FrameStream<'_>) -> Result<Frame, CameraError> {
        let (buf, meta) = stream
            .dequeue()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let data = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}")))?,
            PixelFormat::Rgb24 => {
                let expected = (self.width * self.height * 3) as usize;
                if buf.len() < expected {
                    return Err(CameraError::CaptureFailed(format!(
                        "RGB3 buffer too short: expected {expected}, got {}",
                        buf.len()
                    )));
                }
                buf[..expected].to_vec()
            }
        };

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }

    /// Create a [`FrameSource`] bound to this camera.
    pub fn frame_source(&self) -> Result<CameraSource<'_>, CameraError> {
        Ok(CameraSource {
            camera: self,
            stream: self.open_stream()?,
        })
    }
}

/// An open capture stream, one variant per backend.
pub enum FrameStream<'a> {
    Mmap(MmapStream<'a>),
    UserPtr(UserptrStream<'a>),
}

impl FrameStream<'_> {
    fn dequeue(&mut self) -> std::io::Result<(&[u8], &Metadata)> {
        match self {
            FrameStream::Mmap(stream) => CaptureStream::next(stream),
            FrameStream::UserPtr(stream) => CaptureStream::next(stream),
        }
    }
}

/// One frame per call, or an error that ends the session.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// [`FrameSource`] over an open camera stream. Distinguishes a
/// device that vanished from a read that failed.
pub struct CameraSource<'a> {
    camera: &'a Camera,
    stream: FrameStream<'a>,
}

impl FrameSource for CameraSource<'_> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if !self.camera.is_connected() {
            return Err(CameraError::Disconnected);
        }
        self.camera.read_frame(&mut self.stream)
    }
}
