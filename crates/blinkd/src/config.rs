use blink_hw::{default_candidates, Candidate, CaptureProperties, StreamBackend};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration, loaded from environment variables. There is
/// no config file; the session is entirely ephemeral.
pub struct Config {
    /// Ordered acquisition candidates.
    pub candidates: Vec<Candidate>,
    /// Delay between opening a candidate and its test read.
    pub settle_delay: Duration,
    /// Capture properties requested after acquisition (best-effort).
    pub capture: CaptureProperties,
    /// Directory containing the face-mesh ONNX model.
    pub model_dir: PathBuf,
    /// Wall-clock interval between heartbeat status events.
    pub heartbeat_interval: Duration,
    /// Pacing sleep at the end of each loop iteration.
    pub frame_interval: Duration,
    /// Downsampled resolution for the video side-channel.
    pub video_width: u32,
    pub video_height: u32,
    /// JPEG quality for the video side-channel.
    pub jpeg_quality: u8,
}

impl Config {
    /// Load configuration from `BLINKD_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let candidates = match std::env::var("BLINKD_CAMERA_INDEX")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            Some(index) => vec![
                Candidate { index, backend: StreamBackend::Mmap },
                Candidate { index, backend: StreamBackend::UserPtr },
            ],
            None => default_candidates(),
        };

        let model_dir = std::env::var("BLINKD_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| blink_core::default_model_dir());

        Self {
            candidates,
            settle_delay: Duration::from_millis(env_u64("BLINKD_SETTLE_DELAY_MS", 500)),
            capture: CaptureProperties {
                width: Some(env_u32("BLINKD_FRAME_WIDTH", 640)),
                height: Some(env_u32("BLINKD_FRAME_HEIGHT", 480)),
                fps: Some(env_u32("BLINKD_FPS", 30)),
                buffer_count: Some(env_u32("BLINKD_BUFFER_COUNT", 1)),
            },
            model_dir,
            heartbeat_interval: Duration::from_secs(env_u64("BLINKD_HEARTBEAT_SECS", 5)),
            frame_interval: Duration::from_millis(env_u64("BLINKD_FRAME_INTERVAL_MS", 30)),
            video_width: env_u32("BLINKD_VIDEO_WIDTH", 320),
            video_height: env_u32("BLINKD_VIDEO_HEIGHT", 240),
            jpeg_quality: env_u8("BLINKD_JPEG_QUALITY", 70),
        }
    }

    /// Path to the face-mesh model.
    pub fn mesh_model_path(&self) -> String {
        self.model_dir
            .join("face_mesh.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
