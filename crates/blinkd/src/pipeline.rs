//! The pipeline driver: session bring-up, the per-frame loop, and
//! cleanup on every exit path.
//!
//! Per iteration: read one frame, run landmarks → openness → counter,
//! emit the current blink count, optionally emit a video frame, then
//! sleep to cap the iteration rate. Heartbeats are paced by wall clock,
//! independent of the per-frame events.

use crate::config::Config;
use crate::events::Emitter;
use crate::video::encode_video_frame;
use blink_core::openness::openness;
use blink_core::{BlinkCounter, FaceMesh, Landmarker};
use blink_hw::{acquire, CameraError, FrameSource, ProbeEvent};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How the session ended, for the process exit code.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    AcquisitionFailed,
}

/// Run one full session. `cleanup_complete` is emitted on every exit
/// path, including failed bring-up and a dead output stream.
pub fn run_session<W: Write>(
    config: &Config,
    stream_video: bool,
    shutdown: &AtomicBool,
    emitter: &mut Emitter<W>,
) -> io::Result<SessionOutcome> {
    let outcome = session_body(config, stream_video, shutdown, emitter);
    let _ = emitter.status("cleanup_complete");
    outcome
}

fn session_body<W: Write>(
    config: &Config,
    stream_video: bool,
    shutdown: &AtomicBool,
    emitter: &mut Emitter<W>,
) -> io::Result<SessionOutcome> {
    emitter.wrapped_status("starting")?;

    let result = acquire(&config.candidates, config.settle_delay, |event| {
        // Probe diagnostics are best-effort; a dead stream surfaces at
        // the next protocol emit.
        match event {
            ProbeEvent::Trying(c) => {
                let _ = emitter.status(&format!("trying_camera_{}", c.index));
            }
            ProbeEvent::Accepted(c) => {
                let _ = emitter.status(&format!("camera_{}_success", c.index));
            }
            ProbeEvent::Failed { candidate, error } => {
                let _ = emitter.warning(&format!("camera_{}_failed: {error}", candidate.index));
            }
        }
    });
    let mut camera = match result {
        Ok(camera) => camera,
        Err(err) => {
            tracing::error!(error = %err, "camera acquisition failed");
            emitter.error("no_camera_found")?;
            return Ok(SessionOutcome::AcquisitionFailed);
        }
    };
    emitter.wrapped_status("camera_ready")?;

    camera.apply_properties(&config.capture);
    emitter.wrapped_status("properties_set")?;

    emitter.wrapped_status("initializing_mediapipe")?;
    let mut mesh = match FaceMesh::load(&config.mesh_model_path()) {
        Ok(mesh) => mesh,
        Err(err) => {
            tracing::error!(error = %err, "face-mesh load failed");
            emitter.error(&format!("main_error: {err}"))?;
            return Ok(SessionOutcome::Completed);
        }
    };
    emitter.wrapped_status("initialized")?;

    let opts = LoopOptions {
        stream_video,
        heartbeat_interval: config.heartbeat_interval,
        frame_interval: config.frame_interval,
        video_width: config.video_width,
        video_height: config.video_height,
        jpeg_quality: config.jpeg_quality,
    };
    let mut counter = BlinkCounter::new();

    let loop_result = match camera.frame_source() {
        Ok(mut source) => run_loop(&mut source, &mut mesh, &mut counter, emitter, &opts, shutdown),
        Err(err) => {
            tracing::error!(error = %err, "stream start failed");
            emitter.error(&format!("loop_error: {err}"))
        }
    };

    mesh.close();
    drop(camera);
    loop_result?;
    Ok(SessionOutcome::Completed)
}

struct LoopOptions {
    stream_video: bool,
    heartbeat_interval: Duration,
    frame_interval: Duration,
    video_width: u32,
    video_height: u32,
    jpeg_quality: u8,
}

/// The per-frame loop. Fatal conditions are emitted as error events and
/// end the loop; only output-stream failures propagate as `Err`.
fn run_loop<S, L, W>(
    source: &mut S,
    landmarker: &mut L,
    counter: &mut BlinkCounter,
    emitter: &mut Emitter<W>,
    opts: &LoopOptions,
    shutdown: &AtomicBool,
) -> io::Result<()>
where
    S: FrameSource,
    L: Landmarker,
    W: Write,
{
    let mut frame_count: u64 = 0;
    let mut last_heartbeat = Instant::now();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            emitter.status("interrupted")?;
            return Ok(());
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(CameraError::Disconnected) => {
                emitter.error("camera_disconnected")?;
                return Ok(());
            }
            Err(err) => {
                tracing::error!(error = %err, "frame read failed");
                emitter.error("frame_read_failed")?;
                return Ok(());
            }
        };
        if frame.is_empty() {
            continue;
        }
        frame_count += 1;

        if last_heartbeat.elapsed() >= opts.heartbeat_interval {
            emitter.heartbeat(frame_count)?;
            last_heartbeat = Instant::now();
        }

        match landmarker.detect(&frame.data, frame.width, frame.height) {
            Ok(detection) => {
                // No detection, or a degenerate eye, skips the counter
                // for this frame
                let sample = detection.as_ref().and_then(openness);
                if counter.advance(sample) {
                    tracing::debug!(blinks = counter.blink_count(), "blink committed");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "landmark inference failed");
                emitter.error(&format!("loop_error: {err}"))?;
                return Ok(());
            }
        }

        emitter.blink_count(counter.blink_count())?;

        if opts.stream_video {
            match encode_video_frame(&frame, opts.video_width, opts.video_height, opts.jpeg_quality)
            {
                Ok(encoded) => emitter.video_frame(&encoded)?,
                Err(err) => {
                    emitter.wrapped_warning(&format!("video_encoding_error: {err}"))?;
                }
            }
        }

        if !opts.frame_interval.is_zero() {
            std::thread::sleep(opts.frame_interval);
        }
    }
}
