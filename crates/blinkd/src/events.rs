//! Delimited-JSON event emission.
//!
//! Two framings coexist on the same stream: bare JSON lines for
//! low-level diagnostics, and `JSON_START`...`JSON_END` wrapped lines
//! for the primary event stream, so a consumer can extract payloads
//! from a descriptor that may also carry unstructured text. Every
//! message is flushed before the call returns — a consumer reading
//! incrementally must never wait on a buffered event.

use serde_json::{json, Value};
use std::io::{self, Write};

const WRAP_START: &str = "JSON_START";
const WRAP_END: &str = "JSON_END";

/// Writes protocol messages to an output stream in strict call order.
pub struct Emitter<W: Write> {
    out: W,
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn bare(&mut self, payload: &Value) -> io::Result<()> {
        writeln!(self.out, "{payload}")?;
        self.out.flush()
    }

    fn wrapped(&mut self, payload: &Value) -> io::Result<()> {
        writeln!(self.out, "{WRAP_START}{payload}{WRAP_END}")?;
        self.out.flush()
    }

    /// Bare low-level status line.
    pub fn status(&mut self, status: &str) -> io::Result<()> {
        self.bare(&json!({ "status": status }))
    }

    /// Bare fatal-condition line.
    pub fn error(&mut self, reason: &str) -> io::Result<()> {
        self.bare(&json!({ "error": reason }))
    }

    /// Bare non-fatal diagnostic line.
    pub fn warning(&mut self, reason: &str) -> io::Result<()> {
        self.bare(&json!({ "warning": reason }))
    }

    /// Wrapped session status transition.
    pub fn wrapped_status(&mut self, status: &str) -> io::Result<()> {
        self.wrapped(&json!({ "status": status }))
    }

    /// Wrapped heartbeat with the running frame count.
    pub fn heartbeat(&mut self, frame_count: u64) -> io::Result<()> {
        self.wrapped(&json!({ "status": "processing", "frame_count": frame_count }))
    }

    /// Wrapped blink-count update, one per processed frame.
    pub fn blink_count(&mut self, count: u64) -> io::Result<()> {
        self.wrapped(&json!({ "blink_count": count }))
    }

    /// Wrapped video frame, always its own message, never merged with
    /// a blink-count update.
    pub fn video_frame(&mut self, jpeg_base64: &str) -> io::Result<()> {
        self.wrapped(&json!({ "video_frame": jpeg_base64 }))
    }

    /// Wrapped warning for best-effort side-channel failures.
    pub fn wrapped_warning(&mut self, reason: &str) -> io::Result<()> {
        self.wrapped(&json!({ "warning": reason }))
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(emitter: Emitter<Vec<u8>>) -> Vec<String> {
        String::from_utf8(emitter.out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Strip the wrapping markers, failing the test on malformed framing.
    fn unwrap_line(line: &str) -> &str {
        assert!(line.starts_with(WRAP_START), "missing start marker: {line}");
        assert!(line.ends_with(WRAP_END), "missing end marker: {line}");
        &line[WRAP_START.len()..line.len() - WRAP_END.len()]
    }

    #[test]
    fn test_bare_messages_parse_directly() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.status("cleanup_complete").unwrap();
        emitter.error("no_camera_found").unwrap();
        emitter.warning("camera_0_failed: busy").unwrap();

        let lines = lines(emitter);
        assert_eq!(lines.len(), 3);
        let first: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["status"], "cleanup_complete");
        let second: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second["error"], "no_camera_found");
        let third: Value = serde_json::from_str(&lines[2]).unwrap();
        assert_eq!(third["warning"], "camera_0_failed: busy");
    }

    #[test]
    fn test_wrapped_messages_parse_after_stripping() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.wrapped_status("starting").unwrap();
        emitter.blink_count(3).unwrap();
        emitter.heartbeat(150).unwrap();
        emitter.video_frame("aGVsbG8=").unwrap();
        emitter.wrapped_warning("video_encoding_error: bad frame").unwrap();

        let lines = lines(emitter);
        assert_eq!(lines.len(), 5);
        for line in &lines {
            let payload: Value = serde_json::from_str(unwrap_line(line)).unwrap();
            assert!(payload.is_object());
        }

        let blink: Value = serde_json::from_str(unwrap_line(&lines[1])).unwrap();
        assert_eq!(blink["blink_count"], 3);
        let heartbeat: Value = serde_json::from_str(unwrap_line(&lines[2])).unwrap();
        assert_eq!(heartbeat["status"], "processing");
        assert_eq!(heartbeat["frame_count"], 150);
        let video: Value = serde_json::from_str(unwrap_line(&lines[3])).unwrap();
        assert_eq!(video["video_frame"], "aGVsbG8=");
    }

    #[test]
    fn test_emission_order_preserved() {
        let mut emitter = Emitter::new(Vec::new());
        for count in 0..5u64 {
            emitter.blink_count(count).unwrap();
        }
        let lines = lines(emitter);
        for (i, line) in lines.iter().enumerate() {
            let payload: Value = serde_json::from_str(unwrap_line(line)).unwrap();
            assert_eq!(payload["blink_count"], i as u64);
        }
    }

    #[test]
    fn test_one_message_per_line() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.wrapped_status("initialized").unwrap();
        emitter.status("interrupted").unwrap();
        let raw = String::from_utf8(emitter.out).unwrap();
        assert_eq!(raw.matches('\n').count(), 2);
        assert!(raw.ends_with('\n'));
    }
}
