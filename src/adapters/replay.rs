//! Recorded tracking sessions
//!
//! Replays frames from NDJSON, one [`TrackingFrame`] per line:
//!
//! ```json
//! {"captured_at":"2024-05-01T12:00:00Z","hands":[{"side":"left","elbow":[0,-0.3,0],"wrist":[0,-0.3,0.25],"palm":[0,0,0,1]}]}
//! ```

use std::collections::VecDeque;
use std::path::Path;

use chrono::Duration;

use super::TrackingSource;
use crate::error::BridgeError;
use crate::types::TrackingFrame;

/// Tracking source that plays back a fixed list of frames
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: VecDeque<TrackingFrame>,
    total: usize,
    span: Option<Duration>,
}

impl ReplaySource {
    pub fn from_frames(frames: Vec<TrackingFrame>) -> Self {
        let total = frames.len();
        let mut stamps = frames.iter().filter_map(|f| f.captured_at);
        let span = stamps
            .next()
            .map(|first| stamps.last().unwrap_or(first) - first);
        Self {
            frames: frames.into(),
            total,
            span,
        }
    }

    /// Parse NDJSON; blank lines are skipped
    pub fn parse_ndjson(ndjson: &str) -> Result<Self, BridgeError> {
        let mut frames = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<TrackingFrame>(trimmed) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    return Err(BridgeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(Self::from_frames(frames))
    }

    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let ndjson = std::fs::read_to_string(path)?;
        Self::parse_ndjson(&ndjson)
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Capture time between the first and last timestamped frames of the whole
    /// recording, unaffected by playback
    pub fn duration(&self) -> Option<Duration> {
        self.span
    }
}

impl TrackingSource for ReplaySource {
    fn current_frame(&mut self) -> Option<TrackingFrame> {
        self.frames.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    const RECORDING: &str = r#"{"captured_at":"2024-05-01T12:00:00Z","hands":[{"side":"left","elbow":[0.0,-0.3,0.0],"wrist":[0.0,-0.3,0.25],"palm":[0.0,0.0,0.0,1.0]}]}

{"captured_at":"2024-05-01T12:00:00.500Z","hands":[]}
{"hands":[{"side":"right","elbow":[0.2,-0.3,0.0],"wrist":[0.2,-0.3,0.25],"palm":[0.0,0.0,0.0,1.0],"fingers":[{"bones":[[0.0,0.0,0.0,1.0],[0.0,0.0,0.0,1.0]]}]}]}
"#;

    #[test]
    fn test_parse_ndjson() {
        let mut source = ReplaySource::parse_ndjson(RECORDING).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.duration(), Some(Duration::milliseconds(500)));

        let first = source.current_frame().unwrap();
        assert!(first.hand(Side::Left).is_some());
        assert!(first.hand(Side::Right).is_none());

        let second = source.current_frame().unwrap();
        assert!(second.hands.is_empty());

        let third = source.current_frame().unwrap();
        assert!(third.captured_at.is_none());
        assert_eq!(third.hand(Side::Right).unwrap().fingers[0].bones.len(), 2);

        assert!(source.current_frame().is_none());
        assert_eq!(source.remaining(), 0);
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn test_duration_survives_playback() {
        let mut source = ReplaySource::parse_ndjson(RECORDING).unwrap();
        source.current_frame();
        assert_eq!(source.duration(), Some(Duration::milliseconds(500)));
        while source.current_frame().is_some() {}
        assert_eq!(source.duration(), Some(Duration::milliseconds(500)));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let ndjson = "{\"hands\":[]}\n\n{\"hands\":[{\"side\":\"middle\"}]}";
        match ReplaySource::parse_ndjson(ndjson) {
            Err(BridgeError::ParseError(msg)) => assert!(msg.contains("line 3"), "{msg}"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_recording() {
        let mut source = ReplaySource::parse_ndjson("\n\n").unwrap();
        assert!(source.is_empty());
        assert_eq!(source.duration(), None);
        assert!(source.current_frame().is_none());
    }
}
