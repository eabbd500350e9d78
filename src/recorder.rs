//! Frame recorder
//!
//! Writes subscribed frames to disk as numbered JPEG/JSON file pairs.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::info;

use crate::client::SubscribedFrame;
use crate::error::Result;

/// Disk sink for a recording session
pub struct RecorderSink {
    dir: PathBuf,
    index: u64,
}

impl RecorderSink {
    /// Record into `dir`, creating it if needed
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, index: 0 })
    }

    /// Number of frames written so far
    pub fn recorded(&self) -> u64 {
        self.index
    }

    /// Write one frame as `img-NNNN.jpg` plus `img-NNNN.json`
    ///
    /// The sidecar carries the frame's metadata with the stream sequence and
    /// a wall-clock timestamp added.
    pub fn save(&mut self, frame: &SubscribedFrame) -> Result<PathBuf> {
        let stem = format!("img-{:04}", self.index);
        let jpeg_path = self.dir.join(format!("{}.jpg", stem));
        fs::write(&jpeg_path, &frame.jpeg)?;

        let mut metadata = frame.metadata.clone();
        metadata.insert("Sequence".into(), Value::from(frame.sequence));
        metadata.insert(
            "RecordedAt".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        let sidecar = self.dir.join(format!("{}.json", stem));
        fs::write(&sidecar, serde_json::to_string_pretty(&metadata)?)?;

        info!("recorded frame {} as {}", frame.sequence, stem);
        self.index += 1;
        Ok(jpeg_path)
    }
}
