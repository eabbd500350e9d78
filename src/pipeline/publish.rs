//! Publish stage

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use super::Stage;
use crate::camera::{CameraDevice, Frame};
use crate::control::{keys, ControlMap, ControlSender};
use crate::error::{RcamError, Result};
use crate::protocol::PubMessage;
use crate::publish::PublishHub;

/// Emits the metadata/image pair for each frame and feeds derived telemetry
/// back to the command router.
///
/// The published metadata is a copy with the bulky `*StatsOutput` diagnostics
/// stripped; the frame itself keeps them.
pub struct Publish {
    hub: Arc<PublishHub>,
    telemetry: ControlSender,
    analogue_gain: f64,
    exposure_time: f64,
    lens_position: f64,
}

impl Publish {
    pub fn new(hub: Arc<PublishHub>, telemetry: ControlSender) -> Self {
        Self {
            hub,
            telemetry,
            analogue_gain: 0.0,
            exposure_time: 0.0,
            lens_position: 0.0,
        }
    }

    fn telemetry_updates(&mut self, metadata: &ControlMap) -> ControlMap {
        let mut updates = ControlMap::new();

        let gain = metadata
            .get(keys::ANALOGUE_GAIN)
            .and_then(Value::as_f64)
            .unwrap_or(self.analogue_gain);
        let exposure = metadata
            .get(keys::EXPOSURE_TIME)
            .and_then(Value::as_f64)
            .unwrap_or(self.exposure_time);
        if gain != self.analogue_gain || exposure != self.exposure_time {
            self.analogue_gain = gain;
            self.exposure_time = exposure;
            updates.insert(keys::ANALOGUE_GAIN.into(), Value::from(gain));
            updates.insert(keys::EXPOSURE_TIME.into(), Value::from(exposure));
        }

        let lens = metadata
            .get(keys::LENS_POSITION)
            .and_then(Value::as_f64)
            .unwrap_or(self.lens_position);
        if lens != self.lens_position {
            self.lens_position = lens;
            updates.insert(keys::LENS_POSITION.into(), Value::from(lens));
        }

        updates
    }
}

impl Stage for Publish {
    fn name(&self) -> &'static str {
        "publish"
    }

    fn process(&mut self, _camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        // copy so downstream diagnostics stay on the frame
        let mut metadata = frame.metadata.clone();
        metadata.retain(|key, _| !key.ends_with(keys::STATS_SUFFIX));

        let metadata_json = serde_json::to_string(&metadata)?;
        self.hub.publish(PubMessage::metadata(
            frame.sequence,
            Bytes::from(metadata_json),
        ));

        let jpeg = frame
            .jpeg
            .take()
            .ok_or_else(|| RcamError::Codec("no encoded image to publish".into()))?;
        self.hub.publish(PubMessage::jpeg(frame.sequence, jpeg));

        let updates = self.telemetry_updates(&metadata);
        if !updates.is_empty() {
            self.telemetry.send(updates);
        }
        Ok(())
    }
}
